//! Authentication token lifecycle

pub mod ports;
pub mod token_manager;

pub use ports::AuthClient;
pub use token_manager::TokenLifecycleManager;
