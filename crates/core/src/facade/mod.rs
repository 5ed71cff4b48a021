//! Resilient data access facade

pub mod history;
pub mod ports;
pub mod service;

pub use history::MetricsHistory;
pub use ports::ResourceClient;
pub use service::{ConnectivityFacade, HealthReport, Response};
