//! Process-local typed publish/subscribe
//!
//! Components announce state transitions on an [`EventBus`] instead of
//! calling each other, so a token manager never needs to know who listens
//! for its refreshes. Events are plain values of one closed enum per bus.

pub mod bus;

pub use bus::{EventBus, EventSubscription, DEFAULT_EVENT_CAPACITY};
