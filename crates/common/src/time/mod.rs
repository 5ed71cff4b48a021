//! Time utilities and abstractions
//!
//! - **[`clock`]**: real and mock clocks shared by every time-dependent
//!   component
//! - **[`timer`]**: cancelable one-shot and recurring timers, plus the
//!   single-handle [`TimerSlot`]
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use unimoghub_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
//! ```

pub mod clock;
pub mod timer;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use timer::{recurring, timeout, TimerHandle, TimerSlot};
