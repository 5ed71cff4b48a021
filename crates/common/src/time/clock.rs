//! Clock abstraction for testability
//!
//! Circuit breakers, token lifetimes and recovery cooldowns all read time
//! through [`Clock`] so tests can drive them deterministically with
//! [`MockClock`] instead of waiting on wall-clock time.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Trait for time operations to enable deterministic testing
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> i64 {
        let millis = self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        i64::try_from(millis).unwrap_or(i64::MAX)
    }
}

/// Shared, type-erased clock handed to long-lived components
pub type SharedClock = Arc<dyn Clock>;

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Both the monotonic and the wall clock advance together, and only when the
/// test says so. Clones share the same elapsed time.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use unimoghub_common::time::{Clock, MockClock};
///
/// let clock = MockClock::at_epoch_millis(1_700_000_000_000);
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.millis_since_epoch(), 1_700_000_005_000);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base_system_time: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock whose wall clock starts at the real current time
    pub fn new() -> Self {
        Self::with_base(SystemTime::now())
    }

    /// Create a mock clock whose wall clock starts at the given epoch millis
    pub fn at_epoch_millis(millis: u64) -> Self {
        Self::with_base(UNIX_EPOCH + Duration::from_millis(millis))
    }

    fn with_base(base_system_time: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            base_system_time,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by milliseconds
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}
