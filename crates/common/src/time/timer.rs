//! One-shot and recurring timers
//!
//! Timers run as tokio tasks and are cancelled through a [`TimerHandle`].
//! A [`TimerSlot`] owns at most one active handle and always cancels the
//! previous handle before scheduling a new one, so a reschedule can never
//! leave a stale timer running.
//!
//! Cancellation only interrupts the waiting phase. Once a timer has fired,
//! its task runs to completion even if the handle is cancelled afterwards;
//! this lets a task safely reschedule the slot that fired it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A timer handle that can be used to cancel a timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> Self {
        Self { token: CancellationToken::new(), finished: Arc::new(AtomicBool::new(false)) }
    }

    fn detached() -> Self {
        let handle = Self::new();
        handle.token.cancel();
        handle.finished.store(true, Ordering::Release);
        handle
    }

    /// Cancel the timer
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check whether the timer task has completed (fired or cancelled)
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// A timer is active while it is neither cancelled nor finished
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }
}

/// Run `task` once after `delay` unless cancelled first
///
/// Returns a cancelled handle without spawning when called outside a tokio
/// runtime.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use unimoghub_common::time::timer::timeout;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = timeout(Duration::from_secs(5), || async {
///         tracing::info!("timer fired");
///     });
///     handle.cancel();
/// }
/// ```
pub fn timeout<F, Fut>(delay: Duration, task: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("timer scheduled outside of a tokio runtime, ignoring");
        return TimerHandle::detached();
    };

    let handle = TimerHandle::new();
    let token = handle.token.clone();
    let finished = Arc::clone(&handle.finished);

    runtime.spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            () = sleep(delay) => task().await,
        }
        finished.store(true, Ordering::Release);
    });

    handle
}

/// Run `task` every `period` until cancelled
///
/// The first run happens one full period after scheduling. Each run is
/// awaited before the next tick is considered, so runs never overlap.
pub fn recurring<F, Fut>(period: Duration, mut task: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("recurring timer scheduled outside of a tokio runtime, ignoring");
        return TimerHandle::detached();
    };

    let handle = TimerHandle::new();
    let token = handle.token.clone();
    let finished = Arc::clone(&handle.finished);

    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => task().await,
            }
        }
        finished.store(true, Ordering::Release);
    });

    handle
}

/// Owner of at most one active timer
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    current: Mutex<Option<TimerHandle>>,
}

impl TimerSlot {
    /// Create an empty slot; `name` only appears in logs
    pub const fn new(name: &'static str) -> Self {
        Self { name, current: Mutex::new(None) }
    }

    /// Cancel any active timer, then schedule a one-shot timer
    pub fn schedule<F, Fut>(&self, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        debug!(timer = self.name, delay_ms = delay.as_millis() as u64, "timer scheduled");
        *current = Some(timeout(delay, task));
    }

    /// Cancel any active timer, then schedule a recurring timer
    pub fn schedule_recurring<F, Fut>(&self, period: Duration, task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        debug!(timer = self.name, period_ms = period.as_millis() as u64, "recurring timer scheduled");
        *current = Some(recurring(period, task));
    }

    /// Cancel the active timer; returns whether one was still pending
    pub fn cancel(&self) -> bool {
        match self.current.lock().take() {
            Some(handle) => {
                let was_active = handle.is_active();
                handle.cancel();
                if was_active {
                    debug!(timer = self.name, "timer cancelled");
                }
                was_active
            }
            None => false,
        }
    }

    /// Whether the slot holds a timer that has not fired or been cancelled
    pub fn is_active(&self) -> bool {
        self.current.lock().as_ref().is_some_and(TimerHandle::is_active)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.current.get_mut().take() {
            handle.cancel();
        }
    }
}
