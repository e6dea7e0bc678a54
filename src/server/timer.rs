//! Single-shot cancelable timers.
//!
//! A [`Timer`] sleeps on the tokio runtime and then runs a callback. Each
//! timer carries a token; the owner stores it next to the state the timer
//! guards and ignores firings whose token no longer matches. This covers
//! the window where a timer already fired but its callback has not yet
//! taken the state lock when the timer is canceled.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

// ============================================================================
// Timer
// ============================================================================

/// Handle to a scheduled callback.
pub(crate) struct Timer {
    token: u64,
    abort: AbortHandle,
}

impl Timer {
    /// Schedules `callback` to run after `delay` on `runtime`.
    ///
    /// The caller's thread does not need to be inside the runtime.
    pub(crate) fn start<F>(runtime: &Handle, token: u64, delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        // Deadline is taken now, on the runtime's clock, not at first poll
        let deadline = {
            let _enter = runtime.enter();
            Instant::now() + delay
        };

        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            callback();
        });

        Self {
            token,
            abort: task.abort_handle(),
        }
    }

    /// Returns the token this timer was started with.
    #[inline]
    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Cancels the timer. A callback already running is not interrupted.
    pub(crate) fn cancel(self) {
        self.abort.abort();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("token", &self.token).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
