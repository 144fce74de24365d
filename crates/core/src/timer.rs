//! One-shot timers with cancellation handles.
//!
//! The core never sleeps itself; reminders and pending dwell go through a
//! [`TimerHost`] supplied by the host loop.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce()>;

/// Schedules one-shot callbacks on the host loop.
pub trait TimerHost {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

pub type SharedTimerHost = Rc<dyn TimerHost>;

/// Cancels a scheduled callback. Dropping the handle does not cancel.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
    abort: Rc<RefCell<Option<AbortHandle>>>,
}

/// Host-side half of a [`TimerHandle`]; tells the host whether to run.
#[derive(Clone)]
pub struct TimerToken {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn pair() -> (TimerHandle, TimerToken) {
        let cancelled = Rc::new(Cell::new(false));
        (
            TimerHandle {
                cancelled: cancelled.clone(),
                abort: Rc::new(RefCell::new(None)),
            },
            TimerToken { cancelled },
        )
    }

    /// Attach the task that backs this timer so `cancel` can abort it.
    pub fn with_abort(self, abort: AbortHandle) -> Self {
        *self.abort.borrow_mut() = Some(abort);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
        if let Some(abort) = self.abort.borrow_mut().take() {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

impl TimerToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

/// Timer host backed by `tokio::time`. Must be used inside a `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimerHost;

impl TokioTimerHost {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedTimerHost {
        Rc::new(Self)
    }
}

impl TimerHost for TokioTimerHost {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let (handle, token) = TimerHandle::pair();
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if !token.is_cancelled() {
                callback();
            }
        });
        handle.with_abort(task.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    #[test]
    fn test_handle_cancel_flag() {
        let (handle, token) = TimerHandle::pair();
        assert!(!token.is_cancelled());
        handle.clone().cancel();
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_after_delay() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(Cell::new(false));
                let flag = fired.clone();
                let host = TokioTimerHost::new();
                host.schedule(Duration::from_millis(500), Box::new(move || flag.set(true)));

                tokio::time::sleep(Duration::from_millis(499)).await;
                assert!(!fired.get());
                tokio::time::sleep(Duration::from_millis(2)).await;
                assert!(fired.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_cancel() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(Cell::new(false));
                let flag = fired.clone();
                let handle =
                    TokioTimerHost::new().schedule(Duration::from_millis(100), Box::new(move || flag.set(true)));

                handle.cancel();
                tokio::time::sleep(Duration::from_millis(200)).await;
                assert!(!fired.get());
            })
            .await;
    }
}
