use tracing::trace;

use crate::Timer;

/// Receives fire and lifecycle callbacks from a [`Timer`].
///
/// Only [`on_fire`](TimerObserver::on_fire) is required; the lifecycle
/// methods default to a trace log. The timer holds its observer weakly:
/// dropping the last `Arc` to the observer cancels the timer on its next
/// fire, since a timer with no one to call is meaningless.
///
/// `on_fire` arrives on the timer's runtime; the lifecycle notifications are
/// delivered synchronously on whichever thread called the triggering
/// operation.
pub trait TimerObserver: Send + Sync + 'static {
    /// Called every time the timer elapses, on the timer's runtime.
    fn on_fire(&self, timer: &Timer);

    /// Called exactly once, right after the scheduling source has been
    /// created and armed, before the first fire can occur.
    fn on_armed(&self, _timer: &Timer) {
        trace!("default on_armed observer call");
    }

    /// Called when the timer is being cancelled, while the observer is
    /// still registered. The last notification the observer will receive.
    fn on_will_invalidate(&self, _timer: &Timer) {
        trace!("default on_will_invalidate observer call");
    }

    /// Called when a running timer is paused.
    fn on_suspend(&self, _timer: &Timer) {
        trace!("default on_suspend observer call");
    }

    /// Called when the timer starts or resumes delivery.
    fn on_resume(&self, _timer: &Timer) {
        trace!("default on_resume observer call");
    }
}
