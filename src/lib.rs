//! A pausable one-shot/repeating timer with observer lifecycle callbacks.
//!
//! Create a [`Timer`] from a [`TimerConfig`] and a [`TimerObserver`], then
//! drive it with [`start`](Timer::start), [`pause`](Timer::pause) and
//! [`cancel`](Timer::cancel) from any thread. Fires are delivered on a tokio
//! runtime; lifecycle notifications arrive synchronously on the thread that
//! triggered them. Cancellation is permanent and race-free: once `cancel`
//! begins, no new fire is dispatched.

pub mod config;
pub mod error;
pub mod observer;
mod source;
pub mod timer;

pub use config::{ClockKind, TimerConfig};
pub use error::TimerError;
pub use observer::TimerObserver;
pub use timer::{Timer, TimerContext};

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use super::*;

    struct CountingObserver {
        fires: Arc<AtomicUsize>,
    }

    impl TimerObserver for CountingObserver {
        fn on_fire(&self, _timer: &Timer) {
            self.fires.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn one_shot_smoke() {
        let fires = Arc::new(AtomicUsize::new(0));
        let observer = Arc::new(CountingObserver {
            fires: fires.clone(),
        });

        // The timer only holds the observer weakly; keep it alive here
        let timer = Timer::new(
            TimerConfig::new(Duration::from_millis(50)).fire_once(true),
            Some(observer.clone()),
        )
        .unwrap();

        assert!(timer.is_invalid());
        timer.start();

        //give the fire time to land and the self-cancel to finish
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert!(timer.is_invalid());
    }
}
