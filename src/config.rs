use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::TimerError;

/// Which clock the timer elapses against.
///
/// A monotonic timer stops elapsing while the system is asleep; a wall-clock
/// timer keeps counting through a suspend and fires as soon as the deadline
/// has passed on the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockKind {
    #[default]
    Monotonic,
    WallClock,
}

/// Configuration for a [`Timer`](crate::Timer). Fixed once the timer has
/// been armed.
#[derive(Clone, Default)]
pub struct TimerConfig {
    pub(crate) interval: Duration,
    pub(crate) leeway: Duration,
    pub(crate) fire_once: bool,
    pub(crate) clock: ClockKind,
    pub(crate) runtime: Option<Handle>,
}

impl TimerConfig {
    /// A repeating, monotonic config with zero leeway, running on the
    /// ambient tokio runtime.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    ///Scheduling slack granted to the source. Ignored for fire-once timers.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    ///Fire one time and self-cancel, instead of repeating indefinitely.
    pub fn fire_once(mut self, fire_once: bool) -> Self {
        self.fire_once = fire_once;
        self
    }

    pub fn clock(mut self, clock: ClockKind) -> Self {
        self.clock = clock;
        self
    }

    ///Run fire callbacks on this runtime instead of the ambient one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), TimerError> {
        if self.interval.is_zero() {
            return Err(TimerError::ZeroInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let config = TimerConfig::new(Duration::ZERO);
        assert_eq!(config.validate(), Err(TimerError::ZeroInterval));
    }

    #[test]
    fn positive_interval_is_accepted() {
        let config = TimerConfig::new(Duration::from_millis(100));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn builder_sets_fields() {
        let config = TimerConfig::new(Duration::from_secs(1))
            .leeway(Duration::from_millis(50))
            .fire_once(true)
            .clock(ClockKind::WallClock);

        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.leeway, Duration::from_millis(50));
        assert!(config.fire_once);
        assert_eq!(config.clock, ClockKind::WallClock);
    }

    #[test]
    fn defaults_are_repeating_and_monotonic() {
        let config = TimerConfig::new(Duration::from_secs(1));
        assert!(!config.fire_once);
        assert_eq!(config.clock, ClockKind::Monotonic);
        assert_eq!(config.leeway, Duration::ZERO);
        assert!(config.runtime.is_none());
    }
}
