#[derive(Debug, PartialEq, Eq)]
pub enum TimerError {
    ///Timer interval must be greater than zero
    ZeroInterval,
    ///No tokio runtime handle was supplied, and none is ambiently available
    NoRuntime,
}

impl std::fmt::Display for TimerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerError::ZeroInterval => write!(f, "Timer interval must be greater than zero"),
            TimerError::NoRuntime => write!(f, "No tokio runtime is available to run the timer"),
        }
    }
}

impl std::error::Error for TimerError {}
