use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("wheel size must be greater than zero")]
    ZeroWheelSize,
    #[error("tick interval must be at least one millisecond")]
    ZeroTick,
    #[error("tick interval {0:?} is out of range")]
    TickOutOfRange(Duration),
    #[error("delay {0:?} does not fit the scheduling horizon")]
    DelayOutOfRange(Duration),
    #[error("timer wheel is not running")]
    NotRunning,
    #[error(transparent)]
    Rejected(#[from] ExecuteError),
}

/// An executor turned down a task handed to it by the wheel.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("executor rejected task: {reason}")]
pub struct ExecuteError {
    pub reason: String,
}

impl ExecuteError {
    pub fn new(reason: impl Into<String>) -> Self {
        ExecuteError {
            reason: reason.into(),
        }
    }
}
