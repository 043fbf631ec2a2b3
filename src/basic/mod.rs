mod error;
mod result;

pub use error::{ExecuteError, TimerError};
pub use result::TimerResult;
