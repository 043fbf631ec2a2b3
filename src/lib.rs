//! Hashed timing wheel for one-shot callbacks with millisecond-range
//! accuracy, built for workloads that register and cancel timers far more
//! often than they let them fire.

mod basic;
mod core;
mod time_wheel;

pub use crate::basic::*;
pub use time_wheel::{
    Cancellable, DirectExecutor, Executor, Task, TimerWheel, DEFAULT_TICK, DEFAULT_WHEEL_SIZE,
};
