//! Event Module - what happened during a bake
//!
//! - `log`: ExecutionLog, LogEntry, StepStatus

mod log;

pub use log::{ExecutionLog, LogEntry, StepStatus};
