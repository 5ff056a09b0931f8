//! Bakehouse - recipe engine for tabular data
//!
//! A recipe is an ordered list of steps. Each step names an operation from
//! the registry, carries its arguments, and commits its result to a shared
//! variable environment that later steps read.

pub mod ast;
pub mod config;
pub mod error;
pub mod event;
pub mod expr;
pub mod ops;
pub mod runtime;
pub mod store;

pub use ast::{Placement, Recipe, RecipeFile, RecipeStep};
pub use config::BakeConfig;
pub use error::{BakeError, ErrorCategory, FixSuggestion, Result};
pub use event::{ExecutionLog, LogEntry, StepStatus};
pub use ops::{builtin_registry, Operation, Registry};
pub use runtime::{BakeReport, Baker, Kitchen};
pub use store::{Environment, Scalar, Table, Value};
