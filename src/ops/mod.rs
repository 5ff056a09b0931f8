//! # Operation Contract
//!
//! Every recipe step is bound to an [`Operation`]: a declared argument
//! schema plus an async `run(args, environment) -> Value`.
//!
//! ## Contract
//!
//! - `run` reads the environment, never writes it. The baker commits the
//!   returned value under the step's output name.
//! - `run` validates its own preconditions (required args, referenced
//!   variable kind, referenced columns) and fails with a [`BakeError`]
//!   naming the offending argument or column.
//!
//! ## Catalog
//!
//! | Id | Category | Module |
//! |----|----------|--------|
//! | `op_from_csv` | Input | [`input`] |
//! | `input-constant` | Input | [`input`] |
//! | `op_filter_rows` | Table | [`table`] |
//! | `op_sort_rows` | Table | [`table`] |
//! | `op_column_math` | Arithmetic | [`math`] |
//! | `constant-math` | Math | [`math`] |
//! | `linear-regression` | Analysis | [`analysis`] |

pub mod analysis;
pub mod input;
pub mod math;
mod registry;
pub mod table;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{BakeError, Result};
use crate::store::{Environment, Table, Value, ValueKind};

pub use registry::{builtin_registry, Registry};

/// Raw argument values of a step, keyed by argument name
pub type Args = BTreeMap<String, JsonValue>;

/// Presentation grouping; not semantically load-bearing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    Input,
    Table,
    Arithmetic,
    Math,
    Analysis,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Argument kinds an operation can declare
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgKind {
    /// Free-form, possibly multi-line
    Text,
    /// Single line
    String,
    Boolean,
    Select { options: &'static [&'static str] },
    /// Must name a variable present at run time
    VariableRef { accepts: Option<&'static [ValueKind]> },
}

/// One declared argument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: ArgKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl ArgSpec {
    pub fn new(name: &'static str, label: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            label,
            kind,
            description: None,
            default: None,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn default_value(mut self, default: impl Into<JsonValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// `variable_ref` restricted to tables
    pub fn table_ref(name: &'static str, label: &'static str) -> Self {
        Self::new(
            name,
            label,
            ArgKind::VariableRef {
                accepts: Some(&[ValueKind::Table]),
            },
        )
    }
}

/// A registry-defined transformation
#[async_trait]
pub trait Operation: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn category(&self) -> Category;

    fn description(&self) -> &'static str;

    /// Ordered argument schema
    fn args(&self) -> &[ArgSpec];

    /// Produce a fresh value. Must not (and cannot) mutate `env`.
    async fn run(&self, args: &Args, env: &Environment) -> Result<Value>;

    /// Defaults used to pre-populate a new step
    fn default_args(&self) -> Args {
        self.args()
            .iter()
            .filter_map(|spec| spec.default.clone().map(|d| (spec.name.to_string(), d)))
            .collect()
    }
}

impl fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id())
            .field("category", &self.category())
            .finish()
    }
}

/// Typed, validating access to a step's raw arguments
#[derive(Debug, Clone, Copy)]
pub struct ArgReader<'a> {
    args: &'a Args,
}

impl<'a> ArgReader<'a> {
    pub fn new(args: &'a Args) -> Self {
        Self { args }
    }

    /// Text form of an argument; numbers/bools are rendered, null is absent
    pub fn text(&self, name: &str) -> Option<String> {
        match self.args.get(name)? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Trimmed, non-empty text or `MissingArgument`
    pub fn required(&self, name: &str) -> Result<String> {
        self.text(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BakeError::missing(name))
    }

    /// Raw (untrimmed) non-empty text or `MissingArgument`
    pub fn required_raw(&self, name: &str) -> Result<String> {
        self.text(name)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BakeError::missing(name))
    }

    /// Accepts JSON booleans and the strings `true`/`false`
    pub fn boolean(&self, name: &str, default: bool) -> bool {
        match self.args.get(name) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Value restricted to `options`, falling back to `default` when unset
    pub fn select(
        &self,
        name: &str,
        options: &[&'static str],
        default: &'static str,
    ) -> Result<&'static str> {
        let Some(raw) = self.text(name).filter(|s| !s.trim().is_empty()) else {
            return Ok(default);
        };
        options
            .iter()
            .copied()
            .find(|o| *o == raw.trim())
            .ok_or_else(|| BakeError::InvalidOption {
                arg: name.to_string(),
                value: raw,
                options: options.iter().map(|o| o.to_string()).collect(),
            })
    }

    /// Resolve a `variable_ref` argument to a table in `env`
    pub fn table<'e>(&self, name: &str, env: &'e Environment) -> Result<&'e Table> {
        let var_name = self.required(name)?;
        env.table(&var_name)
    }
}

/// Fail with `ColumnNotFound` unless `column` is declared on `table`
pub fn require_column(table: &Table, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(BakeError::ColumnNotFound {
            column: column.to_string(),
            available: table.columns.clone(),
        })
    }
}
