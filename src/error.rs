//! Error types with fix suggestions
//!
//! Every failure a step can raise is a [`BakeError`]. The engine converts
//! them into log entries; nothing here is allowed to escape a bake.

use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T, E = BakeError> = std::result::Result<T, E>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Coarse error taxonomy, used for reporting and log filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Expression,
    Parse,
    Engine,
    Config,
    Io,
}

#[derive(Error, Debug)]
pub enum BakeError {
    // ─────────────────────────────────────────────────────────────
    // Validation errors (BAKE-010 to BAKE-016)
    // ─────────────────────────────────────────────────────────────
    #[error("BAKE-010: Argument '{arg}' is required")]
    MissingArgument { arg: String },

    #[error("BAKE-011: Variable '{name}' not found")]
    VariableNotFound { name: String },

    #[error("BAKE-012: Variable '{name}' is a {found}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: String,
        found: String,
    },

    #[error("BAKE-013: Column '{column}' not found in table. Available: {}", .available.join(", "))]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("BAKE-014: Argument '{arg}' has invalid value '{value}' (expected one of: {})", .options.join(", "))]
    InvalidOption {
        arg: String,
        value: String,
        options: Vec<String>,
    },

    #[error("BAKE-015: {details}")]
    InsufficientData { details: String },

    #[error("BAKE-016: Step '{step_id}' not found in recipe")]
    StepNotFound { step_id: String },

    // ─────────────────────────────────────────────────────────────
    // Expression errors (BAKE-020 to BAKE-021)
    // ─────────────────────────────────────────────────────────────
    #[error("BAKE-020: Cannot parse expression '{expr}' at position {position}: {details}")]
    ExpressionParse {
        expr: String,
        position: usize,
        details: String,
    },

    #[error("BAKE-021: Expression error in '{expr}': {cause}")]
    Expression { expr: String, cause: String },

    // ─────────────────────────────────────────────────────────────
    // Parse errors (BAKE-030)
    // ─────────────────────────────────────────────────────────────
    #[error("BAKE-030: CSV Parse Error: {details}")]
    CsvParse { details: String },

    // ─────────────────────────────────────────────────────────────
    // Engine errors (BAKE-040 to BAKE-041)
    // ─────────────────────────────────────────────────────────────
    #[error("BAKE-040: Unknown operation '{operation_id}'")]
    UnknownOperation { operation_id: String },

    #[error("BAKE-041: A bake is already in progress")]
    RunInProgress,

    // ─────────────────────────────────────────────────────────────
    // Config / IO
    // ─────────────────────────────────────────────────────────────
    #[error("BAKE-050: Config error: {reason}")]
    ConfigError { reason: String },

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BakeError {
    /// Shorthand for a missing/empty required argument
    pub fn missing(arg: impl Into<String>) -> Self {
        Self::MissingArgument { arg: arg.into() }
    }

    /// Wrap an evaluation failure with the expression text that produced it
    pub fn expression(expr: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Expression {
            expr: expr.into(),
            cause: cause.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingArgument { .. }
            | Self::VariableNotFound { .. }
            | Self::WrongKind { .. }
            | Self::ColumnNotFound { .. }
            | Self::InvalidOption { .. }
            | Self::InsufficientData { .. }
            | Self::StepNotFound { .. } => ErrorCategory::Validation,
            Self::ExpressionParse { .. } | Self::Expression { .. } => ErrorCategory::Expression,
            Self::CsvParse { .. } | Self::YamlParse(_) | Self::Json(_) => ErrorCategory::Parse,
            Self::UnknownOperation { .. } | Self::RunInProgress => ErrorCategory::Engine,
            Self::ConfigError { .. } => ErrorCategory::Config,
            Self::Io(_) => ErrorCategory::Io,
        }
    }
}

impl From<csv::Error> for BakeError {
    fn from(e: csv::Error) -> Self {
        Self::CsvParse {
            details: e.to_string(),
        }
    }
}

impl FixSuggestion for BakeError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BakeError::MissingArgument { .. } => Some("Fill in the argument on the step"),
            BakeError::VariableNotFound { .. } => {
                Some("Run the step that produces this variable first, or pick another input")
            }
            BakeError::WrongKind { .. } => Some("Select a variable of the expected type"),
            BakeError::ColumnNotFound { .. } => {
                Some("Column names are case-sensitive; use one of the available columns")
            }
            BakeError::InvalidOption { .. } => Some("Pick one of the listed options"),
            BakeError::InsufficientData { .. } => {
                Some("Check that the selected columns hold numeric values")
            }
            BakeError::StepNotFound { .. } => Some("Verify the step id exists in the recipe"),
            BakeError::ExpressionParse { .. } => {
                Some("Check operators and parentheses; quote column names with spaces in backticks")
            }
            BakeError::Expression { .. } => {
                Some("Every name must be a column or a number/string variable")
            }
            BakeError::CsvParse { .. } => Some("Every row must have as many fields as the header"),
            BakeError::UnknownOperation { .. } => Some("Run `bakehouse ops` to list operations"),
            BakeError::RunInProgress => Some("Wait for the current bake to finish"),
            BakeError::ConfigError { .. } => Some("Check bakehouse.yaml and BAKEHOUSE_* variables"),
            BakeError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            BakeError::Json(_) => None,
            BakeError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
