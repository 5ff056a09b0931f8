//! Expression-driven operations
//!
//! Both go through the [`Evaluator`] trait only, so the expression
//! language can be swapped without touching them.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::warn;

use super::{ArgKind, ArgReader, ArgSpec, Args, Category, Operation};
use crate::error::Result;
use crate::expr::{Evaluator, MathEvaluator, Scope};
use crate::store::{Environment, Scalar, Table, Value};

const DEFAULT_COLUMN: &str = "Result";

// ═══════════════════════════════════════════════════════════════
// COLUMN MATH
// ═══════════════════════════════════════════════════════════════

/// `op_column_math`: evaluate an expression per row into a new column
#[derive(Debug, Clone, Default)]
pub struct ColumnMath<E = MathEvaluator> {
    evaluator: E,
}

impl ColumnMath {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: Evaluator> ColumnMath<E> {
    pub fn with_evaluator(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// Evaluate `expression` for every row of `table`.
    ///
    /// The expression is compiled once; a compile error fails the whole call.
    /// A row whose evaluation fails gets `NaN` in the new column.
    pub fn apply(
        &self,
        table: &Table,
        expression: &str,
        new_column: &str,
        env: &Environment,
    ) -> Result<Table> {
        let compiled = self.evaluator.compile(expression)?;
        let globals = env.scalar_scope();
        let scope = Scope::new(&globals);

        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let cell = match self.evaluator.evaluate(&compiled, &scope.with_row(row)) {
                    Ok(value) => value.into_scalar(),
                    Err(e) => {
                        warn!(row = index, error = %e, "row evaluation failed, writing NaN");
                        Scalar::Number(f64::NAN)
                    }
                };
                let mut out = row.clone();
                out.insert(new_column.to_string(), cell);
                out
            })
            .collect();

        let mut columns = table.columns.clone();
        if !table.has_column(new_column) {
            columns.push(new_column.to_string());
        }
        Ok(Table::new(columns, rows))
    }
}

static COLUMN_MATH_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![
        ArgSpec::table_ref("inputTable", "Input Table").describe("Table to calculate on"),
        ArgSpec::new("expression", "Expression", ArgKind::Text)
            .describe("Math expression using column names, e.g. \"Age * 2\" or \"Price / Qty\"")
            .default_value(""),
        ArgSpec::new("newColumnName", "New Column Name", ArgKind::String)
            .default_value(DEFAULT_COLUMN),
    ]
});

#[async_trait]
impl<E: Evaluator + 'static> Operation for ColumnMath<E> {
    fn id(&self) -> &'static str {
        "op_column_math"
    }

    fn name(&self) -> &'static str {
        "Column Math"
    }

    fn category(&self) -> Category {
        Category::Arithmetic
    }

    fn description(&self) -> &'static str {
        "Perform math on a column (e.g. colA * 2 + colB)."
    }

    fn args(&self) -> &[ArgSpec] {
        &COLUMN_MATH_ARGS
    }

    async fn run(&self, args: &Args, env: &Environment) -> Result<Value> {
        let reader = ArgReader::new(args);
        let table = reader.table("inputTable", env)?;
        let expression = reader.required("expression")?;
        let new_column = reader
            .required("newColumnName")
            .unwrap_or_else(|_| DEFAULT_COLUMN.to_string());

        self.apply(table, &expression, &new_column, env)
            .map(Value::Table)
    }
}

// ═══════════════════════════════════════════════════════════════
// CALCULATE CONSTANT
// ═══════════════════════════════════════════════════════════════

/// `constant-math`: one expression over the scalar variables
#[derive(Debug, Clone, Default)]
pub struct ConstantMath<E = MathEvaluator> {
    evaluator: E,
}

impl ConstantMath {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: Evaluator> ConstantMath<E> {
    pub fn with_evaluator(evaluator: E) -> Self {
        Self { evaluator }
    }
}

static CONSTANT_MATH_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![ArgSpec::new("expression", "Expression", ArgKind::Text)
        .describe("Math expression using variable names. e.g. \"a * 2 + b\"")
        .default_value("")]
});

#[async_trait]
impl<E: Evaluator + 'static> Operation for ConstantMath<E> {
    fn id(&self) -> &'static str {
        "constant-math"
    }

    fn name(&self) -> &'static str {
        "Calculate Constant"
    }

    fn category(&self) -> Category {
        Category::Math
    }

    fn description(&self) -> &'static str {
        "Calculate a new constant value using an expression (e.g., \"const1 + 5\")"
    }

    fn args(&self) -> &[ArgSpec] {
        &CONSTANT_MATH_ARGS
    }

    async fn run(&self, args: &Args, env: &Environment) -> Result<Value> {
        let expression = ArgReader::new(args).required("expression")?;
        let globals = env.scalar_scope();

        let compiled = self.evaluator.compile(&expression)?;
        let value = self.evaluator.evaluate(&compiled, &Scope::new(&globals))?;
        Ok(value.into_value())
    }
}
