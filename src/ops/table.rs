//! Table operations: row filtering and sorting
//!
//! Both keep `columns` untouched. Filter never grows the row count, sort
//! never changes it.

use std::cmp::Ordering;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{require_column, ArgKind, ArgReader, ArgSpec, Args, Category, Operation};
use crate::error::Result;
use crate::store::{compare_cells, parse_number, Environment, Scalar, Table, Value};

// ═══════════════════════════════════════════════════════════════
// FILTER ROWS
// ═══════════════════════════════════════════════════════════════

/// `op_filter_rows`: keep rows whose cell satisfies a condition
pub struct FilterRows;

const FILTER_OPERATORS: &[&str] = &["equals", "contains", "greater_than", "less_than"];

static FILTER_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![
        ArgSpec::table_ref("inputTable", "Input Table").describe("The table to filter"),
        ArgSpec::new("column", "Column Name", ArgKind::String)
            .describe("The column to check")
            .default_value(""),
        ArgSpec::new(
            "operator",
            "Condition",
            ArgKind::Select {
                options: FILTER_OPERATORS,
            },
        )
        .default_value("equals"),
        ArgSpec::new("value", "Value", ArgKind::String).default_value(""),
    ]
});

/// Parsed filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String),
    Contains(String),
    GreaterThan(Option<f64>),
    LessThan(Option<f64>),
}

impl Condition {
    fn parse(operator: &str, value: String) -> Self {
        match operator {
            "contains" => Condition::Contains(value),
            "greater_than" => Condition::GreaterThan(parse_number(&value)),
            "less_than" => Condition::LessThan(parse_number(&value)),
            _ => Condition::Equals(value),
        }
    }

    /// Numeric conditions reject rows where either side is not a number
    pub fn matches(&self, cell: &Scalar) -> bool {
        match self {
            Condition::Equals(v) => cell.to_string() == *v,
            Condition::Contains(v) => cell.to_string().contains(v.as_str()),
            Condition::GreaterThan(v) => numeric_pair(cell, *v).is_some_and(|(c, v)| c > v),
            Condition::LessThan(v) => numeric_pair(cell, *v).is_some_and(|(c, v)| c < v),
        }
    }
}

fn numeric_pair(cell: &Scalar, value: Option<f64>) -> Option<(f64, f64)> {
    Some((cell.to_number()?, value?))
}

/// Rows with an absent cell are dropped
pub fn filter_table(table: &Table, column: &str, condition: &Condition) -> Table {
    let rows = table
        .rows
        .iter()
        .filter(|row| row.get(column).is_some_and(|cell| condition.matches(cell)))
        .cloned()
        .collect();
    Table::new(table.columns.clone(), rows)
}

#[async_trait]
impl Operation for FilterRows {
    fn id(&self) -> &'static str {
        "op_filter_rows"
    }

    fn name(&self) -> &'static str {
        "Filter Rows"
    }

    fn category(&self) -> Category {
        Category::Table
    }

    fn description(&self) -> &'static str {
        "Filter rows based on a column value."
    }

    fn args(&self) -> &[ArgSpec] {
        &FILTER_ARGS
    }

    async fn run(&self, args: &Args, env: &Environment) -> Result<Value> {
        let reader = ArgReader::new(args);
        let table = reader.table("inputTable", env)?;
        let column = reader.required("column")?;
        require_column(table, &column)?;
        let operator = reader.select("operator", FILTER_OPERATORS, "equals")?;
        // numeric conditions need something to compare against
        let value = match operator {
            "greater_than" | "less_than" => reader.required("value")?,
            _ => reader.text("value").unwrap_or_default(),
        };

        let condition = Condition::parse(operator, value);
        Ok(Value::Table(filter_table(table, &column, &condition)))
    }
}

// ═══════════════════════════════════════════════════════════════
// SORT ROWS
// ═══════════════════════════════════════════════════════════════

/// `op_sort_rows`: stable sort by one column
pub struct SortRows;

const SORT_DIRECTIONS: &[&str] = &["Ascending", "Descending"];

static SORT_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![
        ArgSpec::table_ref("inputTable", "Input Table").describe("The table to sort"),
        ArgSpec::new("column", "Column Name", ArgKind::Text)
            .describe("Column to sort by")
            .default_value(""),
        ArgSpec::new(
            "direction",
            "Direction",
            ArgKind::Select {
                options: SORT_DIRECTIONS,
            },
        )
        .default_value("Ascending"),
    ]
});

/// Absent cells order after present ones; `descending` reverses the
/// comparison, so equal keys keep their input order either way.
pub fn sort_table(table: &Table, column: &str, descending: bool) -> Table {
    let mut rows = table.rows.clone();
    rows.sort_by(|a, b| {
        let ord = match (a.get(column), b.get(column)) {
            (Some(x), Some(y)) => compare_cells(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    Table::new(table.columns.clone(), rows)
}

#[async_trait]
impl Operation for SortRows {
    fn id(&self) -> &'static str {
        "op_sort_rows"
    }

    fn name(&self) -> &'static str {
        "Sort Rows"
    }

    fn category(&self) -> Category {
        Category::Table
    }

    fn description(&self) -> &'static str {
        "Sort the table by a specific column."
    }

    fn args(&self) -> &[ArgSpec] {
        &SORT_ARGS
    }

    async fn run(&self, args: &Args, env: &Environment) -> Result<Value> {
        let reader = ArgReader::new(args);
        let table = reader.table("inputTable", env)?;
        let column = reader.required("column")?;
        require_column(table, &column)?;
        let direction = reader.select("direction", SORT_DIRECTIONS, "Ascending")?;

        Ok(Value::Table(sort_table(table, &column, direction == "Descending")))
    }
}
