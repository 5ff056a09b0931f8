//! Input operations: CSV ingestion and literal constants

use std::collections::HashSet;

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{ArgKind, ArgReader, ArgSpec, Args, Category, Operation};
use crate::error::{BakeError, Result};
use crate::store::{
    parse_integer_prefix, parse_number_prefix, Environment, Row, Scalar, Table, Value,
};

/// Fields matching this become numbers; anything else stays text
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$").expect("valid regex")
});

const DEFAULT_CSV: &str = "name,age\nAlice,30\nBob,25";

// ═══════════════════════════════════════════════════════════════
// FROM CSV
// ═══════════════════════════════════════════════════════════════

/// `op_from_csv`: delimited text → Table
pub struct FromCsv;

static FROM_CSV_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![
        ArgSpec::new("csvContent", "CSV Content", ArgKind::Text)
            .describe("Paste your CSV data here")
            .default_value(DEFAULT_CSV),
        ArgSpec::new("hasHeader", "Has Header", ArgKind::Boolean)
            .describe("Does the first row contain column names?")
            .default_value(true),
    ]
});

#[async_trait]
impl Operation for FromCsv {
    fn id(&self) -> &'static str {
        "op_from_csv"
    }

    fn name(&self) -> &'static str {
        "From CSV"
    }

    fn category(&self) -> Category {
        Category::Input
    }

    fn description(&self) -> &'static str {
        "Parse a CSV string into a Table."
    }

    fn args(&self) -> &[ArgSpec] {
        &FROM_CSV_ARGS
    }

    async fn run(&self, args: &Args, _env: &Environment) -> Result<Value> {
        let reader = ArgReader::new(args);
        let content = reader.text("csvContent").unwrap_or_default();
        let has_header = reader.boolean("hasHeader", true);

        let table = parse_csv(&content, has_header)?;
        debug!(
            columns = table.columns.len(),
            rows = table.rows.len(),
            has_header,
            "parsed csv"
        );
        Ok(Value::Table(table))
    }
}

/// Parse CSV text into a table.
///
/// With a header, every record must have the header's field count. Without
/// one, the first record fixes the column count (`Column 1`, `Column 2`, …);
/// shorter records leave trailing cells absent, longer ones are truncated.
pub fn parse_csv(content: &str, has_header: bool) -> Result<Table> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let first = match records.next() {
        Some(record) => record?,
        None => return Ok(Table::default()),
    };

    let (columns, mut rows) = if has_header {
        (unique_headers(&first), Vec::new())
    } else {
        let columns: Vec<String> = (1..=first.len()).map(|i| format!("Column {}", i)).collect();
        let row = build_row(&columns, &first);
        (columns, vec![row])
    };

    for record in records {
        let record = record?;
        if has_header && record.len() != columns.len() {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(BakeError::CsvParse {
                details: format!(
                    "line {}: expected {} fields but found {}",
                    line,
                    columns.len(),
                    record.len()
                ),
            });
        }
        rows.push(build_row(&columns, &record));
    }

    Ok(Table::new(columns, rows))
}

/// Header names with duplicates disambiguated as `name_1`, `name_2`, …
fn unique_headers(record: &StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(record.len());

    for field in record.iter() {
        let mut name = field.to_string();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}_{}", field, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        out.push(name);
    }
    out
}

fn build_row(columns: &[String], record: &StringRecord) -> Row {
    columns
        .iter()
        .zip(record.iter())
        .map(|(col, field)| (col.clone(), coerce_field(field)))
        .collect()
}

fn coerce_field(field: &str) -> Scalar {
    if FLOAT.is_match(field) {
        if let Ok(n) = field.trim().parse::<f64>() {
            return Scalar::Number(n);
        }
    }
    Scalar::Text(field.to_string())
}

// ═══════════════════════════════════════════════════════════════
// DEFINE CONSTANT
// ═══════════════════════════════════════════════════════════════

/// `input-constant`: a literal number or string
pub struct DefineConstant;

const CONSTANT_TYPES: &[&str] = &["string", "int", "float"];

static CONSTANT_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![
        ArgSpec::new(
            "type",
            "Data Type",
            ArgKind::Select {
                options: CONSTANT_TYPES,
            },
        )
        .default_value("string"),
        ArgSpec::new("value", "Value", ArgKind::Text).default_value(""),
    ]
});

#[async_trait]
impl Operation for DefineConstant {
    fn id(&self) -> &'static str {
        "input-constant"
    }

    fn name(&self) -> &'static str {
        "Define Constant"
    }

    fn category(&self) -> Category {
        Category::Input
    }

    fn description(&self) -> &'static str {
        "Define a single constant value (Number or String)"
    }

    fn args(&self) -> &[ArgSpec] {
        &CONSTANT_ARGS
    }

    async fn run(&self, args: &Args, _env: &Environment) -> Result<Value> {
        let reader = ArgReader::new(args);
        let kind = reader.select("type", CONSTANT_TYPES, "string")?;
        let raw = reader.text("value").unwrap_or_default();

        let value = match kind {
            "int" => Value::number(parse_integer_prefix(&raw).unwrap_or(0.0)),
            "float" => Value::number(parse_number_prefix(&raw).unwrap_or(0.0)),
            _ => Value::string(raw),
        };
        Ok(value)
    }
}
