//! Value model: tables, numbers and strings
//!
//! A [`Value`] is an explicit tagged union. Table cells are [`Scalar`]s,
//! never an open-ended dynamic type, so table operations stay total.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// One table cell: a number or a piece of text
///
/// Serializes as a bare JSON number or string. Non-finite numbers are written
/// as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`, and read back as
/// numbers, so a text cell holding exactly one of those labels comes back
/// numeric.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(_) => None,
        }
    }

    /// Numeric reading: numbers as-is, text only when it is a complete number
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => parse_number(s),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Number(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => f.write_str(&format_number(*n)),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Render a number the way users expect to read it back (`3`, `2.5`, `Infinity`)
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        n.to_string()
    }
}

/// Inverse of [`format_number`] for the non-finite labels only
fn non_finite_label(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// Serde adapter for an `f64` that may be NaN or infinite.
///
/// JSON has no spelling for those; serde_json would write `null` and refuse
/// to read it back as a number.
pub mod non_finite {
    use super::*;

    pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if n.is_finite() {
            serializer.serialize_f64(*n)
        } else {
            serializer.serialize_str(&format_number(*n))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match deserializer.deserialize_any(ScalarVisitor)? {
            Scalar::Number(n) => Ok(n),
            Scalar::Text(s) => Err(de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a number, \"NaN\", \"Infinity\" or \"-Infinity\"",
            )),
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a string")
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<Scalar, E> {
        Ok(Scalar::Number(n))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Scalar, E> {
        Ok(Scalar::Number(n as f64))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Scalar, E> {
        Ok(Scalar::Number(n as f64))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Scalar, E> {
        Ok(match non_finite_label(s) {
            Some(n) => Scalar::Number(n),
            None => Scalar::Text(s.to_string()),
        })
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Scalar, E> {
        Ok(match non_finite_label(&s) {
            Some(n) => Scalar::Number(n),
            None => Scalar::Text(s),
        })
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Number(n) => non_finite::serialize(n, serializer),
            Scalar::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// Strict numeric parse of a whole string (surrounding whitespace allowed).
///
/// Rejects `inf`/`nan` spellings that `f64::from_str` would otherwise accept.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() || !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("valid regex")
});

static INT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?\d+").expect("valid regex"));

/// Lenient read of the longest numeric prefix (`"12.5kg"` → 12.5).
/// `None` when the text does not start with a number.
pub fn parse_number_prefix(s: &str) -> Option<f64> {
    let m = FLOAT_PREFIX.find(s)?;
    let text = m.as_str().trim_start();
    match text.trim_start_matches(['+', '-']) {
        "Infinity" if text.starts_with('-') => Some(f64::NEG_INFINITY),
        "Infinity" => Some(f64::INFINITY),
        _ => text.parse().ok(),
    }
}

/// Leading integer prefix (`"12.7"` → 12)
pub fn parse_integer_prefix(s: &str) -> Option<f64> {
    let m = INT_PREFIX.find(s)?;
    m.as_str().trim().parse::<f64>().ok()
}

/// A table row: column name → cell. Absent keys read as undefined.
pub type Row = BTreeMap<String, Scalar>;

/// Ordered columns + ordered rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup; `None` for an out-of-range row or an absent key
    pub fn cell(&self, row: usize, column: &str) -> Option<&Scalar> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

/// Value kinds, used by `variable_ref` filters and kind checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Table,
    Number,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Table => "table",
            ValueKind::Number => "number",
            ValueKind::String => "string",
        })
    }
}

/// What a variable holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Value {
    Table(Table),
    Number {
        #[serde(with = "non_finite")]
        value: f64,
    },
    String {
        value: String,
    },
}

impl Value {
    pub fn number(value: f64) -> Self {
        Value::Number { value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String {
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Table(_) => ValueKind::Table,
            Value::Number { .. } => ValueKind::Number,
            Value::String { .. } => ValueKind::String,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Scalar view of a Number/String value; tables have none
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Table(_) => None,
            Value::Number { value } => Some(Scalar::Number(*value)),
            Value::String { value } => Some(Scalar::Text(value.clone())),
        }
    }

    /// One-line human summary (CLI listing, log lines)
    pub fn summary(&self) -> String {
        match self {
            Value::Table(t) => format!("table [{} cols × {} rows]", t.columns.len(), t.rows.len()),
            Value::Number { value } => format_number(*value),
            Value::String { value } => format!("{:?}", value),
        }
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Number(value) => Value::Number { value },
            Scalar::Text(value) => Value::String { value },
        }
    }
}

/// A named value, wholly owned by the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Total ordering used by sort.
///
/// Numbers come before text. Numbers compare numerically with every NaN
/// equal to every other NaN and after all other numbers. Text compares
/// lexicographically.
pub fn compare_cells(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Number(x), Scalar::Number(y)) => match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            // neither is NaN, so the comparison is defined
            (false, false) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        },
        (Scalar::Number(_), Scalar::Text(_)) => Ordering::Less,
        (Scalar::Text(_), Scalar::Number(_)) => Ordering::Greater,
        (Scalar::Text(x), Scalar::Text(y)) => x.cmp(y),
    }
}
