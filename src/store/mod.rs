//! Store Module - variables and values
//!
//! Key types:
//! - `Environment`: name → Variable, the single source of truth for a bake
//! - `Value`: Table / Number / String tagged union
//! - `Scalar`: a table cell (number or text)

mod environment;
mod value;

pub use environment::{coerce_text, Environment};
pub use value::{
    compare_cells, format_number, parse_integer_prefix, parse_number, parse_number_prefix, Row,
    Scalar, Table, Value, ValueKind, Variable,
};
