//! Variable store (the environment)
//!
//! Single owned map name → [`Variable`]. Cloning produces an independent
//! copy, which is what the baker uses as its per-run working set.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use super::value::{format_number, parse_number, Scalar, Table, Value, ValueKind, Variable};
use crate::error::{BakeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Environment {
    variables: BTreeMap<String, Variable>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a variable's value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).map(|v| &v.value)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Insert or overwrite (kind may change)
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.variables.insert(name.clone(), Variable::new(name, value));
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Resolve `name` and require a table
    pub fn table(&self, name: &str) -> Result<&Table> {
        match self.get(name) {
            Some(Value::Table(t)) => Ok(t),
            Some(other) => Err(BakeError::WrongKind {
                name: name.to_string(),
                expected: ValueKind::Table.to_string(),
                found: other.kind().to_string(),
            }),
            None => Err(BakeError::VariableNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Every Number/String variable, keyed by variable name (expression scope)
    pub fn scalar_scope(&self) -> HashMap<String, Scalar> {
        self.variables
            .values()
            .filter_map(|v| v.value.as_scalar().map(|s| (v.name.clone(), s)))
            .collect()
    }

    /// Replace a scalar payload while keeping the variable's kind
    pub fn update_scalar(&mut self, name: &str, new_value: Scalar) -> Result<()> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| BakeError::VariableNotFound {
                name: name.to_string(),
            })?;

        match &mut variable.value {
            Value::Number { value } => {
                *value = new_value.to_number().ok_or_else(|| BakeError::WrongKind {
                    name: name.to_string(),
                    expected: ValueKind::Number.to_string(),
                    found: ValueKind::String.to_string(),
                })?;
            }
            Value::String { value } => {
                *value = match new_value {
                    Scalar::Text(s) => s,
                    Scalar::Number(n) => format_number(n),
                };
            }
            Value::Table(_) => {
                return Err(BakeError::WrongKind {
                    name: name.to_string(),
                    expected: "number or string".to_string(),
                    found: ValueKind::Table.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Best-effort cell edit.
    ///
    /// Returns `Ok(false)` without touching anything when the row or column
    /// no longer exists; the caller's view of the table shape may be stale.
    pub fn update_cell(
        &mut self,
        name: &str,
        row_index: usize,
        column: &str,
        new_value: Scalar,
    ) -> Result<bool> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| BakeError::VariableNotFound {
                name: name.to_string(),
            })?;

        let found = variable.value.kind();
        let Value::Table(table) = &mut variable.value else {
            return Err(BakeError::WrongKind {
                name: name.to_string(),
                expected: ValueKind::Table.to_string(),
                found: found.to_string(),
            });
        };

        if !table.has_column(column) {
            debug!(variable = name, column, "cell edit ignored: unknown column");
            return Ok(false);
        }
        let Some(row) = table.rows.get_mut(row_index) else {
            debug!(variable = name, row_index, "cell edit ignored: row out of range");
            return Ok(false);
        };

        row.insert(column.to_string(), new_value);
        Ok(true)
    }
}

/// Coerce raw user text into a scalar the way ingestion does
pub fn coerce_text(raw: &str) -> Scalar {
    parse_number(raw)
        .map(Scalar::Number)
        .unwrap_or_else(|| Scalar::Text(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::value::Row;

    fn people() -> Table {
        let mut a = Row::new();
        a.insert("name".into(), "Alice".into());
        a.insert("age".into(), Scalar::Number(30.0));
        let mut b = Row::new();
        b.insert("name".into(), "Bob".into());
        b.insert("age".into(), Scalar::Number(25.0));
        Table::new(vec!["name".into(), "age".into()], vec![a, b])
    }

    #[test]
    fn set_overwrites_value_and_kind() {
        let mut env = Environment::new();
        env.set("x", Value::number(1.0));
        env.set("x", Value::string("now text"));

        assert_eq!(env.len(), 1);
        assert_eq!(env.get("x").unwrap().kind(), ValueKind::String);
        assert_eq!(env.variable("x").unwrap().name, "x");
    }

    #[test]
    fn clone_is_independent() {
        let mut env = Environment::new();
        env.set("t", Value::Table(people()));
        let mut copy = env.clone();
        copy.update_cell("t", 0, "age", Scalar::Number(99.0)).unwrap();

        assert_eq!(env.table("t").unwrap().cell(0, "age"), Some(&Scalar::Number(30.0)));
        assert_eq!(copy.table("t").unwrap().cell(0, "age"), Some(&Scalar::Number(99.0)));
    }

    #[test]
    fn remove_and_clear() {
        let mut env = Environment::new();
        env.set("a", Value::number(1.0));
        env.set("b", Value::number(2.0));
        assert!(env.remove("a").is_some());
        assert!(env.remove("a").is_none());
        env.clear();
        assert!(env.is_empty());
    }

    #[test]
    fn update_scalar_preserves_kind() {
        let mut env = Environment::new();
        env.set("n", Value::number(1.0));
        env.set("s", Value::string("a"));

        env.update_scalar("n", "42".into()).unwrap();
        env.update_scalar("s", Scalar::Number(7.0)).unwrap();

        assert_eq!(env.get("n"), Some(&Value::number(42.0)));
        assert_eq!(env.get("s"), Some(&Value::string("7")));
    }

    #[test]
    fn update_scalar_rejects_unparseable_number_and_tables() {
        let mut env = Environment::new();
        env.set("n", Value::number(1.0));
        env.set("t", Value::Table(people()));

        assert!(matches!(
            env.update_scalar("n", "abc".into()),
            Err(BakeError::WrongKind { .. })
        ));
        assert!(matches!(
            env.update_scalar("t", Scalar::Number(1.0)),
            Err(BakeError::WrongKind { .. })
        ));
        assert!(matches!(
            env.update_scalar("missing", Scalar::Number(1.0)),
            Err(BakeError::VariableNotFound { .. })
        ));
        assert_eq!(env.get("n"), Some(&Value::number(1.0)));
    }

    #[test]
    fn update_cell_out_of_shape_is_noop() {
        let mut env = Environment::new();
        env.set("t", Value::Table(people()));
        let before = env.clone();

        assert!(!env.update_cell("t", 10, "age", Scalar::Number(1.0)).unwrap());
        assert!(!env.update_cell("t", 0, "height", Scalar::Number(1.0)).unwrap());
        assert_eq!(env, before);

        assert!(env.update_cell("t", 1, "name", "Robert".into()).unwrap());
        assert_eq!(env.table("t").unwrap().cell(1, "name"), Some(&Scalar::from("Robert")));
    }

    #[test]
    fn update_cell_on_scalar_is_wrong_kind() {
        let mut env = Environment::new();
        env.set("n", Value::number(1.0));
        assert!(matches!(
            env.update_cell("n", 0, "a", Scalar::Number(1.0)),
            Err(BakeError::WrongKind { .. })
        ));
    }

    #[test]
    fn table_lookup_errors_name_the_variable() {
        let mut env = Environment::new();
        env.set("n", Value::number(1.0));

        let err = env.table("n").unwrap_err();
        assert!(err.to_string().contains("'n'"));
        assert!(matches!(env.table("ghost"), Err(BakeError::VariableNotFound { .. })));
    }

    #[test]
    fn scalar_scope_skips_tables() {
        let mut env = Environment::new();
        env.set("rate", Value::number(2.0));
        env.set("label", Value::string("x"));
        env.set("t", Value::Table(people()));

        let scope = env.scalar_scope();
        assert_eq!(scope.len(), 2);
        assert_eq!(scope["rate"], Scalar::Number(2.0));
        assert_eq!(scope["label"], Scalar::Text("x".into()));
    }

    #[test]
    fn coerce_text_detects_numbers() {
        assert_eq!(coerce_text("3.5"), Scalar::Number(3.5));
        assert_eq!(coerce_text("abc"), Scalar::Text("abc".into()));
    }
}
