//! Recipe documents on disk (YAML)
//!
//! ```yaml
//! variables:
//!   rate: 2
//! steps:
//!   - op: op_from_csv
//!     id: load
//!     output: people
//!     args: { csvContent: "a,b\n1,2", hasHeader: true }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::recipe::{Recipe, RecipeStep};
use crate::error::{BakeError, Result};
use crate::ops::{ArgKind, ArgReader, Args, Registry};
use crate::store::{Environment, Row, Table, Value, ValueKind};

/// A seed variable as written in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedValue {
    Number(f64),
    Text(String),
    Table {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Row>,
    },
}

impl From<SeedValue> for Value {
    fn from(seed: SeedValue) -> Self {
        match seed {
            SeedValue::Number(n) => Value::number(n),
            SeedValue::Text(s) => Value::string(s),
            SeedValue::Table { columns, rows } => Value::Table(Table::new(columns, rows)),
        }
    }
}

/// One step entry in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub args: Args,
}

/// A whole recipe document: optional seed variables plus steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeFile {
    #[serde(default)]
    pub variables: BTreeMap<String, SeedValue>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

/// A problem found by [`RecipeFile::validate`]
#[derive(Debug)]
pub struct Issue {
    /// Step id, or the step's 1-based position when it has none
    pub step: String,
    pub error: BakeError,
}

impl RecipeFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Seed environment from `variables`
    pub fn environment(&self) -> Environment {
        let mut env = Environment::new();
        for (name, seed) in &self.variables {
            env.set(name.clone(), Value::from(seed.clone()));
        }
        env
    }

    /// Build the in-memory recipe.
    ///
    /// Known operations get their registry defaults under the document's
    /// args. Unknown operations are kept as-is so the baker can decide
    /// whether to skip them.
    pub fn recipe(&self, registry: &Registry, prefix: &str) -> Recipe {
        self.steps
            .iter()
            .map(|def| {
                let mut args = registry.defaults_for(&def.op).unwrap_or_default();
                args.extend(def.args.clone());

                let output = def.output.clone().unwrap_or_default();
                let mut step = RecipeStep::new(def.op.clone(), args, output);
                if let Some(id) = &def.id {
                    step = step.with_id(id.clone());
                }
                if step.output_var_name.is_empty() {
                    step.output_var_name = step.output_name(prefix);
                }
                step
            })
            .collect()
    }

    /// Static checks, in document order:
    /// unknown operations, duplicate step ids, select args outside their
    /// option set, and table references to variables that neither a seed
    /// nor an earlier step provides.
    pub fn validate(&self, registry: &Registry) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut known: BTreeMap<String, Option<ValueKind>> = self
            .variables
            .iter()
            .map(|(name, seed)| (name.clone(), Some(Value::from(seed.clone()).kind())))
            .collect();

        for (index, def) in self.steps.iter().enumerate() {
            let label = def.id.clone().unwrap_or_else(|| format!("#{}", index + 1));

            if let Some(id) = &def.id {
                if !seen_ids.insert(id.clone()) {
                    issues.push(Issue {
                        step: label.clone(),
                        error: BakeError::ConfigError {
                            reason: format!("duplicate step id '{}'", id),
                        },
                    });
                }
            }

            let Some(op) = registry.get(&def.op) else {
                issues.push(Issue {
                    step: label,
                    error: BakeError::UnknownOperation {
                        operation_id: def.op.clone(),
                    },
                });
                continue;
            };

            let mut args = op.default_args();
            args.extend(def.args.clone());
            let reader = ArgReader::new(&args);

            for spec in op.args() {
                match &spec.kind {
                    ArgKind::Select { options } => {
                        if let Err(error) = reader.select(spec.name, options, "") {
                            issues.push(Issue {
                                step: label.clone(),
                                error,
                            });
                        }
                    }
                    ArgKind::VariableRef { accepts } => {
                        let Some(name) =
                            reader.text(spec.name).filter(|n| !n.trim().is_empty())
                        else {
                            continue;
                        };
                        let name = name.trim().to_string();
                        match known.get(&name) {
                            None => issues.push(Issue {
                                step: label.clone(),
                                error: BakeError::VariableNotFound { name },
                            }),
                            Some(Some(kind)) if accepts.is_some_and(|a| !a.contains(kind)) => {
                                issues.push(Issue {
                                    step: label.clone(),
                                    error: BakeError::WrongKind {
                                        name,
                                        expected: ValueKind::Table.to_string(),
                                        found: kind.to_string(),
                                    },
                                })
                            }
                            Some(_) => {}
                        }
                    }
                    _ => {}
                }
            }

            // kind of a step's output is only known at run time
            let output = def.output.clone().unwrap_or_default();
            if !output.trim().is_empty() {
                known.insert(output.trim().to_string(), None);
            }
        }

        issues
    }
}
