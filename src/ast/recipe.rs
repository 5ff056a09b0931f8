//! Recipe: the ordered, editable list of steps
//!
//! Every edit here is a pure permutation or a single-step content change.
//! Nothing in this module touches an `Environment`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{BakeError, Result};
use crate::ops::{Args, Registry};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// True when `name` can be referenced from an expression without backticks
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// First 8 hex chars of a fresh v4 uuid
fn short_hex(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// One step: an operation, its argument values and where the result goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub id: String,
    pub operation_id: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub output_var_name: String,
}

impl RecipeStep {
    pub fn new(
        operation_id: impl Into<String>,
        args: Args,
        output_var_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation_id: operation_id.into(),
            args,
            output_var_name: output_var_name.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Configured output name, or one derived from the step id when blank
    pub fn output_name(&self, prefix: &str) -> String {
        let configured = self.output_var_name.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        let stem: String = self
            .id
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect();
        format!("{}{}", prefix, stem)
    }
}

/// Where to drop a moved step relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

/// Ordered step list. Order defines evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipe {
    steps: Vec<RecipeStep>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[RecipeStep] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecipeStep> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&RecipeStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    fn step_mut(&mut self, id: &str) -> Result<&mut RecipeStep> {
        self.steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| BakeError::StepNotFound {
                step_id: id.to_string(),
            })
    }

    /// Append an already-built step
    pub fn push(&mut self, step: RecipeStep) {
        self.steps.push(step);
    }

    /// Append a new step for `operation_id`, args seeded from its defaults.
    ///
    /// Output name is `<prefix><8 hex chars>`.
    pub fn add_step(
        &mut self,
        registry: &Registry,
        operation_id: &str,
        prefix: &str,
    ) -> Result<&RecipeStep> {
        let args = registry.defaults_for(operation_id)?;
        let id = Uuid::new_v4();
        let step = RecipeStep {
            id: id.to_string(),
            operation_id: operation_id.to_string(),
            args,
            output_var_name: format!("{}{}", prefix, short_hex(&id)),
        };
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Merge `args` into the step's arguments; keys not mentioned are kept
    pub fn update_step_args(&mut self, id: &str, args: Args) -> Result<()> {
        let step = self.step_mut(id)?;
        step.args.extend(args);
        Ok(())
    }

    pub fn set_step_output_name(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !name.is_empty() && !is_identifier(&name) {
            warn!(
                step = id,
                name = %name,
                "output name is not an identifier; expressions must quote it in backticks"
            );
        }
        self.step_mut(id)?.output_var_name = name;
        Ok(())
    }

    pub fn remove_step(&mut self, id: &str) -> Result<RecipeStep> {
        let index = self.position(id).ok_or_else(|| BakeError::StepNotFound {
            step_id: id.to_string(),
        })?;
        Ok(self.steps.remove(index))
    }

    /// Drag semantics: take `active` out and insert it at `over`'s old index.
    ///
    /// Moving down lands after the target, moving up lands before it.
    /// Returns `false` (and leaves the order alone) for unknown ids.
    pub fn reorder(&mut self, active: &str, over: &str) -> bool {
        let (Some(from), Some(to)) = (self.position(active), self.position(over)) else {
            return false;
        };
        if from != to {
            let step = self.steps.remove(from);
            self.steps.insert(to, step);
        }
        true
    }

    /// Move `active` immediately before or after `target`
    pub fn move_relative(&mut self, active: &str, target: &str, placement: Placement) -> bool {
        if self.position(target).is_none() {
            return false;
        }
        let Some(from) = self.position(active) else {
            return false;
        };
        if active == target {
            return true;
        }

        let step = self.steps.remove(from);
        // target is still present after removing a different step
        let anchor = self.position(target).unwrap_or(self.steps.len());
        let at = match placement {
            Placement::Before => anchor,
            Placement::After => anchor + 1,
        };
        self.steps.insert(at, step);
        true
    }
}

impl FromIterator<RecipeStep> for Recipe {
    fn from_iter<I: IntoIterator<Item = RecipeStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Recipe {
    type Item = &'a RecipeStep;
    type IntoIter = std::slice::Iter<'a, RecipeStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
