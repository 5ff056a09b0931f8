//! Kitchen: recipe + environment + log + run control behind one handle
//!
//! This is the surface a UI or CLI talks to. All methods take `&self`;
//! state sits behind `parking_lot` locks that are never held across an
//! `.await`. Environment edits are refused while a bake is running.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::baker::{BakeReport, Baker};
use crate::ast::{Placement, Recipe, RecipeStep};
use crate::config::BakeConfig;
use crate::error::{BakeError, Result};
use crate::event::ExecutionLog;
use crate::ops::{Args, Operation, Registry};
use crate::store::{coerce_text, Environment, Scalar, Value, Variable};

#[derive(Debug, Default)]
pub struct Kitchen {
    baker: Baker,
    recipe: RwLock<Recipe>,
    environment: RwLock<Environment>,
    log: RwLock<ExecutionLog>,
}

impl Kitchen {
    pub fn new(config: BakeConfig) -> Self {
        Self::from_baker(Baker::new(config))
    }

    pub fn with_registry(registry: Arc<Registry>, config: BakeConfig) -> Self {
        Self::from_baker(Baker::with_registry(registry, config))
    }

    fn from_baker(baker: Baker) -> Self {
        Self {
            baker,
            recipe: RwLock::new(Recipe::new()),
            environment: RwLock::new(Environment::new()),
            log: RwLock::new(ExecutionLog::new()),
        }
    }

    /// Start from an existing recipe and environment
    pub fn load(&self, recipe: Recipe, environment: Environment) -> Result<()> {
        self.ensure_idle()?;
        *self.recipe.write() = recipe;
        *self.environment.write() = environment;
        self.log.write().clear();
        Ok(())
    }

    pub fn config(&self) -> &BakeConfig {
        self.baker.config()
    }

    // ═══════════════════════════════════════════
    // REGISTRY QUERIES
    // ═══════════════════════════════════════════

    pub fn registry(&self) -> &Registry {
        self.baker.registry()
    }

    pub fn operation(&self, id: &str) -> Option<&Arc<dyn Operation>> {
        self.registry().get(id)
    }

    // ═══════════════════════════════════════════
    // RECIPE EDITS
    // ═══════════════════════════════════════════

    /// Append a step; returns its id
    pub fn add_step(&self, operation_id: &str) -> Result<String> {
        let prefix = &self.config().output_prefix;
        let mut recipe = self.recipe.write();
        let step = recipe.add_step(self.registry(), operation_id, prefix)?;
        debug!(step = %step.id, op = operation_id, "step added");
        Ok(step.id.clone())
    }

    pub fn update_step_args(&self, step_id: &str, args: Args) -> Result<()> {
        self.recipe.write().update_step_args(step_id, args)
    }

    pub fn set_step_output_name(&self, step_id: &str, name: &str) -> Result<()> {
        self.recipe.write().set_step_output_name(step_id, name)
    }

    pub fn remove_step(&self, step_id: &str) -> Result<RecipeStep> {
        self.recipe.write().remove_step(step_id)
    }

    pub fn move_step(&self, step_id: &str, target_id: &str, placement: Placement) -> bool {
        self.recipe.write().move_relative(step_id, target_id, placement)
    }

    /// Drag-and-drop form of [`move_step`](Self::move_step)
    pub fn reorder(&self, active_id: &str, over_id: &str) -> bool {
        self.recipe.write().reorder(active_id, over_id)
    }

    pub fn recipe(&self) -> Recipe {
        self.recipe.read().clone()
    }

    // ═══════════════════════════════════════════
    // ENVIRONMENT
    // ═══════════════════════════════════════════

    pub fn variables(&self) -> Environment {
        self.environment.read().clone()
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.environment.read().get(name).cloned()
    }

    pub fn set_variable(&self, name: &str, value: Value) -> Result<()> {
        self.ensure_idle()?;
        self.environment.write().set(name, value);
        Ok(())
    }

    pub fn remove_variable(&self, name: &str) -> Result<Option<Variable>> {
        self.ensure_idle()?;
        Ok(self.environment.write().remove(name))
    }

    pub fn update_scalar(&self, name: &str, value: Scalar) -> Result<()> {
        self.ensure_idle()?;
        self.environment.write().update_scalar(name, value)
    }

    pub fn update_cell(&self, name: &str, row: usize, column: &str, value: Scalar) -> Result<bool> {
        self.ensure_idle()?;
        self.environment.write().update_cell(name, row, column, value)
    }

    /// Cell edit from raw user input; numeric text becomes a number
    pub fn update_cell_text(
        &self,
        name: &str,
        row: usize,
        column: &str,
        raw: &str,
    ) -> Result<bool> {
        self.update_cell(name, row, column, coerce_text(raw))
    }

    pub fn clear_variables(&self) -> Result<()> {
        self.ensure_idle()?;
        self.environment.write().clear();
        Ok(())
    }

    // ═══════════════════════════════════════════
    // RUN CONTROL
    // ═══════════════════════════════════════════

    pub fn is_running(&self) -> bool {
        self.baker.is_running()
    }

    /// Latest run's log
    pub fn log(&self) -> ExecutionLog {
        self.log.read().clone()
    }

    /// Bake the current recipe.
    ///
    /// The run works on a snapshot of the environment. Its committed outputs
    /// are merged back at the end; variables it never touched stay as they are.
    pub async fn bake(&self) -> Result<BakeReport> {
        let guard = self.baker.begin()?;
        let recipe = self.recipe.read().clone();
        let snapshot = self.environment.read().clone();

        let outcome = self.baker.bake_with(&guard, &recipe, snapshot).await;

        {
            let mut env = self.environment.write();
            for name in &outcome.report.committed {
                if let Some(value) = outcome.environment.get(name) {
                    env.set(name.clone(), value.clone());
                }
            }
        }
        *self.log.write() = outcome.report.log.clone();

        drop(guard);
        Ok(outcome.report)
    }

    /// Clear environment and log, whatever the run state. The recipe stays.
    pub fn reset(&self) {
        self.environment.write().clear();
        self.log.write().clear();
        debug!("kitchen reset");
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_running() {
            return Err(BakeError::RunInProgress);
        }
        Ok(())
    }
}
