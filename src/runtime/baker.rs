//! The bake loop
//!
//! Walks the recipe strictly in order. Each step reads a working copy of the
//! environment; its output is committed only after `run` returns, so a step
//! never observes its own half-applied result. The first failure halts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::ast::{Recipe, RecipeStep};
use crate::config::{BakeConfig, UnknownOperationPolicy};
use crate::error::{BakeError, Result};
use crate::event::ExecutionLog;
use crate::ops::{builtin_registry, Operation, Registry};
use crate::store::{Environment, Value};

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BakeReport {
    pub log: ExecutionLog,
    /// Step id of the failing step, when the run halted
    pub halted_at: Option<String>,
    /// Steps skipped because their operation is not registered
    pub skipped: Vec<String>,
    /// Variable names committed by this run, in commit order
    pub committed: Vec<String>,
}

impl BakeReport {
    pub fn is_success(&self) -> bool {
        self.halted_at.is_none()
    }
}

/// Result of a run: the working environment plus the report
#[derive(Debug, Clone)]
pub struct BakeOutcome {
    pub environment: Environment,
    pub report: BakeReport,
}

/// Proof that a run is in progress. Dropping it returns the baker to idle.
#[derive(Debug)]
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Sequential recipe interpreter with a single-run guard
#[derive(Debug)]
pub struct Baker {
    registry: Arc<Registry>,
    config: BakeConfig,
    running: AtomicBool,
}

impl Default for Baker {
    fn default() -> Self {
        Self::new(BakeConfig::default())
    }
}

impl Baker {
    /// Baker over the built-in operations
    pub fn new(config: BakeConfig) -> Self {
        Self::with_registry(Arc::new(builtin_registry().clone()), config)
    }

    pub fn with_registry(registry: Arc<Registry>, config: BakeConfig) -> Self {
        Self {
            registry,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Idle → Running. Fails with `RunInProgress` when a run is active.
    pub fn begin(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BakeError::RunInProgress)?;
        Ok(RunGuard {
            flag: &self.running,
        })
    }

    /// Run `recipe` against a working copy of `env`
    pub async fn bake(&self, recipe: &Recipe, env: &Environment) -> Result<BakeOutcome> {
        let guard = self.begin()?;
        Ok(self.bake_with(&guard, recipe, env.clone()).await)
    }

    /// Run while already holding the guard. Step failures end up in the
    /// report, never in the return value.
    pub async fn bake_with(
        &self,
        _guard: &RunGuard<'_>,
        recipe: &Recipe,
        mut working: Environment,
    ) -> BakeOutcome {
        let started = Instant::now();
        let mut report = BakeReport::default();
        info!(steps = recipe.len(), variables = working.len(), "bake started");

        for step in recipe {
            let step_started = Instant::now();

            let Some(op) = self.registry.get(&step.operation_id) else {
                match self.config.unknown_operations {
                    UnknownOperationPolicy::Skip => {
                        warn!(
                            step = %step.id,
                            op = %step.operation_id,
                            "unknown operation, step skipped"
                        );
                        report.skipped.push(step.id.clone());
                        continue;
                    }
                    UnknownOperationPolicy::Fail => {
                        let err = BakeError::UnknownOperation {
                            operation_id: step.operation_id.clone(),
                        };
                        report.log.failure(&step.id, &step.operation_id, &err, 0);
                        report.halted_at = Some(step.id.clone());
                        break;
                    }
                }
            };

            let result = self.run_step(&**op, step, &working).await;
            let elapsed = step_started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    let name = step.output_name(&self.config.output_prefix);
                    let snapshot = self.config.snapshot_outputs.then(|| value.clone());
                    debug!(step = %step.id, output = %name, value = %value.summary(), "committed");
                    working.set(name.clone(), value);
                    report
                        .log
                        .success(&step.id, &step.operation_id, &name, snapshot, elapsed);
                    report.committed.push(name);
                }
                Err(err) => {
                    warn!(
                        step = %step.id,
                        op = %step.operation_id,
                        error = %err,
                        "step failed, halting"
                    );
                    report.log.failure(&step.id, &step.operation_id, &err, elapsed);
                    report.halted_at = Some(step.id.clone());
                    break;
                }
            }
        }

        info!(
            attempted = report.log.len(),
            skipped = report.skipped.len(),
            halted = report.halted_at.is_some(),
            duration_ms = started.elapsed().as_millis() as u64,
            "bake finished"
        );

        BakeOutcome {
            environment: working,
            report,
        }
    }

    #[instrument(skip_all, fields(step = %step.id, op = %step.operation_id))]
    async fn run_step(
        &self,
        op: &dyn Operation,
        step: &RecipeStep,
        env: &Environment,
    ) -> Result<Value> {
        debug!("dispatching");
        op.run(&step.args, env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StepStatus;
    use crate::ops::Args;
    use serde_json::json;

    fn step(id: &str, op: &str, output: &str, args: serde_json::Value) -> RecipeStep {
        let args: Args = serde_json::from_value(args).unwrap();
        RecipeStep::new(op, args, output).with_id(id)
    }

    fn three_steps_middle_fails() -> Recipe {
        [
            step("s1", "input-constant", "k", json!({"type": "int", "value": "7"})),
            step("s2", "constant-math", "bad", json!({"expression": "ghost + 1"})),
            step("s3", "constant-math", "never", json!({"expression": "k * 2"})),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn halts_at_first_failure_keeping_earlier_outputs() {
        let baker = Baker::default();
        let outcome = baker
            .bake(&three_steps_middle_fails(), &Environment::new())
            .await
            .unwrap();

        let report = &outcome.report;
        assert_eq!(report.log.statuses(), vec![StepStatus::Success, StepStatus::Error]);
        assert_eq!(report.halted_at.as_deref(), Some("s2"));
        assert_eq!(outcome.environment.get("k"), Some(&Value::number(7.0)));
        assert!(!outcome.environment.contains("never"));
        assert_eq!(report.committed, vec!["k"]);
        assert!(!baker.is_running());
    }

    #[tokio::test]
    async fn later_steps_see_earlier_outputs() {
        let recipe: Recipe = [
            step("a", "input-constant", "k", json!({"type": "float", "value": "1.5"})),
            step("b", "constant-math", "k2", json!({"expression": "k * 2"})),
        ]
        .into_iter()
        .collect();

        let outcome = Baker::default().bake(&recipe, &Environment::new()).await.unwrap();
        assert!(outcome.report.is_success());
        assert_eq!(outcome.environment.get("k2"), Some(&Value::number(3.0)));
    }

    #[tokio::test]
    async fn input_environment_is_not_mutated() {
        let mut env = Environment::new();
        env.set("seed", Value::number(1.0));
        let recipe: Recipe = [step("a", "constant-math", "seed", json!({"expression": "seed + 1"}))]
            .into_iter()
            .collect();

        let outcome = Baker::default().bake(&recipe, &env).await.unwrap();
        assert_eq!(env.get("seed"), Some(&Value::number(1.0)));
        assert_eq!(outcome.environment.get("seed"), Some(&Value::number(2.0)));
    }

    #[tokio::test]
    async fn unknown_operation_is_skipped_by_default() {
        let recipe: Recipe = [
            step("a", "op_removed", "x", json!({})),
            step("b", "input-constant", "y", json!({"value": "hi"})),
        ]
        .into_iter()
        .collect();

        let outcome = Baker::default().bake(&recipe, &Environment::new()).await.unwrap();
        assert_eq!(outcome.report.log.len(), 1);
        assert_eq!(outcome.report.skipped, vec!["a"]);
        assert!(outcome.report.is_success());
    }

    #[tokio::test]
    async fn unknown_operation_can_fail_the_run() {
        let config = BakeConfig {
            unknown_operations: UnknownOperationPolicy::Fail,
            ..BakeConfig::default()
        };
        let recipe: Recipe = [
            step("a", "op_removed", "x", json!({})),
            step("b", "input-constant", "y", json!({"value": "hi"})),
        ]
        .into_iter()
        .collect();

        let outcome = Baker::new(config).bake(&recipe, &Environment::new()).await.unwrap();
        let entry = &outcome.report.log.entries()[0];
        assert_eq!(entry.status, StepStatus::Error);
        assert!(entry.message.as_deref().unwrap_or("").contains("BAKE-040"));
        assert_eq!(outcome.report.log.len(), 1);
        assert!(!outcome.environment.contains("y"));
    }

    #[tokio::test]
    async fn blank_output_name_is_derived_from_step_id() {
        let recipe: Recipe = [step("abcdef0123", "input-constant", "", json!({"value": "x"}))]
            .into_iter()
            .collect();
        let outcome = Baker::default().bake(&recipe, &Environment::new()).await.unwrap();
        assert!(outcome.environment.contains("var_abcdef01"));
    }

    #[tokio::test]
    async fn snapshots_can_be_disabled() {
        let config = BakeConfig {
            snapshot_outputs: false,
            ..BakeConfig::default()
        };
        let recipe: Recipe = [step("a", "input-constant", "k", json!({"value": "x"}))]
            .into_iter()
            .collect();
        let outcome = Baker::new(config).bake(&recipe, &Environment::new()).await.unwrap();
        let entry = &outcome.report.log.entries()[0];
        assert!(entry.output.is_none());
        assert_eq!(entry.output_name.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_running() {
        let baker = Baker::default();
        let guard = baker.begin().unwrap();
        assert!(baker.is_running());

        let err = baker.bake(&Recipe::new(), &Environment::new()).await.unwrap_err();
        assert!(matches!(err, BakeError::RunInProgress));

        drop(guard);
        assert!(!baker.is_running());
        assert!(baker.bake(&Recipe::new(), &Environment::new()).await.is_ok());
    }

    #[tokio::test]
    async fn empty_recipe_produces_empty_log() {
        let outcome = Baker::default()
            .bake(&Recipe::new(), &Environment::new())
            .await
            .unwrap();
        assert!(outcome.report.log.is_empty());
        assert!(outcome.report.is_success());
    }
}
