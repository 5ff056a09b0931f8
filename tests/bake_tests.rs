//! Engine-level properties of a bake
//!
//! Recipes are built the way a front end would build them: through the
//! Kitchen surface or from a YAML document.

use bakehouse::ast::{Placement, RecipeFile};
use bakehouse::config::{BakeConfig, UnknownOperationPolicy};
use bakehouse::error::BakeError;
use bakehouse::event::StepStatus;
use bakehouse::ops::{builtin_registry, Args};
use bakehouse::runtime::{Baker, Kitchen};
use bakehouse::store::{Scalar, Table, Value, ValueKind};
use serde_json::json;

fn args(v: serde_json::Value) -> Args {
    serde_json::from_value(v).unwrap()
}

fn kitchen_from(doc: &str) -> Kitchen {
    let file = RecipeFile::from_yaml(doc).unwrap();
    let kitchen = Kitchen::default();
    let recipe = file.recipe(kitchen.registry(), "var_");
    kitchen.load(recipe, file.environment()).unwrap();
    kitchen
}

fn column(table: &Table, name: &str) -> Vec<Scalar> {
    table.rows.iter().filter_map(|r| r.get(name).cloned()).collect()
}

const PIPELINE: &str = r#"
steps:
  - op: op_from_csv
    id: load
    output: sales
    args:
      csvContent: "region,units,price\nnorth,3,2.5\nsouth,10,1\neast,7,3\nwest,1,9"
  - op: op_column_math
    id: revenue
    output: priced
    args: { inputTable: sales, expression: "units * price", newColumnName: revenue }
  - op: op_filter_rows
    id: big
    output: big
    args: { inputTable: priced, column: revenue, operator: greater_than, value: "8" }
  - op: op_sort_rows
    id: ranked
    output: ranked
    args: { inputTable: big, column: revenue, direction: Descending }
"#;

#[tokio::test]
async fn full_pipeline_from_document() {
    let kitchen = kitchen_from(PIPELINE);
    let report = kitchen.bake().await.unwrap();
    assert!(report.is_success(), "{:?}", report.log);
    assert_eq!(report.log.len(), 4);

    let ranked = kitchen.variable("ranked").unwrap();
    let ranked = ranked.as_table().unwrap();
    assert_eq!(ranked.columns, vec!["region", "units", "price", "revenue"]);
    assert_eq!(
        column(ranked, "region"),
        vec![Scalar::from("east"), Scalar::from("south"), Scalar::from("west")]
    );
    assert_eq!(
        column(ranked, "revenue"),
        vec![Scalar::Number(21.0), Scalar::Number(10.0), Scalar::Number(9.0)]
    );
}

#[tokio::test]
async fn rerun_with_unchanged_environment_is_consistent() {
    let kitchen = kitchen_from(PIPELINE);
    let first = kitchen.bake().await.unwrap();
    let second = kitchen.bake().await.unwrap();

    assert_eq!(first.log.len(), second.log.len());
    assert_eq!(first.log.statuses(), second.log.statuses());
    assert_eq!(first.committed, second.committed);
}

#[tokio::test]
async fn three_steps_with_failing_middle() {
    let kitchen = kitchen_from(
        r#"
steps:
  - op: input-constant
    id: one
    output: first
    args: { type: int, value: "5" }
  - op: op_sort_rows
    id: two
    output: second
    args: { inputTable: first, column: x }
  - op: constant-math
    id: three
    output: third
    args: { expression: "first + 1" }
"#,
    );

    let report = kitchen.bake().await.unwrap();
    assert_eq!(report.log.statuses(), vec![StepStatus::Success, StepStatus::Error]);
    assert_eq!(report.halted_at.as_deref(), Some("two"));
    assert_eq!(kitchen.variable("first"), Some(Value::number(5.0)));
    assert!(kitchen.variable("third").is_none());

    let failure = report.log.for_step("two").unwrap();
    assert!(failure.message.as_deref().unwrap().contains("BAKE-012"));
    assert!(report.log.for_step("three").is_none());
}

#[tokio::test]
async fn fixing_the_failing_step_advances_the_halt_point() {
    let kitchen = Kitchen::default();
    let load = kitchen.add_step("op_from_csv").unwrap();
    kitchen.set_step_output_name(&load, "people").unwrap();

    let sort = kitchen.add_step("op_sort_rows").unwrap();
    kitchen
        .update_step_args(&sort, args(json!({"inputTable": "people", "column": "Age"})))
        .unwrap();

    let stats = kitchen.add_step("linear-regression").unwrap();
    let sort_out = kitchen.recipe().step(&sort).unwrap().output_var_name.clone();
    kitchen
        .update_step_args(
            &stats,
            args(json!({"tableVar": sort_out, "xCol": "#", "yCol": "age"})),
        )
        .unwrap();

    let broken = kitchen.bake().await.unwrap();
    assert_eq!(broken.halted_at.as_deref(), Some(sort.as_str()));
    let message = broken.log.for_step(&sort).unwrap().message.clone().unwrap();
    assert!(message.contains("Available: name, age"), "{}", message);

    kitchen
        .update_step_args(&sort, args(json!({"column": "age"})))
        .unwrap();
    let fixed = kitchen.bake().await.unwrap();

    let position = |id: &str| kitchen.recipe().iter().position(|s| s.id == id);
    let before = broken.halted_at.as_deref().and_then(position).unwrap();
    let after = fixed.halted_at.as_deref().and_then(position).unwrap_or(usize::MAX);
    assert!(after > before);
    assert!(fixed.is_success());
    assert_eq!(fixed.log.len(), 3);
}

#[tokio::test]
async fn renaming_onto_an_existing_variable_overwrites_value_and_kind() {
    let kitchen = Kitchen::default();
    kitchen.set_variable("target", Value::string("old")).unwrap();

    let step = kitchen.add_step("op_from_csv").unwrap();
    kitchen.set_step_output_name(&step, "target").unwrap();
    kitchen.bake().await.unwrap();

    let value = kitchen.variable("target").unwrap();
    assert_eq!(value.kind(), ValueKind::Table);
    assert_eq!(value.as_table().unwrap().len(), 2);
}

#[tokio::test]
async fn column_math_adds_sum_column() {
    let kitchen = kitchen_from(
        r#"
variables:
  t:
    columns: [A, B]
    rows:
      - { A: 2, B: 3 }
steps:
  - op: op_column_math
    output: out
    args: { inputTable: t, expression: "A + B", newColumnName: C }
"#,
    );
    kitchen.bake().await.unwrap();

    let out = kitchen.variable("out").unwrap();
    let out = out.as_table().unwrap();
    assert_eq!(out.columns, vec!["A", "B", "C"]);
    assert_eq!(out.cell(0, "C"), Some(&Scalar::Number(5.0)));
    assert_eq!(out.cell(0, "A"), Some(&Scalar::Number(2.0)));
}

#[tokio::test]
async fn filter_and_sort_examples() {
    let kitchen = kitchen_from(
        r#"
variables:
  t:
    columns: [A]
    rows: [ { A: 1 }, { A: 3 }, { A: 5 } ]
  u:
    columns: [A]
    rows: [ { A: 3 }, { A: 1 }, { A: 2 } ]
steps:
  - op: op_filter_rows
    output: filtered
    args: { inputTable: t, column: A, operator: greater_than, value: "2" }
  - op: op_sort_rows
    output: asc
    args: { inputTable: u, column: A, direction: Ascending }
  - op: op_sort_rows
    output: desc
    args: { inputTable: u, column: A, direction: Descending }
"#,
    );
    kitchen.bake().await.unwrap();

    let get = |name: &str| column(kitchen.variable(name).unwrap().as_table().unwrap(), "A");
    assert_eq!(get("filtered"), vec![Scalar::Number(3.0), Scalar::Number(5.0)]);
    assert_eq!(get("asc"), vec![Scalar::Number(1.0), Scalar::Number(2.0), Scalar::Number(3.0)]);
    assert_eq!(get("desc"), vec![Scalar::Number(3.0), Scalar::Number(2.0), Scalar::Number(1.0)]);
}

#[tokio::test]
async fn regression_over_a_perfect_line() {
    let kitchen = kitchen_from(
        r#"
steps:
  - op: op_from_csv
    output: pts
    args: { csvContent: "x,y\n1,2\n2,4\n3,6" }
  - op: linear-regression
    output: fit
    args: { tableVar: pts, xCol: x, yCol: y }
"#,
    );
    kitchen.bake().await.unwrap();

    let fit = kitchen.variable("fit").unwrap();
    let fit = fit.as_table().unwrap();
    let metric = |row: usize| fit.cell(row, "Value").and_then(Scalar::as_number).unwrap();
    assert!((metric(0) - 2.0).abs() < 1e-9);
    assert!(metric(1).abs() < 1e-9);
    assert!((metric(2) - 1.0).abs() < 1e-9);
    assert_eq!(fit.cell(3, "Value"), Some(&Scalar::from("y = 2.0000x + 0.0000")));
}

#[tokio::test]
async fn regression_needs_two_numeric_pairs() {
    let kitchen = kitchen_from(
        r#"
steps:
  - op: op_from_csv
    output: pts
    args: { csvContent: "x,y\n1,2\nabc,4" }
  - op: linear-regression
    args: { tableVar: pts, xCol: x, yCol: y }
"#,
    );
    let report = kitchen.bake().await.unwrap();
    let last = report.log.entries().last().unwrap();
    assert_eq!(last.status, StepStatus::Error);
    assert!(last.message.as_deref().unwrap().starts_with("BAKE-015"));
}

#[tokio::test]
async fn scalar_chain_through_constants() {
    let kitchen = kitchen_from(
        r#"
variables:
  rate: 2
steps:
  - op: input-constant
    output: base
    args: { type: float, value: "10.5kg" }
  - op: constant-math
    output: total
    args: { expression: "base * rate" }
  - op: constant-math
    output: verdict
    args: { expression: "total > 20 ? 'heavy' : 'light'" }
"#,
    );
    kitchen.bake().await.unwrap();
    assert_eq!(kitchen.variable("base"), Some(Value::number(10.5)));
    assert_eq!(kitchen.variable("total"), Some(Value::number(21.0)));
    assert_eq!(kitchen.variable("verdict"), Some(Value::string("heavy")));
}

#[tokio::test]
async fn moving_a_step_changes_what_it_sees() {
    let kitchen = Kitchen::default();
    let a = kitchen.add_step("input-constant").unwrap();
    kitchen.update_step_args(&a, args(json!({"type": "int", "value": "3"}))).unwrap();
    kitchen.set_step_output_name(&a, "n").unwrap();
    let b = kitchen.add_step("constant-math").unwrap();
    kitchen.update_step_args(&b, args(json!({"expression": "n * n"}))).unwrap();

    assert!(kitchen.move_step(&b, &a, Placement::Before));
    let report = kitchen.bake().await.unwrap();
    assert_eq!(report.halted_at.as_deref(), Some(b.as_str()));

    assert!(kitchen.reorder(&b, &a));
    kitchen.reset();
    let report = kitchen.bake().await.unwrap();
    assert!(report.is_success());
}

#[tokio::test]
async fn unknown_operations_follow_policy() {
    let doc = r#"
steps:
  - op: op_retired
    id: gone
  - op: input-constant
    id: kept
    output: k
"#;
    let file = RecipeFile::from_yaml(doc).unwrap();
    let recipe = file.recipe(builtin_registry(), "var_");

    let skip = Baker::default().bake(&recipe, &file.environment()).await.unwrap();
    assert_eq!(skip.report.skipped, vec!["gone"]);
    assert!(skip.environment.contains("k"));

    let strict = Baker::new(BakeConfig {
        unknown_operations: UnknownOperationPolicy::Fail,
        ..BakeConfig::default()
    });
    let fail = strict.bake(&recipe, &file.environment()).await.unwrap();
    assert_eq!(fail.report.halted_at.as_deref(), Some("gone"));
    assert!(!fail.environment.contains("k"));
}

#[tokio::test]
async fn concurrent_bake_is_rejected() {
    let kitchen = std::sync::Arc::new(kitchen_from(PIPELINE));
    let results = bake_concurrently(kitchen.clone()).await;
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(BakeError::RunInProgress)))
        .count();
    let completed = results.iter().filter(|r| r.is_ok()).count();
    assert!(completed >= 1);
    assert_eq!(completed + rejected, results.len());
    assert!(!kitchen.is_running());
}

async fn bake_concurrently(
    kitchen: std::sync::Arc<Kitchen>,
) -> Vec<Result<bakehouse::runtime::BakeReport, BakeError>> {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let k = kitchen.clone();
            tokio::spawn(async move { k.bake().await })
        })
        .collect();
    let mut out = Vec::new();
    for handle in handles {
        out.push(handle.await.unwrap());
    }
    out
}
