//! Execution log for one bake
//!
//! - LogEntry: step id + operation id + status + timestamp + payload
//! - StepStatus: success | error
//! - ExecutionLog: ordered, append-only, at most one entry per attempted step

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{BakeError, ErrorCategory, FixSuggestion};
use crate::store::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
}

/// Outcome of one attempted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log (0-based, monotonic)
    pub seq: usize,
    pub step_id: String,
    pub operation_id: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    /// Variable the output was committed under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// Snapshot of the produced value (successes, when enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure message (errors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl LogEntry {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }
}

/// Ordered log of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed output
    pub fn success(
        &mut self,
        step_id: &str,
        operation_id: &str,
        output_name: &str,
        output: Option<Value>,
        duration_ms: u64,
    ) -> &LogEntry {
        self.push(LogEntry {
            seq: self.entries.len(),
            step_id: step_id.to_string(),
            operation_id: operation_id.to_string(),
            status: StepStatus::Success,
            timestamp: Utc::now(),
            duration_ms,
            output_name: Some(output_name.to_string()),
            output,
            message: None,
            category: None,
            hint: None,
        })
    }

    /// Record the failure that halted the run
    pub fn failure(
        &mut self,
        step_id: &str,
        operation_id: &str,
        error: &BakeError,
        duration_ms: u64,
    ) -> &LogEntry {
        self.push(LogEntry {
            seq: self.entries.len(),
            step_id: step_id.to_string(),
            operation_id: operation_id.to_string(),
            status: StepStatus::Error,
            timestamp: Utc::now(),
            duration_ms,
            output_name: None,
            output: None,
            message: Some(error.to_string()),
            category: Some(error.category()),
            hint: error.fix_suggestion().map(str::to_string),
        })
    }

    fn push(&mut self, entry: LogEntry) -> &LogEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entry for one step, if it was attempted
    pub fn for_step(&self, step_id: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.step_id == step_id)
    }

    /// The error entry that stopped the run, if any
    pub fn halted_at(&self) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.is_error())
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.entries.iter().map(|e| e.status).collect()
    }

    /// Serialize to JSON for `--json` output
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(&self.entries).unwrap_or(JsonValue::Null)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_are_sequenced_in_order() {
        let mut log = ExecutionLog::new();
        log.success("s1", "op_from_csv", "people", None, 3);
        log.success("s2", "constant-math", "n", Some(Value::number(2.0)), 0);

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].seq, 0);
        assert_eq!(log.entries()[1].seq, 1);
        assert!(log.entries()[1].timestamp >= log.entries()[0].timestamp);
        assert!(log.halted_at().is_none());
    }

    #[test]
    fn failure_carries_message_category_and_hint() {
        let mut log = ExecutionLog::new();
        let err = BakeError::missing("column");
        let entry = log.failure("s1", "op_sort_rows", &err, 1).clone();

        assert_eq!(entry.status, StepStatus::Error);
        assert_eq!(entry.message.as_deref(), Some("BAKE-010: Argument 'column' is required"));
        assert_eq!(entry.category, Some(ErrorCategory::Validation));
        assert!(entry.hint.is_some());
        assert_eq!(log.halted_at().map(|e| e.step_id.as_str()), Some("s1"));
    }

    #[test]
    fn serializes_flat_entries() {
        let mut log = ExecutionLog::new();
        log.success("s1", "input-constant", "k", Some(Value::number(1.0)), 0);
        log.failure("s2", "op_filter_rows", &BakeError::missing("column"), 0);

        let json = log.to_json();
        assert_eq!(json[0]["status"], "success");
        assert_eq!(json[0]["output"], json!({"type": "number", "value": 1.0}));
        assert!(json[0].get("message").is_none());
        assert_eq!(json[1]["status"], "error");
        assert_eq!(json[1]["category"], "validation");
        assert!(json[1].get("output").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let mut log = ExecutionLog::new();
        log.success("s1", "input-constant", "k", Some(Value::string("x")), 4);
        log.success("s2", "constant-math", "inf", Some(Value::number(f64::INFINITY)), 1);

        let text = serde_json::to_string(&log).unwrap();
        assert!(text.contains(r#""value":"Infinity""#));
        let back: ExecutionLog = serde_json::from_str(&text).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn nan_snapshot_survives_json() {
        let mut log = ExecutionLog::new();
        log.success("s1", "constant-math", "bad", Some(Value::number(f64::NAN)), 0);

        let text = serde_json::to_string(&log).unwrap();
        let back: ExecutionLog = serde_json::from_str(&text).unwrap();
        let snapshot = back.for_step("s1").and_then(|e| e.output.clone());
        assert!(matches!(snapshot, Some(Value::Number { value }) if value.is_nan()));
    }

    #[test]
    fn lookup_by_step() {
        let mut log = ExecutionLog::new();
        log.success("a", "op", "x", None, 0);
        assert!(log.for_step("a").is_some());
        assert!(log.for_step("b").is_none());
        assert_eq!(log.statuses(), vec![StepStatus::Success]);
        log.clear();
        assert!(log.is_empty());
    }
}
