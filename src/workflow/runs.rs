use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Grammar the orchestration engine enforces on run ids. A stored run that
/// violates it is treated as corrupt and reported instead of relayed.
fn run_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.~:+-]+$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Scheduled,
    Manual,
    Backfill,
}

impl RunType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(RunType::Scheduled),
            "manual" => Some(RunType::Manual),
            "backfill" => Some(RunType::Backfill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Success,
    Failed,
}

impl RunState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(RunState::Queued),
            "running" => Some(RunState::Running),
            "success" => Some(RunState::Success),
            "failed" => Some(RunState::Failed),
            _ => None,
        }
    }
}

/// Execution state of a single task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskInstanceState {
    Queued,
    Running,
    Success,
    Failed,
    Skipped,
    UpstreamFailed,
}

/// One historical or in-progress execution of a workflow, as recorded by
/// the orchestration engine. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub dag_id: String,
    pub run_id: String,
    pub run_type: RunType,
    pub logical_date: DateTime<Utc>,
    pub state: RunState,
    #[serde(default)]
    pub task_states: HashMap<String, TaskInstanceState>,
}

/// Bounds run retrieval for a grid request. Unset fields mean
/// "unrestricted" (or the documented default for `base_date`).
#[derive(Debug, Clone, Default)]
pub struct RunSelection {
    pub base_date: Option<DateTime<Utc>>,
    pub run_types: Vec<RunType>,
    pub run_states: Vec<RunState>,
    pub limit: usize,
}

/// Filters, sorts and truncates a dag's runs per the selection.
///
/// When `base_date` is absent the latest logical date among the dag's runs
/// is used, falling back to now for a dag that has never run. Sorting
/// walks `ordering` keys descending; `run_id` descending is always the
/// final tiebreak so the order is total and repeated reads are
/// byte-identical.
pub fn apply_selection(
    mut runs: Vec<RunRecord>,
    selection: &RunSelection,
    ordering: &[String],
) -> Vec<RunRecord> {
    let base_date = selection
        .base_date
        .or_else(|| runs.iter().map(|r| r.logical_date).max())
        .unwrap_or_else(Utc::now);

    runs.retain(|r| r.logical_date <= base_date);
    if !selection.run_types.is_empty() {
        runs.retain(|r| selection.run_types.contains(&r.run_type));
    }
    if !selection.run_states.is_empty() {
        runs.retain(|r| selection.run_states.contains(&r.state));
    }

    runs.sort_by(|a, b| compare_runs(a, b, ordering));
    runs.truncate(selection.limit);
    runs
}

fn compare_runs(a: &RunRecord, b: &RunRecord, ordering: &[String]) -> Ordering {
    for key in ordering {
        let ord = match key.as_str() {
            "logical_date" => b.logical_date.cmp(&a.logical_date),
            "run_id" => b.run_id.cmp(&a.run_id),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    b.run_id.cmp(&a.run_id)
}

/// Encodes one run for the wire. Failures are per-record: the caller
/// collects the message and drops the run without aborting the request.
pub fn encode_run(run: &RunRecord) -> Result<Value, String> {
    if !run_id_pattern().is_match(&run.run_id) {
        return Err(format!(
            "error encoding run {:?}: run id contains invalid characters",
            run.run_id
        ));
    }
    let mut value = serde_json::to_value(run)
        .map_err(|e| format!("error encoding run {:?}: {e}", run.run_id))?;
    // Per-task states travel in the grid rollup, not per run.
    if let Some(fields) = value.as_object_mut() {
        fields.remove("task_states");
    }
    Ok(value)
}
