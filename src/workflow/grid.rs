use serde_json::{Value, json};

use super::runs::{RunRecord, TaskInstanceState};
use super::{GroupChild, TaskGroup, WorkflowDefinition};

/// Merge priority for rolling task states up into their group, worst
/// first. A group cell shows the most alarming state among its members.
const STATE_PRIORITY: [TaskInstanceState; 6] = [
    TaskInstanceState::Failed,
    TaskInstanceState::UpstreamFailed,
    TaskInstanceState::Running,
    TaskInstanceState::Queued,
    TaskInstanceState::Success,
    TaskInstanceState::Skipped,
];

fn state_label(state: Option<TaskInstanceState>) -> &'static str {
    match state {
        Some(TaskInstanceState::Queued) => "queued",
        Some(TaskInstanceState::Running) => "running",
        Some(TaskInstanceState::Success) => "success",
        Some(TaskInstanceState::Failed) => "failed",
        Some(TaskInstanceState::Skipped) => "skipped",
        Some(TaskInstanceState::UpstreamFailed) => "upstream_failed",
        None => "no_status",
    }
}

fn merge(a: Option<TaskInstanceState>, b: Option<TaskInstanceState>) -> Option<TaskInstanceState> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let rank = |s| STATE_PRIORITY.iter().position(|p| *p == s).unwrap_or(usize::MAX);
            Some(if rank(a) <= rank(b) { a } else { b })
        }
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// The `groups` rollup for a grid request: the (possibly restricted)
/// group tree where every node carries one `instances` entry per selected
/// run, in run order. Pure function of the dag and the runs, so repeated
/// identical requests serialize identically.
pub fn grid_groups(dag: &WorkflowDefinition, runs: &[RunRecord]) -> Value {
    group_node(dag, &dag.task_group, runs).0
}

fn group_node(
    dag: &WorkflowDefinition,
    group: &TaskGroup,
    runs: &[RunRecord],
) -> (Value, Vec<Option<TaskInstanceState>>) {
    let mut rollup: Vec<Option<TaskInstanceState>> = vec![None; runs.len()];
    let mut children = Vec::with_capacity(group.children.len());

    for child in &group.children {
        match child {
            GroupChild::Task { id } => {
                let states: Vec<Option<TaskInstanceState>> = runs
                    .iter()
                    .map(|r| r.task_states.get(id).copied())
                    .collect();
                for (acc, state) in rollup.iter_mut().zip(&states) {
                    *acc = merge(*acc, *state);
                }
                let label = dag.task(id).map(|t| t.display_label()).unwrap_or(id);
                children.push(json!({
                    "id": id,
                    "label": label,
                    "instances": instances(runs, &states),
                }));
            }
            GroupChild::Group(sub) => {
                let (node, states) = group_node(dag, sub, runs);
                for (acc, state) in rollup.iter_mut().zip(&states) {
                    *acc = merge(*acc, *state);
                }
                children.push(node);
            }
        }
    }

    let node = json!({
        "id": group.id,
        "label": group.label,
        "children": children,
        "instances": instances(runs, &rollup),
    });
    (node, rollup)
}

fn instances(runs: &[RunRecord], states: &[Option<TaskInstanceState>]) -> Vec<Value> {
    runs.iter()
        .zip(states)
        .map(|(run, state)| {
            json!({
                "run_id": run.run_id,
                "state": state_label(*state),
            })
        })
        .collect()
}
