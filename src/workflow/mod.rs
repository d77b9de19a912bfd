pub mod file_store;
pub mod graph;
pub mod grid;
pub mod http_store;
pub mod runs;
pub mod store;
pub mod subset;

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Nesting deeper than this is treated as a malformed definition rather
/// than walked recursively.
const MAX_GROUP_DEPTH: usize = 64;

fn default_orientation() -> String {
    "LR".to_string()
}

pub fn default_run_ordering() -> Vec<String> {
    vec!["logical_date".to_string()]
}

/// A workflow (DAG) as published by the orchestration platform: tasks,
/// dependency edges, and a nested task-group tree used by the UI for
/// visual collapsing. Read-only for the lifetime of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub dag_id: String,
    #[serde(default = "default_orientation")]
    pub orientation: String,
    pub tasks: Vec<Task>,
    pub task_group: TaskGroup,
    #[serde(default = "default_run_ordering")]
    pub run_ordering: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Task ids this task feeds into. Upstream adjacency is derived, so
    /// the two directions can never disagree.
    #[serde(default)]
    pub downstream: Vec<String>,
}

impl Task {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub children: Vec<GroupChild>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupChild {
    Task { id: String },
    Group(TaskGroup),
}

impl WorkflowDefinition {
    pub fn has_task(&self, task_id: &str) -> bool {
        self.tasks.iter().any(|t| t.id == task_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    /// Reverse adjacency: task id -> ids of tasks that feed into it.
    pub fn upstream_map(&self) -> HashMap<&str, Vec<&str>> {
        let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            for down in &task.downstream {
                map.entry(down.as_str()).or_default().push(task.id.as_str());
            }
        }
        map
    }

    /// Checks the invariants inherited from the source graph: unique task
    /// ids, every task in exactly one group, every edge endpoint known,
    /// and a bounded group tree. Called on every load so a malformed
    /// upstream payload is rejected instead of walked.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for task in &self.tasks {
            if !ids.insert(task.id.as_str()) {
                bail!("dag {}: duplicate task id {:?}", self.dag_id, task.id);
            }
        }

        for task in &self.tasks {
            for down in &task.downstream {
                if !ids.contains(down.as_str()) {
                    bail!(
                        "dag {}: task {:?} has edge to unknown task {:?}",
                        self.dag_id,
                        task.id,
                        down
                    );
                }
            }
        }

        let mut grouped = HashSet::new();
        check_group(&self.dag_id, &self.task_group, &mut grouped, 0)?;

        for id in &ids {
            if !grouped.contains(*id) {
                bail!("dag {}: task {:?} missing from the group tree", self.dag_id, id);
            }
        }
        for id in &grouped {
            if !ids.contains(id.as_str()) {
                bail!("dag {}: group tree references unknown task {:?}", self.dag_id, id);
            }
        }

        Ok(())
    }

    /// Induced subgraph over `keep`: tasks outside the set are dropped,
    /// edges to them are pruned, and group nodes left without any kept
    /// descendant disappear. The original definition is untouched.
    pub fn restrict(&self, keep: &HashSet<String>) -> WorkflowDefinition {
        let tasks = self
            .tasks
            .iter()
            .filter(|t| keep.contains(&t.id))
            .map(|t| Task {
                id: t.id.clone(),
                label: t.label.clone(),
                downstream: t
                    .downstream
                    .iter()
                    .filter(|d| keep.contains(*d))
                    .cloned()
                    .collect(),
            })
            .collect();

        let task_group = restrict_group(&self.task_group, keep)
            .unwrap_or_else(|| TaskGroup {
                id: self.task_group.id.clone(),
                label: self.task_group.label.clone(),
                children: Vec::new(),
            });

        WorkflowDefinition {
            dag_id: self.dag_id.clone(),
            orientation: self.orientation.clone(),
            tasks,
            task_group,
            run_ordering: self.run_ordering.clone(),
        }
    }
}

fn check_group(
    dag_id: &str,
    group: &TaskGroup,
    grouped: &mut HashSet<String>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_GROUP_DEPTH {
        bail!("dag {dag_id}: group tree exceeds maximum nesting depth");
    }
    for child in &group.children {
        match child {
            GroupChild::Task { id } => {
                if !grouped.insert(id.clone()) {
                    bail!("dag {dag_id}: task {id:?} appears in more than one group");
                }
            }
            GroupChild::Group(sub) => check_group(dag_id, sub, grouped, depth + 1)?,
        }
    }
    Ok(())
}

fn restrict_group(group: &TaskGroup, keep: &HashSet<String>) -> Option<TaskGroup> {
    let children: Vec<GroupChild> = group
        .children
        .iter()
        .filter_map(|child| match child {
            GroupChild::Task { id } => {
                keep.contains(id).then(|| GroupChild::Task { id: id.clone() })
            }
            GroupChild::Group(sub) => restrict_group(sub, keep).map(GroupChild::Group),
        })
        .collect();

    if children.is_empty() && !group.id.is_empty() {
        return None;
    }

    Some(TaskGroup {
        id: group.id.clone(),
        label: group.label.clone(),
        children,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn task(id: &str, downstream: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            label: None,
            downstream: downstream.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn leaf(id: &str) -> GroupChild {
        GroupChild::Task { id: id.to_string() }
    }

    pub fn group(id: &str, label: &str, children: Vec<GroupChild>) -> GroupChild {
        GroupChild::Group(TaskGroup {
            id: id.to_string(),
            label: label.to_string(),
            children,
        })
    }

    /// extract -> transform -> load, with transform living in a group that
    /// also runs a validation step off to the side.
    pub fn etl_dag() -> WorkflowDefinition {
        WorkflowDefinition {
            dag_id: "etl".to_string(),
            orientation: "LR".to_string(),
            tasks: vec![
                task("extract", &["transform", "validate"]),
                task("transform", &["load"]),
                task("validate", &["load"]),
                task("load", &[]),
            ],
            task_group: TaskGroup {
                id: String::new(),
                label: String::new(),
                children: vec![
                    leaf("extract"),
                    group(
                        "processing",
                        "Processing",
                        vec![leaf("transform"), leaf("validate")],
                    ),
                    leaf("load"),
                ],
            },
            run_ordering: vec!["logical_date".to_string()],
        }
    }
}
