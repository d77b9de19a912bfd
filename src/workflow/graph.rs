use std::collections::BTreeSet;

use serde_json::{Value, json};

use super::{GroupChild, TaskGroup, WorkflowDefinition};

/// The `{arrange, nodes, edges}` payload for a graph request. The dag is
/// assumed to already be subset-restricted when a root filter applied.
pub fn graph_payload(dag: &WorkflowDefinition) -> Value {
    json!({
        "arrange": dag.orientation,
        "nodes": node_tree(dag, &dag.task_group),
        "edges": dag_edges(dag),
    })
}

/// Serializes the group tree. Child order is preserved as declared; the
/// UI treats it as rendering order.
fn node_tree(dag: &WorkflowDefinition, group: &TaskGroup) -> Value {
    let children: Vec<Value> = group
        .children
        .iter()
        .map(|child| match child {
            GroupChild::Task { id } => {
                let label = dag.task(id).map(|t| t.display_label()).unwrap_or(id);
                json!({ "id": id, "label": label })
            }
            GroupChild::Group(sub) => node_tree(dag, sub),
        })
        .collect();

    json!({
        "id": group.id,
        "label": group.label,
        "children": children,
    })
}

/// Flat dependency edge list, de-duplicated and sorted so identical
/// requests serialize identically.
pub fn dag_edges(dag: &WorkflowDefinition) -> Vec<Value> {
    let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
    for task in &dag.tasks {
        for down in &task.downstream {
            edges.insert((task.id.as_str(), down.as_str()));
        }
    }
    edges
        .into_iter()
        .map(|(source, target)| json!({ "source_id": source, "target_id": target }))
        .collect()
}
