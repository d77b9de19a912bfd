use std::collections::{HashMap, HashSet, VecDeque};

use regex::Regex;

use super::WorkflowDefinition;

/// How a root filter selects its starting tasks: an exact task id, or a
/// regex applied to every task id. A root string that names an existing
/// task is always taken literally; anything else is compiled as a pattern,
/// degrading back to literal matching when it is not valid regex.
pub enum TaskMatcher {
    Literal(String),
    Pattern(Regex),
}

impl TaskMatcher {
    pub fn new(root: &str, dag: &WorkflowDefinition) -> Self {
        if dag.has_task(root) {
            return TaskMatcher::Literal(root.to_string());
        }
        match Regex::new(root) {
            Ok(re) => TaskMatcher::Pattern(re),
            Err(_) => TaskMatcher::Literal(root.to_string()),
        }
    }

    pub fn matches(&self, task_id: &str) -> bool {
        match self {
            TaskMatcher::Literal(id) => id == task_id,
            TaskMatcher::Pattern(re) => re.is_match(task_id),
        }
    }
}

/// Root-anchored restriction of a workflow: the matched tasks plus,
/// optionally, everything upstream and/or downstream of them.
#[derive(Debug, Clone)]
pub struct SubsetFilter {
    pub root: String,
    pub include_upstream: bool,
    pub include_downstream: bool,
}

/// Restricts `dag` to the connected subset the filter selects.
///
/// A root that matches no task applies no restriction at all; the full
/// dag is returned unchanged. That fallback is part of the endpoint
/// contract, not an accident.
pub fn partial_subset(dag: &WorkflowDefinition, filter: &SubsetFilter) -> WorkflowDefinition {
    let matcher = TaskMatcher::new(&filter.root, dag);
    let roots: Vec<&str> = dag
        .task_ids()
        .into_iter()
        .filter(|id| matcher.matches(id))
        .collect();

    if roots.is_empty() {
        return dag.clone();
    }

    let mut keep: HashSet<String> = roots.iter().map(|s| s.to_string()).collect();

    if filter.include_downstream {
        let downstream: HashMap<&str, Vec<&str>> = dag
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.downstream.iter().map(|s| s.as_str()).collect()))
            .collect();
        walk(&roots, &downstream, &mut keep);
    }
    if filter.include_upstream {
        let upstream = dag.upstream_map();
        walk(&roots, &upstream, &mut keep);
    }

    dag.restrict(&keep)
}

fn walk(roots: &[&str], adjacency: &HashMap<&str, Vec<&str>>, keep: &mut HashSet<String>) {
    let mut queue: VecDeque<&str> = roots.iter().copied().collect();
    let mut visited: HashSet<&str> = roots.iter().copied().collect();

    while let Some(current) = queue.pop_front() {
        if let Some(next) = adjacency.get(current) {
            for &id in next {
                if visited.insert(id) {
                    keep.insert(id.to_string());
                    queue.push_back(id);
                }
            }
        }
    }
}
