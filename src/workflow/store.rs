use anyhow::Result;
use async_trait::async_trait;

use super::WorkflowDefinition;
use super::runs::{RunRecord, RunSelection};

/// Read-only access to the orchestration platform's workflow metadata.
/// Backed by the platform's REST API in production and by an on-disk
/// snapshot (or an in-memory fake in tests) otherwise.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Resolves a workflow definition by id. `Ok(None)` means the dag is
    /// unknown, which handlers surface as 404.
    async fn get_definition(&self, dag_id: &str) -> Result<Option<WorkflowDefinition>>;

    /// Returns the dag's runs already filtered, sorted and bounded per
    /// the selection. An unknown dag yields an empty list.
    async fn query_runs(&self, dag_id: &str, selection: &RunSelection) -> Result<Vec<RunRecord>>;
}
