use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::runs::{RunRecord, RunSelection, apply_selection};
use super::store::WorkflowStore;
use super::{WorkflowDefinition, default_run_ordering};

/// Store backed by the orchestration platform's REST API, authenticated
/// with the same static credential the proxy injects.
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct DagRunsPage {
    dag_runs: Vec<RunRecord>,
}

impl HttpStore {
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url, token }
    }
}

#[async_trait]
impl WorkflowStore for HttpStore {
    async fn get_definition(&self, dag_id: &str) -> Result<Option<WorkflowDefinition>> {
        let url = format!("{}/api/v1/dags/{dag_id}/structure", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to fetch dag structure")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("metadata API error {status} fetching dag {dag_id}: {body}");
        }

        let dag: WorkflowDefinition = resp.json().await.context("failed to parse dag structure")?;
        dag.validate()
            .with_context(|| format!("metadata API returned malformed dag {dag_id}"))?;
        Ok(Some(dag))
    }

    async fn query_runs(&self, dag_id: &str, selection: &RunSelection) -> Result<Vec<RunRecord>> {
        let url = format!("{}/api/v1/dags/{dag_id}/dagRuns", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to fetch dag runs")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("metadata API error {status} fetching runs for {dag_id}: {body}");
        }

        let page: DagRunsPage = resp.json().await.context("failed to parse dag runs")?;

        // Selection is applied locally even though the API could filter,
        // so both store backends honor the same contract.
        let ordering = self
            .get_definition(dag_id)
            .await?
            .map(|d| d.run_ordering)
            .unwrap_or_else(default_run_ordering);
        Ok(apply_selection(page.dag_runs, selection, &ordering))
    }
}
