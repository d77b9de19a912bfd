use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::runs::{RunRecord, RunSelection, apply_selection};
use super::{WorkflowDefinition, default_run_ordering};
use super::store::WorkflowStore;

/// Store backed by an on-disk snapshot of the platform's metadata:
/// `<data_dir>/dags/<dag_id>.json` holds one definition each, and
/// `<data_dir>/runs/<dag_id>.json` holds that dag's run records as a JSON
/// array. Everything is loaded once at startup and read-only afterwards.
pub struct FileStore {
    data_dir: PathBuf,
    dags: RwLock<HashMap<String, WorkflowDefinition>>,
    runs: RwLock<HashMap<String, Vec<RunRecord>>>,
}

impl FileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            dags: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load_all(&self) -> Result<()> {
        let dags_dir = self.data_dir.join("dags");
        let runs_dir = self.data_dir.join("runs");
        for dir in [&dags_dir, &runs_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
        }

        let mut dags = HashMap::new();
        for path in json_files(&dags_dir)? {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read dag file: {}", path.display()))?;
            let dag: WorkflowDefinition = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse dag file: {}", path.display()))?;
            dag.validate()
                .with_context(|| format!("malformed dag file: {}", path.display()))?;
            tracing::info!(dag_id = %dag.dag_id, tasks = dag.tasks.len(), "Loaded dag");
            dags.insert(dag.dag_id.clone(), dag);
        }

        let mut runs: HashMap<String, Vec<RunRecord>> = HashMap::new();
        for path in json_files(&runs_dir)? {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read runs file: {}", path.display()))?;
            let records: Vec<RunRecord> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse runs file: {}", path.display()))?;
            for record in records {
                runs.entry(record.dag_id.clone()).or_default().push(record);
            }
        }

        let dag_count = dags.len();
        let run_count: usize = runs.values().map(Vec::len).sum();
        *self.dags.write().await = dags;
        *self.runs.write().await = runs;
        tracing::info!(dags = dag_count, runs = run_count, "Loaded workflow snapshot");

        Ok(())
    }
}

fn json_files(dir: &PathBuf) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read data directory: {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();
    Ok(paths)
}

#[async_trait]
impl WorkflowStore for FileStore {
    async fn get_definition(&self, dag_id: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.dags.read().await.get(dag_id).cloned())
    }

    async fn query_runs(&self, dag_id: &str, selection: &RunSelection) -> Result<Vec<RunRecord>> {
        let ordering = self
            .dags
            .read()
            .await
            .get(dag_id)
            .map(|d| d.run_ordering.clone())
            .unwrap_or_else(default_run_ordering);
        let runs = self
            .runs
            .read()
            .await
            .get(dag_id)
            .cloned()
            .unwrap_or_default();
        Ok(apply_selection(runs, selection, &ordering))
    }
}
