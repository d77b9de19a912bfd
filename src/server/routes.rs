use axum::extract::{RawQuery, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hyper::StatusCode;
use serde_json::{Value, json};

use super::AppState;
use super::middleware;
use super::params::QueryParams;
use crate::error::ApiError;
use crate::workflow::runs::{RunSelection, RunState, RunType, encode_run};
use crate::workflow::subset::{SubsetFilter, partial_subset};
use crate::workflow::{WorkflowDefinition, graph, grid};

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let health_routes = Router::new().route(
        "/",
        get(|| async {
            Json(json!({
                "status": "ok",
            }))
        }),
    );

    Router::new()
        .nest("/health", health_routes)
        .route("/object/graph_data", get(graph_data))
        .route("/object/grid_data", get(grid_data))
        .fallback(not_found)
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(config, middleware::apply_cors))
        .layer(axum::middleware::from_fn(
            middleware::enrich_current_span_middleware,
        ))
}

async fn not_found(req: axum::extract::Request) -> impl IntoResponse {
    tracing::warn!("unhandled path: {}", req.uri());
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Compact body to bound transfer size; charset pinned for the UI.
fn json_response(value: &Value) -> Response {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    (
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Applies the root subset filter when one is present. A root that
/// matches nothing leaves the dag unrestricted (endpoint contract).
fn apply_root_filter(dag: &WorkflowDefinition, params: &QueryParams) -> WorkflowDefinition {
    match params.get("root").filter(|r| !r.is_empty()) {
        Some(root) => partial_subset(
            dag,
            &SubsetFilter {
                root: root.to_string(),
                include_upstream: params.get_bool("filter_upstream"),
                include_downstream: params.get_bool("filter_downstream"),
            },
        ),
        None => dag.clone(),
    }
}

/// GET /object/graph_data — dependency topology for the graph view.
#[tracing::instrument(skip_all, fields(http.uri, http.host, http.query))]
async fn graph_data(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let params = QueryParams::parse(query.as_deref());
    let dag_id = params.get("dag_id").unwrap_or("").to_string();

    let dag = state
        .store
        .get_definition(&dag_id)
        .await?
        .ok_or_else(|| ApiError::DagNotFound(dag_id.clone()))?;
    let dag = apply_root_filter(&dag, &params);

    Ok(json_response(&graph::graph_payload(&dag)))
}

/// GET /object/grid_data — run history by task-group status matrix.
#[tracing::instrument(skip_all, fields(http.uri, http.host, http.query))]
async fn grid_data(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let params = QueryParams::parse(query.as_deref());
    let dag_id = params.get("dag_id").unwrap_or("").to_string();

    let dag = state
        .store
        .get_definition(&dag_id)
        .await?
        .ok_or_else(|| ApiError::DagNotFound(dag_id.clone()))?;
    let dag = apply_root_filter(&dag, &params);

    // An unparseable base_date falls back to latest-run-or-now inside the
    // store; filter values that parse to nothing mean "unrestricted".
    let base_date = params
        .get("base_date")
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let run_types: Vec<RunType> = params
        .get_all("run_type")
        .iter()
        .filter_map(|v| RunType::parse(v))
        .collect();
    let run_states: Vec<RunState> = params
        .get_all("run_state")
        .iter()
        .filter_map(|v| RunState::parse(v))
        .collect();
    let limit = params
        .get("num_runs")
        .and_then(|v| v.parse().ok())
        .unwrap_or(state.config.default_run_display);

    let selection = RunSelection { base_date, run_types, run_states, limit };
    let runs = state.store.query_runs(&dag_id, &selection).await?;

    let mut encoded_runs = Vec::with_capacity(runs.len());
    let mut encoding_errors = Vec::new();
    for run in &runs {
        match encode_run(run) {
            Ok(value) => encoded_runs.push(value),
            Err(error) => {
                tracing::warn!(dag_id = %dag_id, run_id = %run.run_id, %error, "dropping run from grid");
                encoding_errors.push(error);
            }
        }
    }

    Ok(json_response(&json!({
        "groups": grid::grid_groups(&dag, &runs),
        "dag_runs": encoded_runs,
        "ordering": dag.run_ordering,
        "errors": encoding_errors,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::workflow::runs::testutil::run;
    use crate::workflow::runs::{RunRecord, apply_selection};
    use crate::workflow::store::WorkflowStore;
    use crate::workflow::testutil::etl_dag;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FakeStore {
        dag: WorkflowDefinition,
        runs: Vec<RunRecord>,
    }

    #[async_trait]
    impl WorkflowStore for FakeStore {
        async fn get_definition(&self, dag_id: &str) -> Result<Option<WorkflowDefinition>> {
            Ok((dag_id == self.dag.dag_id).then(|| self.dag.clone()))
        }

        async fn query_runs(
            &self,
            dag_id: &str,
            selection: &RunSelection,
        ) -> Result<Vec<RunRecord>> {
            if dag_id != self.dag.dag_id {
                return Ok(Vec::new());
            }
            Ok(apply_selection(self.runs.clone(), selection, &self.dag.run_ordering))
        }
    }

    fn test_app(runs: Vec<RunRecord>) -> Router {
        let state = AppState {
            store: Arc::new(FakeStore { dag: etl_dag(), runs }),
            config: Arc::new(Config::from_raw_values(
                None, None, None, None, None, None, None, None,
            )),
        };
        build_router(state)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get_raw(app: &Router, uri: &str) -> axum::body::Bytes {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        to_bytes(resp.into_body(), usize::MAX).await.unwrap()
    }

    fn sample_runs() -> Vec<RunRecord> {
        vec![
            run("r1", 1, RunType::Scheduled, RunState::Success),
            run("r2", 2, RunType::Manual, RunState::Failed),
            run("r3", 3, RunType::Scheduled, RunState::Running),
        ]
    }

    #[tokio::test]
    async fn test_graph_data_unknown_dag_is_404() {
        let app = test_app(vec![]);
        let (status, body) = get_json(&app, "/object/graph_data?dag_id=does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "can't find dag does-not-exist");
    }

    #[tokio::test]
    async fn test_grid_data_unknown_dag_is_404() {
        let app = test_app(vec![]);
        let (status, body) = get_json(&app, "/object/grid_data?dag_id=does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "can't find dag does-not-exist");
    }

    #[tokio::test]
    async fn test_graph_data_full_dag() {
        let app = test_app(vec![]);
        let (status, body) = get_json(&app, "/object/graph_data?dag_id=etl").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["arrange"], "LR");
        assert_eq!(body["edges"].as_array().unwrap().len(), 4);
        assert_eq!(body["nodes"]["children"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_graph_data_root_filter() {
        let app = test_app(vec![]);
        let (status, body) = get_json(
            &app,
            "/object/graph_data?dag_id=etl&root=transform&filter_downstream=true",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rendered = body.to_string();
        assert!(rendered.contains("transform"));
        assert!(rendered.contains("load"));
        assert!(!rendered.contains("extract"));
    }

    #[tokio::test]
    async fn test_non_matching_root_equals_no_filter() {
        let app = test_app(sample_runs());
        let (_, unfiltered) = get_json(&app, "/object/graph_data?dag_id=etl").await;
        let (_, filtered) = get_json(
            &app,
            "/object/graph_data?dag_id=etl&root=nothing-matches&filter_upstream=true",
        )
        .await;
        assert_eq!(unfiltered, filtered);
    }

    #[tokio::test]
    async fn test_grid_data_shape_and_ordering() {
        let app = test_app(sample_runs());
        let (status, body) = get_json(&app, "/object/grid_data?dag_id=etl").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ordering"], json!(["logical_date"]));
        assert_eq!(body["errors"], json!([]));
        let ids: Vec<&str> = body["dag_runs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["run_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["r3", "r2", "r1"]);
        assert_eq!(body["groups"]["children"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_grid_data_num_runs_limit() {
        let app = test_app(sample_runs());
        let (_, body) = get_json(&app, "/object/grid_data?dag_id=etl&num_runs=1").await;
        assert_eq!(body["dag_runs"].as_array().unwrap().len(), 1);
        assert_eq!(body["dag_runs"][0]["run_id"], "r3");
    }

    #[tokio::test]
    async fn test_grid_data_run_filters() {
        let app = test_app(sample_runs());
        let (_, body) = get_json(
            &app,
            "/object/grid_data?dag_id=etl&run_type=scheduled&run_state=success",
        )
        .await;
        let ids: Vec<&str> = body["dag_runs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["run_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["r1"]);
    }

    #[tokio::test]
    async fn test_grid_data_malformed_base_date_falls_back() {
        let app = test_app(sample_runs());
        let (status, body) =
            get_json(&app, "/object/grid_data?dag_id=etl&base_date=yesterday-ish").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dag_runs"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_grid_data_partial_encoding_failure() {
        let mut runs = sample_runs();
        runs[1].run_id = "broken run id!".to_string();
        let app = test_app(runs);
        let (status, body) = get_json(&app, "/object/grid_data?dag_id=etl").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dag_runs"].as_array().unwrap().len(), 2);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
        assert!(body["errors"][0].as_str().unwrap().contains("broken run id!"));
    }

    #[tokio::test]
    async fn test_identical_requests_are_byte_identical() {
        let app = test_app(sample_runs());
        let uri = "/object/grid_data?dag_id=etl&root=processing.*&filter_upstream=true";
        // Raw bytes, not re-serialized values: same request, same response.
        let a = get_raw(&app, uri).await;
        let b = get_raw(&app, uri).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_responses_carry_cors_and_content_type() {
        let app = test_app(vec![]);
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/object/graph_data?dag_id=etl")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(
            resp.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
        assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(vec![]);
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
