pub mod middleware;
pub mod params;
pub mod routes;

use std::sync::Arc;

use axum::Router;

use crate::config::Config;
use crate::workflow::store::WorkflowStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorkflowStore>,
    pub config: Arc<Config>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
