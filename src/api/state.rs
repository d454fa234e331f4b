//! Device state snapshot endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};

use super::ApiState;
use crate::state::Snapshot;

/// Current snapshot, the same shape the WebSocket pushes
async fn get_state(State(state): State<Arc<ApiState>>) -> Json<Snapshot> {
    Json(state.publisher.snapshot())
}

/// Build state router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .with_state(state)
}
