//! HTTP sync endpoint on the replica side.
//!
//! ## Routes
//!
//! - `POST /api/sync` - apply a [`SyncEnvelope`]. Answers
//!   `200 {"status":"applied"|"discarded"}`, `422` when the data does not fit
//!   its event type, `503` when the replica store is unavailable (so the
//!   producer retries).
//! - `GET /health` - `{"status":"healthy","service":"temperature-sync"}`.
//!
//! ```ignore
//! let applier = Arc::new(ReplicaApplier::new(InMemoryReplicaStore::new()));
//! subscribe::http::serve(applier, "0.0.0.0:8081").await?;
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, warn};

use super::{ApplyError, ReplicaApplier};
use crate::event::SyncEnvelope;
use crate::replica::ReplicaStore;

pub const SYNC_PATH: &str = "/api/sync";
pub const SERVICE_NAME: &str = "temperature-sync";

pub fn router<R: ReplicaStore + 'static>(applier: Arc<ReplicaApplier<R>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(SYNC_PATH, post(sync_handler::<R>))
        .with_state(applier)
}

pub async fn serve<R: ReplicaStore + 'static>(
    applier: Arc<ReplicaApplier<R>>,
    addr: &str,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(applier)).await
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

async fn sync_handler<R: ReplicaStore + 'static>(
    State(applier): State<Arc<ReplicaApplier<R>>>,
    Json(envelope): Json<SyncEnvelope>,
) -> Response {
    match applier.apply_envelope(&envelope) {
        Ok(outcome) => (StatusCode::OK, Json(json!({ "status": outcome.as_str() }))).into_response(),
        Err(err @ ApplyError::Malformed(_)) => {
            warn!(event_type = %envelope.event_type, error = %err, "rejecting malformed envelope");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
        Err(err @ ApplyError::Store(_)) => {
            error!(event_type = %envelope.event_type, error = %err, "replica apply failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
