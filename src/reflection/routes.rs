//! REST endpoints for the reflection flow.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::FlowError;

use super::orchestrator::{TurnOrchestrator, TurnResult};
use super::phase::PhaseId;
use super::state::FlowState;

/// Idle session locks are pruned once the map grows past this.
const SESSION_LOCK_PRUNE_AT: usize = 1024;

/// Per-session turn locks. Two turns for the same session never interleave;
/// different sessions run concurrently.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() >= SESSION_LOCK_PRUNE_AT {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(map.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Shared state for reflection routes.
#[derive(Clone)]
pub struct ReflectionRouteState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: SessionLocks,
}

impl ReflectionRouteState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>) -> Self {
        Self {
            orchestrator,
            sessions: SessionLocks::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub user_input: String,
    pub current_phase: PhaseId,
    /// Absent for the first turn of a session.
    #[serde(default)]
    pub flow_state: Option<FlowState>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    #[serde(flatten)]
    pub result: TurnResult,
    pub session_id: String,
}

fn flow_error(err: &FlowError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

/// POST /api/reflection/turn
///
/// Runs one turn. The work happens in a spawned task so a client that
/// disconnects mid-request doesn't cancel a retry in flight.
async fn post_turn(
    State(state): State<ReflectionRouteState>,
    Json(request): Json<TurnRequest>,
) -> Response {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let flow_state = request.flow_state.unwrap_or_default();
    if flow_state.current_phase != request.current_phase {
        return flow_error(&FlowError::PhaseMismatch {
            requested: request.current_phase.get(),
            actual: flow_state.current_phase.get(),
        });
    }

    let orchestrator = Arc::clone(&state.orchestrator);
    let sessions = state.sessions.clone();
    let task_session = session_id.clone();
    let user_input = request.user_input;
    let handle = tokio::spawn(async move {
        let _turn = sessions.acquire(&task_session).await;
        orchestrator.process_turn(&user_input, &flow_state).await
    });

    match handle.await {
        Ok(Ok(result)) => {
            info!(
                session = %session_id,
                phase = %result.current_phase,
                advanced = result.phase_advanced,
                "Reflection turn served"
            );
            Json(TurnResponse { result, session_id }).into_response()
        }
        Ok(Err(e)) => flow_error(&e),
        Err(e) => {
            error!(session = %session_id, error = %e, "Reflection turn task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "turn processing failed" })),
            )
                .into_response()
        }
    }
}

/// GET /api/reflection/phases
async fn get_phases(State(state): State<ReflectionRouteState>) -> impl IntoResponse {
    Json(state.orchestrator.catalog().clone())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the reflection REST routes.
pub fn reflection_routes(state: ReflectionRouteState) -> Router {
    Router::new()
        .route("/api/reflection/turn", post(post_turn))
        .route("/api/reflection/phases", get(get_phases))
        .route("/health", get(health))
        .with_state(state)
}
