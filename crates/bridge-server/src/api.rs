//! Bridge control API
//!
//! REST surface over the controller: start/stop a bridge, inspect session
//! state, aggregate statistics, and the call-event webhook the external
//! call monitor posts into.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use callbridge_bridge_core::{
    BridgeController, BridgeError, CallEvent, CallId, DeviceProvider, RegistryTotals,
    SessionState, SessionStats,
};
use callbridge_link_core::ConnectionParams;

/// Shared state behind the router
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<BridgeController>,
    pub provider: Arc<dyn DeviceProvider>,
    pub params: ConnectionParams,
    pub events_tx: mpsc::Sender<CallEvent>,
    pub heartbeat: std::time::Duration,
}

impl AppState {
    /// Connection parameters with per-request overrides applied
    fn params_with(&self, overrides: &StartBridgeRequest) -> ConnectionParams {
        let mut params = self.params.clone();
        if let Some(endpoint) = &overrides.endpoint {
            params.endpoint = endpoint.clone();
        }
        if let Some(api_key) = &overrides.api_key {
            params.api_key = Some(api_key.clone());
        }
        if let Some(config_id) = &overrides.config_id {
            params.config_id = Some(config_id.clone());
        }
        params
    }
}

/// Build the control router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bridges", get(list_bridges))
        .route(
            "/bridges/:call_id",
            post(start_bridge).delete(stop_bridge).get(bridge_state),
        )
        .route("/events", post(post_event))
        .route("/ws/audio/:call_id", get(crate::ws::audio_socket))
        .with_state(state)
}

/// Optional per-bridge overrides of the default connection parameters
#[derive(Debug, Default, Deserialize)]
pub struct StartBridgeRequest {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub config_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct BridgeStateResponse {
    call_id: CallId,
    state: SessionState,
}

#[derive(Debug, Serialize)]
struct BridgeListResponse {
    totals: RegistryTotals,
    sessions: Vec<SessionStats>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// `POST /bridges/{call_id}` — start a bridge on host devices
async fn start_bridge(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    body: Option<Json<StartBridgeRequest>>,
) -> Response {
    let call_id = CallId::new(call_id);
    let overrides = body.map(|Json(req)| req).unwrap_or_default();
    let params = state.params_with(&overrides);

    let (input, output) = match state.provider.acquire(&call_id).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%call_id, error = %e, "device acquisition failed");
            return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
        }
    };

    match state
        .controller
        .start_bridge_with(call_id.clone(), params, input, output)
    {
        Ok(session) => (
            StatusCode::ACCEPTED,
            Json(BridgeStateResponse {
                call_id,
                state: session.state(),
            }),
        )
            .into_response(),
        Err(BridgeError::DuplicateSession { .. }) => {
            error_response(StatusCode::CONFLICT, "bridge already exists for this call")
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `DELETE /bridges/{call_id}` — begin draining a bridge
async fn stop_bridge(State(state): State<AppState>, Path(call_id): Path<String>) -> Response {
    let call_id = CallId::new(call_id);
    if state.controller.stop_bridge(&call_id) {
        StatusCode::ACCEPTED.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "no live bridge for this call")
    }
}

/// `GET /bridges/{call_id}` — lifecycle state, live or retained
async fn bridge_state(State(state): State<AppState>, Path(call_id): Path<String>) -> Response {
    let call_id = CallId::new(call_id);
    match state.controller.session_state(&call_id) {
        Some(session_state) => Json(BridgeStateResponse {
            call_id,
            state: session_state,
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no bridge for this call"),
    }
}

/// `GET /bridges` — statistics for every live bridge
async fn list_bridges(State(state): State<AppState>) -> Json<BridgeListResponse> {
    Json(BridgeListResponse {
        totals: state.controller.registry().totals(),
        sessions: state.controller.stats(),
    })
}

/// `POST /events` — call-lifecycle webhook from the external call monitor
///
/// Enqueues for the dispatcher; a full queue answers 429 so the monitor
/// backs off instead of wedging the server.
async fn post_event(State(state): State<AppState>, Json(event): Json<CallEvent>) -> Response {
    match state.events_tx.try_send(event) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => {
            error_response(StatusCode::TOO_MANY_REQUESTS, "event queue full")
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "dispatcher not running")
        }
    }
}
