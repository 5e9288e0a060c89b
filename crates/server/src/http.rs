//! REST endpoints
//!
//! Triggering and inspecting test calls, scenario listing, health, and
//! the Prometheus scrape endpoint.

use std::collections::HashMap;

use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use callprobe_config::{all_scenarios, get_scenario, scenario_ids};

use crate::state::AppState;
use crate::ws::media_stream_handler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Call control
        .route("/calls", post(trigger_call))
        .route("/calls/:call_sid", get(call_status))
        .route("/call-status", post(call_status_webhook))
        // Catalog
        .route("/scenarios", get(list_scenarios))
        // Operations
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        // Twilio Media Streams
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TriggerCallRequest {
    scenario_id: String,
}

#[derive(Debug, Serialize)]
struct TriggerCallResponse {
    call_sid: String,
    scenario_id: String,
    status: &'static str,
}

/// Place a test call for the requested scenario
async fn trigger_call(
    State(state): State<AppState>,
    Json(request): Json<TriggerCallRequest>,
) -> Result<Json<TriggerCallResponse>, (StatusCode, String)> {
    if get_scenario(&request.scenario_id).is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Unknown scenario: {}. Available: {}",
                request.scenario_id,
                scenario_ids().join(", ")
            ),
        ));
    }

    let call_sid = state
        .twilio
        .make_call(
            &state.public_url,
            &request.scenario_id,
            &state.settings.twilio.target_number,
            state.settings.twilio.max_call_duration_secs,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "failed to place call");
            (StatusCode::BAD_GATEWAY, format!("Twilio error: {e}"))
        })?;

    crate::metrics::record_call_placed(&request.scenario_id);

    Ok(Json(TriggerCallResponse {
        call_sid,
        scenario_id: request.scenario_id,
        status: "initiated",
    }))
}

/// Check the status of a call
async fn call_status(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let status = state
        .twilio
        .call_status(&call_sid)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, format!("Call not found: {e}")))?;

    Ok(Json(serde_json::json!({
        "call_sid": call_sid,
        "status": status,
    })))
}

/// Twilio status callback webhook
async fn call_status_webhook(
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let unknown = || "unknown".to_string();
    info!(
        call_sid = %form.get("CallSid").cloned().unwrap_or_else(unknown),
        status = %form.get("CallStatus").cloned().unwrap_or_else(unknown),
        duration_secs = %form.get("CallDuration").cloned().unwrap_or_default(),
        "call status callback"
    );
    Json(serde_json::json!({ "status": "ok" }))
}

/// List the available test scenarios
async fn list_scenarios() -> Json<serde_json::Value> {
    let summaries: Vec<serde_json::Value> = all_scenarios()
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id,
                "name": s.name,
                "description": s.description,
            })
        })
        .collect();
    Json(serde_json::json!(summaries))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "public_url": *state.public_url,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_creation() {
        let metrics = crate::metrics::test_recorder();
        let state = AppState::new(
            callprobe_config::Settings::default(),
            "https://example.ngrok.app".into(),
            metrics,
        )
        .unwrap();
        let _ = create_router(state);
    }
}
