use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cortex_common::records::decision::DecisionType;
use cortex_common::wire::{CinderVolumeRequest, HostsResponse, ManilaShareRequest, NovaExternalRequest, PodExtenderRequest, PodExtenderResponse};
use cortex_controllers::{DecisionController, DecisionOutcome};
use cortex_knowledge::metrics::gather_text;
use serde::Serialize;

use crate::mqtt::MqttPublisher;

/// How long the HTTP handler waits for the Decision reconciler before
/// giving up and telling the caller to fall back to its own ordering
/// (spec §6 "A timeout in the client is indistinguishable from a
/// reject").
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub decisions: Arc<DecisionController>,
    pub mqtt: Option<Arc<MqttPublisher>>,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(decisions: Arc<DecisionController>, mqtt: Option<Arc<MqttPublisher>>) -> Self {
        Self {
            decisions,
            mqtt,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scheduler/nova/external", post(nova_external))
        .route("/scheduler/pod/extender", post(pod_extender))
        .route("/scheduler/manila/share", post(manila_share))
        .route("/scheduler/cinder/volume", post(cinder_volume))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn server_error(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

/// Registers the pending waiter, creates the Decision, and blocks under
/// the configured deadline (spec §4.4 "Ingress path"). On timeout the
/// entry is cancelled so a late-arriving reconcile result is silently
/// dropped rather than delivered to a caller that already gave up.
async fn dispatch_and_wait(state: &AppState, decision_type: DecisionType, pipeline_ref: String, raw_request: serde_json::Value) -> Result<DecisionOutcome, ApiError> {
    let (name, rx) = state
        .decisions
        .dispatch(decision_type, pipeline_ref, raw_request)
        .await
        .map_err(|e| server_error(format!("creating decision: {e}")))?;

    match tokio::time::timeout(state.timeout, rx).await {
        Ok(Ok(outcome)) => {
            if let Some(mqtt) = &state.mqtt {
                mqtt.publish_finished(decision_type, &name).await;
            }
            match outcome.error {
                Some(e) => Err(server_error(format!("pipeline run failed: {e}"))),
                None => Ok(outcome),
            }
        }
        Ok(Err(_)) => Err(server_error("decision reconciler dropped without signaling")),
        Err(_) => {
            state.decisions.pending_cancel(&name).await;
            Err(server_error("timed out waiting for scheduling decision"))
        }
    }
}

async fn nova_external(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Result<Json<HostsResponse>, ApiError> {
    let request: NovaExternalRequest = serde_json::from_value(body.clone()).map_err(|e| bad_request(format!("malformed nova external request: {e}")))?;
    let outcome = dispatch_and_wait(&state, DecisionType::NovaServer, request.pipeline, body).await?;
    Ok(Json(HostsResponse { hosts: outcome.ordered_hosts }))
}

async fn pod_extender(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Result<Json<PodExtenderResponse>, ApiError> {
    let request: PodExtenderRequest = serde_json::from_value(body.clone()).map_err(|e| bad_request(format!("malformed pod extender request: {e}")))?;
    let outcome = dispatch_and_wait(&state, DecisionType::Pod, request.pipeline, body).await?;
    let priorities = outcome.ordered_hosts.iter().enumerate().map(|(i, node)| (node.clone(), (outcome.ordered_hosts.len() - i) as f64)).collect();
    Ok(Json(PodExtenderResponse {
        node_names: outcome.ordered_hosts,
        priorities,
    }))
}

async fn manila_share(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Result<Json<HostsResponse>, ApiError> {
    let request: ManilaShareRequest = serde_json::from_value(body.clone()).map_err(|e| bad_request(format!("malformed manila share request: {e}")))?;
    let outcome = dispatch_and_wait(&state, DecisionType::ManilaShare, request.pipeline, body).await?;
    Ok(Json(HostsResponse { hosts: outcome.ordered_hosts }))
}

async fn cinder_volume(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Result<Json<HostsResponse>, ApiError> {
    let request: CinderVolumeRequest = serde_json::from_value(body.clone()).map_err(|e| bad_request(format!("malformed cinder volume request: {e}")))?;
    let outcome = dispatch_and_wait(&state, DecisionType::CinderVolume, request.pipeline, body).await?;
    Ok(Json(HostsResponse { hosts: outcome.ordered_hosts }))
}

#[derive(Serialize)]
struct MetricsError {
    error: String,
}

async fn metrics_handler() -> Response {
    match gather_text() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(MetricsError { error: e })).into_response(),
    }
}
