//! REST API handlers

use axon_bridge::CommandError;
use axon_core::{StateValue, TreePath};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Status code a command failure is reported with
fn status_for(error: &CommandError) -> StatusCode {
    match error {
        CommandError::NotFound(_) => StatusCode::NOT_FOUND,
        CommandError::CapabilityAbsent { .. } => StatusCode::METHOD_NOT_ALLOWED,
        CommandError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommandError::Busy | CommandError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        CommandError::Driver(_) => StatusCode::BAD_GATEWAY,
    }
}

fn command_error(error: CommandError) -> Response {
    debug!(error = %error, "Command rejected");
    (status_for(&error), Json(ApiError::new(error.to_string()))).into_response()
}

/// Reply to an accepted write
#[derive(Serialize)]
struct Accepted {
    request_id: Uuid,
}

fn accepted(request_id: Uuid) -> Response {
    (StatusCode::ACCEPTED, Json(Accepted { request_id })).into_response()
}

/// Get the whole device tree
pub async fn get_tree(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.tree().await {
        Ok(tree) => Json(tree).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(e.to_string())),
        )
            .into_response(),
    }
}

/// List registered commands
pub async fn list_commands(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

/// Get the running configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

#[derive(Serialize)]
struct ValueResponse {
    path: TreePath,
    value: StateValue,
}

/// Read a value from the driver
pub async fn get_value(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let path = TreePath::parse(&path);
    let marshaller = state.marshaller.clone();
    let lookup = path.clone();
    let result = tokio::task::spawn_blocking(move || marshaller.get(&lookup)).await;

    match result {
        Ok(Ok(value)) => Json(ValueResponse { path, value }).into_response(),
        Ok(Err(e)) => command_error(e),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(format!("Read failed: {}", e))),
        )
            .into_response(),
    }
}

/// Write request body
#[derive(Deserialize)]
pub struct SetValueRequest {
    value: StateValue,
}

/// Queue a value write
pub async fn set_value(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(req): Json<SetValueRequest>,
) -> impl IntoResponse {
    let path = TreePath::parse(&path);
    info!(path = %path, value = %req.value, "Value write requested");
    match state.marshaller.set(&path, req.value) {
        Ok(id) => accepted(id),
        Err(e) => command_error(e),
    }
}

/// Level request body
#[derive(Deserialize)]
pub struct SetLevelRequest {
    level: i64,
}

fn node_path(network: &str, node: &str) -> TreePath {
    TreePath::root().child(network).child(node)
}

/// Queue a node level change
pub async fn set_level(
    State(state): State<Arc<AppState>>,
    Path((network, node)): Path<(String, String)>,
    Json(req): Json<SetLevelRequest>,
) -> impl IntoResponse {
    let path = node_path(&network, &node);
    info!(node = %path, level = req.level, "Node level requested");
    match state.marshaller.set_level(&path, req.level) {
        Ok(id) => accepted(id),
        Err(e) => command_error(e),
    }
}

/// Configuration parameter request body
#[derive(Deserialize)]
pub struct SetConfigRequest {
    param: i64,
    value: i64,
}

/// Queue a node configuration parameter write
pub async fn set_config_param(
    State(state): State<Arc<AppState>>,
    Path((network, node)): Path<(String, String)>,
    Json(req): Json<SetConfigRequest>,
) -> impl IntoResponse {
    let path = node_path(&network, &node);
    info!(node = %path, param = req.param, value = req.value, "Configuration parameter requested");
    match state.marshaller.set_config_param(&path, req.param, req.value) {
        Ok(id) => accepted(id),
        Err(e) => command_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_core::{DriverError, ValidationError};

    #[test]
    fn test_error_status_codes() {
        let path = TreePath::parse("network1/node5");
        assert_eq!(status_for(&CommandError::NotFound(path.clone())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&CommandError::CapabilityAbsent {
                path,
                capability: "get"
            }),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            status_for(&CommandError::Validation(ValidationError::NotFinite)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&CommandError::Busy), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&CommandError::Driver(DriverError::Timeout)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_request_bodies() {
        let req: SetValueRequest = serde_json::from_str(r#"{"value": "Heat"}"#).unwrap();
        assert_eq!(req.value, StateValue::Text("Heat".to_string()));
        let req: SetConfigRequest = serde_json::from_str(r#"{"param": 3, "value": -20}"#).unwrap();
        assert_eq!((req.param, req.value), (3, -20));
    }
}
