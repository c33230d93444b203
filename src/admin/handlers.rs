use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

use crate::admin::AdminState;

pub async fn get_version(State(state): State<AdminState>) -> Json<Value> {
    Json(json!({ "version": state.farm.version() }))
}

pub async fn get_farm(State(state): State<AdminState>) -> Response {
    respond(Some(state.farm.to_json()))
}

pub async fn get_virtualhost(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Response {
    respond(state.farm.virtualhost_json(&id))
}

pub async fn get_backend(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    respond(state.farm.backend_json(&id))
}

/// Empty results are not-found: a missing entity, `{}` or `[]` all map to
/// 404 with a generated message body.
fn respond(value: Option<Value>) -> Response {
    match value {
        Some(value) if !is_empty_json(&value) => Json(value).into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status_code": 404, "message": "Not Found" })),
        )
            .into_response(),
    }
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
