use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::domain::{QueryError, ValidationError};
use crate::infrastructure::AppState;
use crate::services::query_service::SearchRequest;

fn validation_response(e: &ValidationError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": e.to_string(), "field": e.field })),
    )
        .into_response()
}

fn error_response(e: QueryError) -> Response {
    match e {
        QueryError::Validation(e) => validation_response(&e),
        QueryError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Listing '{}' not found", id) })),
        )
            .into_response(),
    }
}

/// Body bytes as JSON; an empty body means no filters.
fn parse_body(body: &[u8]) -> Result<Value, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ValidationError::new("request", format!("invalid JSON: {}", e)))
}

pub async fn search_listings(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let request = match parse_body(&body).and_then(|payload| SearchRequest::from_json(&payload)) {
        Ok(request) => request,
        Err(e) => return validation_response(&e),
    };

    match state.query.search(&request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.query.get(&id) {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn catalog_summary(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.query.summary())).into_response()
}
