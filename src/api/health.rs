use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::infrastructure::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "nadlan",
        "version": env!("CARGO_PKG_VERSION"),
        "listings": state.query.catalog().len()
    }))
}
