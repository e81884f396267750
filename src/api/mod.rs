pub mod health;
pub mod listings;
#[cfg(feature = "mcp")]
pub mod mcp;

use axum::{
    routing::{get, post},
    Router,
};

use crate::infrastructure::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Listings
        .route("/listings/search", post(listings::search_listings))
        .route("/listings/:id", get(listings::get_listing))
        .route("/summary", get(listings::catalog_summary))
        .with_state(state)
}
