//! Application state shared by the HTTP handlers

use std::sync::Arc;

use crate::services::catalog::Catalog;
use crate::services::query_service::{QueryConfig, QueryService};

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, config: QueryConfig) -> Self {
        Self {
            query: Arc::new(QueryService::new(catalog, config)),
        }
    }
}

