//! Geocoding capability traits
//!
//! `GeocodeLookup` is the raw external source; `Geocode` is the resolver the
//! catalog build talks to. Implementations live in the services and modules
//! layers; tests substitute fakes.

use async_trait::async_trait;
use std::sync::Arc;

use super::{GeoResult, LookupError};

/// A match reported by the external source.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupMatch {
    pub latitude: f64,
    pub longitude: f64,
    /// Match quality in `[0, 1]` as reported by the source.
    pub confidence: f64,
    pub display_name: String,
}

/// External address-resolution source.
#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<LookupMatch, LookupError>;
}

#[async_trait]
impl<L: GeocodeLookup + ?Sized> GeocodeLookup for Arc<L> {
    async fn lookup(&self, address: &str) -> Result<LookupMatch, LookupError> {
        (**self).lookup(address).await
    }
}

/// Resolves an address, never failing: problems become `GeoResult::Unresolved`.
#[async_trait]
pub trait Geocode: Send + Sync {
    async fn resolve(&self, address: &str) -> GeoResult;

    /// Try each query in order and keep the first resolved one.
    async fn resolve_first(&self, queries: &[String]) -> GeoResult {
        for (attempt, query) in queries.iter().enumerate() {
            let result = self.resolve(query).await;
            if result.is_resolved() {
                if attempt > 0 {
                    tracing::debug!("Resolved '{}' after {} fallback(s)", query, attempt);
                }
                return result;
            }
        }
        GeoResult::Unresolved
    }
}
