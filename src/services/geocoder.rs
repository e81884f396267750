//! Address resolution with a per-run cache
//!
//! Every distinct normalized address is looked up at most once, even when
//! several build workers ask for it at the same time: the cache stores a
//! once-cell per key and concurrent callers await the same initialization.
//! Failures are cached too, as `GeoResult::Unresolved`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use unicode_normalization::UnicodeNormalization;

use crate::domain::{GeoResult, Geocode, GeocodeFailure, GeocodeLookup, LookupMatch};

pub struct Geocoder<L> {
    lookup: L,
    min_confidence: f64,
    cache: DashMap<String, Arc<OnceCell<GeoResult>>>,
}

impl<L: GeocodeLookup> Geocoder<L> {
    pub fn new(lookup: L, min_confidence: f64) -> Self {
        Self {
            lookup,
            min_confidence,
            cache: DashMap::new(),
        }
    }

    /// Number of distinct normalized addresses seen so far.
    pub fn cached_addresses(&self) -> usize {
        self.cache.len()
    }

    async fn try_resolve(&self, address: &str) -> Result<LookupMatch, GeocodeFailure> {
        let found = self.lookup.lookup(address).await?;
        if found.confidence < self.min_confidence {
            return Err(GeocodeFailure::LowConfidence {
                confidence: found.confidence,
                threshold: self.min_confidence,
            });
        }
        Ok(found)
    }
}

#[async_trait]
impl<L: GeocodeLookup> Geocode for Geocoder<L> {
    async fn resolve(&self, address: &str) -> GeoResult {
        let key = normalize_address(address);
        if key.is_empty() {
            return GeoResult::Unresolved;
        }

        let cell = self.cache.entry(key).or_default().clone();
        if let Some(cached) = cell.get() {
            tracing::debug!("Geocode cache hit for '{}'", address);
            return cached.clone();
        }

        cell.get_or_init(|| async {
            match self.try_resolve(address).await {
                Ok(found) => {
                    tracing::debug!(
                        "Geocoded '{}' -> ({}, {})",
                        address,
                        found.latitude,
                        found.longitude
                    );
                    GeoResult::Resolved {
                        latitude: found.latitude,
                        longitude: found.longitude,
                        confidence: found.confidence,
                        resolved_address: found.display_name,
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to geocode '{}': {}", address, e);
                    GeoResult::Unresolved
                }
            }
        })
        .await
        .clone()
    }
}

/// Cache key for an address: NFKC, trimmed, case-folded, single-spaced.
pub fn normalize_address(address: &str) -> String {
    address
        .nfkc()
        .collect::<String>()
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
