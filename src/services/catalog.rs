//! Catalog Index
//!
//! The enriched, ordered, read-only listing collection. Built once from parsed
//! records (geocoding through a bounded worker pool), then shared behind an
//! `Arc` and queried without locking.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::domain::{
    BuildError, EnrichedListing, GeoResult, Geocode, ListingRecord, TransactionType,
};
use crate::modules::import::ParseReport;
use crate::services::classifier::Classifier;
use crate::services::geocoder::normalize_address;
use crate::utils::geo::distance_km;

/// Bumped whenever the snapshot layout changes; older cache files are rebuilt.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Data-quality counts recorded while building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Rows read from the source, including skipped ones.
    pub source_rows: usize,
    /// Malformed rows dropped by the parser.
    pub skipped_rows: usize,
    /// Rows dropped because their listing id was already seen.
    pub duplicate_ids: usize,
    pub missing_address: usize,
    /// Listings without coordinates (includes those missing an address).
    pub unresolved: usize,
    pub listings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Distance,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub transaction_type: Option<TransactionType>,
    pub near: Option<NearFilter>,
    pub text: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rooms: Option<f64>,
    /// Normalized neighbourhood names; a listing must be in one of them.
    pub neighbourhoods: Vec<String>,
    /// Features every listing must have (e.g. `parking`).
    pub features: Vec<String>,
    /// Defaults to distance when `near` is set, catalog order otherwise.
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub listing: &'a EnrichedListing,
    /// Set when the filter carried a reference point.
    pub distance_km: Option<f64>,
}

#[derive(Debug)]
pub struct SearchResults<'a> {
    pub hits: Vec<SearchHit<'a>>,
    /// Matches before the limit was applied.
    pub total_matches: usize,
}

/// Serialized form of a catalog, as written to the durable cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub version: u32,
    pub source_fingerprint: Option<String>,
    pub built_at: DateTime<Utc>,
    pub stats: BuildStats,
    pub listings: Vec<EnrichedListing>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    listings: Vec<EnrichedListing>,
    index: HashMap<String, usize>,
    stats: BuildStats,
    source_fingerprint: Option<String>,
    built_at: DateTime<Utc>,
}

impl Catalog {
    /// Enrich `records` into a catalog.
    ///
    /// Later records repeating a listing id are dropped before any geocoding.
    /// Up to `workers` geocoding requests are in flight at once; results keep
    /// the source order. A listing whose full address does not resolve is
    /// retried with its coarser address forms.
    pub async fn build<I>(
        records: I,
        geocoder: &dyn Geocode,
        classifier: &Classifier,
        workers: usize,
    ) -> Result<Catalog, BuildError>
    where
        I: IntoIterator<Item = ListingRecord>,
    {
        let mut stats = BuildStats::default();
        let mut seen = HashSet::new();
        let mut unique = Vec::new();

        for record in records {
            stats.source_rows += 1;
            if !seen.insert(record.listing_id.clone()) {
                stats.duplicate_ids += 1;
                tracing::warn!(
                    "Skipping duplicate listing id '{}' (line {})",
                    record.listing_id,
                    record.source_line
                );
                continue;
            }
            unique.push(record);
        }

        if unique.is_empty() {
            return Err(BuildError::NoValidRows);
        }

        tracing::info!(
            "Geocoding {} listings with {} workers",
            unique.len(),
            workers.max(1)
        );

        let geo_results: Vec<GeoResult> = stream::iter(unique.iter())
            .map(|record| async move { geocoder.resolve_first(&record.geocode_queries()).await })
            .buffered(workers.max(1))
            .collect()
            .await;

        let listings: Vec<EnrichedListing> = unique
            .into_iter()
            .zip(geo_results)
            .map(|(record, geo)| {
                if !record.has_address() {
                    stats.missing_address += 1;
                }
                if !geo.is_resolved() {
                    stats.unresolved += 1;
                }
                let transaction_type = classifier.classify(&record);
                EnrichedListing {
                    record,
                    geo,
                    transaction_type,
                }
            })
            .collect();

        stats.listings = listings.len();

        tracing::info!(
            "Catalog built: {} listings, {} unresolved, {} duplicates dropped",
            stats.listings,
            stats.unresolved,
            stats.duplicate_ids
        );

        Ok(Self::assemble(listings, stats, None, Utc::now()))
    }

    fn assemble(
        listings: Vec<EnrichedListing>,
        stats: BuildStats,
        source_fingerprint: Option<String>,
        built_at: DateTime<Utc>,
    ) -> Self {
        let mut index = HashMap::with_capacity(listings.len());
        let mut unique = Vec::with_capacity(listings.len());
        for listing in listings {
            if index.contains_key(listing.listing_id()) {
                continue;
            }
            index.insert(listing.listing_id().to_string(), unique.len());
            unique.push(listing);
        }

        Self {
            listings: unique,
            index,
            stats,
            source_fingerprint,
            built_at,
        }
    }

    /// Fold the parser's row counts into the build stats.
    pub fn with_parse_report(mut self, report: ParseReport) -> Self {
        self.stats.source_rows = report.rows;
        self.stats.skipped_rows = report.skipped;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.source_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn get(&self, listing_id: &str) -> Option<&EnrichedListing> {
        self.index.get(listing_id).map(|&i| &self.listings[i])
    }

    pub fn listings(&self) -> &[EnrichedListing] {
        &self.listings
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn source_fingerprint(&self) -> Option<&str> {
        self.source_fingerprint.as_deref()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn count_by_type(&self, transaction_type: TransactionType) -> usize {
        self.listings
            .iter()
            .filter(|l| l.transaction_type == transaction_type)
            .count()
    }

    pub fn search(&self, filter: &SearchFilter) -> SearchResults<'_> {
        let text = filter
            .text
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());

        let mut hits: Vec<SearchHit<'_>> = Vec::new();
        for listing in &self.listings {
            if filter
                .transaction_type
                .is_some_and(|wanted| listing.transaction_type != wanted)
            {
                continue;
            }

            let distance = match (&filter.near, listing.geo.coordinates()) {
                (Some(near), Some((lat, lon))) => {
                    let d = distance_km(near.latitude, near.longitude, lat, lon);
                    if d > near.radius_km {
                        continue;
                    }
                    Some(d)
                }
                (Some(_), None) => continue,
                (None, _) => None,
            };

            if text.as_deref().is_some_and(|t| !matches_text(listing, t)) {
                continue;
            }

            if filter.min_price.is_some() || filter.max_price.is_some() {
                let Some(price) = listing.record.price_value() else {
                    continue;
                };
                if filter.min_price.is_some_and(|min| price < min)
                    || filter.max_price.is_some_and(|max| price > max)
                {
                    continue;
                }
            }

            if let Some(min_rooms) = filter.min_rooms {
                if !listing.record.rooms_value().is_some_and(|rooms| rooms >= min_rooms) {
                    continue;
                }
            }

            if !filter.neighbourhoods.is_empty()
                && !filter
                    .neighbourhoods
                    .contains(&normalize_address(&listing.record.neighbourhood))
            {
                continue;
            }

            if !filter.features.iter().all(|f| listing.record.has_feature(f)) {
                continue;
            }

            hits.push(SearchHit {
                listing,
                distance_km: distance,
            });
        }

        let sort = filter
            .sort
            .or(filter.near.map(|_| SortOrder::Distance));
        match sort {
            Some(SortOrder::Distance) => {
                hits.sort_by(|a, b| compare_missing_last(a.distance_km, b.distance_km))
            }
            Some(SortOrder::PriceAsc) => hits.sort_by(|a, b| {
                compare_missing_last(a.listing.record.price_value(), b.listing.record.price_value())
            }),
            Some(SortOrder::PriceDesc) => hits.sort_by(|a, b| {
                compare_missing_last(
                    a.listing.record.price_value().map(|p| -p),
                    b.listing.record.price_value().map(|p| -p),
                )
            }),
            None => {}
        }

        let total_matches = hits.len();
        if let Some(limit) = filter.limit {
            hits.truncate(limit);
        }

        SearchResults {
            hits,
            total_matches,
        }
    }

    pub fn to_snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            version: SNAPSHOT_VERSION,
            source_fingerprint: self.source_fingerprint.clone(),
            built_at: self.built_at,
            stats: self.stats,
            listings: self.listings.clone(),
        }
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self::assemble(
            snapshot.listings,
            snapshot.stats,
            snapshot.source_fingerprint,
            snapshot.built_at,
        )
    }
}

fn matches_text(listing: &EnrichedListing, needle: &str) -> bool {
    listing.record.description.to_lowercase().contains(needle)
        || listing.record.address.to_lowercase().contains(needle)
}

/// Ascending order with `None` after every value. Stable sorts keep catalog
/// order among equal keys.
fn compare_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
