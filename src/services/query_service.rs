//! Query Service - the boundary between transports and the catalog
//!
//! Validates search requests and turns catalog hits into serializable views.
//! Invalid requests never reach the catalog. An empty result set is a normal
//! response, not an error.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::{EnrichedListing, QueryError, TransactionType, ValidationError};
use crate::services::catalog::{
    BuildStats, Catalog, NearFilter, SearchFilter, SearchHit, SortOrder,
};
use crate::services::geocoder::normalize_address;

#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// Limit applied when a request does not give one.
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NearRequest {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
}

/// A search request as received from a transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    pub transaction_type: Option<String>,
    pub near: Option<NearRequest>,
    pub text: Option<String>,
    pub limit: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rooms: Option<f64>,
    pub neighbourhoods: Option<Vec<String>>,
    /// `true` requires the feature; `false` or absent does not filter.
    pub has_parking: Option<bool>,
    pub has_elevator: Option<bool>,
    pub has_balcony: Option<bool>,
    /// Any other configured feature names to require.
    pub features: Option<Vec<String>>,
    pub sort_by: Option<String>,
}

impl SearchRequest {
    /// Decode a request field by field, so a malformed value is reported
    /// against the field that carried it.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Ok(Self::default()),
            _ => return Err(ValidationError::new("request", "expected a JSON object")),
        };

        let mut request = Self::default();
        for (key, field_value) in object {
            match key.as_str() {
                "transaction_type" => request.transaction_type = decode(key, field_value)?,
                "near" => request.near = decode(key, field_value)?,
                "text" => request.text = decode(key, field_value)?,
                "limit" => request.limit = decode(key, field_value)?,
                "min_price" => request.min_price = decode(key, field_value)?,
                "max_price" => request.max_price = decode(key, field_value)?,
                "min_rooms" => request.min_rooms = decode(key, field_value)?,
                "neighbourhoods" => request.neighbourhoods = decode(key, field_value)?,
                "has_parking" => request.has_parking = decode(key, field_value)?,
                "has_elevator" => request.has_elevator = decode(key, field_value)?,
                "has_balcony" => request.has_balcony = decode(key, field_value)?,
                "features" => request.features = decode(key, field_value)?,
                "sort_by" => request.sort_by = decode(key, field_value)?,
                other => return Err(ValidationError::new(other, "unknown field")),
            }
        }
        Ok(request)
    }

    pub fn validate(&self, config: &QueryConfig) -> Result<SearchFilter, ValidationError> {
        let transaction_type = self
            .transaction_type
            .as_deref()
            .map(|t| {
                t.parse::<TransactionType>()
                    .map_err(|e| ValidationError::new("transaction_type", e))
            })
            .transpose()?;

        let near = self.near.as_ref().map(validate_near).transpose()?;

        let limit = match self.limit {
            Some(limit) if limit < 0 => {
                return Err(ValidationError::new("limit", "must not be negative"));
            }
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
            None => config.default_limit,
        };

        for (field, price) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if let Some(price) = price {
                if !price.is_finite() || price < 0.0 {
                    return Err(ValidationError::new(field, "must be a non-negative number"));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ValidationError::new("min_price", "must not exceed max_price"));
            }
        }

        if let Some(rooms) = self.min_rooms {
            if !rooms.is_finite() || rooms < 0.0 {
                return Err(ValidationError::new("min_rooms", "must be a non-negative number"));
            }
        }

        let neighbourhoods: Vec<String> = names("neighbourhoods", self.neighbourhoods.as_deref())?
            .iter()
            .map(|n| normalize_address(n))
            .collect();

        let mut features: Vec<String> = [
            ("parking", self.has_parking),
            ("elevator", self.has_elevator),
            ("balcony", self.has_balcony),
        ]
        .into_iter()
        .filter(|(_, wanted)| *wanted == Some(true))
        .map(|(name, _)| name.to_string())
        .collect();
        for name in names("features", self.features.as_deref())? {
            let name = name.to_lowercase();
            if !features.contains(&name) {
                features.push(name);
            }
        }

        let sort = match self.sort_by.as_deref() {
            None => None,
            Some("distance") if near.is_none() => {
                return Err(ValidationError::new(
                    "sort_by",
                    "distance sort requires 'near'",
                ));
            }
            Some("distance") => Some(SortOrder::Distance),
            Some("price_asc") => Some(SortOrder::PriceAsc),
            Some("price_desc") => Some(SortOrder::PriceDesc),
            Some(other) => {
                return Err(ValidationError::new(
                    "sort_by",
                    format!(
                        "expected one of distance, price_asc, price_desc, got '{}'",
                        other
                    ),
                ));
            }
        };

        Ok(SearchFilter {
            transaction_type,
            near,
            text: self.text.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            min_rooms: self.min_rooms,
            neighbourhoods,
            features,
            sort,
            limit: Some(limit),
        })
    }
}

/// Trimmed entries of a list of names; a blank entry is an error.
fn names<'a>(field: &str, list: Option<&'a [String]>) -> Result<Vec<&'a str>, ValidationError> {
    list.unwrap_or_default()
        .iter()
        .map(|name| match name.trim() {
            "" => Err(ValidationError::new(field, "entries must not be blank")),
            trimmed => Ok(trimmed),
        })
        .collect()
}

fn decode<T: DeserializeOwned>(field: &str, value: &Value) -> Result<T, ValidationError> {
    T::deserialize(value).map_err(|e| ValidationError::new(field, e.to_string()))
}

fn validate_near(near: &NearRequest) -> Result<NearFilter, ValidationError> {
    if !(near.radius_km.is_finite() && near.radius_km > 0.0) {
        return Err(ValidationError::new("near.radius_km", "must be positive"));
    }
    if !(-90.0..=90.0).contains(&near.lat) {
        return Err(ValidationError::new("near.lat", "must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&near.lon) {
        return Err(ValidationError::new("near.lon", "must be within [-180, 180]"));
    }
    Ok(NearFilter {
        latitude: near.lat,
        longitude: near.lon,
        radius_km: near.radius_km,
    })
}

/// A listing as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingView {
    pub listing_id: String,
    pub address: String,
    pub resolved_address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub transaction_type: TransactionType,
    pub price: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub rooms: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub neighbourhood: String,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub features: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub attributes: BTreeMap<String, String>,
}

impl ListingView {
    fn new(listing: &EnrichedListing, distance_km: Option<f64>) -> Self {
        let coordinates = listing.geo.coordinates();
        Self {
            listing_id: listing.record.listing_id.clone(),
            address: listing.record.address.clone(),
            resolved_address: listing.geo.resolved_address().map(str::to_string),
            lat: coordinates.map(|(lat, _)| lat),
            lon: coordinates.map(|(_, lon)| lon),
            transaction_type: listing.transaction_type,
            price: listing.record.price.clone(),
            description: listing.record.description.clone(),
            rooms: listing.record.rooms.clone(),
            neighbourhood: listing.record.neighbourhood.clone(),
            features: listing.record.features.clone(),
            distance_km: distance_km.map(|d| (d * 1000.0).round() / 1000.0),
            attributes: listing.record.attributes.clone(),
        }
    }
}

impl From<&SearchHit<'_>> for ListingView {
    fn from(hit: &SearchHit<'_>) -> Self {
        ListingView::new(hit.listing, hit.distance_km)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_matches: usize,
    pub returned: usize,
    /// Catalog-wide data-quality counts
    pub unresolved: usize,
    pub skipped_rows: usize,
    pub duplicate_ids: usize,
}

/// Parsed-price statistics over the returned page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub listings: Vec<ListingView>,
    pub summary: ResultSummary,
    pub price_stats: Option<PriceStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub stats: BuildStats,
    pub for_sale: usize,
    pub for_rent: usize,
    pub unknown: usize,
    pub source_fingerprint: Option<String>,
    pub built_at: DateTime<Utc>,
}

pub struct QueryService {
    catalog: Arc<Catalog>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(catalog: Arc<Catalog>, config: QueryConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, QueryError> {
        let filter = request.validate(&self.config)?;
        let results = self.catalog.search(&filter);
        let stats = self.catalog.stats();

        let listings: Vec<ListingView> = results.hits.iter().map(ListingView::from).collect();
        let prices: Vec<f64> = results
            .hits
            .iter()
            .filter_map(|h| h.listing.record.price_value())
            .collect();

        tracing::debug!(
            "Search matched {} listings, returning {}",
            results.total_matches,
            listings.len()
        );

        Ok(SearchResponse {
            summary: ResultSummary {
                total_matches: results.total_matches,
                returned: listings.len(),
                unresolved: stats.unresolved,
                skipped_rows: stats.skipped_rows,
                duplicate_ids: stats.duplicate_ids,
            },
            price_stats: price_stats(&prices),
            listings,
        })
    }

    pub fn get(&self, listing_id: &str) -> Result<ListingView, QueryError> {
        self.catalog
            .get(listing_id)
            .map(|listing| ListingView::new(listing, None))
            .ok_or_else(|| QueryError::NotFound(listing_id.to_string()))
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            stats: self.catalog.stats(),
            for_sale: self.catalog.count_by_type(TransactionType::ForSale),
            for_rent: self.catalog.count_by_type(TransactionType::ForRent),
            unknown: self.catalog.count_by_type(TransactionType::Unknown),
            source_fingerprint: self.catalog.source_fingerprint().map(str::to_string),
            built_at: self.catalog.built_at(),
        }
    }
}

fn price_stats(prices: &[f64]) -> Option<PriceStats> {
    if prices.is_empty() {
        return None;
    }
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = prices.iter().sum::<f64>() / prices.len() as f64;
    Some(PriceStats {
        min,
        max,
        avg: avg.round(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(value: Value) -> Result<SearchFilter, ValidationError> {
        SearchRequest::from_json(&value)?.validate(&QueryConfig::default())
    }

    #[test]
    fn test_valid_request() {
        let filter = validate(json!({
            "transaction_type": "ForRent",
            "near": {"lat": 32.79, "lon": 34.99, "radius_km": 2},
            "text": "balcony",
            "limit": 5
        }))
        .unwrap();

        assert_eq!(filter.transaction_type, Some(TransactionType::ForRent));
        assert_eq!(filter.near.unwrap().radius_km, 2.0);
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.text.as_deref(), Some("balcony"));
    }

    #[test]
    fn test_defaults() {
        let filter = validate(json!({})).unwrap();
        assert_eq!(filter, SearchFilter {
            limit: Some(10),
            ..Default::default()
        });
        assert_eq!(validate(Value::Null).unwrap().limit, Some(10));
    }

    #[test]
    fn test_invalid_fields_are_named() {
        let field = |value: Value| validate(value).unwrap_err().field;

        assert_eq!(
            field(json!({"near": {"lat": 32.79, "lon": 34.99, "radius_km": -1}})),
            "near.radius_km"
        );
        assert_eq!(
            field(json!({"near": {"lat": 32.79, "lon": 34.99, "radius_km": 0}})),
            "near.radius_km"
        );
        assert_eq!(
            field(json!({"near": {"lat": 132.0, "lon": 34.99, "radius_km": 1}})),
            "near.lat"
        );
        assert_eq!(field(json!({"transaction_type": "Sold"})), "transaction_type");
        assert_eq!(field(json!({"limit": -1})), "limit");
        assert_eq!(field(json!({"limit": "ten"})), "limit");
        assert_eq!(field(json!({"min_price": 10, "max_price": 5})), "min_price");
        assert_eq!(field(json!({"sort_by": "distance"})), "sort_by");
        assert_eq!(field(json!({"sort_by": "newest"})), "sort_by");
        assert_eq!(field(json!({"bedrooms": 3})), "bedrooms");
        assert_eq!(field(json!({"near": {"lat": 1.0}})), "near");
        assert_eq!(field(json!({"min_rooms": -2})), "min_rooms");
        assert_eq!(field(json!({"min_rooms": "three"})), "min_rooms");
        assert_eq!(field(json!({"neighbourhoods": "Hadar"})), "neighbourhoods");
        assert_eq!(field(json!({"neighbourhoods": ["Hadar", "  "]})), "neighbourhoods");
        assert_eq!(field(json!({"has_parking": "yes"})), "has_parking");
        assert_eq!(field(json!({"features": [""]})), "features");
        assert_eq!(field(json!([1, 2])), "request");
    }

    #[test]
    fn test_attribute_filters() {
        let filter = validate(json!({
            "min_rooms": 3.5,
            "neighbourhoods": [" HADAR ", "Carmel Center"],
            "has_parking": true,
            "has_elevator": false,
            "has_balcony": true,
            "features": ["Storage", "parking"]
        }))
        .unwrap();

        assert_eq!(filter.min_rooms, Some(3.5));
        assert_eq!(filter.neighbourhoods, vec!["hadar", "carmel center"]);
        // A false flag does not exclude listings that have the feature
        assert_eq!(filter.features, vec!["parking", "balcony", "storage"]);
    }

    #[test]
    fn test_price_stats() {
        assert_eq!(price_stats(&[]), None);
        assert_eq!(
            price_stats(&[1000.0, 3000.0, 2500.0]),
            Some(PriceStats {
                min: 1000.0,
                max: 3000.0,
                avg: 2167.0,
            })
        );
    }
}
