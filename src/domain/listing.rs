//! Listing data model
//!
//! Raw records as read from the source table, their geocoding outcome and
//! transaction label, and the enriched composition the catalog owns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A single row of the listing source, as parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing_id: String,
    /// Empty when the row had no address; the build step skips geocoding then.
    pub address: String,
    /// Address columns in mapping order, blanks kept so positions line up.
    #[serde(default)]
    pub address_parts: Vec<String>,
    pub price: String,
    pub description: String,
    pub transaction_hint: String,
    #[serde(default)]
    pub rooms: String,
    #[serde(default)]
    pub neighbourhood: String,
    /// Amenities whose column held a yes-like value (e.g. `parking`).
    #[serde(default)]
    pub features: BTreeSet<String>,
    /// Every column not claimed by the column mapping, keyed by header.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// 1-based line in the source file.
    pub source_line: u64,
}

impl ListingRecord {
    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }

    /// Numeric price parsed from the free-form price text.
    pub fn price_value(&self) -> Option<f64> {
        parse_price(&self.price)
    }

    pub fn rooms_value(&self) -> Option<f64> {
        parse_price(&self.rooms)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Geocoding queries from most to least precise.
    ///
    /// The full address comes first. With three or more address columns
    /// (street, neighbourhood, city) two coarser forms follow: the first and
    /// last column only, then everything after the first column. A form with
    /// fewer than two non-blank parts, or one already listed, is left out.
    pub fn geocode_queries(&self) -> Vec<String> {
        if !self.has_address() {
            return Vec::new();
        }

        let mut queries = vec![self.address.clone()];
        let parts = &self.address_parts;
        if parts.len() >= 3 {
            let street_city = [&parts[0], &parts[parts.len() - 1]];
            let without_street: Vec<&String> = parts[1..].iter().collect();

            for variant in [street_city.to_vec(), without_street] {
                let kept: Vec<&str> = variant
                    .iter()
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .collect();
                if kept.len() < 2 {
                    continue;
                }
                let query = kept.join(", ");
                if !queries.contains(&query) {
                    queries.push(query);
                }
            }
        }
        queries
    }
}

/// Whether a spreadsheet cell reads as "yes" (`true`, `yes`, `1`, `כן`...).
pub fn is_truthy(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "כן"
    )
}

/// Extract the first number from a price text such as `₪1,850,000` or `4,500/month`.
///
/// Thousands separators are dropped; a single `.` is kept as the decimal point.
pub fn parse_price(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    let digits = digits.trim_end_matches('.');
    digits.parse::<f64>().ok()
}

/// Outcome of resolving an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GeoResult {
    Resolved {
        latitude: f64,
        longitude: f64,
        confidence: f64,
        resolved_address: String,
    },
    Unresolved,
}

impl GeoResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, GeoResult::Resolved { .. })
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self {
            GeoResult::Resolved {
                latitude,
                longitude,
                ..
            } => Some((*latitude, *longitude)),
            GeoResult::Unresolved => None,
        }
    }

    pub fn resolved_address(&self) -> Option<&str> {
        match self {
            GeoResult::Resolved {
                resolved_address, ..
            } => Some(resolved_address),
            GeoResult::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    ForSale,
    ForRent,
    Unknown,
}

impl TransactionType {
    pub const ALL: [TransactionType; 3] = [
        TransactionType::ForSale,
        TransactionType::ForRent,
        TransactionType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::ForSale => "ForSale",
            TransactionType::ForRent => "ForRent",
            TransactionType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("expected one of ForSale, ForRent, Unknown, got '{}'", s))
    }
}

/// A source record together with its enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedListing {
    pub record: ListingRecord,
    pub geo: GeoResult,
    pub transaction_type: TransactionType,
}

impl EnrichedListing {
    pub fn listing_id(&self) -> &str {
        &self.record.listing_id
    }
}
