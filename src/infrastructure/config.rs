use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::modules::import::ColumnMapping;

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub country_codes: Option<String>,
    pub min_confidence: f64,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub min_interval: Duration,
    pub workers: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "nadlan-catalog/0.1".to_string(),
            country_codes: Some("il".to_string()),
            min_confidence: 0.1,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            min_interval: Duration::from_millis(1500),
            workers: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source_path: PathBuf,
    pub cache_dir: PathBuf,
    pub port: u16,
    pub columns: ColumnMapping,
    pub geocoder: GeocoderConfig,
    /// Prices below this signal a rental; `None` disables the price signal.
    pub rent_price_ceiling: Option<f64>,
    pub default_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = GeocoderConfig::default();
        let columns = ColumnMapping::default();

        let geocoder = GeocoderConfig {
            base_url: env::var("GEOCODER_URL").unwrap_or(defaults.base_url),
            user_agent: env::var("GEOCODER_USER_AGENT").unwrap_or(defaults.user_agent),
            country_codes: match env::var("GEOCODER_COUNTRY_CODES") {
                Ok(codes) if codes.trim().is_empty() => None,
                Ok(codes) => Some(codes.trim().to_string()),
                Err(_) => defaults.country_codes,
            },
            min_confidence: parse_var("GEOCODER_MIN_CONFIDENCE").unwrap_or(defaults.min_confidence),
            timeout: parse_var("GEOCODER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: parse_var("GEOCODER_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: parse_var("GEOCODER_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            min_interval: parse_var("GEOCODER_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
            workers: parse_var::<usize>("GEOCODER_WORKERS")
                .unwrap_or(defaults.workers)
                .max(1),
        };

        Self {
            source_path: env::var("LISTINGS_SOURCE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/listings.csv")),
            cache_dir: env::var("CATALOG_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/cache")),
            port: parse_var("PORT").unwrap_or(8000),
            columns: ColumnMapping {
                id: env::var("COLUMN_ID").unwrap_or(columns.id),
                address: env::var("COLUMN_ADDRESS")
                    .ok()
                    .map(|s| split_list(&s))
                    .filter(|cols| !cols.is_empty())
                    .unwrap_or(columns.address),
                price: env::var("COLUMN_PRICE").unwrap_or(columns.price),
                description: env::var("COLUMN_DESCRIPTION").unwrap_or(columns.description),
                transaction_hint: env::var("COLUMN_TRANSACTION_HINT")
                    .unwrap_or(columns.transaction_hint),
                rooms: env::var("COLUMN_ROOMS").unwrap_or(columns.rooms),
                neighbourhood: env::var("COLUMN_NEIGHBOURHOOD").unwrap_or(columns.neighbourhood),
                features: env::var("COLUMN_FEATURES")
                    .map(|s| parse_features(&s))
                    .unwrap_or(columns.features),
            },
            geocoder,
            rent_price_ceiling: match parse_var::<f64>("CLASSIFIER_RENT_PRICE_CEILING") {
                Some(ceiling) if ceiling <= 0.0 => None,
                Some(ceiling) => Some(ceiling),
                None => Some(100_000.0),
            },
            default_limit: parse_var("QUERY_DEFAULT_LIMIT").unwrap_or(10),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `parking=bulletin_has_parking, storage` -> feature name to column; a bare
/// name reads `has_<name>`.
fn parse_features(value: &str) -> BTreeMap<String, String> {
    split_list(value)
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, column)) => (name.trim().to_lowercase(), column.trim().to_string()),
            None => (entry.to_lowercase(), format!("has_{}", entry)),
        })
        .filter(|(name, column)| !name.is_empty() && !column.is_empty())
        .collect()
}
