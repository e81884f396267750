//! OpenStreetMap Nominatim geocoding source
//!
//! Free-text search against `/search?format=json&limit=1`. Nominatim's
//! `importance` score is used as the match confidence.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::domain::{GeocodeLookup, LookupError, LookupMatch};
use crate::infrastructure::config::GeocoderConfig;

/// Confidence assumed when Nominatim omits `importance`.
const DEFAULT_IMPORTANCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    importance: Option<f64>,
}

pub struct NominatimLookup {
    client: reqwest::Client,
    search_url: Url,
    country_codes: Option<String>,
    timeout: Duration,
}

impl NominatimLookup {
    pub fn new(config: &GeocoderConfig) -> Result<Self, String> {
        let search_url = Url::parse(&format!(
            "{}/search",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| format!("Invalid geocoder URL '{}': {}", config.base_url, e))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            search_url,
            country_codes: config.country_codes.clone(),
            timeout: config.timeout,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout(self.timeout)
        } else {
            LookupError::Request(e)
        }
    }

    fn request_url(&self, address: &str) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("q", address)
                .append_pair("format", "json")
                .append_pair("limit", "1");
            if let Some(codes) = &self.country_codes {
                query.append_pair("countrycodes", codes);
            }
        }
        url
    }
}

#[async_trait]
impl GeocodeLookup for NominatimLookup {
    async fn lookup(&self, address: &str) -> Result<LookupMatch, LookupError> {
        let res = self
            .client
            .get(self.request_url(address))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !res.status().is_success() {
            return Err(LookupError::Status {
                status: res.status(),
            });
        }

        let body = res.text().await.map_err(|e| self.request_error(e))?;
        let places: Vec<NominatimPlace> = serde_json::from_str(&body)
            .map_err(|e| LookupError::InvalidResponse(e.to_string()))?;

        let place = places.into_iter().next().ok_or(LookupError::NotFound)?;
        let latitude = parse_coordinate(&place.lat)?;
        let longitude = parse_coordinate(&place.lon)?;

        Ok(LookupMatch {
            latitude,
            longitude,
            confidence: place.importance.unwrap_or(DEFAULT_IMPORTANCE),
            display_name: place.display_name,
        })
    }
}

/// Parse a coordinate string, rounded to 6 decimals (~0.1 m).
fn parse_coordinate(value: &str) -> Result<f64, LookupError> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| LookupError::InvalidResponse(format!("bad coordinate '{}'", value)))?;
    Ok((parsed * 1e6).round() / 1e6)
}
