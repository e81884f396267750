//! Catalog build pipeline
//!
//! Source file -> parse -> geocode -> classify -> catalog, with the durable
//! cache consulted first. The whole build finishes before anything is served.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::domain::BuildError;
use crate::infrastructure::cache::CatalogCache;
use crate::infrastructure::config::Config;
use crate::modules::import::parse_listings;
use crate::modules::integrations::nominatim::NominatimLookup;
use crate::services::catalog::{Catalog, SNAPSHOT_VERSION};
use crate::services::classifier::{Classifier, ClassifierRules};
use crate::services::geocoder::Geocoder;
use crate::services::lookup::{RateLimitedLookup, RetryConfig, RetryingLookup};

/// Cache key for a build: SHA-256 over the raw source bytes and every
/// setting that changes the catalog built from them, hex encoded.
pub fn fingerprint(bytes: &[u8], config: &Config) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update([0u8]);
    hasher.update(build_settings(config).as_bytes());
    hex::encode(hasher.finalize())
}

fn build_settings(config: &Config) -> String {
    let geocoder = &config.geocoder;
    format!(
        "v{}|{:?}|{}|{:?}|{:?}|{}",
        SNAPSHOT_VERSION,
        config.columns,
        geocoder.min_confidence,
        config.rent_price_ceiling,
        geocoder.country_codes,
        geocoder.base_url.trim_end_matches('/'),
    )
}

fn read_source(path: &Path) -> Result<Vec<u8>, BuildError> {
    std::fs::read(path).map_err(|source| BuildError::SourceUnreadable {
        path: path.display().to_string(),
        source,
    })
}

/// Load the catalog for `config.source_path`, from cache when possible.
///
/// `rebuild` skips the cache lookup; the fresh catalog still replaces the
/// cached one.
pub async fn load_catalog(config: &Config, rebuild: bool) -> Result<Catalog, BuildError> {
    let bytes = read_source(&config.source_path)?;
    let fingerprint = fingerprint(&bytes, config);
    let cache = CatalogCache::new(&config.cache_dir);

    if !rebuild {
        match cache.load(&fingerprint) {
            Ok(Some(catalog)) => {
                tracing::info!(
                    "Using cached catalog for {} ({} listings)",
                    config.source_path.display(),
                    catalog.len()
                );
                return Ok(catalog);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Catalog cache unusable, rebuilding: {}", e),
        }
    }

    let catalog = build_catalog(&bytes, config)
        .await?
        .with_fingerprint(fingerprint);

    if let Err(e) = cache.store(&catalog) {
        tracing::warn!("Failed to store catalog cache: {}", e);
    }

    Ok(catalog)
}

async fn build_catalog(bytes: &[u8], config: &Config) -> Result<Catalog, BuildError> {
    let parsed = parse_listings(bytes, &config.columns)?;

    let nominatim = NominatimLookup::new(&config.geocoder).map_err(BuildError::Geocoder)?;
    // Every attempt, retries included, waits for the rate limiter.
    let lookup = RetryingLookup::new(
        RateLimitedLookup::new(nominatim, config.geocoder.min_interval),
        RetryConfig {
            max_retries: config.geocoder.max_retries,
            initial_delay: config.geocoder.retry_delay,
            ..RetryConfig::default()
        },
    );
    let geocoder = Geocoder::new(lookup, config.geocoder.min_confidence);

    let classifier = Classifier::new(ClassifierRules {
        rent_price_ceiling: config.rent_price_ceiling,
        ..ClassifierRules::default()
    });

    tracing::info!(
        "Building catalog from {} records ({} workers)",
        parsed.records.len(),
        config.geocoder.workers
    );

    let catalog = Catalog::build(
        parsed.records,
        &geocoder,
        &classifier,
        config.geocoder.workers,
    )
    .await?
    .with_parse_report(parsed.report);

    let stats = catalog.stats();
    tracing::info!(
        "Catalog ready: {} listings, {} unresolved, {} skipped rows, {} duplicate ids ({} distinct addresses looked up)",
        stats.listings,
        stats.unresolved,
        stats.skipped_rows,
        stats.duplicate_ids,
        geocoder.cached_addresses()
    );

    Ok(catalog)
}
