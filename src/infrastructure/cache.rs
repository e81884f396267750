//! Durable catalog cache
//!
//! One JSON snapshot per source fingerprint, so a rebuild is only paid for
//! when the listings file actually changes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::CacheError;
use crate::services::catalog::{Catalog, CatalogSnapshot, SNAPSHOT_VERSION};

#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
}

impl CatalogCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("catalog-{}.json", fingerprint))
    }

    /// Load the snapshot built from `fingerprint`, if a usable one exists.
    ///
    /// Snapshots from another format version or another source are ignored.
    pub fn load(&self, fingerprint: &str) -> Result<Option<Catalog>, CacheError> {
        let path = self.path_for(fingerprint);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            tracing::info!(
                "Ignoring cached catalog {} (version {}, expected {})",
                path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            );
            return Ok(None);
        }
        if snapshot.source_fingerprint.as_deref() != Some(fingerprint) {
            tracing::warn!(
                "Ignoring cached catalog {} (fingerprint mismatch)",
                path.display()
            );
            return Ok(None);
        }

        tracing::debug!("Loaded cached catalog from {}", path.display());
        Ok(Some(Catalog::from_snapshot(snapshot)))
    }

    /// Write `catalog` under its fingerprint. Catalogs without one are not cached.
    pub fn store(&self, catalog: &Catalog) -> Result<Option<PathBuf>, CacheError> {
        let Some(fingerprint) = catalog.source_fingerprint() else {
            return Ok(None);
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(fingerprint);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec(&catalog.to_snapshot())?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!("Stored catalog snapshot at {}", path.display());
        Ok(Some(path))
    }
}
