// Per-(host, source type) cache of the last successful raw payload, plus persisted sections.
// Files: <dir>/<source>/<host> and <dir>/persisted/<source>/<host>, each a versioned wincode blob.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, instrument, warn};
use wincode::{SchemaRead, SchemaWrite};

use crate::blob;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::models::{CacheInfo, Section, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct CacheEntry {
    pub fetched_at_ms: i64,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.fetched_at_ms
    }

    /// Fresh iff `now - fetched_at < max_age`. An entry exactly `max_age` old is expired,
    /// so `max_age = 0` never yields a hit.
    pub fn is_fresh(&self, now_ms: i64, max_age: Duration) -> bool {
        if max_age.is_zero() {
            return false;
        }
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        self.age_ms(now_ms) < max_age_ms
    }
}

/// A section delivered with `persist(UNTIL)`, kept until `until` (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct PersistedSection {
    pub cached_at: i64,
    pub until: i64,
    pub section: Section,
}

impl PersistedSection {
    pub fn is_outdated(&self, now_secs: i64) -> bool {
        now_secs >= self.until
    }

    /// The section as served from the persisted store: flagged cached with its validity window.
    pub fn to_cached_section(&self) -> Section {
        let mut section = self.section.clone().mark_cached();
        section.cache_info = Some(CacheInfo {
            cached_at: self.cached_at,
            interval: self.until - self.cached_at,
        });
        section
    }
}

#[derive(Debug, Clone)]
pub struct FetchCache {
    dir: PathBuf,
    enabled: bool,
}

impl FetchCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.dir, config.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn entry_path(&self, host: &str, source: SourceKind) -> PathBuf {
        self.dir.join(source.id()).join(host)
    }

    fn persisted_path(&self, host: &str, source: SourceKind) -> PathBuf {
        self.dir.join("persisted").join(source.id()).join(host)
    }

    /// Cached entry if it is younger than `max_age`. Errors degrade to `None`.
    pub async fn get_if_fresh(
        &self,
        host: &str,
        source: SourceKind,
        max_age: Duration,
    ) -> Option<CacheEntry> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.get(host, source)
            .await
            .filter(|e| e.is_fresh(now_ms, max_age))
    }

    /// Cached entry regardless of age (stale fallback after a failed fetch).
    pub async fn get(&self, host: &str, source: SourceKind) -> Option<CacheEntry> {
        if !self.enabled || !source.uses_fetch_cache() {
            return None;
        }
        let path = self.entry_path(host, source);
        match read_entry(&path).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(host, source = %source, error = %e, operation = "cache_get", "Cache read failed; treating as miss");
                None
            }
        }
    }

    /// Replace the entry wholesale (temp file + rename).
    #[instrument(skip(self, payload), fields(operation = "cache_put", bytes = payload.len()))]
    pub async fn put(
        &self,
        host: &str,
        source: SourceKind,
        payload: &[u8],
        fetched_at_ms: i64,
    ) -> Result<(), CacheError> {
        if !self.enabled || !source.uses_fetch_cache() {
            return Ok(());
        }
        let path = self.entry_path(host, source);
        let entry = CacheEntry {
            fetched_at_ms,
            payload: payload.to_vec(),
        };
        let encoded = wincode::serialize(&entry).map_err(|e| CacheError::Codec {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let bytes = blob::with_version_prefix(blob::CACHE_ENTRY_VERSION, encoded);
        blob::write_atomic(&path, &bytes)
            .await
            .map_err(|source| CacheError::Io {
                path: path.display().to_string(),
                source,
            })?;
        debug!("Cache entry written");
        Ok(())
    }

    /// Persisted sections that are still valid. An empty or fully outdated file is removed.
    pub async fn load_persisted(
        &self,
        host: &str,
        source: SourceKind,
        now_secs: i64,
    ) -> Vec<PersistedSection> {
        if !self.enabled {
            return Vec::new();
        }
        let path = self.persisted_path(host, source);
        let stored = match read_persisted(&path).await {
            Ok(s) => s,
            Err(e) => {
                warn!(host, source = %source, error = %e, operation = "load_persisted", "Persisted sections unreadable; ignoring");
                Vec::new()
            }
        };
        let valid: Vec<PersistedSection> = stored
            .into_iter()
            .filter(|p| !p.is_outdated(now_secs))
            .collect();
        if valid.is_empty() {
            remove_if_exists(&path).await;
        }
        valid
    }

    /// Merge freshly delivered persisted sections into `previous` (by name, new wins) and store.
    #[instrument(skip(self, previous, fresh), fields(operation = "store_persisted"))]
    pub async fn store_persisted(
        &self,
        host: &str,
        source: SourceKind,
        previous: Vec<PersistedSection>,
        fresh: Vec<(Section, i64)>,
        now_secs: i64,
    ) -> Result<(), CacheError> {
        if !self.enabled || fresh.is_empty() {
            return Ok(());
        }
        let mut by_name: BTreeMap<String, PersistedSection> = previous
            .into_iter()
            .map(|p| (p.section.name.clone(), p))
            .collect();
        for (mut section, until) in fresh {
            section.cached = false;
            section.cache_info = None;
            by_name.insert(
                section.name.clone(),
                PersistedSection {
                    cached_at: now_secs,
                    until,
                    section,
                },
            );
        }
        let sections: Vec<PersistedSection> = by_name.into_values().collect();
        let path = self.persisted_path(host, source);
        let encoded = wincode::serialize(&sections).map_err(|e| CacheError::Codec {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let bytes = blob::with_version_prefix(blob::PERSISTED_SECTIONS_VERSION, encoded);
        blob::write_atomic(&path, &bytes)
            .await
            .map_err(|source| CacheError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

async fn read_blob(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CacheError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn versioned_payload<'a>(path: &Path, bytes: &'a [u8], version: u8) -> Result<&'a [u8], CacheError> {
    blob::blob_payload(bytes, version).ok_or_else(|| CacheError::Codec {
        path: path.display().to_string(),
        message: format!(
            "unsupported blob version {} (expected {})",
            blob::blob_version(bytes),
            version
        ),
    })
}

async fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    let Some(bytes) = read_blob(path).await? else {
        return Ok(None);
    };
    let payload = versioned_payload(path, &bytes, blob::CACHE_ENTRY_VERSION)?;
    let entry: CacheEntry = wincode::deserialize(payload).map_err(|e| CacheError::Codec {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(entry))
}

async fn read_persisted(path: &Path) -> Result<Vec<PersistedSection>, CacheError> {
    let Some(bytes) = read_blob(path).await? else {
        return Ok(Vec::new());
    };
    let payload = versioned_payload(path, &bytes, blob::PERSISTED_SECTIONS_VERSION)?;
    wincode::deserialize(payload).map_err(|e| CacheError::Codec {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove persisted sections file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_boundary_is_exclusive() {
        let entry = CacheEntry {
            fetched_at_ms: 1_000,
            payload: Vec::new(),
        };
        let max_age = Duration::from_secs(30);
        assert!(entry.is_fresh(30_999, max_age));
        assert!(!entry.is_fresh(31_000, max_age));
        assert!(!entry.is_fresh(1_000, Duration::ZERO));
    }

    #[test]
    fn persisted_section_becomes_cached() {
        let p = PersistedSection {
            cached_at: 100,
            until: 160,
            section: Section::new("lnx_if", SourceKind::Agent),
        };
        let s = p.to_cached_section();
        assert!(s.cached);
        assert_eq!(s.cache_info.unwrap().interval, 60);
        assert!(!p.is_outdated(159));
        assert!(p.is_outdated(160));
    }
}
