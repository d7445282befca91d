// Piggyback spool: data one host delivers on behalf of others.
// Layout: <dir>/<target host>/<source host>, one file of raw agent lines per pair.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tracing::{debug, instrument, warn};

use crate::blob;
use crate::config::PiggybackConfig;

#[derive(Debug, Clone)]
pub struct PiggybackSpool {
    dir: PathBuf,
    max_age: Duration,
}

/// Payload assembled for one target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiggybackData {
    pub payload: Vec<u8>,
    /// Source hosts that contributed, in name order.
    pub sources: Vec<String>,
}

impl PiggybackSpool {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn from_config(config: &PiggybackConfig) -> Self {
        Self::new(&config.dir, Duration::from_secs(config.max_age_secs))
    }

    pub fn file_path(&self, target: &str, source_host: &str) -> PathBuf {
        self.dir.join(target).join(source_host)
    }

    /// Concatenate every non-outdated file for `target`, ordered by source host name.
    /// Returns `Ok(None)` when there is nothing to read.
    pub async fn read_for(&self, target: &str) -> std::io::Result<Option<PiggybackData>> {
        let dir = self.dir.join(target);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Temp files of an in-progress write.
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .unwrap_or_default();
            if age > self.max_age {
                debug!(target_host = target, source_host = %name, age_secs = age.as_secs(), "Skipping outdated piggyback file");
                continue;
            }
            files.push((name, entry.path()));
        }
        if files.is_empty() {
            return Ok(None);
        }
        files.sort();
        let mut payload = Vec::new();
        let mut sources = Vec::with_capacity(files.len());
        for (name, path) in files {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    payload.extend_from_slice(&bytes);
                    if !bytes.ends_with(b"\n") {
                        payload.push(b'\n');
                    }
                    sources.push(name);
                }
                // Replaced or removed between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        if sources.is_empty() {
            return Ok(None);
        }
        Ok(Some(PiggybackData { payload, sources }))
    }

    /// Write the blocks `source_host` delivered this cycle and drop its files for targets
    /// it no longer reports.
    #[instrument(skip(self, blocks), fields(operation = "piggyback_store", targets = blocks.len()))]
    pub async fn store(
        &self,
        source_host: &str,
        blocks: &BTreeMap<String, Vec<String>>,
    ) -> std::io::Result<()> {
        for (target, lines) in blocks {
            let mut content = lines.join("\n");
            content.push('\n');
            blob::write_atomic(&self.file_path(target, source_host), content.as_bytes()).await?;
        }
        let keep: HashSet<&str> = blocks.keys().map(String::as_str).collect();
        self.remove_stale(source_host, &keep).await
    }

    async fn remove_stale(&self, source_host: &str, keep: &HashSet<&str>) -> std::io::Result<()> {
        let mut targets = match tokio::fs::read_dir(&self.dir).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(entry) = targets.next_entry().await? {
            let target = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(target.as_str()) {
                continue;
            }
            let path = entry.path().join(source_host);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(target_host = %target, source_host, "Removed piggyback file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove piggyback file")
                }
            }
        }
        Ok(())
    }
}
