// Versioned blob helpers shared by the fetch cache files and the result store.
// Layout: [version: u8][wincode payload]. An unknown version is treated as unreadable.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) const CACHE_ENTRY_VERSION: u8 = 1;
pub(crate) const PERSISTED_SECTIONS_VERSION: u8 = 1;
pub(crate) const STORED_SECTIONS_VERSION: u8 = 1;
pub(crate) const CYCLE_REPORT_VERSION: u8 = 1;

pub(crate) fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

/// Payload after the version byte, or `None` if the blob is empty or of another version.
pub(crate) fn blob_payload(bytes: &[u8], expected_version: u8) -> Option<&[u8]> {
    match bytes.split_first() {
        Some((&version, rest)) if version == expected_version => Some(rest),
        _ => None,
    }
}

pub(crate) fn blob_version(bytes: &[u8]) -> u8 {
    bytes.first().copied().unwrap_or(0)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` next to `path` under a temporary name, then rename over `path`.
/// Readers see either the old or the new file, never a partial one.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_round_trip() {
        let blob = with_version_prefix(CACHE_ENTRY_VERSION, vec![7, 8, 9]);
        assert_eq!(blob_version(&blob), CACHE_ENTRY_VERSION);
        assert_eq!(blob_payload(&blob, CACHE_ENTRY_VERSION), Some(&[7u8, 8, 9][..]));
    }

    #[test]
    fn unknown_version_is_unreadable() {
        let blob = with_version_prefix(9, vec![1]);
        assert_eq!(blob_payload(&blob, CACHE_ENTRY_VERSION), None);
        assert_eq!(blob_payload(&[], CACHE_ENTRY_VERSION), None);
        assert_eq!(blob_version(&[]), 0);
    }

    #[tokio::test]
    async fn write_atomic_replaces_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a").join("b");
        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        let leftovers = std::fs::read_dir(dir.path().join("a")).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
