//! Atomic file persistence: write to a temp file in the same directory,
//! then rename over the target. Shared by the credential store, the resume
//! state writer, and (for its own index file) the JSONL sink, so the one
//! crash-safety primitive is proven once instead of three times.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Serialize `value` to pretty JSON and persist it atomically at `path`.
///
/// Writes to `<parent>/.{file_name}.tmp.{pid}`, sets `0600` permissions on
/// unix (the file may contain tokens), then renames over `path`. A reader
/// can never observe a partially-written file.
pub async fn write_atomic_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic_bytes(path, json.as_bytes()).await
}

/// Persist `bytes` atomically at `path` via temp-file + rename, `0600` on
/// unix. Shared by `write_atomic_json` and by the JSONL sink's compressed
/// modes, which must rewrite the whole compressed file rather than append.
pub async fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("path has no file name: {}", path.display())))?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&tmp_path, bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;
    debug!(path = %path.display(), "persisted file atomically");
    Ok(())
}

/// Read and parse a JSON file, treating a missing or corrupt file as
/// `Ok(None)` rather than an error — callers apply the `state-corrupt`
/// policy (log at warn, rename aside, continue as absent) at the call site
/// because only they know the right default value to fall back to.
pub async fn read_json_lenient<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = tokio::fs::read_to_string(path).await?;
    match serde_json::from_str(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt file, renaming aside");
            let backup = path.with_extension("bak");
            let _ = tokio::fs::rename(path, &backup).await;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        value: u32,
    }

    #[tokio::test]
    async fn roundtrip_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_atomic_json(&path, &Doc { value: 7 }).await.unwrap();
        let read: Option<Doc> = read_json_lenient(&path).await.unwrap();
        assert_eq!(read, Some(Doc { value: 7 }));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let read: Option<Doc> = read_json_lenient(&path).await.unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn corrupt_file_renamed_aside_and_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let read: Option<Doc> = read_json_lenient(&path).await.unwrap();
        assert_eq!(read, None);
        assert!(path.with_extension("bak").exists());
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("doc.json");
        write_atomic_json(&path, &Doc { value: 1 }).await.unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic_json(&path, &Doc { value: 1 }).await.unwrap();
        let mode = tokio::fs::metadata(&path)
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
