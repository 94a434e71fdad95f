//! Blob storage abstraction.
//!
//! The [`BlobStore`] trait covers the three blob namespaces the pipeline
//! writes: cached source files under `skills/`, published listing
//! snapshots under `cache/`, and cold-storage records under `archive/`.
//! Keys are slash-separated relative paths. [`FsBlobStore`] maps them
//! onto a directory tree; [`MemoryBlobStore`] backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `content` at `key`, replacing any existing blob.
    async fn put(&self, key: &str, content: &str) -> Result<()>;

    /// Read the blob at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete the blob at `key`. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every blob whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// List keys under `prefix`, in unspecified order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|c| c.is_empty() || c == "..")
    {
        anyhow::bail!("Invalid blob key: {}", key);
    }
    Ok(())
}

/// Key prefix for a skill's cached source files. Root-level skills use the
/// repository prefix directly; nested skills append their repo-relative path.
pub fn skill_prefix(owner: &str, repo: &str, skill_path: &str) -> String {
    if skill_path.is_empty() {
        format!("skills/{}/{}", owner, repo)
    } else {
        format!("skills/{}/{}/{}", owner, repo, skill_path)
    }
}

/// Cold-storage key for an archived record, bucketed by the month the
/// record was first created so the key stays stable across re-archival.
pub fn archive_key(created_at: chrono::DateTime<chrono::Utc>, id: &str) -> String {
    use chrono::Datelike;
    format!(
        "archive/{}/{:02}/{}.json",
        created_at.year(),
        created_at.month(),
        id
    )
}

/// Filesystem-backed blob store rooted at a configured directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_files(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, content: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create blob directory for: {}", key))?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write blob: {}", key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read blob: {}", key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete blob: {}", key)),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let path = self.path_for(prefix)?;
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to delete blobs under: {}", prefix))?;
        } else if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete blob: {}", prefix))?;
        }
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.path_for(prefix)?;
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        Self::collect_files(&path, &mut files)?;
        let mut keys = Vec::new();
        for file in files {
            let rel = file
                .strip_prefix(&self.root)
                .with_context(|| format!("Blob path escapes root: {}", file.display()))?;
            keys.push(rel.to_string_lossy().replace('\\', "/"));
        }
        Ok(keys)
    }
}

/// In-memory blob store for tests.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content: &str) -> Result<()> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().unwrap();
        blobs.insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let blobs = self.blobs.read().unwrap();
        Ok(blobs.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut blobs = self.blobs.write().unwrap();
        blobs.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut blobs = self.blobs.write().unwrap();
        blobs.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read().unwrap();
        Ok(blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_prefix_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("skills/octo/tools/SKILL.md", "# hi").await.unwrap();
        store.put("skills/octo/tools/README.md", "readme").await.unwrap();
        store.put("cache/trending.json", "{}").await.unwrap();

        assert_eq!(
            store.get("skills/octo/tools/SKILL.md").await.unwrap(),
            Some("# hi".to_string())
        );
        assert_eq!(store.get("skills/octo/missing.md").await.unwrap(), None);

        let mut keys = store.list_prefix("skills/octo/tools").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "skills/octo/tools/README.md".to_string(),
                "skills/octo/tools/SKILL.md".to_string()
            ]
        );

        store.delete_prefix("skills/octo/tools").await.unwrap();
        assert_eq!(store.get("skills/octo/tools/SKILL.md").await.unwrap(), None);
        assert_eq!(
            store.get("cache/trending.json").await.unwrap(),
            Some("{}".to_string())
        );
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(skill_prefix("octo", "tools", ""), "skills/octo/tools");
        assert_eq!(
            skill_prefix("octo", "tools", "skills/pdf"),
            "skills/octo/tools/skills/pdf"
        );
        let created = chrono::DateTime::parse_from_rfc3339("2025-07-03T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(archive_key(created, "abc"), "archive/2025/07/abc.json");
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.put("../escape.txt", "x").await.is_err());
        assert!(store.put("/abs.txt", "x").await.is_err());
        assert!(store.get("skills/../../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_matches_contract() {
        let store = MemoryBlobStore::new();
        store.put("archive/2025/07/abc.json", "{}").await.unwrap();
        assert_eq!(
            store.get("archive/2025/07/abc.json").await.unwrap(),
            Some("{}".to_string())
        );
        store.delete("archive/2025/07/abc.json").await.unwrap();
        assert_eq!(store.get("archive/2025/07/abc.json").await.unwrap(), None);
        // deleting again is a no-op
        store.delete("archive/2025/07/abc.json").await.unwrap();
    }
}
