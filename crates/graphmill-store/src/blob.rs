//! Oversized-value store implementations.
//!
//! Objects are addressed by [`BlobLocation`]. An object that already exists
//! is never rewritten.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use graphmill_core::{BlobLocation, BlobStore, Error, Result, TypedPayload};

/// Filesystem store. `<root>/<bucket>/<key>` holds the JSON payload; the
/// storage class only appears in the locator.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, location: &BlobLocation) -> Result<PathBuf> {
        let escapes = |part: &str| part.split('/').any(|seg| seg == ".." || seg.is_empty());
        if escapes(&location.bucket) || escapes(&location.key) {
            return Err(Error::StorageTier(format!(
                "refusing path outside the blob root: {}",
                location.locator()
            )));
        }
        Ok(self.root.join(&location.bucket).join(&location.key))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn store(&self, location: &BlobLocation, value: &TypedPayload) -> Result<String> {
        let full_path = self.full_path(location)?;
        let locator = location.locator();
        if fs::try_exists(&full_path).await? {
            debug!(%locator, "blob_store: object exists, keeping it");
            return Ok(locator);
        }

        let parent = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).await.map_err(|e| {
            warn!(parent = %parent.display(), error = %e, "blob_store: create_dir_all failed");
            e
        })?;

        let data = serde_json::to_vec(value)?;
        let size = data.len();
        let target = full_path.clone();
        // Each writer gets its own temp file; the no-clobber persist loses to
        // any object that appeared since the existence check.
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let mut file = NamedTempFile::new_in(&parent)?;
            file.write_all(&data)?;
            file.as_file().sync_all()?;
            match file.persist_noclobber(&target) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error),
            }
        })
        .await
        .map_err(|e| Error::StorageTier(format!("blob write task failed: {}", e)))?
        .map_err(|e| {
            warn!(path = %full_path.display(), error = %e, "blob_store: persist failed");
            e
        })?;

        if written {
            debug!(%locator, size, "blob_store: write");
        } else {
            debug!(%locator, "blob_store: object appeared concurrently, keeping it");
        }
        Ok(locator)
    }

    async fn retrieve(&self, locator: &str) -> Result<TypedPayload> {
        let location = BlobLocation::parse(locator)?;
        let full_path = self.full_path(&location)?;
        let data = fs::read(&full_path).await.map_err(|e| {
            Error::StorageTier(format!("cannot read {}: {}", locator, e))
        })?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Process-local store keyed by locator.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, TypedPayload>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, location: &BlobLocation, value: &TypedPayload) -> Result<String> {
        let locator = location.locator();
        self.objects
            .write()
            .await
            .entry(locator.clone())
            .or_insert_with(|| value.clone());
        Ok(locator)
    }

    async fn retrieve(&self, locator: &str) -> Result<TypedPayload> {
        self.objects
            .read()
            .await
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::StorageTier(format!("no object at {}", locator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmill_core::DataType;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(text: &str) -> TypedPayload {
        TypedPayload {
            data_type: DataType::String,
            property_value: json!(text),
        }
    }

    #[tokio::test]
    async fn test_filesystem_write_and_read() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let location = BlobLocation::for_property("s3", "notes-bucket", "notes", "abc");

        let locator = store.store(&location, &payload("long text")).await.unwrap();
        assert_eq!(locator, "s3://notes-bucket/notes/abc_notes.json");
        assert!(dir.path().join("notes-bucket/notes/abc_notes.json").exists());
        let entries = std::fs::read_dir(dir.path().join("notes-bucket/notes"))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
        assert_eq!(store.retrieve(&locator).await.unwrap(), payload("long text"));
    }

    #[tokio::test]
    async fn test_filesystem_keeps_existing_object() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let location = BlobLocation::for_property("s3", "b", "notes", "abc");

        store.store(&location, &payload("first")).await.unwrap();
        let locator = store.store(&location, &payload("second")).await.unwrap();
        assert_eq!(store.retrieve(&locator).await.unwrap(), payload("first"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_one_object() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FilesystemBlobStore::new(dir.path()));
        let location = BlobLocation::for_property("s3", "b", "notes", "abc");

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let location = location.clone();
            handles.push(tokio::spawn(async move {
                store.store(&location, &payload(&format!("v{}", i))).await
            }));
        }
        let mut locators = Vec::new();
        for handle in handles {
            locators.push(handle.await.unwrap().unwrap());
        }
        assert!(locators.iter().all(|l| l == "s3://b/notes/abc_notes.json"));

        let stored = store.retrieve(&locators[0]).await.unwrap();
        let first = stored.property_value.as_str().unwrap().to_string();
        assert!(first.starts_with('v'));
        for _ in 0..3 {
            store.store(&location, &payload("late")).await.unwrap();
        }
        assert_eq!(store.retrieve(&locators[0]).await.unwrap(), stored);

        let entries = std::fs::read_dir(dir.path().join("b/notes")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_filesystem_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let location = BlobLocation {
            storage_class: "s3".to_string(),
            bucket: "..".to_string(),
            key: "x.json".to_string(),
        };
        assert!(store.store(&location, &payload("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_filesystem_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        assert!(matches!(
            store.retrieve("s3://b/notes/none.json").await.unwrap_err(),
            Error::StorageTier(_)
        ));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryBlobStore::new();
        let location = BlobLocation::for_property("s3", "b", "notes", "abc");
        let locator = store.store(&location, &payload("first")).await.unwrap();
        store.store(&location, &payload("second")).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.retrieve(&locator).await.unwrap(), payload("first"));
    }
}
