use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::BlobStore;
use crate::error::BlobError;

/// Blob store that keeps every blob as a file under `root`.
///
/// Keys map to relative paths (`farms/1700000000000` → `<root>/farms/1700000000000`).
/// Durable URLs are `public_base_url` followed by the key.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn open(root: PathBuf, public_base_url: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;

        let mut public_base_url = public_base_url.to_string();
        if !public_base_url.ends_with('/') {
            public_base_url.push('/');
        }

        Ok(Self {
            root,
            public_base_url,
        })
    }

    /// Resolve a key to its file, rejecting anything that could escape `root`
    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && !key.ends_with('/')
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| BlobError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).await?;

        // Write next to the target, then rename: a key is either absent or complete
        let file_name = path
            .file_name()
            .ok_or_else(|| BlobError::InvalidKey(key.to_string()))?
            .to_string_lossy()
            .to_string();
        let partial = parent.join(format!(".{}.part", file_name));

        fs::write(&partial, &bytes).await?;
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn durable_url(&self, key: &str) -> Result<String, BlobError> {
        let path = self.path_for(key)?;
        if !fs::try_exists(&path).await? {
            return Err(BlobError::NotFound(key.to_string()));
        }
        Ok(format!("{}{}", self.public_base_url, key))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs"), "https://cdn.test").unwrap();

        store.put("farms/123", vec![1, 2, 3]).await.unwrap();

        assert_eq!(
            store.durable_url("farms/123").await.unwrap(),
            "https://cdn.test/farms/123"
        );
        assert_eq!(store.get("farms/123").await.unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join("blobs/farms/.123.part").exists());
    }

    #[tokio::test]
    async fn test_durable_url_resolves_to_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs"), "https://cdn.test").unwrap();
        store.put("farms/42", vec![7, 7]).await.unwrap();

        let url = store.durable_url("farms/42").await.unwrap();
        assert_eq!(store.key_for_url(&url).as_deref(), Some("farms/42"));
        assert_eq!(store.get_by_url(&url).await.unwrap(), vec![7, 7]);

        assert!(matches!(
            store.get_by_url("https://elsewhere.test/farms/42").await,
            Err(BlobError::UnknownUrl(_))
        ));
        assert!(matches!(
            store.get_by_url("https://cdn.test/farms/43").await,
            Err(BlobError::NotFound(_))
        ));
        assert!(matches!(
            store.get_by_url("https://cdn.test/../secret").await,
            Err(BlobError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_url_for_missing_blob_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().to_path_buf(), "https://cdn.test/").unwrap();

        assert!(matches!(
            store.durable_url("farms/404").await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs"), "https://cdn.test/").unwrap();

        for key in ["", "../outside", "/etc/passwd", "farms/", "farms/../../x", "a\\b"] {
            assert!(
                matches!(store.put(key, vec![0]).await, Err(BlobError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }
}
