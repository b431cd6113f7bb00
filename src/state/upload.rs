/// Image upload pipeline
///
/// Turns a picked image (a local path or `file://` URI) into a durable URL:
/// read the bytes, store them under `<namespace><timestamp>`, ask the blob
/// store for the URL. No retries; the caller decides what a failure means.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::data::next_timestamp;
use crate::backend::BlobStore;
use crate::error::UploadError;

/// Transient reference to an image on this device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    reference: String,
}

impl LocalImage {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy().to_string())
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Filesystem path behind the reference
    pub fn path(&self) -> PathBuf {
        let path = self
            .reference
            .strip_prefix("file://")
            .unwrap_or(&self.reference);
        PathBuf::from(path)
    }
}

pub struct ImageUploadPipeline {
    blobs: Arc<dyn BlobStore>,
    namespace: String,
}

impl ImageUploadPipeline {
    pub fn new(blobs: Arc<dyn BlobStore>, namespace: impl Into<String>) -> Self {
        Self {
            blobs,
            namespace: namespace.into(),
        }
    }

    /// Upload one image and return its durable URL
    pub async fn upload(&self, image: &LocalImage) -> Result<String, UploadError> {
        let bytes = fetch_image(image).await?;

        let key = format!("{}{}", self.namespace, next_timestamp());
        self.blobs.put(&key, bytes).await?;
        let url = self.blobs.durable_url(&key).await?;

        info!("📸 Uploaded {} as {}", image.reference(), key);
        Ok(url)
    }
}

/// Read the image bytes and make sure they really are an image
async fn fetch_image(image: &LocalImage) -> Result<Vec<u8>, UploadError> {
    let fetch_error = |reason: String| UploadError::Fetch {
        reference: image.reference().to_string(),
        reason,
    };

    let bytes = tokio::fs::read(image.path())
        .await
        .map_err(|e| fetch_error(e.to_string()))?;

    if bytes.is_empty() {
        return Err(fetch_error("file is empty".to_string()));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| fetch_error(format!("not a recognised image: {}", e)))?;

    debug!(
        "Read {} bytes of {} from {}",
        bytes.len(),
        format.to_mime_type(),
        image.reference()
    );
    Ok(bytes)
}
