/// Farm submission
///
/// Order of work for one submission:
/// 1. Preconditions (session, display name, name), each a hard stop
/// 2. Form validation (phone format)
/// 3. Image upload when the image is not already a durable URL.
///    A failed upload is logged and the farm is saved without an image.
/// 4. A single document write keyed by a fresh timestamp id
///
/// Upload and write are not transactional: a crash between them leaves an
/// unreferenced blob behind, but never a record pointing at a missing blob.
/// A failed write hands the uploaded URL back so a retry does not upload again.

use std::sync::Arc;
use tracing::{info, warn};

use super::data::{next_timestamp, FarmRecord};
use super::forms::FarmForm;
use super::upload::{ImageUploadPipeline, LocalImage};
use crate::backend::{Backend, DocumentStore, Session};
use crate::config::AppConfig;
use crate::error::{StoreError, SubmitError};

pub const NO_CREDENTIALS: &str = "No credentials! Try again sign in";
pub const MISSING_DISPLAY_NAME: &str = "Input the display name";
pub const MISSING_NAME: &str = "Input the name";

/// Already uploaded images are referenced by their https URL
pub fn is_durable_url(reference: &str) -> bool {
    reference.starts_with("https")
}

pub struct FarmRecordSubmitter {
    documents: Arc<dyn DocumentStore>,
    uploads: ImageUploadPipeline,
    collection: String,
}

impl FarmRecordSubmitter {
    pub fn new(backend: &Backend, config: &AppConfig) -> Self {
        Self::with_parts(
            Arc::clone(&backend.documents),
            ImageUploadPipeline::new(Arc::clone(&backend.blobs), config.image_namespace.clone()),
            config.farms_collection.clone(),
        )
    }

    pub fn with_parts(
        documents: Arc<dyn DocumentStore>,
        uploads: ImageUploadPipeline,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            uploads,
            collection: collection.into(),
        }
    }

    /// Validate, upload the image if needed, then persist the farm.
    /// Returns the stored record.
    pub async fn submit(
        &self,
        session: Option<&Session>,
        form: &FarmForm,
        image: Option<&str>,
    ) -> Result<FarmRecord, SubmitError> {
        let session = match session {
            Some(session) if !session.uid.is_empty() => session,
            _ => return Err(SubmitError::Rejected(NO_CREDENTIALS)),
        };
        if form.display_name.trim().is_empty() {
            return Err(SubmitError::Rejected(MISSING_DISPLAY_NAME));
        }
        if form.name.trim().is_empty() {
            return Err(SubmitError::Rejected(MISSING_NAME));
        }
        form.validate()?;

        let image = self.resolve_image(image).await;

        let record = FarmRecord {
            id: next_timestamp().to_string(),
            uid: session.uid.clone(),
            display_name: form.display_name.trim().to_string(),
            name: form.name.trim().to_string(),
            phone: form.phone(),
            open_hours: form.open_hours(),
            image,
        };

        let written = match record.to_fields() {
            Ok(fields) => self.documents.write(&self.collection, &record.id, fields).await,
            Err(e) => Err(StoreError::Serialize {
                id: record.id.clone(),
                reason: e.to_string(),
            }),
        };
        if let Err(source) = written {
            return Err(SubmitError::Store {
                source,
                image: record.image,
            });
        }

        info!("🌾 Saved farm {} ({}) for {}", record.id, record.display_name, session.email);
        Ok(record)
    }

    /// Durable URL for the submitted image, or "" when there is none
    /// or the upload failed
    async fn resolve_image(&self, image: Option<&str>) -> String {
        let reference = match image.map(str::trim) {
            Some(reference) if !reference.is_empty() => reference,
            _ => return String::new(),
        };

        if is_durable_url(reference) {
            return reference.to_string();
        }

        match self.uploads.upload(&LocalImage::new(reference)).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Image upload failed, saving farm without image: {}", e);
                String::new()
            }
        }
    }
}
