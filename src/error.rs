/// Error types shared by the backend, the core flows and the screens
///
/// Every error here is scoped to a single user action; none of them
/// bring the application down once the window is open.

use std::fmt;
use thiserror::Error;

/// Failures reported by the authentication gateway.
/// The `Display` text is shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("The email address is badly formatted.")]
    InvalidEmail,

    #[error("Password should be at least 6 characters.")]
    WeakPassword,

    #[error("The email address is already in use by another account.")]
    EmailInUse,

    #[error("The email or password is incorrect.")]
    WrongCredentials,

    #[error("Authentication backend failure: {0}")]
    Backend(String),
}

/// A single inline form error, attached to the field that caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Form validation result: one or more fields need correcting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Message for a given field, if that field failed
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Blob storage failures
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid blob key: {0:?}")]
    InvalidKey(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Not a URL of this blob store: {0}")]
    UnknownUrl(String),

    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image upload failures. Callers treat both as "no upload happened".
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read image {reference}: {reason}")]
    Fetch { reference: String, reason: String },

    #[error("Failed to store image: {0}")]
    Write(#[from] BlobError),
}

/// Document store failures
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Failed to write document: {0}")]
    Write(String),

    #[error("Live query failed: {0}")]
    Query(String),

    #[error("Malformed document {id}: {reason}")]
    Serialize { id: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Write(e.to_string())
    }
}

/// Reasons a farm submission did not produce a record
#[derive(Error, Debug, Clone)]
pub enum SubmitError {
    /// A precondition failed; the message goes straight to an alert
    #[error("{0}")]
    Rejected(&'static str),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The record was not saved. `image` is what the record would have
    /// referenced, so a retry can reuse an image that was already uploaded.
    #[error("{source}")]
    Store {
        #[source]
        source: StoreError,
        image: String,
    },
}

impl SubmitError {
    /// Durable URL uploaded during a submission that failed afterwards
    pub fn uploaded_image(&self) -> Option<&str> {
        match self {
            SubmitError::Store { image, .. } if !image.is_empty() => Some(image),
            _ => None,
        }
    }
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine a data directory")]
    NoDataDir,

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Startup failures while opening the local backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lookup() {
        let err = ValidationError {
            errors: vec![
                FieldError::new("name", "Required"),
                FieldError::new("phone", "Invalid phone number"),
            ],
        };

        assert_eq!(err.message_for("phone"), Some("Invalid phone number"));
        assert_eq!(err.message_for("display_name"), None);
        assert_eq!(err.to_string(), "name: Required, phone: Invalid phone number");
    }

    #[test]
    fn test_store_failure_keeps_uploaded_image() {
        let err = SubmitError::Store {
            source: StoreError::Write("offline".to_string()),
            image: "https://cdn.test/farms/1".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to write document: offline");
        assert_eq!(err.uploaded_image(), Some("https://cdn.test/farms/1"));

        let without = SubmitError::Store {
            source: StoreError::Write("offline".to_string()),
            image: String::new(),
        };
        assert_eq!(without.uploaded_image(), None);
    }

    #[test]
    fn test_rejection_displays_verbatim() {
        let err = SubmitError::Rejected("Input the name");
        assert_eq!(err.to_string(), "Input the name");
    }
}
