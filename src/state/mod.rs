/// State management module
///
/// This module holds the farm domain and the flows that move it:
/// - Farm records and id generation (data.rs)
/// - Form validation for credentials and farms (forms.rs)
/// - Image upload to blob storage (upload.rs)
/// - Farm submission: validate, upload, persist (submit.rs)
/// - Live, owner-scoped farm list (subscription.rs)

pub mod data;
pub mod forms;
pub mod submit;
pub mod subscription;
pub mod upload;
