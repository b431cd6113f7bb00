/// AddFarm screen
///
/// Form fields, an optional picked image and a submit button. Form errors
/// are shown inline; submission errors end up in the alert line. A
/// successful submission goes back to the list. When saving fails after the
/// image was uploaded, the screen keeps the uploaded URL for the retry.

use iced::widget::{button, column, scrollable, text, text_input};
use iced::{Element, Length, Task};
use rfd::FileDialog;
use tracing::info;

use super::{error_text, field_error, Action, Context, Route};
use crate::error::{SubmitError, ValidationError};
use crate::state::data::FarmRecord;
use crate::state::forms::FarmForm;
use crate::state::submit::{is_durable_url, FarmRecordSubmitter};

/// Extensions offered by the image picker
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

#[derive(Debug, Default)]
pub struct State {
    form: FarmForm,
    /// Picked image: a local path, or its durable URL once uploaded
    image: Option<String>,
    errors: Option<ValidationError>,
    alert: Option<String>,
    uploading: bool,
}

#[derive(Debug, Clone)]
pub enum Message {
    DisplayNameChanged(String),
    NameChanged(String),
    PhoneChanged(String),
    OpenHoursChanged(String),
    PickImage,
    Submit,
    Submitted(Result<FarmRecord, SubmitError>),
    Back,
}

impl State {
    pub fn update(&mut self, message: Message, context: &Context) -> Action<Message> {
        match message {
            Message::DisplayNameChanged(value) => {
                self.form.display_name = value;
                Action::None
            }
            Message::NameChanged(value) => {
                self.form.name = value;
                Action::None
            }
            Message::PhoneChanged(value) => {
                self.form.phone = value;
                Action::None
            }
            Message::OpenHoursChanged(value) => {
                self.form.open_hours = value;
                Action::None
            }
            Message::PickImage => {
                let picked = FileDialog::new()
                    .set_title("Select a farm image")
                    .add_filter("Images", &IMAGE_EXTENSIONS)
                    .pick_file();

                if let Some(path) = picked {
                    info!("Picked image {}", path.display());
                    self.image = Some(path.to_string_lossy().to_string());
                }
                Action::None
            }
            Message::Submit => {
                if self.uploading {
                    return Action::None;
                }
                if let Err(errors) = self.form.validate() {
                    self.errors = Some(errors);
                    return Action::None;
                }

                self.errors = None;
                self.alert = None;
                self.uploading = true;

                let submitter = FarmRecordSubmitter::new(&context.backend, &context.config);
                let session = context.backend.auth.current_session();
                let form = self.form.clone();
                let image = self.image.clone();

                Action::Run(Task::perform(
                    async move {
                        submitter
                            .submit(session.as_ref(), &form, image.as_deref())
                            .await
                    },
                    Message::Submitted,
                ))
            }
            Message::Submitted(Ok(record)) => {
                self.uploading = false;
                self.image = None;
                info!("Farm {} created", record.id);
                Action::Navigate(Route::FarmsList)
            }
            Message::Submitted(Err(e)) => {
                self.uploading = false;
                if let Some(url) = e.uploaded_image() {
                    info!("Keeping uploaded image {} for the next attempt", url);
                    self.image = Some(url.to_string());
                }
                self.alert = Some(e.to_string());
                Action::None
            }
            Message::Back => {
                self.image = None;
                Action::Navigate(Route::FarmsList)
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let image_label = match &self.image {
            Some(url) if is_durable_url(url) => "Image uploaded".to_string(),
            Some(path) => format!("Image: {}", path),
            None => "Add image (optional)".to_string(),
        };

        let submit = button(text(if self.uploading { "Uploading..." } else { "Submit" }))
            .on_press_maybe((!self.uploading).then_some(Message::Submit))
            .padding(12)
            .width(Length::Fill);

        let form = column![
            button("< Back").on_press(Message::Back),
            text_input("Display name", &self.form.display_name)
                .on_input(Message::DisplayNameChanged)
                .padding(10),
        ]
        .push_maybe(field_error(&self.errors, "display_name"))
        .push(
            text_input("Name", &self.form.name)
                .on_input(Message::NameChanged)
                .padding(10),
        )
        .push_maybe(field_error(&self.errors, "name"))
        .push(
            text_input("Phone number (optional)", &self.form.phone)
                .on_input(Message::PhoneChanged)
                .padding(10),
        )
        .push_maybe(field_error(&self.errors, "phone"))
        .push(
            text_input("Open hours (optional)", &self.form.open_hours)
                .on_input(Message::OpenHoursChanged)
                .padding(10),
        )
        .push(button(text(image_label)).on_press(Message::PickImage))
        .push(submit)
        .push_maybe(self.alert.as_deref().map(error_text))
        .spacing(15)
        .padding(20);

        scrollable(form).height(Length::Fill).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::config::AppConfig;
    use crate::error::StoreError;
    use crate::state::forms::{INVALID_PHONE, REQUIRED};
    use crate::state::submit::NO_CREDENTIALS;

    fn context(dir: &std::path::Path) -> Context {
        let config = AppConfig::default_with_dir(dir.to_path_buf());
        Context {
            backend: Backend::open_local(&config).unwrap(),
            config,
        }
    }

    #[test]
    fn test_invalid_form_is_not_submitted() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        let mut state = State::default();

        state.update(Message::PhoneChanged("12".to_string()), &context);
        let action = state.update(Message::Submit, &context);

        assert!(matches!(action, Action::None));
        assert!(!state.uploading);
        let errors = state.errors.as_ref().unwrap();
        assert_eq!(errors.message_for("display_name"), Some(REQUIRED));
        assert_eq!(errors.message_for("phone"), Some(INVALID_PHONE));
    }

    #[test]
    fn test_submission_result_handling() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        let mut state = State {
            uploading: true,
            image: Some("/tmp/barn.png".to_string()),
            ..Default::default()
        };

        let failed = state.update(
            Message::Submitted(Err(SubmitError::Rejected(NO_CREDENTIALS))),
            &context,
        );
        assert!(matches!(failed, Action::None));
        assert_eq!(state.alert.as_deref(), Some("No credentials! Try again sign in"));
        assert_eq!(state.image.as_deref(), Some("/tmp/barn.png"));

        let done = state.update(Message::Submitted(Ok(FarmRecord::default())), &context);
        assert!(matches!(done, Action::Navigate(Route::FarmsList)));
        assert!(state.image.is_none());
    }

    #[test]
    fn test_failed_save_keeps_uploaded_image() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        let mut state = State {
            uploading: true,
            image: Some("/tmp/barn.png".to_string()),
            ..Default::default()
        };

        state.update(
            Message::Submitted(Err(SubmitError::Store {
                source: StoreError::Write("offline".to_string()),
                image: "https://cdn.test/farms/1".to_string(),
            })),
            &context,
        );

        assert!(!state.uploading);
        assert_eq!(state.image.as_deref(), Some("https://cdn.test/farms/1"));
        assert_eq!(state.alert.as_deref(), Some("Failed to write document: offline"));
    }
}
