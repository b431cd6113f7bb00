/// Login and SignUp screens
///
/// Both are an email + password form; they differ in validation (sign-up
/// enforces the minimum password length) and in the gateway call.

use iced::widget::{button, column, container, text, text_input};
use iced::{Alignment, Element, Length, Task};
use std::sync::Arc;
use tracing::info;

use super::{error_text, field_error, Action, Context, Route};
use crate::backend::Session;
use crate::error::{AuthError, ValidationError};
use crate::state::forms::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Login,
    SignUp,
}

#[derive(Debug)]
pub struct State {
    mode: Mode,
    credentials: Credentials,
    errors: Option<ValidationError>,
    alert: Option<String>,
    busy: bool,
}

#[derive(Debug, Clone)]
pub enum Message {
    EmailChanged(String),
    PasswordChanged(String),
    Submit,
    Finished(Result<Session, AuthError>),
    SwitchMode,
}

impl State {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            credentials: Credentials::default(),
            errors: None,
            alert: None,
            busy: false,
        }
    }

    pub fn update(&mut self, message: Message, context: &Context) -> Action<Message> {
        match message {
            Message::EmailChanged(email) => {
                self.credentials.email = email;
                Action::None
            }
            Message::PasswordChanged(password) => {
                self.credentials.password = password;
                Action::None
            }
            Message::Submit => {
                if self.busy {
                    return Action::None;
                }

                let checked = match self.mode {
                    Mode::Login => self.credentials.validate_login(),
                    Mode::SignUp => self.credentials.validate_sign_up(),
                };
                if let Err(errors) = checked {
                    self.errors = Some(errors);
                    return Action::None;
                }

                self.errors = None;
                self.alert = None;
                self.busy = true;

                let auth = Arc::clone(&context.backend.auth);
                let Credentials { email, password } = self.credentials.clone();
                let mode = self.mode;

                Action::Run(Task::perform(
                    async move {
                        match mode {
                            Mode::Login => auth.sign_in(&email, &password).await,
                            Mode::SignUp => auth.sign_up(&email, &password).await,
                        }
                    },
                    Message::Finished,
                ))
            }
            Message::Finished(Ok(session)) => {
                self.busy = false;
                info!("Authenticated as {}", session.email);
                Action::Navigate(Route::FarmsList)
            }
            Message::Finished(Err(e)) => {
                self.busy = false;
                self.alert = Some(e.to_string());
                Action::None
            }
            Message::SwitchMode => Action::Navigate(match self.mode {
                Mode::Login => Route::SignUp,
                Mode::SignUp => Route::Login,
            }),
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let (title, submit_label, switch_label) = match self.mode {
            Mode::Login => ("Login", "Login", "Create an account"),
            Mode::SignUp => ("Sign up", "Register", "Back to login"),
        };

        let submit = button(text(submit_label))
            .on_press_maybe((!self.busy).then_some(Message::Submit))
            .padding(10);

        let content = column![
            text(title).size(32),
            text_input("Email", &self.credentials.email)
                .on_input(Message::EmailChanged)
                .on_submit(Message::Submit)
                .padding(10),
        ]
        .push_maybe(field_error(&self.errors, "email"))
        .push(
            text_input("Password", &self.credentials.password)
                .on_input(Message::PasswordChanged)
                .on_submit(Message::Submit)
                .secure(true)
                .padding(10),
        )
        .push_maybe(field_error(&self.errors, "password"))
        .push(submit)
        .push(button(text(switch_label)).on_press(Message::SwitchMode))
        .push_maybe(self.alert.as_deref().map(error_text))
        .spacing(12)
        .padding(40)
        .max_width(420)
        .align_x(Alignment::Center);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }
}
