/// Screens
///
/// One module per screen. Each screen owns its state, returns an `Action`
/// from `update`, and leaves navigation to the application shell.

pub mod add_farm;
pub mod auth;
pub mod farms_list;

use iced::widget::text;
use iced::{Color, Element, Task};

use crate::backend::Backend;
use crate::config::AppConfig;
use crate::error::ValidationError;

/// What every screen gets to work with
#[derive(Debug, Clone)]
pub struct Context {
    pub backend: Backend,
    pub config: AppConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    SignUp,
    FarmsList,
    AddFarm,
}

/// Outcome of a screen update
pub enum Action<M> {
    None,
    Run(Task<M>),
    Navigate(Route),
}

/// Red alert line
pub fn error_text<'a, M: 'a>(message: &str) -> Element<'a, M> {
    text(message.to_string())
        .size(14)
        .color(Color::from_rgb(0.9, 0.2, 0.2))
        .into()
}

/// Inline error under a form field, if that field failed validation
pub fn field_error<'a, M: 'a>(
    errors: &Option<ValidationError>,
    field: &str,
) -> Option<Element<'a, M>> {
    errors
        .as_ref()
        .and_then(|errors| errors.message_for(field))
        .map(error_text)
}
