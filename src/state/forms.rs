/// Form validation
///
/// Runs before anything is sent to the backend. Messages are the inline
/// texts shown under each field.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{FieldError, ValidationError};

pub const MIN_PASSWORD_LEN: usize = 6;

pub const REQUIRED: &str = "Required";
pub const INVALID_EMAIL: &str = "Invalid Email";
pub const PASSWORD_TOO_SHORT: &str = "must be of 6 characters long.";
pub const INVALID_PHONE: &str = "Invalid phone number";

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@.]+$").expect("email pattern is valid")
    })
}

/// North American number: optional +1, area code and exchange starting 2-9
fn us_phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:\+?1[\s.-]?)?(?:\(([2-9]\d{2})\)|([2-9]\d{2}))[\s.-]?([2-9]\d{2})[\s.-]?(\d{4})$",
        )
        .expect("phone pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

/// Valid US phone number (strict: must be dialable, not just digit-shaped)
pub fn is_valid_us_phone(phone: &str) -> bool {
    let Some(caps) = us_phone_pattern().captures(phone.trim()) else {
        return false;
    };

    let area = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let exchange = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

    // N11 codes are service numbers; X9X area codes are reserved
    let is_service = |code: &str| code.ends_with("11");
    !is_service(area) && !is_service(exchange) && area.as_bytes().get(1) != Some(&b'9')
}

/// Email + password, as typed on the Login and SignUp screens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate_login(&self) -> Result<(), ValidationError> {
        let mut errors = self.check_email();
        if self.password.is_empty() {
            errors.push(FieldError::new("password", REQUIRED));
        }
        finish(errors)
    }

    pub fn validate_sign_up(&self) -> Result<(), ValidationError> {
        let mut errors = self.check_email();
        if self.password.is_empty() {
            errors.push(FieldError::new("password", REQUIRED));
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::new("password", PASSWORD_TOO_SHORT));
        }
        finish(errors)
    }

    fn check_email(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.email.trim().is_empty() {
            errors.push(FieldError::new("email", REQUIRED));
        } else if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", INVALID_EMAIL));
        }
        errors
    }
}

/// Raw AddFarm form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FarmForm {
    pub display_name: String,
    pub name: String,
    pub phone: String,
    pub open_hours: String,
}

impl FarmForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.display_name.trim().is_empty() {
            errors.push(FieldError::new("display_name", REQUIRED));
        }
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", REQUIRED));
        }
        if let Some(phone) = self.phone() {
            if !is_valid_us_phone(&phone) {
                errors.push(FieldError::new("phone", INVALID_PHONE));
            }
        }

        finish(errors)
    }

    /// Phone, or `None` when left blank
    pub fn phone(&self) -> Option<String> {
        non_blank(&self.phone)
    }

    /// Open hours, or `None` when left blank
    pub fn open_hours(&self) -> Option<String> {
        non_blank(&self.open_hours)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn finish(errors: Vec<FieldError>) -> Result<(), ValidationError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}
