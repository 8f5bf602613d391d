// src/utils/validation.rs
use crate::errors::{HaulageError as AppError, ValidationError};

/// Collects field errors so a request can be rejected with all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    pub fn require_text(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "must not be empty")
    }

    pub fn require_positive(&mut self, value: f64, field: &str) -> &mut Self {
        self.check(value.is_finite() && value > 0.0, field, "must be a positive number")
    }

    pub fn require_pin(&mut self, pin: &str, field: &str) -> &mut Self {
        self.check(is_valid_pin(pin), field, "must be 4 to 6 digits")
    }

    pub fn require_phone(&mut self, phone: &str, field: &str) -> &mut Self {
        self.check(is_valid_phone(phone), field, "must be a phone number")
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationFailed(std::mem::take(&mut self.errors)))
        }
    }
}

pub fn is_valid_pin(pin: &str) -> bool {
    (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Digits with an optional leading `+`, 9 to 15 digits long.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (9..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}
