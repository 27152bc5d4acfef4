use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, FieldError};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 100;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Collects field errors and turns them into one `AppError::Validation`.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, path: &'static str, msg: &'static str) {
        self.errors.push(FieldError::body(path, msg));
    }

    pub fn required(&mut self, path: &'static str, value: Option<&str>, msg: &'static str) {
        if value.map_or(true, |v| v.trim().is_empty()) {
            self.fail(path, msg);
        }
    }

    pub fn present(&mut self, path: &'static str, value: Option<&str>, msg: &'static str) {
        if value.is_none() {
            self.fail(path, msg);
        }
    }

    pub fn username(&mut self, value: &str) {
        if value.trim().is_empty() {
            self.fail("username", "Username is required");
        } else if value.trim().chars().count() > MAX_USERNAME_LEN {
            self.fail("username", "Username must be at most 50 characters");
        }
    }

    pub fn email(&mut self, value: &str) {
        if !is_valid_email(&normalize_email(value)) {
            self.fail("email", "Please include a valid email");
        }
    }

    pub fn password(&mut self, path: &'static str, value: &str) {
        if value.chars().count() < MIN_PASSWORD_LEN {
            self.fail(path, "Password must be at least 6 characters");
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}
