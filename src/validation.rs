//! Request payload validation rules shared by registration and account
//! management handlers.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 2;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // Deliberately permissive; the identity provider is the final arbiter.
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex must compile")
});

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// # Errors
/// Returns a user-facing message when the email is malformed.
pub fn validate_email(email: &str) -> Result<(), String> {
    if valid_email(email) {
        Ok(())
    } else {
        Err("Invalid email address".to_string())
    }
}

/// # Errors
/// Returns a user-facing message when the password is too short.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ))
    } else {
        Ok(())
    }
}

/// # Errors
/// Returns a user-facing message when the name is too short.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        Err(format!("Name must be at least {MIN_NAME_LEN} characters"))
    } else {
        Ok(())
    }
}
