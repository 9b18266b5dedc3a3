//! Request validation shared by handlers and the CLI.

use std::collections::HashMap;

use crate::config;
use crate::error::ApiError;

/// Accumulates per-field problems so a response can report all of them at once
#[derive(Debug, Default)]
pub struct FieldErrors(HashMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(msg) = result {
            self.0.entry(field.to_string()).or_insert(msg);
        }
        self
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("Validation failed", Some(self.0)))
        }
    }
}

pub fn username(username: &str) -> Result<(), String> {
    if username.len() < 3 {
        return Err("Username must be at least 3 characters".to_string());
    }
    if username.len() > 32 {
        return Err("Username must be at most 32 characters".to_string());
    }
    // Allow alphanumeric, underscore, hyphen
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err("Username can only contain letters, numbers, underscore, and hyphen".to_string());
    }
    if !username.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err("Username must start with a letter or number".to_string());
    }
    Ok(())
}

pub fn email(email: &str) -> Result<(), String> {
    let (local, domain) = email.split_once('@').ok_or_else(|| "Invalid email format".to_string())?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err("Invalid email format".to_string());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err("Invalid email domain".to_string());
    }
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn password(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    // bcrypt ignores input past 72 bytes
    if password.len() > 72 {
        return Err("Password must be at most 72 bytes".to_string());
    }
    Ok(())
}

pub fn title(title: &str) -> Result<(), String> {
    let forum = &config::config().forum;
    let len = title.trim().chars().count();
    if len < forum.min_title_length {
        return Err(format!("Title must be at least {} characters", forum.min_title_length));
    }
    if len > forum.max_title_length {
        return Err(format!("Title must be at most {} characters", forum.max_title_length));
    }
    Ok(())
}

pub fn body(body: &str) -> Result<(), String> {
    let max = config::config().forum.max_body_length;
    if body.trim().is_empty() {
        return Err("Body cannot be empty".to_string());
    }
    if body.chars().count() > max {
        return Err(format!("Body must be at most {} characters", max));
    }
    Ok(())
}

pub fn message_body(body: &str) -> Result<(), String> {
    let max = config::config().forum.max_message_length;
    if body.trim().is_empty() {
        return Err("Message cannot be empty".to_string());
    }
    if body.chars().count() > max {
        return Err(format!("Message must be at most {} characters", max));
    }
    Ok(())
}

/// Empty clears the display name
pub fn display_name(name: &str) -> Result<(), String> {
    if name.trim().chars().count() > 64 {
        return Err("Display name must be at most 64 characters".to_string());
    }
    Ok(())
}

pub fn bio(bio: &str) -> Result<(), String> {
    if bio.chars().count() > 2000 {
        return Err("Bio must be at most 2000 characters".to_string());
    }
    Ok(())
}

pub fn reason(reason: &str) -> Result<(), String> {
    let len = reason.trim().chars().count();
    if len < 3 {
        return Err("Reason must be at least 3 characters".to_string());
    }
    if len > 1000 {
        return Err("Reason must be at most 1000 characters".to_string());
    }
    Ok(())
}

/// Lowercase identifiers used for category slugs and role names
pub fn slug(value: &str) -> Result<(), String> {
    if value.is_empty() || value.len() > 64 {
        return Err("Must be between 1 and 64 characters".to_string());
    }
    if !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Err("Only lowercase letters, digits, '-' and '_' are allowed".to_string());
    }
    Ok(())
}

pub fn validate_slug(field: &str, value: &str) -> Result<(), ApiError> {
    slug(value).map_err(|msg| ApiError::invalid_field(field, msg))
}
