//! Local-first form validation.
//!
//! Every rule runs before any remote call: a form that fails validation
//! produces zero backend traffic. Failures are human-readable messages,
//! matched to fields by the UI via substring checks.

use crate::error::ValidationError;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Registration form state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl RegistrationForm {
    /// Validate all fields. Returns the first failing rule, in the order
    /// the user reads the form: completeness, then password strength.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::new("Fill in all fields"));
        }
        if !self.is_password_valid() {
            return Err(ValidationError::new("Password is invalid"));
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.username.is_empty()
            || self.email.is_empty()
            || self.password.is_empty()
            || self.password_confirmation.is_empty()
    }

    fn is_password_valid(&self) -> bool {
        if self.password.len() < MIN_PASSWORD_LEN
            || self.password_confirmation.len() < MIN_PASSWORD_LEN
        {
            return false;
        }
        self.password == self.password_confirmation
    }
}

/// Login form state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(ValidationError::new("Fill in all fields"));
        }
        Ok(())
    }
}

/// A message draft must be non-empty before it is sent.
pub fn validate_draft(draft: &str) -> Result<(), ValidationError> {
    if draft.is_empty() {
        return Err(ValidationError::new("Add a message"));
    }
    Ok(())
}

/// "Add channel" form state. Both fields are required; an incomplete form
/// simply does not submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelForm {
    pub name: String,
    pub details: String,
}

impl ChannelForm {
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.details.is_empty()
    }
}
