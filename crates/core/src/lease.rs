use std::fmt::{Display, Formatter};

use uuid::Uuid;

use crate::{AppError, AppResult};

/// Name of one lockable resource inside a lease store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseKey(String);

impl LeaseKey {
    /// Creates a validated lease key.
    ///
    /// Keys must be non-empty, carry no surrounding whitespace and contain
    /// no control characters, so that every store adapter can embed them
    /// in its own key space verbatim.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "lease key must not be empty or whitespace".to_owned(),
            ));
        }

        if value.trim() != value {
            return Err(AppError::Validation(format!(
                "lease key '{value}' must not have leading or trailing whitespace"
            )));
        }

        if value.chars().any(char::is_control) {
            return Err(AppError::Validation(
                "lease key must not contain control characters".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for LeaseKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl From<LeaseKey> for String {
    fn from(value: LeaseKey) -> Self {
        value.0
    }
}

/// Opaque lease token issued by a lease store on successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseId(String);

impl LeaseId {
    /// Wraps a token returned by a store.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "lease id must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the underlying token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for LeaseId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}
