//! Caller identity read at the boundary, before any context scope opens.

use uuid::Uuid;

/// Identity failure raised by an [`IdentitySource`](crate::traits::IdentitySource).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing header '{field}'")]
    Missing { field: String },
    #[error("Invalid GUID in '{field}': '{value}'")]
    Invalid { field: String, value: String },
}

impl IdentityError {
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Name of the offending field.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }
}

/// Tenant, user and correlation id of one inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub correlation_id: String,
}

/// Parses a non-nil UUID, naming `field` on failure.
///
/// # Errors
///
/// Returns [`IdentityError::Invalid`] for malformed or nil UUIDs.
pub fn parse_identity_uuid(field: &str, value: &str) -> Result<Uuid, IdentityError> {
    match Uuid::parse_str(value.trim()) {
        Ok(id) if !id.is_nil() => Ok(id),
        _ => Err(IdentityError::invalid(field, value)),
    }
}

/// Rejects blank tokens, naming `field` on failure.
///
/// # Errors
///
/// Returns [`IdentityError::Invalid`] if `value` is empty or whitespace.
pub fn require_token(field: &str, value: &str) -> Result<String, IdentityError> {
    if value.trim().is_empty() {
        return Err(IdentityError::invalid(field, value));
    }
    Ok(value.to_string())
}
