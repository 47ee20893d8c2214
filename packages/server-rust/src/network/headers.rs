//! Caller identity read from HTTP request headers.

use axum::http::HeaderMap;

use super::config::{
    CORRELATION_ID_HEADER, IDEMPOTENCY_KEY_HEADER, TENANT_ID_HEADER, USER_ID_HEADER,
};
use crate::service::identity::{parse_identity_uuid, require_token, IdentityError, RequestIdentity};
use crate::traits::IdentitySource;

/// [`IdentitySource`] over the headers of one request.
#[derive(Debug, Clone, Copy)]
pub struct HeaderIdentity<'a> {
    headers: &'a HeaderMap,
}

impl<'a> HeaderIdentity<'a> {
    #[must_use]
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self { headers }
    }

    /// Header value as text. Absent headers are `Missing`; values that are
    /// not visible ASCII are `Invalid` with a lossy rendering.
    fn required(&self, name: &str) -> Result<&'a str, IdentityError> {
        let value = self
            .headers
            .get(name)
            .ok_or_else(|| IdentityError::missing(name))?;
        value
            .to_str()
            .map_err(|_| IdentityError::invalid(name, String::from_utf8_lossy(value.as_bytes())))
    }

    fn uuid(&self, name: &str) -> Result<uuid::Uuid, IdentityError> {
        parse_identity_uuid(name, self.required(name)?)
    }
}

impl IdentitySource for HeaderIdentity<'_> {
    fn request_identity(&self) -> Result<RequestIdentity, IdentityError> {
        Ok(RequestIdentity {
            tenant_id: self.uuid(TENANT_ID_HEADER)?,
            user_id: self.uuid(USER_ID_HEADER)?,
            correlation_id: self.required(CORRELATION_ID_HEADER)?.to_string(),
        })
    }

    fn idempotency_key(&self) -> Result<String, IdentityError> {
        require_token(IDEMPOTENCY_KEY_HEADER, self.required(IDEMPOTENCY_KEY_HEADER)?)
    }
}
