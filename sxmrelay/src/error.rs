//! Error handling for the SiriusXM relay

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SiriusXmError>;

/// Failures surfaced by the relay components
#[derive(Error, Debug)]
pub enum SiriusXmError {
    /// Transport failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream answered with an unexpected HTTP status
    #[error("Upstream returned HTTP {code}")]
    UpstreamStatus { code: u16 },

    /// Upstream answered 200 but the embedded status/message code reports a failure
    #[error("SiriusXM API error (code {code}): {message}")]
    UpstreamLogic { code: i64, message: String },

    /// Response body is missing expected fields or is not JSON
    #[error("Malformed upstream response: {0}")]
    Decode(String),

    /// Unknown channel, empty variant list, exhausted fallbacks
    #[error("Not found: {0}")]
    NotFound(String),

    /// A cookie, token or account id could not be derived
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration layer failure (anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl From<serde_json::Error> for SiriusXmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl SiriusXmError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingCredential(what.into())
    }

    /// Session-expired message codes returned by the now-playing endpoint
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::UpstreamLogic { code: 201 | 208, .. })
    }

    /// HTTP 401/403 from upstream
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::UpstreamStatus { code: 401 | 403 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let expired = SiriusXmError::UpstreamLogic {
            code: 208,
            message: "expired".into(),
        };
        assert!(expired.is_session_expired());
        assert!(!expired.is_auth_error());

        assert!(SiriusXmError::UpstreamStatus { code: 403 }.is_auth_error());
        assert!(!SiriusXmError::UpstreamStatus { code: 404 }.is_auth_error());
    }

    #[test]
    fn test_json_error_becomes_decode() {
        let err: SiriusXmError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, SiriusXmError::Decode(_)));
    }
}
