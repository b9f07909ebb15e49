//! Provider error types.

use thiserror::Error;

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by a [`CloudProvider`](crate::CloudProvider)
/// implementation.
///
/// Status 404 is the only code callers treat specially: operations that
/// track a resource suppress it where the resource may have been removed
/// out of band.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider API rejected the request with an HTTP status code.
    #[error("provider api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced a provider response.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Shorthand for a 404 API error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Api {
            status: 404,
            message: message.into(),
        }
    }

    /// Whether this error is a 404 from the provider API.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected() {
        assert!(ProviderError::not_found("no such instance").is_not_found());
    }

    #[test]
    fn other_statuses_are_not_not_found() {
        let err = ProviderError::Api {
            status: 429,
            message: "TooManyRequests".to_string(),
        };
        assert!(!err.is_not_found());
        assert!(!ProviderError::Transport("connection reset".to_string()).is_not_found());
    }

    #[test]
    fn display_includes_status() {
        let err = ProviderError::Api {
            status: 404,
            message: "NotAuthorizedOrNotFound".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "provider api error (404): NotAuthorizedOrNotFound"
        );
    }
}
