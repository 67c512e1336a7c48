//! Error types for the portcullis-connect crate

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectError>;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Access API returned {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("Failed to decode {kind} response: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} response is missing field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Unrecognized {kind} list response: {detail}")]
    UnexpectedShape {
        kind: &'static str,
        detail: String,
    },

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ConnectError {
    /// HTTP status reported by the remote service, if the failure carried one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ConnectError::UnexpectedStatus { status, .. } => Some(*status),
            ConnectError::Http(e) => e.status(),
            _ => None,
        }
    }

    /// True for 401/403 responses
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::FORBIDDEN) | Some(StatusCode::UNAUTHORIZED)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_exposed_for_unexpected_status() {
        let err = ConnectError::UnexpectedStatus {
            status: StatusCode::FORBIDDEN,
            body: "identity lookups are not allowed".to_string(),
        };

        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_missing_field_has_no_status() {
        let err = ConnectError::MissingField {
            kind: "socket",
            field: "id",
        };

        assert_eq!(err.status(), None);
        assert!(!err.is_permission_denied());
    }
}
