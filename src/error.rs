// Error taxonomy shared by the indicator store, the role authority and the
// web layer.
//
// Store backends keep returning anyhow::Result with context attached; the
// services convert those into `NodeError::StoreUnavailable` at the boundary so
// callers can match on a closed set of outcomes.

use thiserror::Error;

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Error, Debug)]
pub enum NodeError {
    /// The request body or parameters could not be understood.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The presented key does not have the expected shape.
    #[error("the API key has an invalid format")]
    InvalidKeyFormat,

    /// No key, an unknown key, or a role below the one required.
    #[error("you are not authorized to perform this operation")]
    NotAuthorized,

    /// The key belongs to an account an administrator has not activated yet.
    #[error("your user has not been activated by the administrators")]
    NotActivated,

    /// The value is neither an email address nor a domain name.
    #[error("unrecognized indicator format: {0}")]
    UnrecognizedIndicatorFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Registration with an email address that is already taken.
    #[error("a user is already registered with this email address")]
    AlreadyRegistered,

    /// User management endpoints are meaningless when the node is open.
    #[error("the node does not enforce user authentication")]
    AuthNotEnforced,

    /// Any failure of the underlying store. Fatal to the request.
    #[error("store unavailable: {0:#}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl NodeError {
    /// Stable machine-readable code used in the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::InvalidRequest(_) => "invalid_request",
            NodeError::InvalidKeyFormat => "invalid_key_format",
            NodeError::NotAuthorized => "not_authorized",
            NodeError::NotActivated => "not_activated",
            NodeError::UnrecognizedIndicatorFormat(_) => "unrecognized_indicator_format",
            NodeError::NotFound(_) => "not_found",
            NodeError::AlreadyRegistered => "already_registered",
            NodeError::AuthNotEnforced => "auth_not_enforced",
            NodeError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Message safe to show to API callers. Store failures never leak detail.
    pub fn public_message(&self) -> String {
        match self {
            NodeError::StoreUnavailable(_) => "Some unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_hide_detail() {
        let err = NodeError::from(anyhow::anyhow!("disk I/O error at /var/lib/phishnode.db"));
        assert_eq!(err.code(), "store_unavailable");
        assert!(!err.public_message().contains("/var/lib"));
        assert!(err.to_string().contains("/var/lib"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            NodeError::InvalidRequest(String::new()),
            NodeError::InvalidKeyFormat,
            NodeError::NotAuthorized,
            NodeError::NotActivated,
            NodeError::UnrecognizedIndicatorFormat(String::new()),
            NodeError::NotFound(String::new()),
            NodeError::AlreadyRegistered,
            NodeError::AuthNotEnforced,
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
