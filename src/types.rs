//! Error types for Watchtower

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchtowerError {
    /// Network-level failure reaching the ledger: timeouts, refused or
    /// reset connections. Always retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx HTTP response from the ledger endpoint.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// JSON-RPC error envelope returned by the ledger.
    #[error("ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WatchtowerError>;

impl WatchtowerError {
    /// Whether a retry can reasonably be expected to succeed.
    ///
    /// Transport failures and rate-limit/server-side HTTP statuses are
    /// transient; RPC envelope errors, schema problems, and local errors
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            WatchtowerError::Transport(_) => true,
            WatchtowerError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for WatchtowerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            WatchtowerError::Transport(e.to_string())
        } else if e.is_decode() {
            WatchtowerError::Internal(format!("invalid response body: {e}"))
        } else if let Some(status) = e.status() {
            WatchtowerError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            WatchtowerError::Transport(e.to_string())
        }
    }
}

impl From<mongodb::error::Error> for WatchtowerError {
    fn from(e: mongodb::error::Error) -> Self {
        WatchtowerError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(WatchtowerError::Transport("connection refused".into()).is_transient());
        assert!(WatchtowerError::Http {
            status: 429,
            message: "too many requests".into()
        }
        .is_transient());
        assert!(WatchtowerError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());

        assert!(!WatchtowerError::Http {
            status: 404,
            message: "not found".into()
        }
        .is_transient());
        assert!(!WatchtowerError::Rpc {
            code: -32800,
            message: "not found".into()
        }
        .is_transient());
        assert!(!WatchtowerError::Config("bad".into()).is_transient());
    }
}
