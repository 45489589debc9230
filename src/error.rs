//! Error types for the order backup & sync engine.
//!
//! Every failure is resolved locally into a report or an event; nothing in
//! this crate is allowed to take the host process down. The UI layer owns
//! presentation.

use thiserror::Error;

/// Failures the sync engine can surface to callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote call failed in transport or was rejected by the order service.
    /// Retryable; drives the per-order failure transition.
    #[error("{0}")]
    Network(String),

    /// Read or write of the persistent store failed. The in-progress
    /// operation is aborted without partial updates.
    #[error("storage error: {0}")]
    Storage(String),

    /// Operator invoked a manual resync with an empty selection.
    #[error("no orders selected for resync")]
    NoSelection,

    /// None of the selected sessions exist in the backup collection.
    #[error("selected orders not found in backup")]
    NoMatchingOrders,

    /// An order burned through its automatic retry budget; only a manual
    /// resync can push it now.
    #[error("order {session} exceeded the retry limit; manual resync required")]
    RetriesExhausted { session: String },

    /// Terminal credentials (service URL / API key) are missing.
    #[error("terminal is not configured")]
    NotConfigured,
}

impl SyncError {
    /// True when retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Storage(_))
    }

    /// True for conditions caused by operator input rather than the system.
    pub fn is_operator_error(&self) -> bool {
        matches!(self, SyncError::NoSelection | SyncError::NoMatchingOrders)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(format!("record serialization: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Storage("disk full".into()).is_retryable());

        assert!(!SyncError::NoSelection.is_retryable());
        assert!(!SyncError::NotConfigured.is_retryable());
        assert!(!SyncError::RetriesExhausted {
            session: "s-1".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_operator_errors() {
        assert!(SyncError::NoSelection.is_operator_error());
        assert!(SyncError::NoMatchingOrders.is_operator_error());
        assert!(!SyncError::Network("boom".into()).is_operator_error());
    }

    #[test]
    fn test_display_includes_session() {
        let err = SyncError::RetriesExhausted {
            session: "abc-123".into(),
        };
        assert!(err.to_string().contains("abc-123"));
    }
}
