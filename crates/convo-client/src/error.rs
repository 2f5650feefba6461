//! Client error types.

use std::time::Duration;

use thiserror::Error;

use convo_topic::AddressError;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A topic address could not be built. Always a caller bug.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// Connecting or disconnecting failed at the transport boundary.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport rejected or did not confirm a subscribe request.
    #[error("subscription to '{topic}' failed: {reason}")]
    Subscription { topic: String, reason: String },

    /// The transport rejected an unsubscribe request.
    #[error("unsubscribe from '{topic}' failed: {reason}")]
    Unsubscribe { topic: String, reason: String },

    /// The topic is not tracked by the registry.
    #[error("not subscribed to '{0}'")]
    NotSubscribed(String),

    /// A blocking round-trip exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// One or more teardown steps failed. Every step was still attempted.
    #[error("teardown finished with {} failure(s)", .0.len())]
    Teardown(Vec<TeardownFailure>),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same call with backoff may succeed.
    ///
    /// Address and tracking errors are caller bugs and never retryable. A
    /// teardown has already released the connection, so repeating it is a
    /// no-op.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection(_)
            | Error::Subscription { .. }
            | Error::Unsubscribe { .. }
            | Error::Timeout { .. } => true,
            Error::InvalidAddress(_)
            | Error::NotSubscribed(_)
            | Error::Teardown(_)
            | Error::Config(_) => false,
        }
    }
}

/// A single failed step of a registry teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownFailure {
    /// Unsubscribing from a tracked topic failed.
    Unsubscribe { topic: String, reason: String },
    /// Releasing the connection failed.
    Disconnect { reason: String },
}

impl std::fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownFailure::Unsubscribe { topic, reason } => {
                write!(f, "unsubscribe '{}': {}", topic, reason)
            }
            TeardownFailure::Disconnect { reason } => write!(f, "disconnect: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_topic::EntityKind;

    #[test]
    fn test_retryable_classification() {
        let bad_input = Error::from(AddressError::MissingIdentifier {
            kind: EntityKind::Organization,
            identifier: "organization_id",
        });
        assert!(!bad_input.is_retryable());
        assert!(!Error::NotSubscribed("a/b".into()).is_retryable());

        assert!(Error::Connection("refused".into()).is_retryable());
        assert!(Error::Timeout {
            operation: "subscribe",
            after: Duration::from_secs(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_teardown_message() {
        let err = Error::Teardown(vec![
            TeardownFailure::Unsubscribe {
                topic: "a".into(),
                reason: "nope".into(),
            },
            TeardownFailure::Disconnect {
                reason: "gone".into(),
            },
        ]);
        assert_eq!(err.to_string(), "teardown finished with 2 failure(s)");
        assert!(!err.is_retryable());
    }
}
