//! Topic addressing error types.

use thiserror::Error;

use crate::kind::EntityKind;

/// Errors raised while building a topic address.
///
/// Every variant indicates a caller bug; none of them are worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// An identifier required by the entity kind was not supplied.
    #[error("{identifier} is required for {kind} topic")]
    MissingIdentifier {
        kind: EntityKind,
        identifier: &'static str,
    },

    /// The entity kind is not one of root, organization, conversation or message.
    #[error("invalid topic type: {0}")]
    UnknownKind(String),

    /// The operation is not one of the recognized event operations.
    #[error("invalid topic operation: {0}")]
    UnknownOperation(String),

    /// An identifier or field qualifier cannot be placed in a topic level.
    #[error("invalid {name} {value:?}: {reason}")]
    InvalidSegment {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}
