//! Entity kinds and event operations.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// The level of the organization → conversation → message hierarchy a topic addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The topic base itself.
    Root,
    /// A single organization.
    Organization,
    /// A conversation inside an organization.
    Conversation,
    /// A message inside a conversation.
    Message,
}

impl EntityKind {
    /// All kinds, from the root down.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Root,
        EntityKind::Organization,
        EntityKind::Conversation,
        EntityKind::Message,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Root => "root",
            EntityKind::Organization => "organization",
            EntityKind::Conversation => "conversation",
            EntityKind::Message => "message",
        }
    }

    /// Number of identifiers this kind requires.
    pub fn depth(&self) -> usize {
        match self {
            EntityKind::Root => 0,
            EntityKind::Organization => 1,
            EntityKind::Conversation => 2,
            EntityKind::Message => 3,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(EntityKind::Root),
            "organization" | "org" => Ok(EntityKind::Organization),
            "conversation" | "conv" => Ok(EntityKind::Conversation),
            "message" | "msg" => Ok(EntityKind::Message),
            other => Err(AddressError::UnknownKind(other.to_string())),
        }
    }
}

/// An event operation carried as a topic level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
}

impl Operation {
    /// All operations in declaration order.
    pub const ALL: [Operation; 6] = [
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::BulkCreate,
        Operation::BulkUpdate,
        Operation::BulkDelete,
    ];

    /// Wire name used as the topic level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::BulkCreate => "bulk_create",
            Operation::BulkUpdate => "bulk_update",
            Operation::BulkDelete => "bulk_delete",
        }
    }

    /// Whether this operation applies to many entities at once.
    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Operation::BulkCreate | Operation::BulkUpdate | Operation::BulkDelete
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| AddressError::UnknownOperation(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!("org".parse::<EntityKind>().unwrap(), EntityKind::Organization);
        assert_eq!("conv".parse::<EntityKind>().unwrap(), EntityKind::Conversation);
        assert_eq!("msg".parse::<EntityKind>().unwrap(), EntityKind::Message);
        assert_eq!("message".parse::<EntityKind>().unwrap(), EntityKind::Message);
    }

    #[test]
    fn test_unknown_kind() {
        let err = "channel".parse::<EntityKind>().unwrap_err();
        assert_eq!(err, AddressError::UnknownKind("channel".to_string()));
        assert!("Root".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_kind_depth() {
        let depths: Vec<usize> = EntityKind::ALL.iter().map(|k| k.depth()).collect();
        assert_eq!(depths, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_operation_names() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
            assert_eq!(op.to_string(), op.as_str());
        }
        assert_eq!(Operation::BulkDelete.as_str(), "bulk_delete");
    }

    #[test]
    fn test_operation_is_bulk() {
        assert!(Operation::BulkCreate.is_bulk());
        assert!(!Operation::Update.is_bulk());
    }

    #[test]
    fn test_unknown_operation() {
        assert_eq!(
            "upsert".parse::<Operation>(),
            Err(AddressError::UnknownOperation("upsert".to_string()))
        );
    }
}
