//! Topic address construction.
//!
//! The grammar is fixed:
//!
//! ```text
//! root         := <topic_base>
//! org          := root "/" <org_segment> "/" <organization_id>
//! conversation := org "/" <conv_segment> "/" <conversation_id>
//! message      := conversation "/" <msg_segment> "/" <message_id>
//! address      := (root|org|conversation|message) ["/" <operation>] ["/" <field>]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AddressError;
use crate::kind::{EntityKind, Operation};
use crate::layout::TopicLayout;

/// Topic level separator.
pub const SEPARATOR: char = '/';

/// Characters that may not appear inside an identifier or field qualifier.
const RESERVED: [char; 3] = [SEPARATOR, '+', '#'];

/// Build the canonical topic string for an entity.
///
/// Identifiers beyond the depth of `kind` are ignored, so a message
/// identifier passed with `EntityKind::Conversation` does not change the
/// address.
pub fn build_topic(
    kind: EntityKind,
    operation: Option<Operation>,
    field: Option<&str>,
    organization_id: Option<&str>,
    conversation_id: Option<&str>,
    message_id: Option<&str>,
    layout: &TopicLayout,
) -> Result<String, AddressError> {
    let mut topic = layout.topic_base.clone();

    let levels = [
        (&layout.org_segment, organization_id, "organization_id"),
        (&layout.conv_segment, conversation_id, "conversation_id"),
        (&layout.msg_segment, message_id, "message_id"),
    ];

    for (segment, id, identifier) in levels.into_iter().take(kind.depth()) {
        let id = id.ok_or(AddressError::MissingIdentifier { kind, identifier })?;
        check_segment(identifier, id)?;
        push_level(&mut topic, segment);
        push_level(&mut topic, id);
    }

    if let Some(operation) = operation {
        push_level(&mut topic, operation.as_str());
    }

    if let Some(field) = field {
        check_segment("field", field)?;
        push_level(&mut topic, field);
    }

    Ok(topic)
}

fn push_level(topic: &mut String, level: &str) {
    topic.push(SEPARATOR);
    topic.push_str(level);
}

fn check_segment(name: &'static str, value: &str) -> Result<(), AddressError> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value.contains(&RESERVED[..]) {
        "must not contain '/', '+' or '#'"
    } else {
        return Ok(());
    };

    Err(AddressError::InvalidSegment {
        name,
        value: value.to_string(),
        reason,
    })
}

/// An entity address, independent of any layout.
///
/// # Example
///
/// ```
/// use convo_topic::{Operation, TopicAddress, TopicLayout};
///
/// let layout = TopicLayout::new("app");
/// let topic = TopicAddress::message("org1", "conv1", "msg1")
///     .with_operation(Operation::Create)
///     .build(&layout)
///     .unwrap();
///
/// assert_eq!(topic, "app/orgs/org1/convs/conv1/msgs/msg1/create");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicAddress {
    pub kind: EntityKind,
    pub operation: Option<Operation>,
    pub field: Option<String>,
    pub organization_id: Option<String>,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

impl TopicAddress {
    /// Create an address of the given kind with no identifiers set.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            operation: None,
            field: None,
            organization_id: None,
            conversation_id: None,
            message_id: None,
        }
    }

    /// Address of the topic base.
    pub fn root() -> Self {
        Self::new(EntityKind::Root)
    }

    /// Address of an organization.
    pub fn organization(organization_id: impl Into<String>) -> Self {
        Self::new(EntityKind::Organization).with_organization_id(organization_id)
    }

    /// Address of a conversation.
    pub fn conversation(
        organization_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self::new(EntityKind::Conversation)
            .with_organization_id(organization_id)
            .with_conversation_id(conversation_id)
    }

    /// Address of a message.
    pub fn message(
        organization_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self::new(EntityKind::Message)
            .with_organization_id(organization_id)
            .with_conversation_id(conversation_id)
            .with_message_id(message_id)
    }

    /// Set the operation level.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Set the trailing field qualifier.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Set the organization identifier.
    pub fn with_organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }

    /// Set the conversation identifier.
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Set the message identifier.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Render this address with the given layout.
    pub fn build(&self, layout: &TopicLayout) -> Result<String, AddressError> {
        build_topic(
            self.kind,
            self.operation,
            self.field.as_deref(),
            self.organization_id.as_deref(),
            self.conversation_id.as_deref(),
            self.message_id.as_deref(),
            layout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TopicLayout {
        TopicLayout::new("app")
            .with_org_segment("orgs")
            .with_conv_segment("convs")
            .with_msg_segment("msgs")
    }

    #[test]
    fn test_root_is_base_verbatim() {
        let topic = build_topic(EntityKind::Root, None, None, None, None, None, &layout());
        assert_eq!(topic.unwrap(), "app");

        let nested = TopicLayout::new("tenant/app/v1");
        assert_eq!(TopicAddress::root().build(&nested).unwrap(), "tenant/app/v1");
    }

    #[test]
    fn test_message_create() {
        let topic = build_topic(
            EntityKind::Message,
            Some(Operation::Create),
            None,
            Some("org1"),
            Some("conv1"),
            Some("msg1"),
            &layout(),
        )
        .unwrap();
        assert_eq!(topic, "app/orgs/org1/convs/conv1/msgs/msg1/create");
    }

    #[test]
    fn test_each_kind() {
        let l = layout();
        assert_eq!(TopicAddress::organization("o").build(&l).unwrap(), "app/orgs/o");
        assert_eq!(
            TopicAddress::conversation("o", "c").build(&l).unwrap(),
            "app/orgs/o/convs/c"
        );
        assert_eq!(
            TopicAddress::message("o", "c", "m").build(&l).unwrap(),
            "app/orgs/o/convs/c/msgs/m"
        );
    }

    #[test]
    fn test_operation_then_field() {
        let topic = TopicAddress::conversation("o", "c")
            .with_operation(Operation::BulkUpdate)
            .with_field("title")
            .build(&layout())
            .unwrap();
        assert_eq!(topic, "app/orgs/o/convs/c/bulk_update/title");
    }

    #[test]
    fn test_field_without_operation() {
        let topic = TopicAddress::organization("o")
            .with_field("name")
            .build(&layout())
            .unwrap();
        assert_eq!(topic, "app/orgs/o/name");
    }

    #[test]
    fn test_root_with_operation() {
        let topic = TopicAddress::root()
            .with_operation(Operation::Delete)
            .build(&layout())
            .unwrap();
        assert_eq!(topic, "app/delete");
    }

    #[test]
    fn test_deterministic() {
        let address = TopicAddress::message("o", "c", "m").with_operation(Operation::Update);
        let l = layout();
        assert_eq!(address.build(&l).unwrap(), address.build(&l).unwrap());
    }

    #[test]
    fn test_missing_organization() {
        let err = build_topic(EntityKind::Organization, None, None, None, None, None, &layout())
            .unwrap_err();
        assert_eq!(
            err,
            AddressError::MissingIdentifier {
                kind: EntityKind::Organization,
                identifier: "organization_id",
            }
        );
    }

    #[test]
    fn test_missing_conversation_identifiers() {
        let l = layout();
        let missing_org = build_topic(EntityKind::Conversation, None, None, None, Some("c"), None, &l);
        assert!(matches!(
            missing_org,
            Err(AddressError::MissingIdentifier { identifier: "organization_id", .. })
        ));

        let missing_conv = build_topic(EntityKind::Conversation, None, None, Some("o"), None, None, &l);
        assert!(matches!(
            missing_conv,
            Err(AddressError::MissingIdentifier { identifier: "conversation_id", .. })
        ));
    }

    #[test]
    fn test_missing_message_identifiers() {
        let l = layout();
        let combos = [
            (None, Some("c"), Some("m")),
            (Some("o"), None, Some("m")),
            (Some("o"), Some("c"), None),
        ];
        for (org, conv, msg) in combos {
            let result = build_topic(EntityKind::Message, None, None, org, conv, msg, &l);
            assert!(matches!(result, Err(AddressError::MissingIdentifier { .. })));
        }
    }

    #[test]
    fn test_extra_identifiers_ignored() {
        let topic = build_topic(
            EntityKind::Organization,
            None,
            None,
            Some("o"),
            Some("c"),
            Some("m"),
            &layout(),
        )
        .unwrap();
        assert_eq!(topic, "app/orgs/o");
    }

    #[test]
    fn test_rejects_reserved_characters() {
        let l = layout();
        for bad in ["a/b", "+", "x#"] {
            let err = TopicAddress::organization(bad).build(&l).unwrap_err();
            assert!(matches!(err, AddressError::InvalidSegment { name: "organization_id", .. }));
        }

        let err = TopicAddress::root().with_field("a/b").build(&l).unwrap_err();
        assert!(matches!(err, AddressError::InvalidSegment { name: "field", .. }));
    }

    #[test]
    fn test_rejects_empty_identifier() {
        let err = TopicAddress::conversation("o", "").build(&layout()).unwrap_err();
        assert!(matches!(
            err,
            AddressError::InvalidSegment { name: "conversation_id", reason: "must not be empty", .. }
        ));
    }
}
