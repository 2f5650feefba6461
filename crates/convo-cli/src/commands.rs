//! Subcommand implementations.

use convo_client::ClientConfig;
use convo_topic::{EntityKind, Operation, TopicAddress, TopicLayout};

use crate::CliError;

/// Build the topic address for one entity.
pub fn topic(
    kind: EntityKind,
    organization_id: Option<String>,
    conversation_id: Option<String>,
    message_id: Option<String>,
    operation: Option<Operation>,
    field: Option<String>,
    layout: &TopicLayout,
) -> Result<String, CliError> {
    let address = TopicAddress {
        kind,
        operation,
        field,
        organization_id,
        conversation_id,
        message_id,
    };
    Ok(address.build(layout)?)
}

/// Render the resolved configuration as pretty JSON.
pub fn config(config: &ClientConfig) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(config)?)
}
