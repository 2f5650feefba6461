//! Topic layout: the base and the path segment names of the hierarchy.

use serde::{Deserialize, Serialize};

/// Default topic base.
pub const DEFAULT_TOPIC_BASE: &str = "convo";

/// Default path segment preceding an organization identifier.
pub const DEFAULT_ORG_SEGMENT: &str = "orgs";

/// Default path segment preceding a conversation identifier.
pub const DEFAULT_CONV_SEGMENT: &str = "convs";

/// Default path segment preceding a message identifier.
pub const DEFAULT_MSG_SEGMENT: &str = "msgs";

/// The fixed parts of every topic address.
///
/// Publishers and subscribers must share the same layout, otherwise they
/// address different topics for the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicLayout {
    /// Prefix of every address, inserted verbatim (may contain `/`).
    pub topic_base: String,
    /// Segment preceding the organization identifier.
    pub org_segment: String,
    /// Segment preceding the conversation identifier.
    pub conv_segment: String,
    /// Segment preceding the message identifier.
    pub msg_segment: String,
}

impl TopicLayout {
    /// Create a layout with the given base and default path segments.
    pub fn new(topic_base: impl Into<String>) -> Self {
        Self {
            topic_base: topic_base.into(),
            org_segment: DEFAULT_ORG_SEGMENT.to_string(),
            conv_segment: DEFAULT_CONV_SEGMENT.to_string(),
            msg_segment: DEFAULT_MSG_SEGMENT.to_string(),
        }
    }

    /// Set the organization path segment.
    pub fn with_org_segment(mut self, segment: impl Into<String>) -> Self {
        self.org_segment = segment.into();
        self
    }

    /// Set the conversation path segment.
    pub fn with_conv_segment(mut self, segment: impl Into<String>) -> Self {
        self.conv_segment = segment.into();
        self
    }

    /// Set the message path segment.
    pub fn with_msg_segment(mut self, segment: impl Into<String>) -> Self {
        self.msg_segment = segment.into();
        self
    }
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_BASE)
    }
}
