//! Client configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use convo_topic::TopicLayout;

use crate::error::Error;
use crate::transport::{ConnectOptions, ConnectionEvents};

/// Default broker endpoint.
pub const DEFAULT_ENDPOINT: &str = "localhost:8883";

/// Default client certificate path.
pub const DEFAULT_CERT_PATH: &str = "certs/client.pem.crt";

/// Default client private key path.
pub const DEFAULT_KEY_PATH: &str = "certs/client.pem.key";

/// Default certificate authority path.
pub const DEFAULT_CA_PATH: &str = "certs/root-ca.pem";

/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 6;

/// Default deadline for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for subscribe, unsubscribe and disconnect round-trips.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
///
/// Every field has a default and deserialization fills in whatever is
/// missing, so a partial JSON document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker endpoint (e.g., "example.iot.local:8883").
    pub endpoint: String,

    /// Client certificate file.
    pub cert_path: PathBuf,

    /// Client private key file.
    pub key_path: PathBuf,

    /// Certificate authority file.
    pub ca_path: PathBuf,

    /// Client identifier presented to the broker.
    pub client_id: String,

    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,

    /// Whether the broker should discard session state on connect.
    pub clean_session: bool,

    /// Deadline for establishing a connection.
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Deadline for each subscribe, unsubscribe and disconnect round-trip.
    #[serde(rename = "operation_timeout_ms", with = "duration_ms")]
    pub operation_timeout: Duration,

    /// Topic base and path segments.
    pub layout: TopicLayout,
}

impl ClientConfig {
    /// Create a new client configuration for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            ca_path: PathBuf::from(DEFAULT_CA_PATH),
            client_id: generate_client_id(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            clean_session: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            layout: TopicLayout::default(),
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Set the certificate, key and CA file paths.
    pub fn with_credentials(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        ca_path: impl Into<PathBuf>,
    ) -> Self {
        self.cert_path = cert_path.into();
        self.key_path = key_path.into();
        self.ca_path = ca_path.into();
        self
    }

    /// Set the client identifier.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the keep-alive interval in seconds.
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Set the clean-session flag.
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    /// Set the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the topic layout.
    pub fn with_layout(mut self, layout: TopicLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Reject configurations that cannot produce a working connection.
    pub fn validate(&self) -> Result<(), Error> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config("endpoint must not be empty".to_string()));
        }
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".to_string()));
        }
        if self.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Derive the options handed to a connection factory.
    pub fn connect_options(&self, events: Arc<dyn ConnectionEvents>) -> ConnectOptions {
        ConnectOptions {
            endpoint: self.endpoint.clone(),
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
            ca_path: self.ca_path.clone(),
            client_id: self.client_id.clone(),
            keep_alive: Duration::from_secs(u64::from(self.keep_alive_secs)),
            clean_session: self.clean_session,
            events,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// Generate a unique client identifier.
fn generate_client_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    format!("client-{:x}", timestamp)
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoggingConnectionEvents;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.keep_alive_secs, DEFAULT_KEEP_ALIVE_SECS);
        assert!(!config.clean_session);
        assert_eq!(config.operation_timeout, DEFAULT_OPERATION_TIMEOUT);
        assert_eq!(config.layout, TopicLayout::default());
        assert!(config.client_id.starts_with("client-"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("broker.local:8883")
            .with_credentials("a.crt", "a.key", "ca.pem")
            .with_client_id("bot-1")
            .with_keep_alive_secs(30)
            .with_clean_session(true)
            .with_operation_timeout(Duration::from_millis(250))
            .with_layout(TopicLayout::new("app"));

        assert_eq!(config.endpoint, "broker.local:8883");
        assert_eq!(config.cert_path, PathBuf::from("a.crt"));
        assert_eq!(config.ca_path, PathBuf::from("ca.pem"));
        assert_eq!(config.client_id, "bot-1");
        assert!(config.clean_session);
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.layout.topic_base, "app");
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(matches!(
            ClientConfig::new("").validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::default().with_client_id(" ").validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::default()
                .with_connect_timeout(Duration::ZERO)
                .validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_partial_json() {
        let config = ClientConfig::from_json(
            r#"{
                "endpoint": "iot.example:8883",
                "client_id": "bot",
                "operation_timeout_ms": 1500,
                "layout": { "topic_base": "app", "msg_segment": "messages" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "iot.example:8883");
        assert_eq!(config.client_id, "bot");
        assert_eq!(config.operation_timeout, Duration::from_millis(1500));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.layout.topic_base, "app");
        assert_eq!(config.layout.org_segment, "orgs");
        assert_eq!(config.layout.msg_segment, "messages");
    }

    #[test]
    fn test_from_invalid_json() {
        assert!(matches!(
            ClientConfig::from_json("{\"keep_alive_secs\": \"soon\"}"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"endpoint": "file.example:1883", "clean_session": true}}"#).unwrap();

        let config = ClientConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "file.example:1883");
        assert!(config.clean_session);

        assert!(ClientConfig::from_json_file("/nonexistent/convo.json").is_err());
    }

    #[test]
    fn test_connect_options() {
        let config = ClientConfig::new("broker:8883")
            .with_client_id("bot")
            .with_keep_alive_secs(12);
        let options = config.connect_options(Arc::new(LoggingConnectionEvents));

        assert_eq!(options.endpoint, "broker:8883");
        assert_eq!(options.client_id, "bot");
        assert_eq!(options.keep_alive, Duration::from_secs(12));
        assert_eq!(options.cert_path, PathBuf::from(DEFAULT_CERT_PATH));
        assert!(!options.clean_session);
    }
}
