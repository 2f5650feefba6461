//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use convo_client::ClientConfig;
use convo_topic::{EntityKind, Operation};

use crate::CliError;

/// Convo Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "convo")]
#[command(version, about = "Topic addressing and client configuration for convo events")]
pub struct Args {
    /// JSON configuration file; flags and environment override its values.
    #[arg(short, long, env = "CONVO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker endpoint (host:port).
    #[arg(long, env = "CONVO_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Client certificate.
    #[arg(long, env = "CONVO_CERT_PATH")]
    pub cert_path: Option<PathBuf>,

    /// Client private key.
    #[arg(long, env = "CONVO_KEY_PATH")]
    pub key_path: Option<PathBuf>,

    /// Certificate authority bundle.
    #[arg(long, env = "CONVO_CA_PATH")]
    pub ca_path: Option<PathBuf>,

    /// Client identifier presented to the broker.
    #[arg(long, env = "CONVO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Keep-alive interval in seconds.
    #[arg(long)]
    pub keep_alive: Option<u16>,

    /// Connect timeout in milliseconds.
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Subscribe/unsubscribe timeout in milliseconds.
    #[arg(long)]
    pub operation_timeout_ms: Option<u64>,

    /// Leading topic prefix.
    #[arg(long, env = "CONVO_TOPIC_BASE")]
    pub topic_base: Option<String>,

    /// Path segment for organizations.
    #[arg(long, env = "CONVO_TOPIC_PATH_ORG")]
    pub org_segment: Option<String>,

    /// Path segment for conversations.
    #[arg(long, env = "CONVO_TOPIC_PATH_CONV")]
    pub conv_segment: Option<String>,

    /// Path segment for messages.
    #[arg(long, env = "CONVO_TOPIC_PATH_MSG")]
    pub msg_segment: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the topic address for an entity.
    Topic {
        /// Entity kind: root, org, conv or msg.
        kind: EntityKind,

        /// Organization identifier.
        #[arg(long)]
        org: Option<String>,

        /// Conversation identifier.
        #[arg(long)]
        conv: Option<String>,

        /// Message identifier.
        #[arg(long)]
        msg: Option<String>,

        /// Operation suffix (create, update, delete, bulk_create, ...).
        #[arg(long)]
        operation: Option<Operation>,

        /// Field qualifier appended after the operation.
        #[arg(long)]
        field: Option<String>,
    },

    /// Print the resolved configuration as JSON.
    Config,
}

impl Args {
    /// Resolve the client configuration.
    ///
    /// Starts from the configuration file when one is given, otherwise from
    /// the defaults, and applies every flag or environment value on top.
    pub fn to_config(&self) -> Result<ClientConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)?,
            None => ClientConfig::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(path) = &self.cert_path {
            config.cert_path = path.clone();
        }
        if let Some(path) = &self.key_path {
            config.key_path = path.clone();
        }
        if let Some(path) = &self.ca_path {
            config.ca_path = path.clone();
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = client_id.clone();
        }
        if let Some(secs) = self.keep_alive {
            config.keep_alive_secs = secs;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.operation_timeout_ms {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(base) = &self.topic_base {
            config.layout.topic_base = base.clone();
        }
        if let Some(segment) = &self.org_segment {
            config.layout.org_segment = segment.clone();
        }
        if let Some(segment) = &self.conv_segment {
            config.layout.conv_segment = segment.clone();
        }
        if let Some(segment) = &self.msg_segment {
            config.layout.msg_segment = segment.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_topic_command_parsing() {
        let args = parse(&[
            "convo", "topic", "conv", "--org", "o1", "--conv", "c1", "--operation", "bulk_update",
        ]);
        match args.command {
            Command::Topic {
                kind,
                org,
                conv,
                msg,
                operation,
                field,
            } => {
                assert_eq!(kind, EntityKind::Conversation);
                assert_eq!(org.as_deref(), Some("o1"));
                assert_eq!(conv.as_deref(), Some("c1"));
                assert!(msg.is_none());
                assert_eq!(operation, Some(Operation::BulkUpdate));
                assert!(field.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Args::try_parse_from(["convo", "topic", "thread"]).is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "convo",
            "--endpoint",
            "broker.example.com:8883",
            "--client-id",
            "cli-1",
            "--topic-base",
            "app/v1",
            "--org-segment",
            "o",
            "--operation-timeout-ms",
            "250",
            "config",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.endpoint, "broker.example.com:8883");
        assert_eq!(config.client_id, "cli-1");
        assert_eq!(config.layout.topic_base, "app/v1");
        assert_eq!(config.layout.org_segment, "o");
        assert_eq!(config.layout.conv_segment, "convs");
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"endpoint": "file-host:1883", "client_id": "from-file", "layout": {{"topic_base": "filebase"}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = parse(&["convo", "--config", &path, "--client-id", "from-flag", "config"]);
        let config = args.to_config().unwrap();

        assert_eq!(config.endpoint, "file-host:1883");
        assert_eq!(config.client_id, "from-flag");
        assert_eq!(config.layout.topic_base, "filebase");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = parse(&["convo", "--endpoint", " ", "config"]);
        assert!(matches!(args.to_config(), Err(CliError::Client(_))));
    }
}
