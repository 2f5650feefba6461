//! Convo Command-Line Client
//!
//! Prints topic addresses and the effective client configuration.

mod args;
mod commands;

use clap::Parser;
use thiserror::Error;

use args::{Args, Command};

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Client(#[from] convo_client::Error),

    /// The requested topic address is malformed.
    #[error(transparent)]
    Address(#[from] convo_topic::AddressError),

    /// Output could not be rendered.
    #[error("failed to render output: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convo_cli=info,convo_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<String, CliError> {
    let config = args.to_config()?;
    tracing::debug!(
        endpoint = %config.endpoint,
        client_id = %config.client_id,
        topic_base = %config.layout.topic_base,
        "configuration resolved"
    );

    match args.command {
        Command::Topic {
            kind,
            org,
            conv,
            msg,
            operation,
            field,
        } => commands::topic(kind, org, conv, msg, operation, field, &config.layout),
        Command::Config => commands::config(&config),
    }
}
