//! Convo Client - subscription lifecycle over a publish-subscribe transport.
//!
//! The client owns one connection per [`SubscriptionRegistry`], tracks the
//! topics subscribed on it, and guarantees orderly teardown: every tracked
//! topic is unsubscribed before the connection is released, and release
//! happens exactly once on every exit path.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use convo_client::memory::InMemoryBroker;
//! use convo_client::{ClientConfig, Error, LoggingHandler, SubscriptionRegistry};
//! use convo_topic::{Operation, TopicAddress};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let broker = InMemoryBroker::new();
//!     let config = ClientConfig::default();
//!
//!     SubscriptionRegistry::scoped(&broker.factory(), &config, |registry| async move {
//!         let address = TopicAddress::conversation("org1", "conv1")
//!             .with_operation(Operation::Create);
//!         registry.subscribe_address(&address, Arc::new(LoggingHandler)).await?;
//!
//!         // Fired by whichever handler decides the run is complete.
//!         registry.completion_signal().fire();
//!         registry.await_completion().await;
//!         Ok::<_, Error>(())
//!     })
//!     .await
//! }
//! ```

pub mod completion;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod registry;
pub mod transport;

pub use completion::{CompletionGate, CompletionSignal};
pub use config::ClientConfig;
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState};
pub use error::{Error, TeardownFailure};
pub use registry::{SubscriptionEntry, SubscriptionRegistry, SubscriptionState, SUBSCRIPTION_QOS};
pub use transport::{
    ConnectOptions, ConnectionEvents, ConnectionFactory, LoggingConnectionEvents,
    LoggingHandler, MessageHandler, QoS, Transport, TransportError,
};

/// Re-export topic addressing types.
pub use convo_topic as topic;
