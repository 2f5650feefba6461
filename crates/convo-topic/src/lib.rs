//! Convo topic addressing.
//!
//! Organizations contain conversations and conversations contain messages.
//! Every entity publishes create/update/delete events (and their bulk
//! variants) on a topic derived from its identity. This crate is the single
//! place that derives those topics, so publishers and subscribers agree on
//! them byte for byte.
//!
//! # Modules
//!
//! - [`kind`] - Entity kinds and event operations
//! - [`layout`] - Topic base and path segment names
//! - [`address`] - Address values and the topic builder
//! - [`error`] - Addressing errors

pub mod address;
pub mod error;
pub mod kind;
pub mod layout;

pub use address::{build_topic, TopicAddress, SEPARATOR};
pub use error::AddressError;
pub use kind::{EntityKind, Operation};
pub use layout::TopicLayout;
