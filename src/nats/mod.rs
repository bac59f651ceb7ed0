/// NATS JetStream integration module
///
/// Inbound queue connection, message extraction and disposition primitives

pub mod actions;
pub mod client;
pub mod message;

pub use actions::{apply, JetStreamActions, MemoryActions, MessageActions};
pub use client::{NatsClient, NatsConfig, RelayConsumer};
pub use message::{InboundMessage, DEFAULT_CONTENT_TYPE};
