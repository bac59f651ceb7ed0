/// Downstream HTTP relay
///
/// Sends message payloads to the configured endpoint and normalizes the result

pub mod client;
pub mod outcome;

pub use client::{HttpRelayClient, MESSAGE_ID_HEADER};
pub use outcome::{RelayOutcome, TRANSPORT_ERROR_STATUS};
