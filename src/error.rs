//! Error types for the relay.
//!
//! Only startup and plumbing failures are errors. Downstream HTTP failures are
//! values ([`crate::RelayOutcome`]) and never appear here.

use thiserror::Error;

/// Configuration could not be loaded or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting has no value in the file or the environment.
    #[error("{0} configuration is missing")]
    Missing(&'static str),

    /// A setting is present but unusable.
    #[error("Invalid value for {key} ('{value}'): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Publishing to the side channel failed.
///
/// Never escapes the notifier; it is logged and reported as `false`.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to serialize control message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to provision control stream '{stream}': {reason}")]
    Provision { stream: String, reason: String },

    #[error("Failed to publish control message to '{subject}': {reason}")]
    Publish { subject: String, reason: String },
}

/// Talking to the inbound queue failed.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to connect to NATS at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Failed to provision {what}: {reason}")]
    Provision { what: String, reason: String },

    /// Applying a disposition primitive failed.
    #[error("Failed to {action} message: {reason}")]
    Disposition { action: &'static str, reason: String },
}

/// A delivered message could not be turned into an [`crate::InboundMessage`].
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Message metadata unavailable: {0}")]
    Metadata(String),

    /// A header the relay must forward cannot be sent over HTTP.
    #[error("Header '{name}' is not valid: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl IntakeError {
    /// Returns `true` if redelivering the same message cannot succeed.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidHeader { .. })
    }
}
