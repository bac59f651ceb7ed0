//! Side channel carrying circuit-break control messages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_nats::jetstream;
use async_trait::async_trait;

use crate::error::ControlError;

/// Destination for encoded control messages
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Create the destination if it does not exist. Idempotent.
    ///
    /// Called before every publish, so a destination removed while the relay
    /// runs is recreated on the next trigger.
    async fn provision(&self) -> Result<(), ControlError>;

    /// Publish one encoded payload. Returns the channel-assigned sequence.
    ///
    /// Exactly one attempt; implementations must not retry.
    async fn publish(&self, payload: String) -> Result<u64, ControlError>;

    /// Human-readable destination, for logs
    fn destination(&self) -> &str;
}

/// Control channel backed by a JetStream stream
pub struct JetStreamControlChannel {
    jetstream: jetstream::Context,
    stream_name: String,
    subject: String,
}

impl JetStreamControlChannel {
    pub fn new(jetstream: jetstream::Context, stream_name: String, subject: String) -> Self {
        Self {
            jetstream,
            stream_name,
            subject,
        }
    }
}

#[async_trait]
impl ControlChannel for JetStreamControlChannel {
    async fn provision(&self) -> Result<(), ControlError> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects: vec![self.subject.clone()],
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| ControlError::Provision {
                stream: self.stream_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!("JetStream control stream '{}' ready", self.stream_name);
        Ok(())
    }

    async fn publish(&self, payload: String) -> Result<u64, ControlError> {
        let publish_error = |e: &dyn std::fmt::Display| ControlError::Publish {
            subject: self.subject.clone(),
            reason: e.to_string(),
        };

        let ack = self
            .jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| publish_error(&e))?
            .await
            .map_err(|e| publish_error(&e))?;

        Ok(ack.sequence)
    }

    fn destination(&self) -> &str {
        &self.subject
    }
}

/// How a [`MemoryControlChannel`] misbehaves
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Failure {
    #[default]
    None,
    Provision,
    Publish,
}

/// In-process control channel that records every published payload
///
/// Useful for tests and for running the relay without a control plane.
#[derive(Debug, Default)]
pub struct MemoryControlChannel {
    published: Mutex<Vec<String>>,
    provisions: AtomicUsize,
    failure: Failure,
}

impl MemoryControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose every publish fails
    pub fn failing() -> Self {
        Self {
            failure: Failure::Publish,
            ..Self::default()
        }
    }

    /// A channel that can never be provisioned
    pub fn unprovisionable() -> Self {
        Self {
            failure: Failure::Provision,
            ..Self::default()
        }
    }

    /// Payloads published so far, oldest first
    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Number of provisioning calls so far
    pub fn provisions(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlChannel for MemoryControlChannel {
    async fn provision(&self) -> Result<(), ControlError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::Provision {
            return Err(ControlError::Provision {
                stream: "memory".to_string(),
                reason: "channel configured to fail".to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, payload: String) -> Result<u64, ControlError> {
        if self.failure == Failure::Publish {
            return Err(ControlError::Publish {
                subject: "memory".to_string(),
                reason: "channel configured to fail".to_string(),
            });
        }

        let mut published = self.published.lock().map_err(|e| ControlError::Publish {
            subject: "memory".to_string(),
            reason: e.to_string(),
        })?;
        published.push(payload);
        Ok(published.len() as u64)
    }

    fn destination(&self) -> &str {
        "memory"
    }
}
