/// NATS JetStream client for the inbound relay queue
///
/// Provides connection management and stream/consumer provisioning

use async_nats::jetstream;
use std::time::Duration;

use crate::error::QueueError;

/// Pull consumer delivering inbound messages
pub type RelayConsumer = jetstream::consumer::Consumer<jetstream::consumer::pull::Config>;

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    pub subject: String,
    pub consumer_name: String,
    /// JetStream redelivery cap, `-1` for unbounded
    pub max_deliver: i64,
    /// How long the server waits for an ack before redelivering
    pub ack_wait: Duration,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub dead_letter_subject: String,
    pub max_age: Duration,
    pub max_bytes: i64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "MESSAGES".to_string(),
            subject: "messages.relay.>".to_string(),
            consumer_name: "relay".to_string(),
            max_deliver: -1,
            ack_wait: Duration::from_secs(45),
            batch_size: 10,
            poll_interval: Duration::from_millis(100),
            dead_letter_subject: "messages.dlq.relay".to_string(),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

impl NatsConfig {
    /// Stream holding dead-lettered messages
    pub fn dead_letter_stream(&self) -> String {
        format!("{}_DLQ", self.stream_name)
    }
}

#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS and make sure the inbound and dead-letter streams exist
    pub async fn connect(config: NatsConfig) -> Result<Self, QueueError> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| QueueError::Connect {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!("Connected to NATS at {}", config.url);

        let jetstream = jetstream::new(client.clone());

        for (name, subject, max_age) in [
            (config.stream_name.clone(), config.subject.clone(), config.max_age),
            (config.dead_letter_stream(), config.dead_letter_subject.clone(), Duration::ZERO),
        ] {
            jetstream
                .get_or_create_stream(jetstream::stream::Config {
                    name: name.clone(),
                    subjects: vec![subject],
                    max_age,
                    max_bytes: config.max_bytes,
                    storage: jetstream::stream::StorageType::File,
                    num_replicas: 1,
                    ..Default::default()
                })
                .await
                .map_err(|e| QueueError::Provision {
                    what: format!("stream '{}'", name),
                    reason: e.to_string(),
                })?;

            tracing::info!("JetStream stream '{}' ready", name);
        }

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Get or create the durable pull consumer with explicit acks
    pub async fn consumer(&self) -> Result<RelayConsumer, QueueError> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| QueueError::Provision {
                what: format!("stream '{}'", self.config.stream_name),
                reason: e.to_string(),
            })?;

        stream
            .get_or_create_consumer(
                &self.config.consumer_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(self.config.consumer_name.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: self.config.max_deliver,
                    ack_wait: self.config.ack_wait,
                    filter_subject: self.config.subject.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::Provision {
                what: format!("consumer '{}'", self.config.consumer_name),
                reason: e.to_string(),
            })
    }

    /// Get JetStream context for publishing
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}
