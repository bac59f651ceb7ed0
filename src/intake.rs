//! Message intake.
//!
//! Receives one delivery at a time, runs it through relay client, disposition
//! engine and (when triggered) the circuit-break notifier, then applies the
//! resulting disposition to the queue exactly once. All decision logging happens
//! here so the engine stays pure.
//!
//! Anything that goes wrong before a decision exists results in
//! [`Disposition::RetryLater`]: redeliver rather than lose. The one exception
//! is a message whose headers can never be sent, which is dead-lettered.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};

use crate::breaker::{CircuitBreakNotifier, ControlChannel};
use crate::config::RelayConfig;
use crate::disposition::{Decision, Disposition, DispositionEngine, Rule};
use crate::error::{IntakeError, QueueError};
use crate::nats::{apply, InboundMessage, JetStreamActions, MessageActions, NatsClient};
use crate::relay::HttpRelayClient;

/// Everything that happened to one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub decision: Decision,
    /// `Some(sent)` when a circuit-break request was attempted
    pub breaker_notified: Option<bool>,
}

pub struct Relay {
    client: HttpRelayClient,
    endpoint: String,
    engine: DispositionEngine,
    notifier: CircuitBreakNotifier,
}

impl Relay {
    pub fn new(
        client: HttpRelayClient,
        endpoint: impl Into<String>,
        engine: DispositionEngine,
        notifier: CircuitBreakNotifier,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            engine,
            notifier,
        }
    }

    /// Wire a relay from validated configuration
    pub fn from_config(
        config: &RelayConfig,
        channel: Arc<dyn ControlChannel>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            HttpRelayClient::new(config.http_timeout)?,
            config.http_endpoint.clone(),
            DispositionEngine::new(config.target.clone(), config.disable_period_minutes),
            CircuitBreakNotifier::new(channel, config.target.resource_group_name.clone()),
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Relay one message and decide its disposition.
    ///
    /// Order is fixed: HTTP call, classification, then the circuit-break
    /// request if the decision carries one. A failed notification never
    /// changes the decision.
    pub async fn process(&self, message: &InboundMessage) -> Processed {
        let outcome = self
            .client
            .send(
                &self.endpoint,
                message.body.clone(),
                Some(message.id.as_str()),
                &message.content_type,
            )
            .await;

        let decision = self.engine.decide(outcome);

        let breaker_notified = match &decision.circuit_break {
            Some(request) => Some(self.notifier.send(request).await),
            None => None,
        };

        Processed {
            decision,
            breaker_notified,
        }
    }

    /// Process a delivery and apply its disposition through `actions`.
    ///
    /// Returns the disposition that was chosen. If applying it fails the error
    /// is logged and no other disposition is attempted. A message that can
    /// never be relayed (see [`IntakeError::is_permanent`]) is dead-lettered;
    /// any other intake failure is retried.
    pub async fn deliver(
        &self,
        message: Result<InboundMessage, IntakeError>,
        actions: &dyn MessageActions,
    ) -> Disposition {
        let disposition = match message {
            Ok(message) => self.decide_logged(&message).await,
            Err(e) if e.is_permanent() => {
                tracing::warn!("Message cannot be relayed: {}. Dead-lettering message.", e);
                Disposition::DeadLetter
            }
            Err(e) => {
                tracing::error!("Error processing message: {}. Abandoning message.", e);
                Disposition::RetryLater
            }
        };

        if let Err(e) = apply(actions, disposition).await {
            tracing::error!(%disposition, "Failed to apply disposition: {}", e);
        }

        disposition
    }

    async fn decide_logged(&self, message: &InboundMessage) -> Disposition {
        tracing::info!(
            id = %message.id,
            content_type = %message.content_type,
            bytes = message.body.len(),
            "Relaying message"
        );

        let processed = match AssertUnwindSafe(self.process(message)).catch_unwind().await {
            Ok(processed) => processed,
            Err(_) => {
                tracing::error!(id = %message.id, "Error processing message: relay panicked. Abandoning message.");
                return Disposition::RetryLater;
            }
        };

        log_decision(message, &processed);
        processed.decision.disposition
    }
}

fn log_decision(message: &InboundMessage, processed: &Processed) {
    let decision = &processed.decision;
    let id = &message.id;

    match decision.rule {
        Rule::Delivered => tracing::info!(
            "Successfully forwarded message {} to HTTP endpoint. Status: {}",
            id,
            decision.outcome
        ),
        Rule::TransportFailure => tracing::error!(
            "Exception occurred while forwarding message {} to HTTP endpoint. Abandoning message.",
            id
        ),
        Rule::UnprocessableMessage => tracing::warn!(
            "Message {} failed with {}. Dead-lettering message.",
            id,
            decision.outcome
        ),
        Rule::DownstreamUnhealthy => {
            tracing::warn!(
                "Message {} failed with {}. Requested pause: {}. Abandoning message.",
                id,
                decision.outcome,
                match processed.breaker_notified {
                    Some(true) => "sent",
                    _ => "not sent",
                }
            );
        }
    }
}

/// Upper bound on the pause after repeated fetch failures
const MAX_FETCH_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Pause before fetching again after `consecutive_failures` failed fetches.
///
/// Doubles from `poll_interval` and is capped at [`MAX_FETCH_RETRY_DELAY`].
pub fn fetch_retry_delay(poll_interval: Duration, consecutive_failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(consecutive_failures.saturating_sub(1).min(16));
    poll_interval.saturating_mul(factor).min(MAX_FETCH_RETRY_DELAY)
}

/// Fetch and relay messages until `shutdown` resolves.
///
/// Messages within a batch are handled one at a time, each marked in progress
/// before it is relayed so its ack deadline starts when its turn comes. Fetch
/// failures are logged and retried with backoff; only failing to provision
/// the consumer ends the loop with an error. The shutdown signal is checked
/// between batches.
pub async fn consume<F>(relay: &Relay, nats: &NatsClient, shutdown: F) -> Result<(), QueueError>
where
    F: Future<Output = ()>,
{
    let consumer = nats.consumer().await?;
    let config = nats.config();

    tracing::info!(
        "Relay ready - consuming from stream '{}' with consumer '{}', forwarding to {}",
        config.stream_name,
        config.consumer_name,
        relay.endpoint()
    );

    tokio::pin!(shutdown);
    let mut fetch_failures: u32 = 0;

    loop {
        let batch = tokio::select! {
            _ = &mut shutdown => break,
            batch = consumer.fetch().max_messages(config.batch_size).messages() => batch,
        };

        let delay = match batch {
            Ok(mut messages) => {
                fetch_failures = 0;

                while let Some(msg) = messages.next().await {
                    let msg = match msg {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::error!("Error receiving message: {}", e);
                            continue;
                        }
                    };

                    let actions =
                        JetStreamActions::new(&msg, nats.jetstream(), &config.dead_letter_subject);
                    if let Err(e) = actions.in_progress().await {
                        tracing::warn!("Failed to mark message in progress: {}", e);
                    }
                    relay.deliver(InboundMessage::from_jetstream(&msg), &actions).await;
                }

                // Small delay between batches
                config.poll_interval
            }
            Err(e) => {
                fetch_failures = fetch_failures.saturating_add(1);
                let delay = fetch_retry_delay(config.poll_interval, fetch_failures);
                tracing::error!(
                    failures = fetch_failures,
                    "Failed to fetch messages: {}. Retrying in {:?}",
                    e,
                    delay
                );
                delay
            }
        };

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!("Shutdown requested, relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerTarget, MemoryControlChannel};
    use crate::error::ControlError;
    use crate::nats::MemoryActions;
    use async_trait::async_trait;
    use axum::{http::StatusCode, routing::post, Router};

    fn relay_to(endpoint: &str, channel: Arc<dyn ControlChannel>) -> Relay {
        Relay::new(
            HttpRelayClient::new(Duration::from_secs(2)).unwrap(),
            endpoint,
            DispositionEngine::new(
                BreakerTarget {
                    function_app_name: "app".to_string(),
                    function_name: "relay".to_string(),
                    resource_group_name: "rg".to_string(),
                },
                5,
            ),
            CircuitBreakNotifier::new(channel, "rg"),
        )
    }

    #[tokio::test]
    async fn test_intake_error_is_retried() {
        let channel = Arc::new(MemoryControlChannel::new());
        let relay = relay_to("http://127.0.0.1:9/", channel.clone());
        let actions = MemoryActions::new();

        let disposition = relay
            .deliver(Err(IntakeError::Metadata("no info".to_string())), &actions)
            .await;

        assert_eq!(disposition, Disposition::RetryLater);
        assert_eq!(actions.applied(), vec![Disposition::RetryLater]);
        assert!(channel.published().is_empty());
    }

    #[tokio::test]
    async fn test_failed_apply_is_not_followed_by_second_disposition() {
        let channel = Arc::new(MemoryControlChannel::new());
        let relay = relay_to("http://127.0.0.1:9/", channel);
        let actions = MemoryActions::failing();

        relay
            .deliver(Err(IntakeError::Metadata("no info".to_string())), &actions)
            .await;

        assert_eq!(actions.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_unsendable_header_is_dead_lettered() {
        let channel = Arc::new(MemoryControlChannel::new());
        let relay = relay_to("http://127.0.0.1:9/", channel.clone());
        let actions = MemoryActions::new();

        let error = IntakeError::InvalidHeader {
            name: "Content-Type".to_string(),
            reason: "control character".to_string(),
        };
        let disposition = relay.deliver(Err(error), &actions).await;

        assert_eq!(disposition, Disposition::DeadLetter);
        assert_eq!(actions.applied(), vec![Disposition::DeadLetter]);
        assert!(channel.published().is_empty());
    }

    /// Control channel that panics on publish
    struct PanickingChannel;

    #[async_trait]
    impl ControlChannel for PanickingChannel {
        async fn provision(&self) -> Result<(), ControlError> {
            Ok(())
        }

        async fn publish(&self, _payload: String) -> Result<u64, ControlError> {
            panic!("control channel exploded");
        }

        fn destination(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_panic_during_processing_is_retried_once() {
        let app = Router::new().route("/", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let relay = relay_to(&format!("http://{}/", addr), Arc::new(PanickingChannel));
        let actions = MemoryActions::new();

        let disposition = relay
            .deliver(Ok(InboundMessage::new("m-1", None, "{}")), &actions)
            .await;

        assert_eq!(disposition, Disposition::RetryLater);
        assert_eq!(actions.applied(), vec![Disposition::RetryLater]);
    }

    #[test]
    fn test_fetch_retry_delay_backs_off_and_caps() {
        let poll = Duration::from_millis(100);

        assert_eq!(fetch_retry_delay(poll, 1), Duration::from_millis(100));
        assert_eq!(fetch_retry_delay(poll, 2), Duration::from_millis(200));
        assert_eq!(fetch_retry_delay(poll, 4), Duration::from_millis(800));
        assert_eq!(fetch_retry_delay(poll, 100), MAX_FETCH_RETRY_DELAY);
        assert_eq!(fetch_retry_delay(Duration::from_secs(60), 1), MAX_FETCH_RETRY_DELAY);
    }
}
