/// Queue disposition primitives
///
/// The three operations a delivered message supports, and their JetStream mapping

use std::sync::Mutex;

use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;

use crate::disposition::Disposition;
use crate::error::QueueError;

/// Header recording where a dead-lettered message was originally published
pub const ORIGINAL_SUBJECT_HEADER: &str = "Relay-Original-Subject";

/// Disposition operations for one delivered message
#[async_trait]
pub trait MessageActions: Send + Sync {
    /// Remove the message from the queue
    async fn acknowledge(&self) -> Result<(), QueueError>;

    /// Return the message for redelivery under the queue's own backoff policy
    async fn retry_later(&self) -> Result<(), QueueError>;

    /// Move the message to the dead-letter area; it is not redelivered
    async fn dead_letter(&self) -> Result<(), QueueError>;
}

/// Invoke the primitive matching `disposition`
pub async fn apply(actions: &dyn MessageActions, disposition: Disposition) -> Result<(), QueueError> {
    match disposition {
        Disposition::Acknowledge => actions.acknowledge().await,
        Disposition::RetryLater => actions.retry_later().await,
        Disposition::DeadLetter => actions.dead_letter().await,
    }
}

/// JetStream implementation: ACK, NAK, and DLQ publish followed by TERM
pub struct JetStreamActions<'a> {
    message: &'a jetstream::Message,
    jetstream: &'a jetstream::Context,
    dead_letter_subject: &'a str,
}

impl<'a> JetStreamActions<'a> {
    pub fn new(
        message: &'a jetstream::Message,
        jetstream: &'a jetstream::Context,
        dead_letter_subject: &'a str,
    ) -> Self {
        Self {
            message,
            jetstream,
            dead_letter_subject,
        }
    }

    async fn ack_with(&self, kind: AckKind, action: &'static str) -> Result<(), QueueError> {
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| QueueError::Disposition {
                action,
                reason: e.to_string(),
            })
    }

    /// Reset the server's ack deadline for this message
    pub async fn in_progress(&self) -> Result<(), QueueError> {
        self.ack_with(AckKind::Progress, "progress").await
    }
}

#[async_trait]
impl MessageActions for JetStreamActions<'_> {
    async fn acknowledge(&self) -> Result<(), QueueError> {
        self.ack_with(AckKind::Ack, "ACK").await
    }

    async fn retry_later(&self) -> Result<(), QueueError> {
        self.ack_with(AckKind::Nak(None), "NAK").await
    }

    async fn dead_letter(&self) -> Result<(), QueueError> {
        let dead_letter_error = |e: &dyn std::fmt::Display| QueueError::Disposition {
            action: "dead-letter",
            reason: format!("publish to '{}' failed: {}", self.dead_letter_subject, e),
        };

        let mut headers = self.message.headers.clone().unwrap_or_default();
        headers.insert(ORIGINAL_SUBJECT_HEADER, self.message.subject.as_str());

        // Publish first; the original is only terminated once the copy is stored
        self.jetstream
            .publish_with_headers(
                self.dead_letter_subject.to_string(),
                headers,
                self.message.payload.clone(),
            )
            .await
            .map_err(|e| dead_letter_error(&e))?
            .await
            .map_err(|e| dead_letter_error(&e))?;

        self.ack_with(AckKind::Term, "TERM").await
    }
}

/// In-process actions that record which primitives were invoked
#[derive(Debug, Default)]
pub struct MemoryActions {
    applied: Mutex<Vec<Disposition>>,
    fail: bool,
}

impl MemoryActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions whose every primitive fails after being recorded
    pub fn failing() -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn applied(&self) -> Vec<Disposition> {
        self.applied.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, disposition: Disposition, action: &'static str) -> Result<(), QueueError> {
        if let Ok(mut applied) = self.applied.lock() {
            applied.push(disposition);
        }
        if self.fail {
            return Err(QueueError::Disposition {
                action,
                reason: "actions configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageActions for MemoryActions {
    async fn acknowledge(&self) -> Result<(), QueueError> {
        self.record(Disposition::Acknowledge, "ACK")
    }

    async fn retry_later(&self) -> Result<(), QueueError> {
        self.record(Disposition::RetryLater, "NAK")
    }

    async fn dead_letter(&self) -> Result<(), QueueError> {
        self.record(Disposition::DeadLetter, "dead-letter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_invokes_matching_primitive() {
        for disposition in [
            Disposition::Acknowledge,
            Disposition::RetryLater,
            Disposition::DeadLetter,
        ] {
            let actions = MemoryActions::new();
            apply(&actions, disposition).await.unwrap();
            assert_eq!(actions.applied(), vec![disposition]);
        }
    }

    #[tokio::test]
    async fn test_failing_actions_report_error() {
        let actions = MemoryActions::failing();
        let err = apply(&actions, Disposition::RetryLater).await.unwrap_err();
        assert!(err.to_string().contains("NAK"));
        assert_eq!(actions.applied(), vec![Disposition::RetryLater]);
    }
}
