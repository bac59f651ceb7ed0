//! Circuit-break notifier.
//!
//! Best-effort: at most one publish per trigger, and failures are reported only
//! through the returned `bool`. Must not retry.

use std::sync::Arc;

use super::channel::ControlChannel;
use super::request::{BreakerTarget, CircuitBreakRequest};
use crate::error::ControlError;

pub struct CircuitBreakNotifier {
    channel: Arc<dyn ControlChannel>,
    resource_group_name: String,
}

impl CircuitBreakNotifier {
    pub fn new(channel: Arc<dyn ControlChannel>, resource_group_name: impl Into<String>) -> Self {
        Self {
            channel,
            resource_group_name: resource_group_name.into(),
        }
    }

    /// Ask the controller to pause `function_name` of `function_app_name`.
    ///
    /// Returns `false` if the request could not be serialized or published.
    pub async fn request_pause(
        &self,
        function_app_name: &str,
        function_name: &str,
        disable_period_minutes: u32,
    ) -> bool {
        let target = BreakerTarget {
            function_app_name: function_app_name.to_string(),
            function_name: function_name.to_string(),
            resource_group_name: self.resource_group_name.clone(),
        };
        self.send(&CircuitBreakRequest::disable(&target, disable_period_minutes))
            .await
    }

    /// Publish an already built request.
    pub async fn send(&self, request: &CircuitBreakRequest) -> bool {
        match self.try_send(request).await {
            Ok(sequence) => {
                tracing::info!(
                    destination = self.channel.destination(),
                    sequence,
                    function_app = %request.function_app_name,
                    function = %request.function_name,
                    minutes = request.disable_period_minutes,
                    "Circuit-break request sent"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    destination = self.channel.destination(),
                    "Error occurred while sending circuit-break request: {}",
                    e
                );
                false
            }
        }
    }

    async fn try_send(&self, request: &CircuitBreakRequest) -> Result<u64, ControlError> {
        let payload = request.encode()?;
        self.channel.provision().await?;
        tracing::debug!(destination = self.channel.destination(), "Publishing circuit-break request");
        self.channel.publish(payload).await
    }
}
