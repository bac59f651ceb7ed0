//! HTTP relay client.
//!
//! Posts a message payload to the downstream endpoint and normalizes whatever
//! happens into a [`RelayOutcome`]. No retries happen here: redelivery is a
//! queue-level decision made by the disposition engine.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use super::outcome::RelayOutcome;

/// Header carrying the queue-assigned message identity
pub const MESSAGE_ID_HEADER: &str = "X-Message-ID";

#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    client: reqwest::Client,
}

impl HttpRelayClient {
    /// Build a client whose calls are bounded by `timeout`.
    ///
    /// An elapsed timeout is reported as [`RelayOutcome::TransportError`].
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("qrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Send one message to `endpoint`.
    ///
    /// The body is forwarded verbatim with `content_type` as declared and, when
    /// present, `message_id` in the `X-Message-ID` header. Logging here is
    /// observational only.
    pub async fn send(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        message_id: Option<&str>,
        content_type: &str,
    ) -> RelayOutcome {
        tracing::info!("Sending message to endpoint: {}", endpoint);

        let mut request = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(body);

        if let Some(id) = message_id.filter(|id| !id.is_empty()) {
            request = request.header(MESSAGE_ID_HEADER, id);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    endpoint,
                    timeout = e.is_timeout(),
                    connect = e.is_connect(),
                    "Error occurred while sending message to {}: {}",
                    endpoint,
                    e
                );
                return RelayOutcome::TransportError;
            }
        };

        let status = response.status().as_u16();

        if response.status().is_success() {
            tracing::info!(endpoint, status, "Message sent successfully");
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable response body: {}>", e));
            tracing::warn!(
                endpoint,
                status,
                response = %body,
                "Failed to send message"
            );
        }

        RelayOutcome::from_status(status)
    }
}
