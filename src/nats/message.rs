/// Inbound message extracted from a queue delivery
///
/// Identity, content type and body are all the relay ever reads from a message

use async_nats::jetstream;
use reqwest::header::HeaderValue;

use crate::error::IntakeError;

/// Content type assumed when a message declares none
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

const CONTENT_TYPE_HEADER: &str = "Content-Type";
const MESSAGE_ID_HEADER: &str = "Nats-Msg-Id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Opaque identity assigned by the queue
    pub id: String,

    /// Declared content type, forwarded as-is
    pub content_type: String,

    /// Raw body, forwarded verbatim
    pub body: Vec<u8>,
}

impl InboundMessage {
    /// Create a message, defaulting the content type only when it is absent
    pub fn new(id: impl Into<String>, content_type: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: body.into(),
        }
    }

    /// Extract a message from a JetStream delivery.
    ///
    /// Identity is the `Nats-Msg-Id` header when the publisher set a usable
    /// one, otherwise `<stream>:<stream sequence>`.
    ///
    /// # Errors
    /// [`IntakeError::InvalidHeader`] if the declared content type cannot be
    /// sent over HTTP; [`IntakeError::Metadata`] if the delivery has no
    /// JetStream metadata and no usable identity header.
    pub fn from_jetstream(message: &jetstream::Message) -> Result<Self, IntakeError> {
        let header = |name: &str| {
            message
                .headers
                .as_ref()
                .and_then(|h| h.get(name))
                .map(|v| v.as_str().to_string())
        };

        let id = resolve_id(header(MESSAGE_ID_HEADER).as_deref(), || {
            let info = message
                .info()
                .map_err(|e| IntakeError::Metadata(e.to_string()))?;
            Ok(format!("{}:{}", info.stream, info.stream_sequence))
        })?;

        let content_type = resolve_content_type(header(CONTENT_TYPE_HEADER))?;

        Ok(Self::new(id, content_type, message.payload.to_vec()))
    }
}

fn is_sendable(value: &str) -> bool {
    HeaderValue::from_str(value).is_ok()
}

/// Use the tracking header when it can be forwarded as `X-Message-ID`,
/// otherwise fall back to the queue position.
fn resolve_id<F>(header: Option<&str>, fallback: F) -> Result<String, IntakeError>
where
    F: FnOnce() -> Result<String, IntakeError>,
{
    match header {
        Some(id) if !id.is_empty() && is_sendable(id) => Ok(id.to_string()),
        Some(id) if !id.is_empty() => {
            let fallback = fallback()?;
            tracing::warn!(
                "Ignoring {} header {:?}: not a valid HTTP header value. Using {}",
                MESSAGE_ID_HEADER,
                id,
                fallback
            );
            Ok(fallback)
        }
        _ => fallback(),
    }
}

/// Keep a declared content type verbatim; reject one HTTP cannot carry.
fn resolve_content_type(header: Option<String>) -> Result<Option<String>, IntakeError> {
    match header {
        Some(value) if !is_sendable(&value) => Err(IntakeError::InvalidHeader {
            name: CONTENT_TYPE_HEADER.to_string(),
            reason: format!("{:?} is not a valid HTTP header value", value),
        }),
        other => Ok(other),
    }
}
