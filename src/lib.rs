//! # qrelay: Queue-to-HTTP Relay
//!
//! qrelay consumes messages from a durable NATS JetStream queue, forwards each
//! one to a downstream HTTP endpoint, and turns the response into a queue
//! disposition.
//!
//! ## Dispositions
//!
//! | Downstream result | Disposition | Circuit break |
//! |---|---|---|
//! | 2xx | acknowledge | no |
//! | no response (timeout, refused, ...) | retry later | no |
//! | 400 / 422 | dead-letter | no |
//! | anything else (5xx, 429, ...) | retry later | yes |
//!
//! A circuit break publishes a base64-encoded JSON control message to a side
//! channel, asking an external controller to pause the relay for a cooldown:
//!
//! ```json
//! {"FunctionAppName":"qrelay","FunctionName":"relay","ResourceGroupName":"rg",
//!  "DisableFunction":true,"DisablePeriodMinutes":5}
//! ```
//!
//! ## Example: classifying a response
//!
//! ```
//! use qrelay::{BreakerTarget, Disposition, DispositionEngine, RelayOutcome};
//!
//! let engine = DispositionEngine::new(
//!     BreakerTarget {
//!         function_app_name: "qrelay".to_string(),
//!         function_name: "relay".to_string(),
//!         resource_group_name: "rg".to_string(),
//!     },
//!     5,
//! );
//!
//! let decision = engine.decide(RelayOutcome::from_status(503));
//! assert_eq!(decision.disposition, Disposition::RetryLater);
//! assert!(decision.circuit_break.is_some());
//! ```

// Core decision logic
pub mod disposition;

// Downstream HTTP relay
pub mod relay;

// Circuit breaker side channel
pub mod breaker;

// NATS JetStream integration
pub mod nats;

// Per-delivery orchestration and consume loop
pub mod intake;

pub mod config;
pub mod error;
pub mod health;

// Re-export key types
pub use disposition::{decide, Decision, Disposition, DispositionEngine, Rule};
pub use relay::{HttpRelayClient, RelayOutcome};
pub use breaker::{
    BreakerTarget, CircuitBreakNotifier, CircuitBreakRequest, ControlChannel,
    JetStreamControlChannel, MemoryControlChannel,
};
pub use nats::{InboundMessage, JetStreamActions, MemoryActions, MessageActions, NatsClient, NatsConfig};
pub use intake::{consume, Processed, Relay};
pub use config::{ControlConfig, RawConfig, RelayConfig};
pub use error::{ConfigError, ControlError, IntakeError, QueueError};
