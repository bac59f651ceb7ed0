/// Circuit breaker side channel
///
/// Builds pause requests and publishes them for an external controller

pub mod channel;
pub mod notifier;
pub mod request;

pub use channel::{ControlChannel, JetStreamControlChannel, MemoryControlChannel};
pub use notifier::CircuitBreakNotifier;
pub use request::{BreakerTarget, CircuitBreakRequest};
