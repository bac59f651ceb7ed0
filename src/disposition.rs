//! Disposition engine.
//!
//! Maps a [`RelayOutcome`] to what the queue should do with the message, and
//! decides whether the relay should ask to be paused. First matching row wins:
//!
//! | Outcome                         | Disposition  | Circuit break |
//! |---------------------------------|--------------|---------------|
//! | 2xx                             | Acknowledge  | no            |
//! | transport error                 | RetryLater   | no            |
//! | 400 or 422                      | DeadLetter   | no            |
//! | any other status                | RetryLater   | yes           |
//!
//! The engine is pure: no I/O, no logging, no state carried between messages.

use std::fmt;

use crate::breaker::{BreakerTarget, CircuitBreakRequest};
use crate::relay::RelayOutcome;

/// Statuses meaning the message itself is unprocessable
pub const DEAD_LETTER_STATUSES: [u16; 2] = [400, 422];

/// Default cooldown requested when the downstream looks unhealthy
pub const DEFAULT_DISABLE_PERIOD_MINUTES: u32 = 5;

/// Terminal instruction for the queue, applied exactly once per message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledge,
    RetryLater,
    DeadLetter,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Acknowledge => write!(f, "acknowledge"),
            Disposition::RetryLater => write!(f, "retry-later"),
            Disposition::DeadLetter => write!(f, "dead-letter"),
        }
    }
}

/// Which row of the decision table matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Delivered,
    TransportFailure,
    UnprocessableMessage,
    DownstreamUnhealthy,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Delivered => write!(f, "delivered"),
            Rule::TransportFailure => write!(f, "no response from downstream"),
            Rule::UnprocessableMessage => write!(f, "message rejected as unprocessable"),
            Rule::DownstreamUnhealthy => write!(f, "downstream unhealthy"),
        }
    }
}

/// Result of classifying one outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: RelayOutcome,
    pub rule: Rule,
    pub disposition: Disposition,
    /// Present only for [`Rule::DownstreamUnhealthy`]
    pub circuit_break: Option<CircuitBreakRequest>,
}

/// Decide the disposition for `outcome`.
///
/// Total over every `RelayOutcome`; unknown statuses fall through to the
/// circuit-breaking row.
pub fn decide(outcome: RelayOutcome, target: &BreakerTarget, disable_period_minutes: u32) -> Decision {
    let (rule, disposition) = match outcome {
        RelayOutcome::Success(_) => (Rule::Delivered, Disposition::Acknowledge),
        RelayOutcome::TransportError => (Rule::TransportFailure, Disposition::RetryLater),
        RelayOutcome::Rejected(status) if DEAD_LETTER_STATUSES.contains(&status) => {
            (Rule::UnprocessableMessage, Disposition::DeadLetter)
        }
        RelayOutcome::Rejected(_) | RelayOutcome::ServerFailure(_) => {
            (Rule::DownstreamUnhealthy, Disposition::RetryLater)
        }
    };

    let circuit_break = (rule == Rule::DownstreamUnhealthy)
        .then(|| CircuitBreakRequest::disable(target, disable_period_minutes));

    Decision {
        outcome,
        rule,
        disposition,
        circuit_break,
    }
}

/// [`decide`] bound to a validated target and cooldown
#[derive(Debug, Clone)]
pub struct DispositionEngine {
    target: BreakerTarget,
    disable_period_minutes: u32,
}

impl DispositionEngine {
    pub fn new(target: BreakerTarget, disable_period_minutes: u32) -> Self {
        Self {
            target,
            disable_period_minutes,
        }
    }

    pub fn decide(&self, outcome: RelayOutcome) -> Decision {
        decide(outcome, &self.target, self.disable_period_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(minutes: u32) -> DispositionEngine {
        DispositionEngine::new(
            BreakerTarget {
                function_app_name: "app".to_string(),
                function_name: "relay".to_string(),
                resource_group_name: "rg".to_string(),
            },
            minutes,
        )
    }

    #[test]
    fn test_every_2xx_is_acknowledged() {
        let engine = engine(5);
        for status in 200..=299 {
            let decision = engine.decide(RelayOutcome::from_status(status));
            assert_eq!(decision.disposition, Disposition::Acknowledge, "status {}", status);
            assert!(decision.circuit_break.is_none());
        }
    }

    #[test]
    fn test_transport_error_retries_without_break() {
        let decision = engine(5).decide(RelayOutcome::TransportError);
        assert_eq!(decision.rule, Rule::TransportFailure);
        assert_eq!(decision.disposition, Disposition::RetryLater);
        assert!(decision.circuit_break.is_none());
    }

    #[test]
    fn test_400_and_422_dead_letter_regardless_of_cooldown() {
        for minutes in [0, 5, 60] {
            for status in DEAD_LETTER_STATUSES {
                let decision = engine(minutes).decide(RelayOutcome::from_status(status));
                assert_eq!(decision.disposition, Disposition::DeadLetter);
                assert_eq!(decision.rule, Rule::UnprocessableMessage);
                assert!(decision.circuit_break.is_none());
            }
        }
    }

    #[test]
    fn test_other_failures_retry_and_break() {
        for status in [401, 404, 418, 429, 500, 502, 503, 504, 302, 999] {
            let decision = engine(9).decide(RelayOutcome::from_status(status));
            assert_eq!(decision.disposition, Disposition::RetryLater, "status {}", status);
            assert_eq!(decision.rule, Rule::DownstreamUnhealthy);

            let request = decision.circuit_break.expect("circuit break expected");
            assert!(request.disable_function);
            assert_eq!(request.disable_period_minutes, 9);
            assert_eq!(request.function_app_name, "app");
            assert_eq!(request.function_name, "relay");
            assert_eq!(request.resource_group_name, "rg");
        }
    }

    #[test]
    fn test_decide_is_repeatable() {
        let engine = engine(5);
        for outcome in [
            RelayOutcome::Success(201),
            RelayOutcome::TransportError,
            RelayOutcome::Rejected(422),
            RelayOutcome::ServerFailure(503),
        ] {
            assert_eq!(engine.decide(outcome), engine.decide(outcome));
        }
    }
}
