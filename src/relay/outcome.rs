//! Normalized result of one downstream HTTP attempt.

use std::fmt;

/// Status code reserved for "no response was obtained".
///
/// Never a real HTTP status; [`RelayOutcome::from_status`] maps it to
/// [`RelayOutcome::TransportError`].
pub const TRANSPORT_ERROR_STATUS: u16 = 0;

/// Outcome of relaying a single message to the downstream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// 2xx response
    Success(u16),
    /// 4xx response
    Rejected(u16),
    /// 5xx or any other non-2xx, non-4xx response
    ServerFailure(u16),
    /// The call raised before a response was obtained (timeout, refused, DNS, TLS)
    TransportError,
}

impl RelayOutcome {
    /// Classify a numeric status code.
    ///
    /// Status `0` is the transport-error sentinel. Everything outside 2xx/4xx,
    /// including out-of-range values such as 1xx, 3xx or 999, is a server failure.
    pub fn from_status(status: u16) -> Self {
        match status {
            TRANSPORT_ERROR_STATUS => RelayOutcome::TransportError,
            200..=299 => RelayOutcome::Success(status),
            400..=499 => RelayOutcome::Rejected(status),
            _ => RelayOutcome::ServerFailure(status),
        }
    }

    /// The status code carried by this outcome, `None` for transport errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayOutcome::Success(s) | RelayOutcome::Rejected(s) | RelayOutcome::ServerFailure(s) => {
                Some(*s)
            }
            RelayOutcome::TransportError => None,
        }
    }
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::Success(s) => write!(f, "success ({})", s),
            RelayOutcome::Rejected(s) => write!(f, "rejected ({})", s),
            RelayOutcome::ServerFailure(s) => write!(f, "server failure ({})", s),
            RelayOutcome::TransportError => write!(f, "transport error"),
        }
    }
}
