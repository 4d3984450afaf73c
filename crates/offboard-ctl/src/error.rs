use std::time::Duration;

/// Failures reported by a [`FlightLink`](crate::link::FlightLink) implementation.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link not connected")]
    NotConnected,

    #[error("no acknowledgement for {0} within {1:?}")]
    AckTimeout(&'static str, Duration),

    #[error("{0} request rate-limited")]
    RateLimited(&'static str),

    #[error("transport: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FlightError {
    #[error("{0} rejected by autopilot")]
    Rejected(&'static str),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("{op} did not complete within {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{0} cancelled by shutdown")]
    Cancelled(&'static str),

    #[error("no pose estimate received yet")]
    NoPose,

    #[error("invalid sample: {0}")]
    InvalidSample(&'static str),

    #[error(transparent)]
    Link(#[from] LinkError),
}
