//! Error definitions for rule registration and response emission.
//!
//! # Design Decisions
//! - Registration errors are surfaced synchronously; a rejected rule is never added
//! - Emission errors are programming errors in a handler and are never retried
//! - Cancellation is not an error and has no variant here

use thiserror::Error;

/// Errors raised while building or registering an interception rule.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The matcher specification is structurally unusable (empty host, bad path...).
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// A regular expression failed to compile at registration time.
    #[error("Invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors raised by a [`ResponseSink`](crate::sink::ResponseSink) when a handler
/// violates the emission protocol.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Headers, status and cache policy are frozen once the body has started.
    #[error("Response headers are frozen")]
    SinkFrozen,

    /// A complete response was already emitted, or streaming has begun.
    #[error("Response already sent")]
    AlreadyResponded,

    /// Body data was written before the response was started.
    #[error("Response stream not started")]
    SinkNotStarted,

    /// The sink reached a terminal state.
    #[error("Response sink is closed")]
    SinkClosed,

    /// A header name or value is not valid HTTP.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A JSON body could not be serialized.
    #[error("Failed to encode JSON body: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl SinkError {
    /// True for errors caused by calling an operation in the wrong lifecycle state.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SinkError::SinkFrozen
                | SinkError::AlreadyResponded
                | SinkError::SinkNotStarted
                | SinkError::SinkClosed
        )
    }
}
