//! Response sink lifecycle.
//!
//! # States
//! - HeadersPending: status, headers and cache policy still mutable
//! - Streaming: head delivered, body chunks flowing, headers frozen
//! - Completed / Cancelled / Errored: terminal, nothing else is delivered
//!
//! # State Transitions
//! ```text
//! (construction)  → HeadersPending
//! HeadersPending  → Streaming:  begin_with_upstream_metadata
//! HeadersPending  → Completed:  any one-shot responder
//! Streaming       → Completed:  finish
//! HeadersPending | Streaming → Errored:    fail, or every handle dropped
//! HeadersPending | Streaming → Cancelled:  host aborted the load
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkState {
    HeadersPending,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

impl SinkState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SinkState::Completed | SinkState::Cancelled | SinkState::Errored
        )
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SinkState::HeadersPending => "headers_pending",
            SinkState::Streaming => "streaming",
            SinkState::Completed => "completed",
            SinkState::Cancelled => "cancelled",
            SinkState::Errored => "errored",
        }
    }
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
