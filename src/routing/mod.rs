//! Rule matching subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (any time, usually at startup):
//!     register_*(matcher args, handler)
//!     → matcher.rs (validate, compile regex)
//!     → registry.rs (append entry with next sequence number)
//!
//! Lookup (every intercepted request):
//!     InterceptedRequest
//!     → registry.rs (scan entries in sequence order)
//!     → matcher.rs (evaluate each matcher)
//!     → first matching entry, or None
//! ```
//!
//! # Design Decisions
//! - Registration order is match priority, fixed forever
//! - Invalid rules fail at registration, never silently at match time
//! - Deterministic: same request and same rules always pick the same entry

pub mod matcher;
pub mod registry;

pub use matcher::{Matcher, Predicate};
pub use registry::{RuleEntry, RuleRegistry};
