//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! hook: notify_request_started(request, load)
//!     → engine.rs (first match from the registry)
//!         none  → Outcome::Unhandled (real network path proceeds)
//!         match → new ResponseSink, bound in bridge.rs
//!               → handler.rs (invoke, possibly spawning a task)
//!               → Outcome::Handled(sink)
//!
//! hook: notify_load_cancelled(load_id)
//!     → bridge.rs → ResponseSink::cancel
//! ```

pub mod bridge;
pub mod engine;
pub mod handler;

pub use bridge::CancellationBridge;
pub use engine::{DispatchEngine, Outcome};
pub use handler::Handler;
