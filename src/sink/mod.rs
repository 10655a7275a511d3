//! Response emission subsystem.
//!
//! # Data Flow
//! ```text
//! Handler
//!     → ResponseSink (response.rs)
//!         one-shot:  head + single chunk + completion
//!         streaming: head, chunk*, completion | failure
//!     → LoadingHook (crate::hook)
//!
//! CancellationBridge → ResponseSink::cancel → Cancelled (silences the sink)
//! ```

pub mod content;
pub mod response;
pub mod state;

pub use content::CachePolicy;
pub use response::{ResponseSink, UpstreamMetadata};
pub(crate) use response::WeakResponseSink;
pub use state::SinkState;
