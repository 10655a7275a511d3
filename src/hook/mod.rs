//! Boundary with the URL-loading hook.
//!
//! # Data Flow
//! ```text
//! Inbound (hook → core):
//!     notify_request_started(request, LoadHandle) → DispatchEngine
//!     notify_load_cancelled(LoadId)               → CancellationBridge → ResponseSink
//!
//! Outbound (ResponseSink → hook, via LoadingHook):
//!     deliver_headers      at most once, when headers freeze
//!     deliver_body_chunk   zero or more times, in call order
//!     deliver_completion | deliver_failure   exactly once, unless cancelled
//! ```
//!
//! # Design Decisions
//! - The core never performs I/O; a hook implementation owns transport
//! - Hook calls are made while the sink holds its state lock, so they must not block
//! - The one call a hook may make back into its own load is `notify_load_cancelled`;
//!   it takes effect when the current delivery returns, and is refused (false) from
//!   inside `deliver_completion` or `deliver_failure`

pub mod channel;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::sink::CachePolicy;

pub use channel::{ChannelHook, LoadEvent};

/// Identifier of one intercepted load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadId(Uuid);

impl LoadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LoadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for LoadId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Committed response head handed to the hook when headers freeze.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub cache_policy: CachePolicy,
}

impl ResponseHead {
    pub fn caching_allowed(&self) -> bool {
        self.cache_policy != CachePolicy::NotAllowed
    }

    /// The `Content-Type` header, if set.
    pub fn mime_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Why a load ended without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler's upstream source failed mid-stream.
    Upstream(String),
    /// The handler itself failed (panic, missing runtime...).
    Handler(String),
    /// Every handle to the sink was dropped while it was still open.
    Abandoned,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Upstream(msg) => write!(f, "upstream failure: {}", msg),
            FailureKind::Handler(msg) => write!(f, "handler failure: {}", msg),
            FailureKind::Abandoned => write!(f, "response abandoned by handler"),
        }
    }
}

/// Outbound half of the loading hook.
pub trait LoadingHook: Send + Sync {
    fn deliver_headers(&self, head: ResponseHead);
    fn deliver_body_chunk(&self, chunk: Bytes);
    fn deliver_completion(&self);
    fn deliver_failure(&self, kind: FailureKind);
}

/// The hook's handle on one underlying load.
#[derive(Clone)]
pub struct LoadHandle {
    id: LoadId,
    hook: Arc<dyn LoadingHook>,
}

impl LoadHandle {
    pub fn new(id: LoadId, hook: Arc<dyn LoadingHook>) -> Self {
        Self { id, hook }
    }

    pub fn id(&self) -> LoadId {
        self.id
    }

    pub(crate) fn hook(&self) -> &dyn LoadingHook {
        self.hook.as_ref()
    }
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle").field("id", &self.id).finish()
    }
}
