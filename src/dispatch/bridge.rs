//! Cancellation bridge.
//!
//! # Responsibilities
//! - Remember which sink is bound to which in-flight load
//! - Forward host cancellation to the bound sink
//! - Forget a load as soon as its sink reaches a terminal state
//!
//! # Design Decisions
//! - Holds weak references only; the handler owns the sink
//! - Cancelling an unknown or finished load is a silent no-op

use std::sync::Arc;

use dashmap::DashMap;

use crate::hook::LoadId;
use crate::sink::{ResponseSink, WeakResponseSink};

#[derive(Clone, Default)]
pub struct CancellationBridge {
    loads: Arc<DashMap<LoadId, WeakResponseSink>>,
}

impl CancellationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `sink` to its load. The entry removes itself when the sink finishes.
    pub fn bind(&self, sink: &ResponseSink) {
        let id = sink.load_id();
        self.loads.insert(id, sink.downgrade());

        let loads = Arc::downgrade(&self.loads);
        sink.set_release(move || {
            if let Some(loads) = loads.upgrade() {
                loads.remove(&id);
            }
        });
    }

    /// Cancel the sink bound to `id`. Returns true if an open sink was cancelled.
    pub fn cancel(&self, id: LoadId) -> bool {
        // Remove first so no map guard is held while the sink runs its callbacks.
        let Some((_, weak)) = self.loads.remove(&id) else {
            tracing::debug!(load_id = %id, "Cancellation for unknown or finished load");
            return false;
        };
        match weak.upgrade() {
            Some(sink) => {
                let cancelled = sink.cancel();
                if cancelled {
                    tracing::debug!(load_id = %id, "Load cancelled by host");
                }
                cancelled
            }
            None => false,
        }
    }

    /// Number of loads whose sink is still open.
    pub fn in_flight(&self) -> usize {
        self.loads.iter().filter(|entry| entry.value().is_alive()).count()
    }
}
