//! Channel-backed loading hook.
//!
//! Turns the outbound hook calls into [`LoadEvent`]s on an unbounded tokio
//! channel, so a transport task (or a test) can consume them in order.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::hook::{FailureKind, LoadHandle, LoadId, LoadingHook, ResponseHead};

/// One delivery from a sink, in the order the sink produced it.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Headers(ResponseHead),
    Chunk(Bytes),
    Completed,
    Failed(FailureKind),
}

impl LoadEvent {
    /// True for the events after which nothing else is delivered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadEvent::Completed | LoadEvent::Failed(_))
    }
}

/// [`LoadingHook`] that forwards every delivery into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelHook {
    tx: mpsc::UnboundedSender<LoadEvent>,
}

impl ChannelHook {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wrap this hook in a [`LoadHandle`] for the given load.
    pub fn into_handle(self, id: LoadId) -> LoadHandle {
        LoadHandle::new(id, Arc::new(self))
    }

    fn send(&self, event: LoadEvent) {
        if self.tx.send(event).is_err() {
            // Receiver gone: the load was torn down on the hook side.
            tracing::trace!("Dropping delivery for a closed load");
        }
    }
}

impl LoadingHook for ChannelHook {
    fn deliver_headers(&self, head: ResponseHead) {
        self.send(LoadEvent::Headers(head));
    }

    fn deliver_body_chunk(&self, chunk: Bytes) {
        self.send(LoadEvent::Chunk(chunk));
    }

    fn deliver_completion(&self) {
        self.send(LoadEvent::Completed);
    }

    fn deliver_failure(&self, kind: FailureKind) {
        self.send(LoadEvent::Failed(kind));
    }
}
