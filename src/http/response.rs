//! Response assembly from load events.
//!
//! # Responsibilities
//! - Wait for the committed head and turn it into an HTTP response
//! - Stream body chunks to the client as the sink produces them
//! - Report a client disconnect back to the engine as a cancelled load
//! - Map failures before the head to 502 Bad Gateway
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped automatically
//! - A failure after the head aborts the body, since the status is already sent

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use http::header::{self, HeaderValue};
use http::{HeaderMap, StatusCode};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::dispatch::DispatchEngine;
use crate::hook::{LoadEvent, LoadId, ResponseHead};
use crate::sink::CachePolicy;

const HOP_BY_HOP: [header::HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
];

/// Cancels the load when dropped, unless the load ended on its own.
struct CancelGuard {
    engine: Arc<DispatchEngine>,
    id: LoadId,
    armed: bool,
}

impl CancelGuard {
    fn new(engine: Arc<DispatchEngine>, id: LoadId) -> Self {
        Self {
            engine,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed && self.engine.notify_load_cancelled(self.id) {
            tracing::debug!(load_id = %self.id, "Client went away, load cancelled");
        }
    }
}

/// Build the client response for a handled load.
pub async fn stream_load(
    engine: Arc<DispatchEngine>,
    id: LoadId,
    mut events: UnboundedReceiver<LoadEvent>,
) -> Response {
    let mut guard = CancelGuard::new(engine, id);

    let head = match events.recv().await {
        Some(LoadEvent::Headers(head)) => head,
        Some(LoadEvent::Failed(kind)) => {
            guard.disarm();
            tracing::warn!(load_id = %id, failure = %kind, "Load failed before response head");
            return (StatusCode::BAD_GATEWAY, kind.to_string()).into_response();
        }
        Some(event) => {
            tracing::error!(load_id = %id, ?event, "Body event arrived before response head");
            return (StatusCode::BAD_GATEWAY, "Malformed interception response").into_response();
        }
        None => {
            guard.disarm();
            return (StatusCode::BAD_GATEWAY, "Handler produced no response").into_response();
        }
    };

    let mut response = Response::new(body_stream(events, guard));
    *response.status_mut() = head.status;
    *response.headers_mut() = response_headers(head);
    response
}

fn response_headers(head: ResponseHead) -> HeaderMap {
    let mut headers = head.headers;
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    if head.cache_policy == CachePolicy::NotAllowed {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    headers
}

fn body_stream(events: UnboundedReceiver<LoadEvent>, guard: CancelGuard) -> Body {
    let chunks = stream::unfold(Some((events, guard)), |state| async move {
        let (mut events, mut guard) = state?;
        match events.recv().await {
            Some(LoadEvent::Chunk(chunk)) => Some((Ok::<Bytes, io::Error>(chunk), Some((events, guard)))),
            Some(LoadEvent::Completed) => {
                guard.disarm();
                None
            }
            Some(LoadEvent::Failed(kind)) => {
                guard.disarm();
                tracing::warn!(load_id = %guard.id, failure = %kind, "Load failed mid-stream");
                Some((Err(io::Error::other(kind.to_string())), None))
            }
            Some(LoadEvent::Headers(_)) => {
                Some((Err(io::Error::other("duplicate response head")), None))
            }
            None => {
                guard.disarm();
                Some((Err(io::Error::other("load ended without completion")), None))
            }
        }
    });
    Body::from_stream(chunks)
}
