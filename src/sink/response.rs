//! Per-load response sink.
//!
//! # Responsibilities
//! - Accumulate status, headers and cache policy until the head is committed
//! - Emit a complete response in one call, or a head followed by ordered chunks
//! - Enforce the one-writer emission protocol and reject out-of-order calls
//! - Absorb host cancellation at any point without double completion
//!
//! # Design Decisions
//! - One mutex guards the whole lifecycle; hook deliveries happen under it, so
//!   chunk order equals call order and cancellation can never interleave a delivery
//! - A hook may cancel its own load from inside a delivery; the cancellation is
//!   recorded and applied as soon as that delivery returns
//! - After cancellation every emission call is a silent no-op
//! - Handles are cheap clones of one shared sink; dropping the last handle of an
//!   open sink fails the load instead of leaving the hook waiting forever

use std::mem;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread::{self, ThreadId};

use bytes::{Buf, Bytes};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::SinkError;
use crate::hook::{FailureKind, LoadHandle, LoadId, LoadingHook, ResponseHead};
use crate::observability::metrics;
use crate::request::InterceptedRequest;
use crate::sink::content::{self, CachePolicy};
use crate::sink::state::SinkState;

type Callback = Box<dyn FnOnce() + Send>;

/// Status and headers taken from a real upstream response that is being relayed.
#[derive(Debug, Clone)]
pub struct UpstreamMetadata {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl UpstreamMetadata {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

impl From<&http::response::Parts> for UpstreamMetadata {
    fn from(parts: &http::response::Parts) -> Self {
        Self {
            status: parts.status,
            headers: parts.headers.clone(),
        }
    }
}

impl<B> From<&http::Response<B>> for UpstreamMetadata {
    fn from(response: &http::Response<B>) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
        }
    }
}

struct SinkInner {
    state: SinkState,
    status: Option<StatusCode>,
    headers: HeaderMap,
    cache_policy: CachePolicy,
    stop_loading: Vec<Callback>,
    release: Option<Callback>,
}

impl SinkInner {
    fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: self.headers.clone(),
            cache_policy: self.cache_policy,
        }
    }
}

struct SinkShared {
    request: Arc<InterceptedRequest>,
    load: LoadHandle,
    inner: Mutex<SinkInner>,
    cancelled: watch::Sender<bool>,
    /// Thread currently inside a hook call, and whether that call ends the load.
    delivering: Mutex<Option<(ThreadId, bool)>>,
    /// Set when the hook cancels the load from inside a non-terminal delivery.
    deferred_cancel: AtomicBool,
}

impl Drop for SinkShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state.is_terminal() {
            return;
        }
        tracing::warn!(
            load_id = %self.load.id(),
            state = %inner.state,
            "Response sink dropped before the response finished"
        );
        inner.state = SinkState::Errored;
        inner.stop_loading.clear();
        self.load.hook().deliver_failure(FailureKind::Abandoned);
        if let Some(release) = inner.release.take() {
            release();
        }
        metrics::record_sink_finished(SinkState::Errored);
    }
}

/// Handle through which a handler emits the response for one intercepted load.
#[derive(Clone)]
pub struct ResponseSink {
    shared: Arc<SinkShared>,
}

impl ResponseSink {
    pub(crate) fn new(request: Arc<InterceptedRequest>, load: LoadHandle) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            shared: Arc::new(SinkShared {
                request,
                load,
                inner: Mutex::new(SinkInner {
                    state: SinkState::HeadersPending,
                    status: None,
                    headers: HeaderMap::new(),
                    cache_policy: CachePolicy::default(),
                    stop_loading: Vec::new(),
                    release: None,
                }),
                cancelled,
                delivering: Mutex::new(None),
                deferred_cancel: AtomicBool::new(false),
            }),
        }
    }

    pub fn request(&self) -> &Arc<InterceptedRequest> {
        &self.shared.request
    }

    pub fn load_id(&self) -> LoadId {
        self.shared.load.id()
    }

    pub fn state(&self) -> SinkState {
        self.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == SinkState::Cancelled
    }

    /// Status that will be (or was) committed; 200 unless set otherwise.
    pub fn status(&self) -> StatusCode {
        self.lock().status.unwrap_or(StatusCode::OK)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.lock().cache_policy
    }

    // --- Head mutation ---

    pub fn set_header(&self, name: &str, value: &str) -> Result<(), SinkError> {
        let (name, value) = parse_header(name, value)?;
        self.mutate_head("set_header", |inner| {
            inner.headers.insert(name, value);
        })
    }

    /// Set several headers at once. Nothing is applied if any pair is invalid.
    pub fn set_headers<I, K, V>(&self, headers: I) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parsed = headers
            .into_iter()
            .map(|(k, v)| parse_header(k.as_ref(), v.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.mutate_head("set_headers", |inner| {
            for (name, value) in parsed {
                inner.headers.insert(name, value);
            }
        })
    }

    pub fn set_status(&self, status: StatusCode) -> Result<(), SinkError> {
        self.mutate_head("set_status", |inner| inner.status = Some(status))
    }

    pub fn set_cache_policy(&self, policy: CachePolicy) -> Result<(), SinkError> {
        self.mutate_head("set_cache_policy", |inner| inner.cache_policy = policy)
    }

    // --- One-shot responders ---

    pub fn respond_with_data(&self, data: impl Into<Bytes>, mime_type: &str) -> Result<(), SinkError> {
        self.respond("respond_with_data", data.into(), mime_type, None)
    }

    /// Like [`respond_with_data`](Self::respond_with_data) but always applies `status`.
    pub fn respond_with_data_status(
        &self,
        data: impl Into<Bytes>,
        mime_type: &str,
        status: StatusCode,
    ) -> Result<(), SinkError> {
        self.respond("respond_with_data", data.into(), mime_type, Some(status))
    }

    pub fn respond_with_text(&self, text: &str) -> Result<(), SinkError> {
        let body = Bytes::copy_from_slice(text.as_bytes());
        self.respond("respond_with_text", body, content::TEXT_PLAIN, None)
    }

    pub fn respond_with_html(&self, html: &str) -> Result<(), SinkError> {
        let body = Bytes::copy_from_slice(html.as_bytes());
        self.respond("respond_with_html", body, content::TEXT_HTML, None)
    }

    pub fn respond_with_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), SinkError> {
        let body = content::json_body(value)?;
        self.respond("respond_with_json", body, content::APPLICATION_JSON, None)
    }

    /// Respond with already-encoded image bytes; `mime_type` defaults to `image/png`.
    pub fn respond_with_image(
        &self,
        data: impl Into<Bytes>,
        mime_type: Option<&str>,
    ) -> Result<(), SinkError> {
        let mime_type = mime_type.unwrap_or(content::IMAGE_PNG);
        self.respond("respond_with_image", data.into(), mime_type, None)
    }

    /// Respond with `status` and a short plain-text body. Only valid before streaming.
    pub fn respond_with_error(&self, status: StatusCode, text: &str) -> Result<(), SinkError> {
        let body = content::error_body(status, text);
        self.respond("respond_with_error", body, content::TEXT_PLAIN, Some(status))
    }

    fn respond(
        &self,
        op: &'static str,
        body: Bytes,
        mime_type: &str,
        status: Option<StatusCode>,
    ) -> Result<(), SinkError> {
        let mut inner = self.lock();
        match inner.state {
            SinkState::HeadersPending => {}
            SinkState::Cancelled => return Ok(()),
            SinkState::Streaming | SinkState::Completed => {
                return Err(self.violation(op, inner.state, SinkError::AlreadyResponded))
            }
            SinkState::Errored => return Err(self.violation(op, inner.state, SinkError::SinkClosed)),
        }

        if !inner.headers.contains_key(CONTENT_TYPE) {
            let value = HeaderValue::from_str(mime_type)
                .map_err(|_| SinkError::InvalidHeader(format!("content type `{}`", mime_type)))?;
            inner.headers.insert(CONTENT_TYPE, value);
        }
        inner.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        if let Some(status) = status {
            inner.status = Some(status);
        }

        let head = inner.head();
        self.deliver(false, |hook| hook.deliver_headers(head));
        let Some(inner) = self.settle(inner) else {
            return Ok(());
        };
        metrics::record_body_bytes(body.len());
        self.deliver(false, |hook| hook.deliver_body_chunk(body));
        let Some(inner) = self.settle(inner) else {
            return Ok(());
        };
        self.deliver(true, |hook| hook.deliver_completion());
        self.enter_terminal(inner, SinkState::Completed);
        Ok(())
    }

    // --- Streaming ---

    /// Commit the head from an upstream response and start streaming.
    ///
    /// Headers set earlier on this sink override the upstream ones. When
    /// `caching_allowed` is false the cache policy becomes `NotAllowed`.
    pub fn begin_with_upstream_metadata(
        &self,
        metadata: UpstreamMetadata,
        caching_allowed: bool,
    ) -> Result<(), SinkError> {
        const OP: &str = "begin_with_upstream_metadata";
        let mut inner = self.lock();
        match inner.state {
            SinkState::HeadersPending => {}
            SinkState::Cancelled => return Ok(()),
            SinkState::Streaming => {
                return Err(self.violation(OP, inner.state, SinkError::AlreadyResponded))
            }
            SinkState::Completed | SinkState::Errored => {
                return Err(self.violation(OP, inner.state, SinkError::SinkClosed))
            }
        }

        let mut headers = metadata.headers;
        let local = mem::take(&mut inner.headers);
        for (name, value) in local.iter() {
            headers.insert(name.clone(), value.clone());
        }
        inner.headers = headers;
        inner.status = Some(metadata.status);
        if !caching_allowed {
            inner.cache_policy = CachePolicy::NotAllowed;
        }
        inner.state = SinkState::Streaming;

        tracing::debug!(
            load_id = %self.load_id(),
            status = metadata.status.as_u16(),
            "Response stream started"
        );
        let head = inner.head();
        self.deliver(false, |hook| hook.deliver_headers(head));
        let _ = self.settle(inner);
        Ok(())
    }

    /// Append body bytes. Chunks reach the hook in call order.
    pub fn write_chunk(&self, chunk: impl Into<Bytes>) -> Result<(), SinkError> {
        const OP: &str = "write_chunk";
        let inner = self.lock();
        match inner.state {
            SinkState::Streaming => {
                let chunk = chunk.into();
                metrics::record_body_bytes(chunk.len());
                self.deliver(false, |hook| hook.deliver_body_chunk(chunk));
                let _ = self.settle(inner);
                Ok(())
            }
            SinkState::Cancelled => Ok(()),
            SinkState::HeadersPending => {
                Err(self.violation(OP, inner.state, SinkError::SinkNotStarted))
            }
            SinkState::Completed | SinkState::Errored => {
                Err(self.violation(OP, inner.state, SinkError::SinkClosed))
            }
        }
    }

    /// End a started stream.
    pub fn finish(&self) -> Result<(), SinkError> {
        const OP: &str = "finish";
        let inner = self.lock();
        match inner.state {
            SinkState::Streaming => {
                self.deliver(true, |hook| hook.deliver_completion());
                self.enter_terminal(inner, SinkState::Completed);
                Ok(())
            }
            SinkState::Cancelled => Ok(()),
            SinkState::HeadersPending => {
                Err(self.violation(OP, inner.state, SinkError::SinkNotStarted))
            }
            SinkState::Completed | SinkState::Errored => {
                Err(self.violation(OP, inner.state, SinkError::SinkClosed))
            }
        }
    }

    /// Fail the load, before or during streaming. The hook sees `deliver_failure` once.
    pub fn fail(&self, kind: FailureKind) -> Result<(), SinkError> {
        let inner = self.lock();
        match inner.state {
            SinkState::HeadersPending | SinkState::Streaming => {
                tracing::warn!(load_id = %self.load_id(), state = %inner.state, failure = %kind, "Response failed");
                self.deliver(true, |hook| hook.deliver_failure(kind));
                self.enter_terminal(inner, SinkState::Errored);
                Ok(())
            }
            SinkState::Cancelled => Ok(()),
            SinkState::Completed | SinkState::Errored => {
                Err(self.violation("fail", inner.state, SinkError::SinkClosed))
            }
        }
    }

    /// Relay an upstream response: its head, every data frame as a chunk, then
    /// completion.
    ///
    /// A body error fails the load with [`FailureKind::Upstream`]. Stops reading
    /// and returns `Ok` as soon as the host cancels the load.
    pub async fn pipe<B>(&self, response: http::Response<B>, caching_allowed: bool) -> Result<(), SinkError>
    where
        B: HttpBody,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = response.into_parts();
        self.begin_with_upstream_metadata(UpstreamMetadata::from(&parts), caching_allowed)?;
        let mut body = pin!(body);
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancelled() => return Ok(()),
                frame = body.frame() => frame,
            };
            match frame {
                Some(Ok(frame)) => {
                    // Trailers carry nothing the hook can use.
                    if let Ok(mut data) = frame.into_data() {
                        let len = data.remaining();
                        if len > 0 {
                            self.write_chunk(data.copy_to_bytes(len))?;
                        }
                    }
                }
                Some(Err(err)) => return self.fail(FailureKind::Upstream(err.to_string())),
                None => return self.finish(),
            }
        }
    }

    // --- Cancellation ---

    /// Force the sink into `Cancelled`. Returns false if it was already terminal.
    ///
    /// Safe to call from inside a hook delivery for this same load: a cancel
    /// raised during headers or a chunk takes effect once that delivery returns,
    /// and one raised during completion or failure returns false.
    pub(crate) fn cancel(&self) -> bool {
        let inner = match self.shared.inner.try_lock() {
            Ok(inner) => inner,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => match self.delivering_on_this_thread() {
                Some(true) => return false,
                Some(false) => return !self.shared.deferred_cancel.swap(true, Ordering::AcqRel),
                None => self.lock(),
            },
        };
        if inner.state.is_terminal() {
            return false;
        }
        self.apply_cancel(inner);
        true
    }

    fn apply_cancel(&self, inner: MutexGuard<'_, SinkInner>) {
        let callbacks = self.enter_terminal(inner, SinkState::Cancelled);
        self.shared.cancelled.send_replace(true);
        for callback in callbacks {
            callback();
        }
    }

    /// Run `f` once if the host cancels this load.
    ///
    /// Runs immediately if the sink is already cancelled and never runs if the
    /// response completed or failed on its own.
    pub fn on_stop_loading<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.lock();
        match inner.state {
            SinkState::HeadersPending | SinkState::Streaming => inner.stop_loading.push(Box::new(f)),
            SinkState::Cancelled => {
                drop(inner);
                f();
            }
            SinkState::Completed | SinkState::Errored => {}
        }
    }

    /// Resolves once the host cancels this load. Pending forever if it never does,
    /// so use it inside `tokio::select!` next to the actual work.
    pub async fn cancelled(&self) {
        let mut rx = self.shared.cancelled.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    // --- Internals ---

    pub(crate) fn downgrade(&self) -> WeakResponseSink {
        WeakResponseSink(Arc::downgrade(&self.shared))
    }

    /// Install the callback run exactly once when the sink reaches a terminal state.
    pub(crate) fn set_release<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            drop(inner);
            f();
        } else {
            inner.release = Some(Box::new(f));
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call the hook while the caller holds `inner`. `terminal` marks
    /// completion and failure deliveries.
    fn deliver<F>(&self, terminal: bool, f: F)
    where
        F: FnOnce(&dyn LoadingHook),
    {
        self.set_delivering(Some((thread::current().id(), terminal)));
        f(self.shared.load.hook());
        self.set_delivering(None);
    }

    fn set_delivering(&self, value: Option<(ThreadId, bool)>) {
        *self.shared.delivering.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn delivering_on_this_thread(&self) -> Option<bool> {
        let current = thread::current().id();
        match *self.shared.delivering.lock().unwrap_or_else(PoisonError::into_inner) {
            Some((thread, terminal)) if thread == current => Some(terminal),
            _ => None,
        }
    }

    /// Apply a cancellation the hook raised during the last delivery.
    /// Hands the guard back only while the sink is still open.
    fn settle<'a>(&self, inner: MutexGuard<'a, SinkInner>) -> Option<MutexGuard<'a, SinkInner>> {
        if !self.shared.deferred_cancel.swap(false, Ordering::AcqRel) {
            return Some(inner);
        }
        tracing::debug!(load_id = %self.load_id(), "Load cancelled from inside a hook delivery");
        self.apply_cancel(inner);
        None
    }

    fn mutate_head<F>(&self, op: &'static str, f: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut SinkInner),
    {
        let mut inner = self.lock();
        match inner.state {
            SinkState::HeadersPending => {
                f(&mut inner);
                Ok(())
            }
            SinkState::Cancelled => Ok(()),
            SinkState::Streaming => Err(self.violation(op, inner.state, SinkError::SinkFrozen)),
            SinkState::Completed | SinkState::Errored => {
                Err(self.violation(op, inner.state, SinkError::SinkClosed))
            }
        }
    }

    /// Move to a terminal state and return the stop-loading callbacks to run.
    /// The lock is released before the release callback runs.
    fn enter_terminal(&self, mut inner: MutexGuard<'_, SinkInner>, state: SinkState) -> Vec<Callback> {
        inner.state = state;
        let callbacks = mem::take(&mut inner.stop_loading);
        let release = inner.release.take();
        drop(inner);

        if let Some(release) = release {
            release();
        }
        metrics::record_sink_finished(state);
        tracing::debug!(load_id = %self.load_id(), state = %state, "Response sink finished");

        if state == SinkState::Cancelled {
            callbacks
        } else {
            Vec::new()
        }
    }

    fn violation(&self, op: &'static str, state: SinkState, err: SinkError) -> SinkError {
        tracing::warn!(
            load_id = %self.load_id(),
            operation = op,
            state = %state,
            error = %err,
            "Response protocol violation"
        );
        err
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("load_id", &self.load_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Non-owning reference used by the cancellation bridge.
#[derive(Clone)]
pub(crate) struct WeakResponseSink(Weak<SinkShared>);

impl WeakResponseSink {
    pub(crate) fn upgrade(&self) -> Option<ResponseSink> {
        self.0.upgrade().map(|shared| ResponseSink { shared })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), SinkError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| SinkError::InvalidHeader(format!("name `{}`", name)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| SinkError::InvalidHeader(format!("value for `{}`", name)))?;
    Ok((name, value))
}
