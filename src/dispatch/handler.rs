//! Interception handlers.
//!
//! A [`Handler`] receives the matched request and an owned [`ResponseSink`].
//! It may respond before returning, or keep the sink and respond later from
//! any thread or task.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::hook::FailureKind;
use crate::request::InterceptedRequest;
use crate::sink::ResponseSink;

type HandlerFn = dyn Fn(Arc<InterceptedRequest>, ResponseSink) + Send + Sync;

/// Callback invoked for every request its rule matches.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Run `f` on the dispatching thread.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Arc<InterceptedRequest>, ResponseSink) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Run the future returned by `f` as a tokio task, so dispatch returns at once.
    ///
    /// Must be invoked from within a tokio runtime; otherwise the load fails.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<InterceptedRequest>, ResponseSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(move |request, sink| match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(f(request, sink));
            }
            Err(_) => {
                tracing::error!(load_id = %sink.load_id(), "Async handler invoked outside a tokio runtime");
                let _ = sink.fail(FailureKind::Handler("no async runtime available".into()));
            }
        })
    }

    /// Invoke the handler, failing the sink if it panics.
    pub(crate) fn invoke(&self, request: Arc<InterceptedRequest>, sink: ResponseSink) {
        let guard = sink.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.0)(request, sink)));
        if result.is_err() {
            tracing::error!(load_id = %guard.load_id(), "Interception handler panicked");
            let _ = guard.fail(FailureKind::Handler("handler panicked".into()));
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}
