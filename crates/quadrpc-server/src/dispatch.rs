//! Handler registration and dispatch.
//!
//! A [`HandlerRegistry`] maps operation names to handlers of one of the four
//! call shapes. The typed handler closures are erased into a single
//! `Fn(Call) -> BoxFuture` form at registration time, so the dispatcher can
//! drive any shape the same way: spawn the handler, then send its terminal
//! status unless the call already has one.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use quadrpc_common::{Call, CallContext, CallShape, Deadline, Frame, MessageChannel, Status};
use quadrpc_metrics::{MetricsCollector, INFO_METHOD, METRICS_METHOD};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// How long to wait for the `Open` frame of a new connection.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to keep reading after the trailer, so the peer sees the trailer
/// before the connection goes away.
const LINGER: Duration = Duration::from_secs(1);

type Handler = Arc<dyn Fn(Call) -> BoxFuture<'static, Result<(), Status>> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    shape: CallShape,
    handler: Handler,
}

/// Typed view of the incoming messages of a streaming call.
pub struct RequestStream<Req> {
    call: Call,
    _marker: PhantomData<fn() -> Req>,
}

impl<Req: DeserializeOwned> RequestStream<Req> {
    fn new(call: Call) -> Self {
        Self {
            call,
            _marker: PhantomData,
        }
    }

    /// Next request, or `None` once the caller half-closed.
    pub async fn next(&mut self) -> Result<Option<Req>, Status> {
        self.call.recv().await
    }

    pub fn context(&self) -> CallContext {
        CallContext::new(self.call.clone())
    }
}

/// Typed handle for sending the responses of a streaming call.
///
/// Clones share the call; a clone may be moved into another task.
pub struct ResponseSink<Resp> {
    call: Call,
    _marker: PhantomData<fn(Resp)>,
}

impl<Resp> Clone for ResponseSink<Resp> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Resp: Serialize> ResponseSink<Resp> {
    fn new(call: Call) -> Self {
        Self {
            call,
            _marker: PhantomData,
        }
    }

    pub async fn send(&self, response: &Resp) -> Result<(), Status> {
        self.call.send(response).await
    }

    pub fn context(&self) -> CallContext {
        CallContext::new(self.call.clone())
    }
}

/// Operation name to handler map.
///
/// # Example
///
/// ```
/// use quadrpc_common::Status;
/// use quadrpc_server::HandlerRegistry;
///
/// let mut registry = HandlerRegistry::new();
/// registry.unary("math.Double", |n: i64, _ctx| async move {
///     n.checked_mul(2).ok_or_else(|| Status::invalid_argument("overflow"))
/// });
/// assert!(registry.contains("math.Double"));
/// ```
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler taking one request and returning one response.
    pub fn unary<Req, Resp, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + Sync + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.insert(
            method,
            CallShape::Unary,
            Arc::new(move |call: Call| {
                let handler = handler.clone();
                async move {
                    let request = single_request::<Req>(&call).await?;
                    let response = handler(request, CallContext::new(call.clone())).await?;
                    call.send(&response).await
                }
                .boxed()
            }),
        )
    }

    /// Registers a handler taking one request and streaming responses.
    pub fn server_stream<Req, Resp, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + Sync + 'static,
        F: Fn(Req, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.insert(
            method,
            CallShape::ServerStream,
            Arc::new(move |call: Call| {
                let handler = handler.clone();
                async move {
                    let request = single_request::<Req>(&call).await?;
                    handler(request, ResponseSink::new(call)).await
                }
                .boxed()
            }),
        )
    }

    /// Registers a handler consuming a request stream and returning one response.
    pub fn client_stream<Req, Resp, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + Sync + 'static,
        F: Fn(RequestStream<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.insert(
            method,
            CallShape::ClientStream,
            Arc::new(move |call: Call| {
                let handler = handler.clone();
                async move {
                    let response = handler(RequestStream::new(call.clone())).await?;
                    call.send(&response).await
                }
                .boxed()
            }),
        )
    }

    /// Registers a handler with independent request and response streams.
    pub fn bidi_stream<Req, Resp, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + Sync + 'static,
        F: Fn(RequestStream<Req>, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.insert(
            method,
            CallShape::BidiStream,
            Arc::new(move |call: Call| {
                let handler = handler.clone();
                async move { handler(RequestStream::new(call.clone()), ResponseSink::new(call)).await }
                    .boxed()
            }),
        )
    }

    fn insert(&mut self, method: &str, shape: CallShape, handler: Handler) -> &mut Self {
        if self
            .handlers
            .insert(method.to_string(), Registration { shape, handler })
            .is_some()
        {
            tracing::warn!("Handler for {} replaced", method);
        }
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn shape_of(&self, method: &str) -> Option<CallShape> {
        self.handlers.get(method).map(|r| r.shape)
    }

    /// Registered operation names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    fn lookup(&self, method: &str, shape: CallShape) -> Result<Handler, Status> {
        let registration = self
            .handlers
            .get(method)
            .ok_or_else(|| Status::failed_precondition(format!("unknown method: {}", method)))?;
        if registration.shape != shape {
            return Err(Status::failed_precondition(format!(
                "method {} is {}, called as {}",
                method, registration.shape, shape
            )));
        }
        Ok(registration.handler.clone())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Reads the one request of a Unary or ServerStream call, then watches the
/// ended request direction for a caller `Cancel` while the handler runs.
async fn single_request<Req: DeserializeOwned>(call: &Call) -> Result<Req, Status> {
    let request = call
        .recv()
        .await?
        .ok_or_else(|| Status::invalid_argument("missing request message"))?;

    let watched = call.clone();
    tokio::spawn(async move { watched.watch_cancel().await });
    Ok(request)
}

/// Runs callee-side calls against a [`HandlerRegistry`].
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    metrics: Arc<dyn MetricsCollector>,
    max_call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: HandlerRegistry,
        metrics: Arc<dyn MetricsCollector>,
        max_call_timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            metrics,
            max_call_timeout,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsCollector> {
        &self.metrics
    }

    /// Serves one call on a freshly accepted channel.
    ///
    /// Reads the `Open` frame, derives the callee deadline from the
    /// propagated timeout (capped by the server maximum), dispatches, and
    /// returns the terminal status. Channels that close or misbehave before
    /// opening a call are logged and yield `Internal`.
    pub async fn serve_channel(&self, channel: MessageChannel) -> Status {
        let header = match tokio::time::timeout(OPEN_TIMEOUT, channel.recv()).await {
            Ok(Ok(Some(Frame::Open(header)))) => header,
            Ok(Ok(Some(other))) => {
                tracing::warn!("Expected open frame from {}, got {}", channel.peer(), other.kind());
                return Status::internal("expected open frame");
            }
            Ok(Ok(None)) => {
                tracing::debug!("Channel from {} closed before opening a call", channel.peer());
                return Status::internal("channel closed before opening a call");
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to read open frame from {}: {}", channel.peer(), e);
                return Status::classify(&e);
            }
            Err(_) => {
                tracing::warn!("Timed out waiting for open frame from {}", channel.peer());
                return Status::internal("timed out waiting for open frame");
            }
        };

        let deadline = match header.timeout() {
            Some(timeout) => Deadline::after(timeout).capped(self.max_call_timeout),
            None => Deadline::after(self.max_call_timeout),
        };
        tracing::debug!(
            "Dispatching {} ({}) call {} from {}",
            header.method,
            header.shape,
            header.call_id,
            channel.peer()
        );

        let call = Call::callee(header, channel.clone(), Some(deadline));
        let status = self.dispatch(call).await;
        linger(&channel).await;
        status
    }

    /// Runs the handler for `call` and ends the call with its status.
    pub async fn dispatch(&self, call: Call) -> Status {
        let start = Instant::now();
        self.metrics.call_started();

        let outcome = if self.metrics.is_metrics_request(call.method()) {
            self.serve_builtin(&call).await
        } else {
            match self.registry.lookup(call.method(), call.shape()) {
                Ok(handler) => match tokio::spawn(handler(call.clone())).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!("Handler for {} did not complete: {}", call.method(), e);
                        Err(Status::from_join_error(&e))
                    }
                },
                Err(status) => Err(status),
            }
        };

        let status = match call.status() {
            // Aborted, cancelled or expired while the handler ran.
            Some(existing) => existing,
            None => {
                let status = outcome.err().unwrap_or_else(Status::ok);
                if let Err(e) = call.finish(status.clone()).await {
                    tracing::debug!("Trailer for call {} not delivered: {}", call.id(), e);
                }
                call.status().unwrap_or(status)
            }
        };

        if status.is_ok() {
            tracing::debug!("{} completed in {:?}", call.method(), start.elapsed());
        } else {
            tracing::warn!("{} failed: {}", call.method(), status);
        }
        self.metrics.record_call(call.method(), start, status.code());
        status
    }

    async fn serve_builtin(&self, call: &Call) -> Result<(), Status> {
        if call.shape() != CallShape::Unary {
            return Err(Status::failed_precondition(format!(
                "method {} is unary, called as {}",
                call.method(),
                call.shape()
            )));
        }
        single_request::<()>(call).await?;

        if call.method() == METRICS_METHOD {
            call.send(&self.metrics.snapshot()).await
        } else if call.method() == INFO_METHOD {
            call.send(&self.metrics.info(self.registry.methods())).await
        } else {
            Err(Status::failed_precondition(format!("unknown method: {}", call.method())))
        }
    }
}

/// Drains the inbound side until the peer closes, bounded by [`LINGER`].
async fn linger(channel: &MessageChannel) {
    let drain = async {
        while let Ok(Some(frame)) = channel.recv().await {
            tracing::trace!("Discarding {} frame after trailer", frame.kind());
        }
    };
    let _ = tokio::time::timeout(LINGER, drain).await;
}
