//! QuadRPC Call Engine
//!
//! A [`Call`] is one RPC invocation seen from one side of a
//! [`MessageChannel`]. It enforces the call shape, tracks the phase of both
//! directions, owns the optional [`Deadline`], and carries the single
//! terminal [`Status`].
//!
//! # Concurrency
//!
//! `Call` is cheap to clone. One clone may be blocked in [`Call::recv`]
//! while another sends from a different task; that is how bidi calls are
//! driven. Any terminal status (completion, abort, deadline) wakes every
//! blocked operation on the call.
//!
//! # Shapes
//!
//! A direction that carries a single message (the caller side of Unary and
//! ServerStream, the callee side of Unary and ClientStream) is closed by its
//! one `send`. Streaming directions end with [`Call::half_close`], or for
//! the callee with [`Call::finish`].

mod deadline;
mod state;

pub use deadline::{Deadline, DeadlineTimer};
pub use state::{CallState, Direction, Phase, RecvGate};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::protocol::{CallHeader, CallId, CallShape, Envelope, Frame, Status};
use crate::transport::MessageChannel;

/// Upper bound on how long an abort waits to notify the peer.
const ABORT_NOTICE_TIMEOUT: Duration = Duration::from_millis(250);

const DEADLINE_MESSAGE: &str = "deadline exceeded";

/// Which end of the call this handle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Caller,
    Callee,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Caller => "caller",
            Side::Callee => "callee",
        }
    }
}

/// One RPC invocation bound to a message channel.
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

struct CallInner {
    id: CallId,
    method: String,
    shape: CallShape,
    side: Side,
    channel: MessageChannel,
    deadline: Option<Deadline>,
    state: Mutex<CallState>,
    terminal_tx: watch::Sender<Option<Status>>,
    timer: Mutex<Option<DeadlineTimer>>,
}

impl Call {
    /// Starts a call from the caller side by sending the `Open` frame.
    ///
    /// The header's timeout is set from the remaining time of `deadline`.
    /// An already expired deadline fails with `DeadlineExceeded` before
    /// anything is sent.
    pub async fn open(
        channel: MessageChannel,
        mut header: CallHeader,
        deadline: Option<Deadline>,
    ) -> Result<Call, Status> {
        if let Some(deadline) = deadline {
            if deadline.is_expired() {
                return Err(Status::deadline_exceeded(DEADLINE_MESSAGE));
            }
            header = header.with_timeout(deadline.remaining());
        }

        channel
            .send(&Frame::Open(header.clone()))
            .await
            .map_err(|e| Status::classify(&e))?;

        tracing::debug!(
            call_id = header.call_id,
            method = %header.method,
            shape = %header.shape,
            "call opened"
        );
        Ok(Call::new(header, channel, deadline, Side::Caller))
    }

    /// Builds the callee side of a call whose `Open` frame was already read.
    ///
    /// Must be called within a tokio runtime when `deadline` is set.
    pub fn callee(header: CallHeader, channel: MessageChannel, deadline: Option<Deadline>) -> Call {
        Call::new(header, channel, deadline, Side::Callee)
    }

    fn new(header: CallHeader, channel: MessageChannel, deadline: Option<Deadline>, side: Side) -> Call {
        let (terminal_tx, _) = watch::channel(None);
        let call = Call {
            inner: Arc::new(CallInner {
                id: header.call_id,
                method: header.method,
                shape: header.shape,
                side,
                channel,
                deadline,
                state: Mutex::new(CallState::new()),
                terminal_tx,
                timer: Mutex::new(None),
            }),
        };
        call.arm_deadline();
        call
    }

    fn arm_deadline(&self) {
        let Some(deadline) = self.inner.deadline else {
            return;
        };
        let weak: Weak<CallInner> = Arc::downgrade(&self.inner);
        let timer = DeadlineTimer::arm(deadline, async move {
            if let Some(inner) = weak.upgrade() {
                let call = Call { inner };
                tracing::debug!(call_id = call.id(), side = call.side().as_str(), "deadline expired");
                call.abort(Status::deadline_exceeded(DEADLINE_MESSAGE)).await;
            }
        });
        *lock(&self.inner.timer) = Some(timer);
    }

    pub fn id(&self) -> CallId {
        self.inner.id
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn shape(&self) -> CallShape {
        self.inner.shape
    }

    pub fn side(&self) -> Side {
        self.inner.side
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.inner.deadline
    }

    pub fn phase(&self) -> Phase {
        self.state().phase()
    }

    /// The terminal status, once the call has one.
    pub fn status(&self) -> Option<Status> {
        self.state().terminal().cloned()
    }

    /// Whether the call ended with anything other than `Ok`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state().terminal(), Some(status) if !status.is_ok())
    }

    /// Sends one message.
    ///
    /// In a single-message direction the message carries the end-of-stream
    /// marker and closes the direction.
    ///
    /// # Errors
    ///
    /// - `FailedPrecondition` if the send direction is closed or the call completed
    /// - `DeadlineExceeded` if the deadline has passed
    /// - The stored terminal status if the call was aborted
    /// - `Internal` if encoding or the transport fails
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), Status> {
        let single = self.sends_single_message();
        {
            let mut state = self.state();
            state.begin_send()?;
            if single {
                state.close_send()?;
            }
        }
        if let Some(status) = self.expire_if_due().await {
            return Err(closed_error(status));
        }

        let payload = match self.inner.channel.codec().encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                let status = Status::internal(format!("failed to encode message: {}", e));
                return Err(self.abort(status).await);
            }
        };
        let envelope = if single {
            Envelope::last(payload)
        } else {
            Envelope::more(payload)
        };
        self.transmit(Frame::Message(envelope)).await
    }

    /// Receives the next message.
    ///
    /// Returns `Ok(None)` once the peer has ended this direction normally,
    /// and on every later call. On the caller side the terminal status is
    /// read as soon as the callee's stream ends, so [`Call::status`] is
    /// available right after the last `recv`.
    pub async fn recv<T: DeserializeOwned>(&self) -> Result<Option<T>, Status> {
        let gate = self.state().begin_recv();
        match gate {
            RecvGate::Open => {}
            RecvGate::Ended => return Ok(None),
            RecvGate::Failed(status) => return Err(status),
        }
        if let Some(status) = self.expire_if_due().await {
            return outcome(status).map(|()| None);
        }

        loop {
            let frame = tokio::select! {
                biased;
                status = self.terminated() => return outcome(status).map(|()| None),
                result = self.inner.channel.recv() => result,
            };

            match frame {
                Ok(Some(Frame::Message(envelope))) => {
                    let message: T = match self.inner.channel.codec().decode(&envelope.payload) {
                        Ok(message) => message,
                        Err(e) => {
                            let status = Status::internal(format!("failed to decode message: {}", e));
                            return Err(self.abort(status).await);
                        }
                    };
                    if envelope.end_of_stream {
                        self.state().close_recv();
                        if self.inner.side == Side::Caller {
                            // The message was delivered; a failed trailer
                            // surfaces through status() and the next recv.
                            if let Err(status) = self.read_trailer().await {
                                tracing::debug!(call_id = self.id(), %status, "call failed after last message");
                            }
                        }
                    }
                    return Ok(Some(message));
                }
                Ok(Some(Frame::HalfClose)) => {
                    self.state().close_recv();
                    tracing::debug!(call_id = self.id(), side = self.side().as_str(), "peer half-closed");
                    if self.inner.side == Side::Caller {
                        self.read_trailer().await?;
                    }
                    return Ok(None);
                }
                Ok(Some(Frame::Trailer(status))) if self.inner.side == Side::Caller => {
                    self.state().close_recv();
                    self.complete(status);
                    return self.terminal_outcome().map(|()| None);
                }
                Ok(Some(Frame::Cancel(status))) if self.inner.side == Side::Callee => {
                    tracing::debug!(call_id = self.id(), %status, "call cancelled by caller");
                    self.complete(status);
                    return self.terminal_outcome().map(|()| None);
                }
                Ok(Some(other)) => {
                    let status = Status::internal(format!(
                        "unexpected {} frame on the {} side",
                        other.kind(),
                        self.side().as_str()
                    ));
                    return Err(self.abort(status).await);
                }
                Ok(None) => {
                    let status = Status::internal("channel closed before the call completed");
                    return Err(self.abort(status).await);
                }
                Err(e) => return Err(self.abort(Status::classify(&e)).await),
            }
        }
    }

    /// Closes this side's send direction. Allowed exactly once.
    pub async fn half_close(&self) -> Result<(), Status> {
        self.state().close_send()?;
        tracing::debug!(call_id = self.id(), side = self.side().as_str(), "half-closed");
        self.transmit(Frame::HalfClose).await
    }

    /// Half-closes and waits for the single response of a client-stream call.
    pub async fn close_and_recv<T: DeserializeOwned>(&self) -> Result<T, Status> {
        self.half_close().await?;
        match self.recv().await? {
            Some(message) => Ok(message),
            None => Err(self
                .status()
                .filter(|status| !status.is_ok())
                .unwrap_or_else(|| Status::internal("call completed without a response"))),
        }
    }

    /// Ends the call from the callee side by sending the terminal status.
    ///
    /// Fails with the existing terminal status if the call already has one.
    pub async fn finish(&self, status: Status) -> Result<(), Status> {
        if self.inner.side != Side::Callee {
            return Err(Status::failed_precondition("only the callee sends a terminal status"));
        }
        if !self.complete(status.clone()) {
            return Err(closed_error(self.status().unwrap_or_else(Status::ok)));
        }

        let sent = self.inner.channel.send(&Frame::Trailer(status)).await;
        if let Err(e) = self.inner.channel.shutdown().await {
            tracing::trace!(call_id = self.id(), "shutdown after trailer failed: {}", e);
        }
        sent.map_err(|e| Status::classify(&e))
    }

    /// Aborts the call with `status`.
    ///
    /// Closes both directions, wakes any blocked send or receive, and
    /// notifies the peer on a best-effort basis: a `Cancel` frame from the
    /// caller, a `Trailer` from the callee. Returns the call's terminal
    /// status, which is the earlier one if the call had already ended.
    pub async fn abort(&self, status: Status) -> Status {
        if self.complete(status.clone()) {
            tracing::debug!(call_id = self.id(), side = self.side().as_str(), %status, "call aborted");
            let notice = match self.inner.side {
                Side::Caller => Frame::Cancel(status),
                Side::Callee => Frame::Trailer(status),
            };
            let channel = self.inner.channel.clone();
            let notify = async move {
                channel.send(&notice).await?;
                channel.shutdown().await
            };
            match tokio::time::timeout(ABORT_NOTICE_TIMEOUT, notify).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::trace!(call_id = self.id(), "abort notice not delivered: {}", e),
                Err(_) => tracing::trace!(call_id = self.id(), "abort notice timed out"),
            }
        }
        self.status().unwrap_or_else(|| Status::internal("call has no terminal status"))
    }

    /// Resolves when the call has a terminal status.
    pub async fn terminated(&self) -> Status {
        let mut rx = self.inner.terminal_tx.subscribe();
        loop {
            if let Some(status) = rx.borrow_and_update().clone() {
                return status;
            }
            if rx.changed().await.is_err() {
                return Status::internal("call dropped");
            }
        }
    }

    /// Watches an ended inbound direction until the call completes.
    ///
    /// The callee of a Unary or ServerStream call reads nothing after its
    /// request, so a `Cancel` from the caller would otherwise go unseen.
    /// A `Cancel` completes the call with the caller's status; a closed
    /// channel or any other frame aborts it with `Internal`.
    pub async fn watch_cancel(&self) {
        let frame = tokio::select! {
            biased;
            _ = self.terminated() => return,
            result = self.inner.channel.recv() => result,
        };

        match frame {
            Ok(Some(Frame::Cancel(status))) => {
                tracing::debug!(call_id = self.id(), %status, "call cancelled by caller");
                self.complete(status);
            }
            Ok(Some(other)) => {
                let status = Status::internal(format!(
                    "unexpected {} frame after the request ended",
                    other.kind()
                ));
                self.abort(status).await;
            }
            Ok(None) => {
                self.abort(Status::internal("channel closed before the call completed"))
                    .await;
            }
            Err(e) => {
                self.abort(Status::classify(&e)).await;
            }
        }
    }

    fn sends_single_message(&self) -> bool {
        match self.inner.side {
            Side::Caller => !self.inner.shape.client_streams(),
            Side::Callee => !self.inner.shape.server_streams(),
        }
    }

    /// Records `status` as terminal. Returns `false` if one already existed.
    fn complete(&self, status: Status) -> bool {
        let won = self.state().terminate(status.clone());
        if won {
            self.inner.terminal_tx.send_replace(Some(status));
            lock(&self.inner.timer).take();
        }
        won
    }

    /// Aborts with `DeadlineExceeded` if the deadline has passed, returning
    /// the terminal status.
    async fn expire_if_due(&self) -> Option<Status> {
        match self.inner.deadline {
            Some(deadline) if deadline.is_expired() => {
                Some(self.abort(Status::deadline_exceeded(DEADLINE_MESSAGE)).await)
            }
            _ => None,
        }
    }

    async fn transmit(&self, frame: Frame) -> Result<(), Status> {
        tokio::select! {
            biased;
            status = self.terminated() => Err(closed_error(status)),
            result = self.inner.channel.send(&frame) => match result {
                Ok(()) => Ok(()),
                Err(e) => Err(self.abort(Status::classify(&e)).await),
            },
        }
    }

    /// Reads frames until the callee's trailer arrives.
    async fn read_trailer(&self) -> Result<(), Status> {
        loop {
            let frame = tokio::select! {
                biased;
                status = self.terminated() => return outcome(status),
                result = self.inner.channel.recv() => result,
            };
            match frame {
                Ok(Some(Frame::Trailer(status))) => {
                    self.complete(status);
                    return self.terminal_outcome();
                }
                Ok(Some(other)) => {
                    let status = Status::internal(format!(
                        "expected trailer, received {} frame",
                        other.kind()
                    ));
                    return Err(self.abort(status).await);
                }
                Ok(None) => {
                    let status = Status::internal("channel closed before the call completed");
                    return Err(self.abort(status).await);
                }
                Err(e) => return Err(self.abort(Status::classify(&e)).await),
            }
        }
    }

    fn terminal_outcome(&self) -> Result<(), Status> {
        self.status().map_or(Ok(()), outcome)
    }

    fn state(&self) -> MutexGuard<'_, CallState> {
        lock(&self.inner.state)
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("shape", &self.inner.shape)
            .field("side", &self.inner.side)
            .field("phase", &self.phase())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn outcome(status: Status) -> Result<(), Status> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(status)
    }
}

/// Error for an operation attempted after the call ended.
fn closed_error(status: Status) -> Status {
    if status.is_ok() {
        Status::failed_precondition("call has already completed")
    } else {
        status
    }
}

/// Handler-facing view of a callee-side call.
///
/// Exposes the call's metadata and its cancellation signal without the
/// send/receive operations.
#[derive(Debug, Clone)]
pub struct CallContext {
    call: Call,
}

impl CallContext {
    pub fn new(call: Call) -> Self {
        CallContext { call }
    }

    pub fn call_id(&self) -> CallId {
        self.call.id()
    }

    pub fn method(&self) -> &str {
        self.call.method()
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.call.deadline()
    }

    /// Time left before the deadline, if the call has one.
    pub fn remaining(&self) -> Option<Duration> {
        self.call.deadline().map(|d| d.remaining())
    }

    /// Whether the call was aborted or its deadline expired.
    pub fn is_cancelled(&self) -> bool {
        self.call.is_cancelled() || self.call.deadline().is_some_and(|d| d.is_expired())
    }

    /// Resolves with the abort status once the call is cancelled.
    pub async fn cancelled(&self) -> Status {
        let status = self.call.terminated().await;
        if status.is_ok() {
            // Completed normally: never cancelled.
            std::future::pending::<()>().await;
        }
        status
    }
}
