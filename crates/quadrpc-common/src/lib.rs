//! QuadRPC Common Types, Transport and Call Engine
//!
//! This crate provides the protocol definitions, the framed message channel
//! and the per-call state machine shared by both ends of a QuadRPC call.
//!
//! # Overview
//!
//! QuadRPC exchanges messages between a caller and a callee over one
//! bidirectional byte channel per call, in one of four shapes:
//!
//! - **Unary**: one request, one response
//! - **ServerStream**: one request, many responses
//! - **ClientStream**: many requests, one response
//! - **BidiStream**: many requests and many responses, independently
//!
//! Every call ends with exactly one terminal [`Status`].
//!
//! # Components
//!
//! - [`protocol`] - Status codes, frames, envelopes, errors and the error classifier
//! - [`transport`] - Codecs and the length-prefixed [`MessageChannel`]
//! - [`call`] - The [`Call`] state machine and the deadline controller
//! - [`messages`] - Payload types for the bundled calculator and greet services
//!
//! # Example
//!
//! ```no_run
//! use quadrpc_common::{Call, CallHeader, CallShape, Codec, MessageChannel};
//!
//! # async fn demo() -> Result<(), quadrpc_common::Status> {
//! let (caller_end, _callee_end) = MessageChannel::pair(Codec::default(), 64 * 1024);
//! let header = CallHeader::new("calculator.SquareRoot", CallShape::Unary);
//! let call = Call::open(caller_end, header, None).await?;
//! call.send(&quadrpc_common::messages::SquareRootRequest { number: 16 }).await?;
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod messages;
pub mod protocol;
pub mod transport;

pub use call::{Call, CallContext, Deadline, Phase, Side};
pub use protocol::*;
pub use transport::{Codec, MessageChannel};
