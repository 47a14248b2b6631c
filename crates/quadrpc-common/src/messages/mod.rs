//! Payload types for the bundled demo services.
//!
//! These are plain serde structs carried inside [`Envelope`](crate::protocol::Envelope)
//! payloads. The call engine never looks inside them.

pub mod calculator;
pub mod greet;

pub use calculator::*;
pub use greet::*;
