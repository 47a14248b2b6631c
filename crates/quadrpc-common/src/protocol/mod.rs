pub mod classify;
pub mod error;
pub mod frame;
pub mod status;


pub use error::{Result, RpcError};
pub use frame::{CallHeader, CallId, CallShape, Envelope, Frame};
pub use status::{Code, Status};
