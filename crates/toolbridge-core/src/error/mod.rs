//! Error types for toolbridge
//!
//! Every failure surfaced by the bridge falls into one of four categories:
//! - transport: spawn failures, broken pipes, channel loss
//! - protocol: a well-formed envelope with an unexpected payload
//! - remote: the far side answered with an explicit error object
//! - state: the operation is not legal in the current connection state

mod constructors;
mod types;

pub use types::{BridgeError, BridgeResult, ErrorCategory};
