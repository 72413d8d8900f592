//! Hop A: the caller's channel to the relay process
//!
//! Requests carry a string id and a tagged action; responses echo the id
//! with an `ok`/`error`/`info` status. The relay process runs
//! [`RelayServer`], which drives hop B on the caller's behalf.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::RelayClient;
pub use protocol::{
    RelayAction, RelayProtocol, RelayRequest, RelayResponse, ResponseData, ResponseStatus,
};
pub use server::RelayServer;
