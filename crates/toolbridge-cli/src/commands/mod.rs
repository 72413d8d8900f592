//! CLI command implementations

pub mod call;
pub mod relay;
pub mod status;
pub mod tools;
