//! Types shared by every Causerie crate: identifiers, the domain model, wire
//! formats of push notifications and RPC results, and protocol constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
