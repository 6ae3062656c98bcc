//! # palaver-shared
//!
//! Types shared between the networking, storage, and client crates:
//! identifier newtypes, the relay wire envelope, and wire timestamp helpers.

pub mod constants;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
