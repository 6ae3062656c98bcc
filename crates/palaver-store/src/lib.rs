//! # palaver-store
//!
//! Local storage for the Palaver client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model. Channels are keyed by their server-assigned ARN; messages are
//! keyed by the client correlation token until the server assigns an id.

pub mod channels;
pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod settings;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
