//! Data models for stowage.
//!
//! The store never interprets document contents; it only reads and writes
//! the serialized form of these structures.

mod database;

pub use database::{Collection, Database};
pub(crate) use database::StoredDatabase;
