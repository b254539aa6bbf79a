//! # Stowage
//!
//! Versioned persistence for in-memory document databases.
//!
//! A [`Store`] persists a named database of ordered, named collections of
//! arbitrary structured data across process restarts, over one of two
//! interchangeable physical backends: a `SQLite` key-blob store (one table
//! per database) or a set of generation-versioned flat JSON files. Data found
//! in the `SQLite` backend is migrated transparently when the store is
//! configured for files.
//!
//! ## Features
//!
//! - Transparent on-the-fly `SQLite`-to-file migration
//! - Generation-rotation backups (generation 0 is always the newest)
//! - Skip-on-unchanged writes for collections that are not dirty
//! - Partial-load tolerance (missing collections are dropped, not fatal)
//! - Corruption detection with delegated, never-silent recovery
//!
//! ## Example
//!
//! ```rust,ignore
//! use stowage::{StorageKind, Store, StoreConfig};
//!
//! let mut config = StoreConfig::new("./data", StorageKind::File);
//! config.versions = Some(3);
//! let store = Store::new(config)?;
//!
//! // `None` means "construct empty": the caller owns the database.
//! let db = store.load_database("library").unwrap_or_default();
//! store.export_database("library", &db)?;
//! # Ok::<(), stowage::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod storage;
mod store;

// Re-exports for convenience
pub use config::{StorageKind, StoreConfig};
pub use models::{Collection, Database};
pub use storage::{
    CorruptionAction, DatabaseBackend, FileBackend, QuitOnCorruption, RecoveryHandler,
    SqliteBackend,
};
pub use store::Store;

/// Error type for stowage operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Unrecognized backend kind, `versions` under `sqlite`, zero `versions` |
/// | `InvalidInput` | Database or collection names unsafe as file names / SQL identifiers |
/// | `Integrity` | A `SQLite` store fails `PRAGMA integrity_check` |
/// | `PartialData` | A referenced collection object is missing and partial loads are off |
/// | `OperationFailed` | I/O errors, serialization failures, `SQLite` query failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid construction parameters; fatal at construct time.
    #[error("unsupported store configuration: {0}")]
    Configuration(String),

    /// Invalid input was provided.
    ///
    /// Database and collection names become file names and quoted SQL
    /// identifiers, so only alphanumerics, dashes, and underscores are
    /// accepted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A `SQLite` store failed its health check.
    ///
    /// Never silently swallowed: escalated to the configured
    /// [`RecoveryHandler`] before any further action.
    #[error("integrity check failed for '{name}': {cause}")]
    Integrity {
        /// The database whose store is corrupt.
        name: String,
        /// The underlying cause.
        cause: String,
    },

    /// A referenced collection object is missing from the persisted form.
    ///
    /// Fatal unless partial loads are explicitly allowed, in which case the
    /// missing collections are dropped from the returned database instead.
    #[error("database '{name}' is missing collections: {missing:?}")]
    PartialData {
        /// The database being loaded.
        name: String,
        /// The collection keys that could not be resolved.
        missing: Vec<String>,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - Filesystem I/O errors occur
    /// - Blobs cannot be serialized or deserialized
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for stowage operations.
pub type Result<T> = std::result::Result<T, Error>;
