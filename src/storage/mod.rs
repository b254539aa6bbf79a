//! Storage backends.
//!
//! Two physical backends implement the [`DatabaseBackend`] contract:
//! - **File** ([`FileBackend`]): one JSON object per database or collection,
//!   with generation-rotation backups (generation 0 is the newest).
//! - **`SQLite`** ([`SqliteBackend`]): one table per database, rows keyed by
//!   qualified name. Also owns the migration protocol (a load under a
//!   non-sqlite configuration consumes the store) and corruption recovery.

pub mod file;
pub(crate) mod fsutil;
mod metrics;
pub mod recovery;
pub mod sqlite;
mod traits;

pub use file::FileBackend;
pub use recovery::{CorruptionAction, QuitOnCorruption, RecoveryHandler};
pub use sqlite::SqliteBackend;
pub use traits::DatabaseBackend;

pub(crate) use metrics::record_operation_metrics;
