//! Backend contract.

use crate::Result;
use crate::models::Database;

/// Contract shared by the physical persistence backends.
///
/// A backend owns the serialized form of a database under its own layout;
/// the [`Store`](crate::Store) facade decides which backend an operation is
/// routed to.
pub trait DatabaseBackend: Send + Sync {
    /// Loads `name`, or `None` when the backend holds no usable data for it.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted data exists but cannot be read back.
    /// The facade demotes load errors to "no result".
    fn load(&self, name: &str) -> Result<Option<Database>>;

    /// Persists `db` under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be written; export failures
    /// propagate to the caller.
    fn export(&self, name: &str, db: &Database) -> Result<()>;
}
