//! Store facade.

use crate::config::{StorageKind, StoreConfig};
use crate::models::Database;
use crate::storage::recovery::{QuitOnCorruption, RecoveryHandler};
use crate::storage::{DatabaseBackend, FileBackend, SqliteBackend, fsutil};
use crate::{Error, Result};

/// Persistence facade over the configured backend.
///
/// Exports go to the configured backend only. Loads always probe the
/// `SQLite` backend first, regardless of configuration: finding data there
/// is the sole migration trigger, and the `SQLite` backend marks its own
/// store migrated as a side effect of being consumed. Only when that yields
/// nothing and the store is configured for files are the file generations
/// probed, newest first.
pub struct Store {
    kind: StorageKind,
    sqlite: SqliteBackend,
    file: FileBackend,
}

impl Store {
    /// Creates a store that treats corruption as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `versions` is combined with the
    /// `SQLite` backend or is zero.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_recovery(config, Box::new(QuitOnCorruption))
    }

    /// Creates a store with an injected corruption recovery strategy.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::new`].
    pub fn with_recovery(config: StoreConfig, recovery: Box<dyn RecoveryHandler>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            kind: config.kind,
            sqlite: SqliteBackend::new(&config, recovery),
            file: FileBackend::new(&config),
        })
    }

    /// The backend that owns exports under the configured kind.
    fn configured_backend(&self) -> &dyn DatabaseBackend {
        match self.kind {
            StorageKind::Sqlite => &self.sqlite,
            StorageKind::File => &self.file,
        }
    }

    /// Loads `name`, or `None` when no backend holds usable data for it.
    ///
    /// Never fails: every failure path is logged and degrades to `None`, so
    /// callers always have a safe "construct empty" fallback.
    #[must_use]
    pub fn load_database(&self, name: &str) -> Option<Database> {
        match self.load_inner(name) {
            Ok(db) => db,
            Err(error) => {
                tracing::error!(name, %error, "load failed, treating as empty");
                None
            },
        }
    }

    /// Callback form of [`Self::load_database`].
    pub fn load_database_with<F>(&self, name: &str, callback: F)
    where
        F: FnOnce(Option<Database>),
    {
        callback(self.load_database(name));
    }

    fn load_inner(&self, name: &str) -> Result<Option<Database>> {
        if !fsutil::is_safe_name(name) {
            return Err(Error::InvalidInput(format!(
                "invalid database name '{name}'"
            )));
        }

        // Unexpected errors from the migration probe are demoted to "no
        // result" so a fallback source can still win.
        match self.sqlite.load(name) {
            Ok(Some(db)) => return Ok(Some(db)),
            Ok(None) => {},
            Err(error) => tracing::error!(name, %error, "sqlite probe failed"),
        }

        if self.kind == StorageKind::File {
            return self.file.load(name);
        }
        Ok(None)
    }

    /// Persists `db` under `name` via the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unsafe database or collection
    /// names, and propagates backend write failures.
    pub fn export_database(&self, name: &str, db: &Database) -> Result<()> {
        if !fsutil::is_safe_name(name) {
            return Err(Error::InvalidInput(format!(
                "invalid database name '{name}'"
            )));
        }
        if let Some(coll) = db
            .collections
            .iter()
            .find(|c| !fsutil::is_safe_name(&c.name))
        {
            return Err(Error::InvalidInput(format!(
                "invalid collection name '{}'",
                coll.name
            )));
        }
        self.configured_backend().export(name, db)
    }

    /// Closes the `SQLite` connection for `name`, if one is open.
    ///
    /// A no-op under the file configuration; the closed slot is tombstoned
    /// and never reused.
    ///
    /// # Errors
    ///
    /// Propagates backend close failures.
    pub fn close(&self, name: &str) -> Result<()> {
        if self.kind != StorageKind::Sqlite {
            return Ok(());
        }
        self.sqlite.close(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collection;
    use serde_json::json;
    use tempfile::TempDir;

    fn file_config(dir: &TempDir) -> StoreConfig {
        StoreConfig::new(dir.path(), StorageKind::File)
    }

    #[test]
    fn test_construction_rejects_sqlite_versions() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::new(dir.path(), StorageKind::Sqlite);
        config.versions = Some(2);
        assert!(matches!(
            Store::new(config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_load_unknown_is_none() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(file_config(&dir)).unwrap();
        assert!(store.load_database("lib").is_none());
    }

    #[test]
    fn test_load_invalid_name_is_none() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(file_config(&dir)).unwrap();
        assert!(store.load_database("../escape").is_none());
    }

    #[test]
    fn test_export_invalid_names_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(file_config(&dir)).unwrap();

        let db = Database::default();
        assert!(matches!(
            store.export_database("a/b", &db),
            Err(Error::InvalidInput(_))
        ));

        let db = Database {
            collections: vec![Collection::new("../escape")],
            meta: serde_json::Map::new(),
        };
        assert!(matches!(
            store.export_database("lib", &db),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_file_round_trip_through_facade() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(file_config(&dir)).unwrap();

        let mut coll = Collection::new("authors");
        coll.dirty = true;
        coll.documents.insert("items".to_string(), json!([1, 2, 3]));
        let db = Database {
            collections: vec![coll],
            meta: serde_json::Map::new(),
        };

        store.export_database("lib", &db).unwrap();
        let loaded = store.load_database("lib").unwrap();
        assert_eq!(loaded.collections[0].documents["items"], json!([1, 2, 3]));
    }

    #[test]
    fn test_callback_form() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(file_config(&dir)).unwrap();

        let mut seen = None;
        store.load_database_with("lib", |db| seen = Some(db.is_none()));
        assert_eq!(seen, Some(true));
    }

    #[test]
    fn test_close_is_noop_for_file_kind() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(file_config(&dir)).unwrap();
        assert!(store.close("lib").is_ok());
    }
}
