//! `SQLite` persistence backend.
//!
//! One table per database name, rows `(name, data)` keyed by the qualified
//! name: the database name itself for the metadata row,
//! `<database>.<collection>` for collection rows.
//!
//! This backend also owns two protocols the file backend does not have:
//! - **Migration**: a load under a non-sqlite store configuration consumes
//!   the `SQLite` store and renames it aside with a `.migrated` suffix,
//!   keeping a forensic copy.
//! - **Corruption recovery**: a store that fails `PRAGMA integrity_check` is
//!   escalated to the injected [`RecoveryHandler`]; there is no silent
//!   repair path.

mod registry;

use crate::config::{StorageKind, StoreConfig};
use crate::models::{Collection, Database, StoredDatabase};
use crate::storage::recovery::{CorruptionAction, RecoveryHandler};
use crate::storage::{DatabaseBackend, fsutil, record_operation_metrics};
use crate::{Error, Result};
use registry::{ConnectionRegistry, Slot};
use rusqlite::{Connection, params};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// `SQLite` persistence backend.
pub struct SqliteBackend {
    dir: PathBuf,
    kind: StorageKind,
    allow_partial: bool,
    delete_after_load: bool,
    registry: ConnectionRegistry,
    recovery: Box<dyn RecoveryHandler>,
}

impl SqliteBackend {
    /// Creates a `SQLite` backend over the configured directory.
    ///
    /// `config.kind` is kept because load behaves differently when the store
    /// is configured away from sqlite (migration instead of registration).
    #[must_use]
    pub fn new(config: &StoreConfig, recovery: Box<dyn RecoveryHandler>) -> Self {
        Self {
            dir: config.dir.clone(),
            kind: config.kind,
            allow_partial: config.allow_partial,
            delete_after_load: config.delete_after_load,
            registry: ConnectionRegistry::default(),
            recovery,
        }
    }

    fn db_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.sqlite"))
    }

    /// Closes and tombstones the connection for `name`, if one is open.
    ///
    /// # Errors
    ///
    /// Currently infallible; the underlying close failure is logged, not
    /// propagated, so shutdown paths cannot stall on it.
    pub fn close(&self, name: &str) -> Result<()> {
        if let Some(conn) = self.registry.take_for_close(name) {
            Self::close_connection(conn, name, "close requested");
        }
        Ok(())
    }

    fn close_connection(conn: Connection, name: &str, reason: &str) {
        tracing::debug!(name, reason, "closing sqlite connection");
        if let Err((_, error)) = conn.close() {
            tracing::error!(name, %error, "closing sqlite connection failed");
        }
    }

    /// Opens `name` and verifies its integrity.
    ///
    /// On a failed check the handle is closed and the [`RecoveryHandler`]
    /// decides: quit, reset (rename the store aside, one fatal retry), or
    /// quit-discard (rename aside under a distinct suffix, no retry).
    fn open_checked(&self, name: &str, fatal: bool) -> Result<Connection> {
        let path = self.db_path(name);
        tracing::debug!(name, path = %path.display(), fatal, "opening sqlite store");

        let error = match Self::try_open(&path) {
            Ok(conn) => return Ok(conn),
            Err(cause) => Error::Integrity {
                name: name.to_string(),
                cause,
            },
        };

        tracing::error!(name, %error, fatal, "sqlite store failed integrity check");
        if fatal {
            return Err(error);
        }

        match self.recovery.decide(name, &error) {
            CorruptionAction::Quit => self.recovery.terminate(false),
            CorruptionAction::Reset => {
                if fsutil::exists(&path) {
                    fsutil::rename(&path, &fsutil::with_suffix(&path, ".discarded"))?;
                }
                self.open_checked(name, true)
            },
            CorruptionAction::QuitDiscard => {
                if fsutil::exists(&path) {
                    // Keep the evidence under a distinct suffix before quitting.
                    if let Err(error) =
                        fsutil::rename(&path, &fsutil::with_suffix(&path, ".corrupt"))
                    {
                        tracing::error!(name, %error, "could not set corrupt store aside");
                    }
                }
                self.recovery.terminate(true)
            },
        }
    }

    /// Opens the file and runs the health check; any error or a non-"ok"
    /// verdict counts as corruption.
    fn try_open(path: &Path) -> std::result::Result<Connection, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        let verdict: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;
        if verdict.eq_ignore_ascii_case("ok") {
            Ok(conn)
        } else {
            Err(format!("integrity check reported '{verdict}'"))
        }
    }

    fn load_inner(&self, name: &str) -> Result<Option<Database>> {
        let path = self.db_path(name);
        let exists = fsutil::exists(&path);
        tracing::debug!(name, exists, "sqlite load");

        // A file-mode deployment probing for a migration source must not
        // create a relational artifact as a side effect.
        if !exists && self.kind != StorageKind::Sqlite {
            return Ok(None);
        }

        let conn = self.open_checked(name, false)?;
        conn.execute(
            &format!(
                r#"CREATE TABLE IF NOT EXISTS "{name}" (name TEXT PRIMARY KEY NOT NULL, data TEXT NOT NULL)"#
            ),
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_table".to_string(),
            cause: e.to_string(),
        })?;

        let (stored, mut rows, row_count) = Self::scan_rows(&conn, name)?;

        let mut failed = false;
        let db = if let Some(stored) = stored {
            let mut collections = Vec::with_capacity(stored.collections.len());
            let mut missing = Vec::new();
            for qualified in &stored.collections {
                match rows.remove(qualified) {
                    Some(coll) => collections.push(coll),
                    None => missing.push(qualified.clone()),
                }
            }
            if !missing.is_empty() {
                failed = !self.allow_partial;
                tracing::error!(name, ?missing, "collection rows missing");
            }
            Some(Database {
                collections,
                meta: stored.meta,
            })
        } else if exists && row_count > 0 {
            // Collection rows without a metadata row: the table is corrupt.
            tracing::error!(name, rows = row_count, "metadata row missing");
            failed = true;
            None
        } else {
            tracing::debug!(name, "new database");
            None
        };

        if self.kind == StorageKind::Sqlite {
            if failed || self.delete_after_load {
                conn.execute(&format!(r#"DELETE FROM "{name}""#), [])
                    .map_err(|e| Error::OperationFailed {
                        operation: "clear_table".to_string(),
                        cause: e.to_string(),
                    })?;
            }
            self.registry.register(name, conn);
        } else {
            // Migration away from sqlite: consume the store and keep a
            // forensic copy; no connection is registered.
            Self::close_connection(conn, name, "migrated");
            fsutil::rename(&path, &fsutil::with_suffix(&path, ".migrated"))?;
            tracing::debug!(name, kind = self.kind.as_str(), "sqlite store migrated");
        }

        if failed {
            tracing::error!(name, "sqlite load failed, treating as empty");
            return Ok(None);
        }
        Ok(db)
    }

    /// Scans every row ordered by key. The row keyed by the database name is
    /// the metadata blob; everything else is a candidate collection, forced
    /// dirty and flagged as a full copy for the consumer.
    #[allow(clippy::type_complexity)]
    fn scan_rows(
        conn: &Connection,
        name: &str,
    ) -> Result<(Option<StoredDatabase>, HashMap<String, Collection>, usize)> {
        let mut stmt = conn
            .prepare(&format!(
                r#"SELECT name, data FROM "{name}" ORDER BY name ASC"#
            ))
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_scan".to_string(),
                cause: e.to_string(),
            })?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| Error::OperationFailed {
                operation: "scan_rows".to_string(),
                cause: e.to_string(),
            })?;

        let mut stored = None;
        let mut collections = HashMap::new();
        let mut count = 0usize;
        for row in rows {
            let (key, data) = row.map_err(|e| Error::OperationFailed {
                operation: "scan_row".to_string(),
                cause: e.to_string(),
            })?;
            count += 1;
            if key == name {
                stored = Some(serde_json::from_str::<StoredDatabase>(&data).map_err(|e| {
                    Error::OperationFailed {
                        operation: "deserialize_metadata".to_string(),
                        cause: e.to_string(),
                    }
                })?);
            } else {
                let mut coll: Collection =
                    serde_json::from_str(&data).map_err(|e| Error::OperationFailed {
                        operation: "deserialize_collection".to_string(),
                        cause: e.to_string(),
                    })?;
                coll.mark_rehydrated();
                coll.dirty = true;
                collections.insert(key, coll);
            }
        }
        Ok((stored, collections, count))
    }

    fn export_inner(&self, name: &str, db: &Database) -> Result<()> {
        let slots = self.registry.lock();
        let conn = match slots.get(name) {
            Some(Slot::Open(conn)) => conn,
            Some(Slot::Closed) => {
                tracing::error!(name, "export attempted after close, dropping");
                return Ok(());
            },
            None => {
                tracing::error!(name, "export to unopened sqlite store, dropping");
                return Ok(());
            },
        };

        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| Error::OperationFailed {
                operation: "begin_transaction".to_string(),
                cause: e.to_string(),
            })?;

        let result = Self::write_rows(conn, name, db);

        if result.is_ok() {
            conn.execute("COMMIT", [])
                .map_err(|e| Error::OperationFailed {
                    operation: "commit_transaction".to_string(),
                    cause: e.to_string(),
                })?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }

        result
    }

    /// Upserts every dirty or not-yet-present collection row, then the
    /// metadata row (always, independent of dirtiness).
    fn write_rows(conn: &Connection, name: &str, db: &Database) -> Result<()> {
        let mut stmt = conn
            .prepare(&format!(r#"SELECT name FROM "{name}""#))
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_existing_keys".to_string(),
                cause: e.to_string(),
            })?;
        let existing: HashSet<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| Error::OperationFailed {
                operation: "existing_keys".to_string(),
                cause: e.to_string(),
            })?
            .filter_map(std::result::Result::ok)
            .collect();
        drop(stmt);

        for coll in &db.collections {
            let qualified = coll.qualified_name(name);
            if coll.dirty || !existing.contains(&qualified) {
                let data = serde_json::to_string(coll).map_err(|e| Error::OperationFailed {
                    operation: "serialize_collection".to_string(),
                    cause: e.to_string(),
                })?;
                conn.execute(
                    &format!(r#"REPLACE INTO "{name}" (name, data) VALUES (?1, ?2)"#),
                    params![qualified, data],
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "upsert_collection".to_string(),
                    cause: e.to_string(),
                })?;
            }
        }

        let stored =
            serde_json::to_string(&StoredDatabase::qualified(name, db)).map_err(|e| {
                Error::OperationFailed {
                    operation: "serialize_metadata".to_string(),
                    cause: e.to_string(),
                }
            })?;
        conn.execute(
            &format!(r#"REPLACE INTO "{name}" (name, data) VALUES (?1, ?2)"#),
            params![name, stored],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "upsert_metadata".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }
}

impl DatabaseBackend for SqliteBackend {
    fn load(&self, name: &str) -> Result<Option<Database>> {
        let start = Instant::now();
        let result = self.load_inner(name);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "load", start, status);
        result
    }

    fn export(&self, name: &str, db: &Database) -> Result<()> {
        let start = Instant::now();
        let result = self.export_inner(name, db);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "export", start, status);
        result
    }
}
