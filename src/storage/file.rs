//! Flat-file persistence backend.
//!
//! One JSON object per `<database>[.<generation>][.<collection>]` key. With
//! versioning enabled, generation 0 is always the newest snapshot; each
//! export first rotates the existing generations up by one, deleting any
//! past the retention boundary.

use crate::config::StoreConfig;
use crate::models::{Collection, Database, StoredDatabase};
use crate::storage::{DatabaseBackend, fsutil, record_operation_metrics};
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Flat-file persistence backend.
pub struct FileBackend {
    dir: PathBuf,
    versions: Option<u32>,
    allow_partial: bool,
    delete_after_load: bool,
}

impl FileBackend {
    /// Creates a file backend over the configured directory.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            versions: config.versions,
            allow_partial: config.allow_partial,
            delete_after_load: config.delete_after_load,
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Object key of the given generation; unversioned stores use the bare
    /// database name.
    fn generation_key(&self, name: &str, generation: u32) -> String {
        if self.versions.is_some() {
            format!("{name}.{generation}")
        } else {
            name.to_string()
        }
    }

    fn export_inner(&self, name: &str, db: &Database) -> Result<()> {
        let base = self.generation_key(name, 0);

        // The skip decision is taken against the pre-rotation snapshot: a
        // collection already persisted in the newest generation is not
        // rewritten unless dirty, its last write survives as generation 1.
        let existed: Vec<bool> = db
            .collections
            .iter()
            .map(|coll| fsutil::exists(&self.object_path(&format!("{base}.{}", coll.name))))
            .collect();

        self.rotate(name)?;

        // The metadata object is always considered dirty.
        self.save(&base, &StoredDatabase::plain(db), true)?;
        for (coll, existed) in db.collections.iter().zip(existed) {
            self.save(
                &format!("{base}.{}", coll.name),
                coll,
                coll.dirty || !existed,
            )?;
        }
        Ok(())
    }

    /// Rolls existing generations of `name` up by one slot, deleting those
    /// past the retention boundary.
    ///
    /// Runs in strictly descending generation order so a rename never lands
    /// on a slot that has not been vacated yet. Individual failures are
    /// logged and do not abort the remaining batch.
    fn rotate(&self, name: &str) -> Result<()> {
        let Some(versions) = self.versions else {
            return Ok(());
        };

        let entries = fs::read_dir(&self.dir).map_err(|e| Error::OperationFailed {
            operation: "read_storage_dir".to_string(),
            cause: e.to_string(),
        })?;

        let mut slots: Vec<(u32, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::OperationFailed {
                operation: "read_dir_entry".to_string(),
                cause: e.to_string(),
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(generation) = parse_generation(name, file_name) {
                slots.push((generation, entry.path()));
            }
        }

        slots.sort_by(|a, b| b.0.cmp(&a.0));

        for (generation, path) in slots {
            // A slot whose next number would exceed the retention boundary
            // is deleted instead of promoted, keeping at most `versions`
            // generations after every export.
            let result = if generation + 1 >= versions {
                fsutil::remove(&path, true)
            } else {
                self.promote(&path, generation)
            };
            if let Err(error) = result {
                tracing::error!(%error, path = %path.display(), "rotation step failed");
            }
        }
        Ok(())
    }

    /// Renames one object from `generation` to `generation + 1`.
    fn promote(&self, path: &Path, generation: u32) -> Result<()> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };
        let next = (generation + 1).to_string();
        let mut parts: Vec<&str> = file_name.split('.').collect();
        parts[1] = &next;
        fsutil::rename(path, &self.dir.join(parts.join(".")))
    }

    /// Writes one object unless `write` says it is unchanged and already
    /// persisted.
    fn save<T: Serialize>(&self, key: &str, value: &T, write: bool) -> Result<()> {
        if !write {
            tracing::debug!(key, "object unchanged, skipping write");
            return Ok(());
        }
        let json = serde_json::to_string(value).map_err(|e| Error::OperationFailed {
            operation: "serialize_object".to_string(),
            cause: e.to_string(),
        })?;
        fsutil::write_atomic(&self.object_path(key), &json)
    }

    fn load_inner(&self, name: &str) -> Result<Option<Database>> {
        let generations = self.versions.unwrap_or(1);
        for generation in 0..generations {
            match self.load_generation(name, generation) {
                Ok(Some(db)) => return Ok(Some(db)),
                Ok(None) => {}
                Err(error @ Error::PartialData { .. }) => {
                    // The generation is unusable; an older one may still be.
                    tracing::error!(name, generation, %error, "skipping unusable generation");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Loads one generation; `None` when its metadata object is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialData`] when a listed collection object is
    /// missing and partial loads are not allowed.
    fn load_generation(&self, name: &str, generation: u32) -> Result<Option<Database>> {
        let key = self.generation_key(name, generation);
        let Some(stored) = self.load_object::<StoredDatabase>(&key)? else {
            return Ok(None);
        };

        let mut collections = Vec::with_capacity(stored.collections.len());
        let mut missing = Vec::new();
        for coll_name in &stored.collections {
            match self.load_object::<Collection>(&format!("{key}.{coll_name}"))? {
                Some(mut coll) => {
                    coll.mark_rehydrated();
                    collections.push(coll);
                }
                None => missing.push(format!("{key}.{coll_name}")),
            }
        }

        if !missing.is_empty() {
            if !self.allow_partial {
                return Err(Error::PartialData {
                    name: name.to_string(),
                    missing,
                });
            }
            tracing::error!(name, generation, ?missing, "dropping missing collections");
        }

        Ok(Some(Database {
            collections,
            meta: stored.meta,
        }))
    }

    /// Reads and deserializes one object.
    ///
    /// With delete-after-load, the raw file is renamed to a `.bak` backup
    /// right after a successful read, so an unclean shutdown before the next
    /// export cannot resurrect it on the next start.
    fn load_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.object_path(key);
        let Some(data) = fsutil::read_to_string(&path)? else {
            return Ok(None);
        };

        let value = serde_json::from_str(&data).map_err(|e| Error::OperationFailed {
            operation: "deserialize_object".to_string(),
            cause: e.to_string(),
        })?;

        if self.delete_after_load {
            fsutil::rename(&path, &fsutil::with_suffix(&path, ".bak"))?;
        }

        Ok(Some(value))
    }
}

impl DatabaseBackend for FileBackend {
    fn load(&self, name: &str) -> Result<Option<Database>> {
        let start = Instant::now();
        let result = self.load_inner(name);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("file", "load", start, status);
        result
    }

    fn export(&self, name: &str, db: &Database) -> Result<()> {
        let start = Instant::now();
        let result = self.export_inner(name, db);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("file", "export", start, status);
        result
    }
}

/// Parses the generation slot out of `<name>.<generation>[...].json`.
fn parse_generation(name: &str, file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(".json")?;
    let parts: Vec<&str> = stem.split('.').collect();
    if parts.len() < 2 || parts[0] != name {
        return None;
    }
    let generation: u32 = parts[1].parse().ok()?;
    // Reject non-canonical digits like "01"
    if parts[1] != generation.to_string() {
        return None;
    }
    Some(generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn backend(dir: &TempDir, versions: Option<u32>) -> FileBackend {
        let mut config = StoreConfig::new(dir.path(), StorageKind::File);
        config.versions = versions;
        FileBackend::new(&config)
    }

    fn dirty_collection(name: &str, payload: serde_json::Value) -> Collection {
        let mut coll = Collection::new(name);
        coll.dirty = true;
        coll.documents.insert("items".to_string(), payload);
        coll
    }

    #[test]
    fn test_parse_generation() {
        assert_eq!(parse_generation("lib", "lib.0.json"), Some(0));
        assert_eq!(parse_generation("lib", "lib.2.authors.json"), Some(2));
        assert_eq!(parse_generation("lib", "lib.json"), None);
        assert_eq!(parse_generation("lib", "other.0.json"), None);
        assert_eq!(parse_generation("lib", "lib.a.json"), None);
        assert_eq!(parse_generation("lib", "lib.01.json"), None);
        assert_eq!(parse_generation("lib", "lib.0.json.tmp"), None);
        assert_eq!(parse_generation("lib", "lib.0.json.bak"), None);
    }

    #[test]
    fn test_unversioned_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, None);

        let db = Database {
            collections: vec![dirty_collection("authors", json!([1, 2]))],
            meta: serde_json::Map::new(),
        };
        backend.export("lib", &db).unwrap();

        assert!(dir.path().join("lib.json").exists());
        assert!(dir.path().join("lib.authors.json").exists());

        let loaded = backend.load("lib").unwrap().unwrap();
        assert_eq!(loaded.collections.len(), 1);
        let coll = &loaded.collections[0];
        assert_eq!(coll.documents["items"], json!([1, 2]));
        assert!(coll.clone_objects);
        assert!(!coll.adaptive_indices);
    }

    #[test]
    fn test_unversioned_skips_clean_collections() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, None);

        let mut db = Database {
            collections: vec![dirty_collection("authors", json!([1]))],
            meta: serde_json::Map::new(),
        };
        backend.export("lib", &db).unwrap();

        // Tamper with the persisted object; a clean re-export must not touch it.
        let path = dir.path().join("lib.authors.json");
        fs::write(&path, "{\"name\":\"authors\",\"sentinel\":true}").unwrap();

        db.collections[0].dirty = false;
        backend.export("lib", &db).unwrap();
        assert!(
            fs::read_to_string(&path).unwrap().contains("sentinel"),
            "clean collection was rewritten"
        );

        // A dirty export does rewrite it.
        db.collections[0].dirty = true;
        backend.export("lib", &db).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("sentinel"));
    }

    #[test]
    fn test_rotation_retention() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, Some(3));

        let db = Database {
            collections: vec![dirty_collection("a", json!([1]))],
            meta: serde_json::Map::new(),
        };
        for _ in 0..4 {
            backend.export("lib", &db).unwrap();
        }

        for generation in 0..3 {
            assert!(dir.path().join(format!("lib.{generation}.json")).exists());
            assert!(
                dir.path()
                    .join(format!("lib.{generation}.a.json"))
                    .exists()
            );
        }
        assert!(!dir.path().join("lib.3.json").exists());
        assert!(!dir.path().join("lib.3.a.json").exists());
    }

    #[test]
    fn test_missing_collection_fails_generation() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, None);

        let db = Database {
            collections: vec![dirty_collection("authors", json!([1]))],
            meta: serde_json::Map::new(),
        };
        backend.export("lib", &db).unwrap();
        fs::remove_file(dir.path().join("lib.authors.json")).unwrap();

        assert!(backend.load("lib").unwrap().is_none());
    }

    #[test]
    fn test_missing_collection_dropped_when_partial_allowed() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::new(dir.path(), StorageKind::File);
        config.allow_partial = true;
        let backend = FileBackend::new(&config);

        let db = Database {
            collections: vec![
                dirty_collection("authors", json!([1])),
                dirty_collection("titles", json!([2])),
            ],
            meta: serde_json::Map::new(),
        };
        backend.export("lib", &db).unwrap();
        fs::remove_file(dir.path().join("lib.authors.json")).unwrap();

        let loaded = backend.load("lib").unwrap().unwrap();
        assert_eq!(loaded.collections.len(), 1);
        assert_eq!(loaded.collections[0].name, "titles");
    }

    #[test]
    fn test_probe_falls_back_to_older_generation() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, Some(2));

        let db = Database {
            collections: vec![dirty_collection("a", json!([1]))],
            meta: serde_json::Map::new(),
        };
        backend.export("lib", &db).unwrap();
        backend.export("lib", &db).unwrap();

        // Break generation 0; generation 1 must win.
        fs::remove_file(dir.path().join("lib.0.a.json")).unwrap();
        let loaded = backend.load("lib").unwrap().unwrap();
        assert_eq!(loaded.collections[0].documents["items"], json!([1]));
    }

    #[test]
    fn test_delete_after_load_leaves_backups() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::new(dir.path(), StorageKind::File);
        config.delete_after_load = true;
        let backend = FileBackend::new(&config);

        let db = Database {
            collections: vec![dirty_collection("authors", json!([1]))],
            meta: serde_json::Map::new(),
        };
        backend.export("lib", &db).unwrap();

        assert!(backend.load("lib").unwrap().is_some());
        assert!(!dir.path().join("lib.json").exists());
        assert!(dir.path().join("lib.json.bak").exists());
        assert!(dir.path().join("lib.authors.json.bak").exists());

        // Nothing readable is left for a second load.
        assert!(backend.load("lib").unwrap().is_none());
    }
}
