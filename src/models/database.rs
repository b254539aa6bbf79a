//! Database and collection representations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named sub-document within a [`Database`].
///
/// Apart from its name and the bookkeeping flags below, a collection is
/// opaque to the store: `documents` carries whatever the in-memory engine
/// serialized into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name, unique within its database.
    pub name: String,
    /// Changed since the last persisted snapshot.
    ///
    /// Only dirty collections are eligible for the skip-on-unchanged write
    /// optimization; the store never sets this except when reconstructing
    /// collections from a backend.
    #[serde(default)]
    pub dirty: bool,
    /// Consumers must hand out copies of documents instead of live
    /// references. Forced on for reconstructed collections.
    #[serde(default)]
    pub clone_objects: bool,
    /// Whether the consumer may maintain its indices incrementally.
    ///
    /// Forced off for reconstructed collections; they must be re-indexed
    /// from scratch.
    #[serde(default = "default_true")]
    pub adaptive_indices: bool,
    /// Opaque document payload owned by the consumer.
    #[serde(flatten)]
    pub documents: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Collection {
    /// Creates an empty, clean collection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dirty: false,
            clone_objects: false,
            adaptive_indices: true,
            documents: Map::new(),
        }
    }

    /// Marks a collection reconstructed from persisted state.
    ///
    /// Such a collection is a fully materialized copy and cannot be indexed
    /// incrementally by the consumer.
    pub fn mark_rehydrated(&mut self) {
        self.clone_objects = true;
        self.adaptive_indices = false;
    }

    /// Row/object key for this collection within `database`.
    #[must_use]
    pub fn qualified_name(&self, database: &str) -> String {
        format!("{database}.{}", self.name)
    }
}

/// A named aggregate of collections plus opaque metadata, persisted as one
/// unit.
///
/// Constructed by the caller or returned by
/// [`Store::load_database`](crate::Store::load_database), mutated freely, and
/// handed to [`Store::export_database`](crate::Store::export_database). It
/// has no persistence identity beyond its name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    /// Ordered collections.
    pub collections: Vec<Collection>,
    /// Opaque metadata fields persisted alongside the collection list.
    pub meta: Map<String, Value>,
}

impl Database {
    /// Looks up a collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name == name)
    }
}

/// Persisted metadata blob: the database with its collections replaced by
/// their persisted keys.
///
/// The file backend lists plain collection names; the `SQLite` backend lists
/// qualified `<database>.<collection>` row keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredDatabase {
    /// Keys of the collections this database expects to resolve on load.
    pub collections: Vec<String>,
    /// Opaque metadata carried through verbatim.
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl StoredDatabase {
    /// Metadata blob for the file backend.
    pub fn plain(db: &Database) -> Self {
        Self {
            collections: db.collections.iter().map(|c| c.name.clone()).collect(),
            meta: db.meta.clone(),
        }
    }

    /// Metadata blob for the `SQLite` backend.
    pub fn qualified(name: &str, db: &Database) -> Self {
        Self {
            collections: db
                .collections
                .iter()
                .map(|c| c.qualified_name(name))
                .collect(),
            meta: db.meta.clone(),
        }
    }
}
