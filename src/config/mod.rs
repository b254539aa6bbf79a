//! Store configuration.

use crate::{Error, Result};
use std::path::PathBuf;

/// Physical backend selection for a [`Store`](crate::Store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// One `SQLite` database file per document database, rows keyed by
    /// qualified name.
    Sqlite,
    /// One JSON object per database or collection, optionally
    /// generation-versioned.
    File,
}

impl StorageKind {
    /// Parses a backend kind string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unrecognized kind.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            other => Err(Error::Configuration(format!(
                "unsupported storage kind '{other}'"
            ))),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::File => "file",
        }
    }
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the persisted objects, both `SQLite` files and JSON
    /// snapshots.
    pub dir: PathBuf,
    /// Which physical backend owns exports.
    pub kind: StorageKind,
    /// Number of snapshot generations retained by the file backend.
    ///
    /// `None` keeps a single unversioned snapshot. Must be greater than zero
    /// and is rejected under [`StorageKind::Sqlite`].
    pub versions: Option<u32>,
    /// Drop missing collections on load instead of failing the load.
    pub allow_partial: bool,
    /// Clear persisted data immediately after a successful load, so an
    /// unclean shutdown before the next export starts from scratch instead of
    /// resurrecting a stale snapshot.
    pub delete_after_load: bool,
}

impl StoreConfig {
    /// Creates a configuration with strict loads and no versioning.
    pub fn new(dir: impl Into<PathBuf>, kind: StorageKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
            versions: None,
            allow_partial: false,
            delete_after_load: false,
        }
    }

    /// Validates invariants that only hold across fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `versions` is combined with the
    /// `SQLite` backend or is zero.
    pub fn validate(&self) -> Result<()> {
        if self.kind == StorageKind::Sqlite && self.versions.is_some() {
            return Err(Error::Configuration(
                "storage kind 'sqlite' does not support versions".to_string(),
            ));
        }
        if self.versions == Some(0) {
            return Err(Error::Configuration(
                "versions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
