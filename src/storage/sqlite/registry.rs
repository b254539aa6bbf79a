//! Connection registry for the `SQLite` backend.
//!
//! At most one connection per database name is tracked. A closed slot is a
//! tombstone: it is never reused, a fresh open replaces it.

use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// State of one registered connection slot.
pub(crate) enum Slot {
    /// A live connection.
    Open(Connection),
    /// Tombstone left behind by `close`; exports against it are dropped.
    Closed,
}

/// Per-database-name map of `SQLite` connection slots.
///
/// The `Mutex` exists because `rusqlite::Connection` is not `Sync`; callers
/// are still responsible for serializing operations per database name.
#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    /// Acquires the registry lock, recovering from poison.
    ///
    /// A panic inside an earlier critical section must not wedge every later
    /// store operation; the slot states themselves are still valid.
    pub fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("connection registry mutex was poisoned, recovering");
                metrics::counter!("store_registry_poison_recovery_total").increment(1);
                poisoned.into_inner()
            },
        }
    }

    /// Registers an open connection for `name`, replacing any previous slot.
    pub fn register(&self, name: &str, conn: Connection) {
        self.lock().insert(name.to_string(), Slot::Open(conn));
    }

    /// Tombstones `name`, returning the connection if one was open.
    pub fn take_for_close(&self, name: &str) -> Option<Connection> {
        let mut slots = self.lock();
        if !matches!(slots.get(name), Some(Slot::Open(_))) {
            return None;
        }
        match slots.insert(name.to_string(), Slot::Closed) {
            Some(Slot::Open(conn)) => Some(conn),
            _ => None,
        }
    }
}
