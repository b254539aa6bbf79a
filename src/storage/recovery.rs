//! Corruption recovery strategy.
//!
//! A `SQLite` store that fails its integrity check is never repaired
//! silently: the decision is delegated to an injected [`RecoveryHandler`].
//! Production implementations typically prompt a human; tests substitute a
//! deterministic stub.

use crate::Error;

/// Outcome of a corruption escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionAction {
    /// Terminate immediately; the corrupt store is left in place.
    Quit,
    /// Rename the corrupt store aside, then retry the open once. A second
    /// failure is fatal; there is no further recursion.
    Reset,
    /// Rename the corrupt store aside under a distinct suffix, then
    /// terminate without retrying.
    QuitDiscard,
}

/// Strategy consulted when a store fails its integrity check.
pub trait RecoveryHandler: Send + Sync {
    /// Decides how to proceed after `name` failed its check with `error`.
    fn decide(&self, name: &str, error: &Error) -> CorruptionAction;

    /// Ends the process.
    ///
    /// `discard` is true when the corrupt store was set aside for inspection
    /// rather than reset for reuse. Process lifecycle is the host's concern;
    /// the default exits with a failure code.
    fn terminate(&self, discard: bool) -> ! {
        let _ = discard;
        std::process::exit(1)
    }
}

/// Default handler: corruption is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuitOnCorruption;

impl RecoveryHandler for QuitOnCorruption {
    fn decide(&self, name: &str, error: &Error) -> CorruptionAction {
        tracing::error!(name, %error, "database store is corrupt, quitting");
        CorruptionAction::Quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handler_quits() {
        let err = Error::Integrity {
            name: "library".to_string(),
            cause: "not ok".to_string(),
        };
        assert_eq!(
            QuitOnCorruption.decide("library", &err),
            CorruptionAction::Quit
        );
    }
}
