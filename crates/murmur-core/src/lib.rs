//! # Murmur Core
//!
//! Core library for Murmur - a local voice journal with tag-scoped encryption.
//!
//! Every entry is protected by one key at a time: the root key by default,
//! or the key of the first PIN-protected tag it carries. Tag keys are only
//! held in memory while the tag is unlocked for the current session.
//!
//! ## Architecture
//!
//! - **crypto**: key derivation, PIN hashing, AES-256-GCM sealing
//! - **secrets**: persistent key slots (OS keychain, keyfiles, memory)
//! - **tags**: PIN credentials of encrypted tags
//! - **session**: per-session access grants for unlocked tags
//! - **coordinator**: which key governs an entry; seal, open, reconcile
//! - **storage**: storage engine trait and the SQLite backend
//! - **journal**: the single save path and maintenance sweeps
//! - **enrichment**: asynchronous enrichment through the save path

pub mod coordinator;
pub mod crypto;
pub mod enrichment;
pub mod error;
pub mod fs;
pub mod journal;
pub mod secrets;
pub mod session;
pub mod storage;
pub mod tags;

pub use coordinator::{
    EncryptionCoordinator, EncryptionDomain, ReconcileReport, RetiredSlots, Revealed,
    WriteOutcome,
};
pub use error::{MurmurError, Result};
pub use journal::{Journal, JournalConfig, ProtectionStatus, SweepReport, TagForgotten};
pub use secrets::{KeyIdentifier, SecretStore};
pub use session::{AccessSessionManager, AccessState};
pub use storage::{Entry, EntryFilter, FieldName, StorageEngine, Tag};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
