//! Session-scoped access grants for encrypted tags.
//!
//! The `AccessSessionManager` caches the live key of every tag the user has
//! unlocked during the current session. It is an ordinary owned value: the
//! host creates one per application session, hands out `Arc` handles, and
//! calls `clear_all_access` when the app is backgrounded or locked. Dropping
//! the manager clears it as well, so no grant outlives the session object.
//!
//! Per-tag state machine:
//!
//! ```text
//! Locked --grant_access--> Unlocking --pin ok--> Unlocked
//!    ^                         |                    |
//!    +-------pin wrong---------+                    |
//!    +----revoke_access / clear_all_access----------+
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::{derive_key, verify_pin, SymmetricKey};
use crate::error::Result;
use crate::secrets::{get_with_retry, put_with_retry, SecretStore};
use crate::storage::Tag;

/// Observable access state of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Locked,
    Unlocking,
    Unlocked,
}

/// In-memory record that a tag's key is available. Never persisted.
struct AccessGrant {
    key: Arc<SymmetricKey>,
    granted_at: DateTime<Utc>,
}

/// Process-lifetime cache of unlocked tag keys.
pub struct AccessSessionManager {
    secrets: Arc<dyn SecretStore>,
    grants: RwLock<HashMap<Uuid, AccessGrant>>,
    tag_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    unlocking: Mutex<HashSet<Uuid>>,
    epoch: AtomicU64,
}

/// Removes a tag from the `Unlocking` set on every exit path.
struct UnlockingGuard<'a> {
    manager: &'a AccessSessionManager,
    tag_id: Uuid,
}

impl Drop for UnlockingGuard<'_> {
    fn drop(&mut self) {
        self.manager.lock_unlocking().remove(&self.tag_id);
    }
}

impl AccessSessionManager {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            grants: RwLock::new(HashMap::new()),
            tag_locks: Mutex::new(HashMap::new()),
            unlocking: Mutex::new(HashSet::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Verify `pin` against the tag's credential and, on success, cache its key.
    ///
    /// Returns `Ok(false)` for every "not authorized" outcome: wrong PIN, a
    /// tag without a credential, or an unlock that was overtaken by
    /// `clear_all_access`. Errors are reserved for secret store and
    /// derivation failures.
    ///
    /// Calling this again for an unlocked tag with the right PIN is a no-op
    /// returning `true`; a wrong PIN returns `false` and leaves the existing
    /// grant alone.
    pub fn grant_access(&self, tag: &Tag, pin: &str) -> Result<bool> {
        let tag_lock = self.tag_lock(&tag.id);
        let _serialized = tag_lock.lock().unwrap_or_else(|e| e.into_inner());

        let credential = match tag.credential.as_ref() {
            Some(credential) => credential,
            None => {
                tracing::debug!(tag_id = %tag.id, "grant denied: tag is not encrypted");
                return Ok(false);
            }
        };

        if self.read_grants().contains_key(&tag.id) {
            return Ok(verify_pin(pin, &credential.pin_hash, &credential.pin_salt));
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.lock_unlocking().insert(tag.id);
        let _unlocking = UnlockingGuard {
            manager: self,
            tag_id: tag.id,
        };

        // Derive before verifying so a wrong PIN costs the same as a right one.
        let derived = derive_key(pin, &credential.pin_salt);
        if !verify_pin(pin, &credential.pin_hash, &credential.pin_salt) {
            tracing::debug!(tag_id = %tag.id, "grant denied");
            return Ok(false);
        }
        let derived = derived?;

        let key = match get_with_retry(self.secrets.as_ref(), &credential.key_identifier)? {
            Some(stored) => stored,
            None => {
                tracing::info!(
                    tag_id = %tag.id,
                    identifier = %credential.key_identifier,
                    "tag key missing from secret store, re-provisioning from PIN"
                );
                put_with_retry(self.secrets.as_ref(), &credential.key_identifier, &derived)?;
                derived
            }
        };

        let mut grants = self.write_grants();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(tag_id = %tag.id, "grant discarded: session was cleared while unlocking");
            return Ok(false);
        }
        grants.insert(
            tag.id,
            AccessGrant {
                key: Arc::new(key),
                granted_at: Utc::now(),
            },
        );
        tracing::info!(tag_id = %tag.id, "tag unlocked");
        Ok(true)
    }

    /// Live key of an unlocked tag. Does not change state.
    ///
    /// Callers may hold the returned `Arc` to finish an operation after the
    /// tag is revoked; the bytes are zeroized once the last holder drops it.
    pub fn get_key(&self, tag_id: &Uuid) -> Option<Arc<SymmetricKey>> {
        self.read_grants()
            .get(tag_id)
            .map(|grant| Arc::clone(&grant.key))
    }

    /// Drop the tag's cached key. Returns `true` if the tag was unlocked.
    pub fn revoke_access(&self, tag_id: &Uuid) -> bool {
        let removed = self.write_grants().remove(tag_id).is_some();
        self.prune_tag_locks(Some(tag_id));
        if removed {
            tracing::info!(tag_id = %tag_id, "tag locked");
        }
        removed
    }

    /// Revoke every grant. Returns how many tags were unlocked.
    ///
    /// Unlocks still in progress when this runs are discarded instead of
    /// being cached afterwards.
    pub fn clear_all_access(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut grants = self.write_grants();
        let count = grants.len();
        grants.clear();
        drop(grants);
        self.prune_tag_locks(None);
        if count > 0 {
            tracing::info!(count, "all tags locked");
        }
        count
    }

    pub fn state(&self, tag_id: &Uuid) -> AccessState {
        if self.read_grants().contains_key(tag_id) {
            AccessState::Unlocked
        } else if self.lock_unlocking().contains(tag_id) {
            AccessState::Unlocking
        } else {
            AccessState::Locked
        }
    }

    pub fn is_unlocked(&self, tag_id: &Uuid) -> bool {
        self.read_grants().contains_key(tag_id)
    }

    /// Currently unlocked tags with their grant time, oldest first.
    pub fn unlocked_tags(&self) -> Vec<(Uuid, DateTime<Utc>)> {
        let mut tags: Vec<(Uuid, DateTime<Utc>)> = self
            .read_grants()
            .iter()
            .map(|(id, grant)| (*id, grant.granted_at))
            .collect();
        tags.sort_by_key(|(_, granted_at)| *granted_at);
        tags
    }

    fn tag_lock(&self, tag_id: &Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.tag_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(*tag_id).or_default())
    }

    /// Drop per-tag unlock locks nobody is holding. `None` prunes all of them.
    fn prune_tag_locks(&self, only: Option<&Uuid>) {
        let mut locks = self.tag_locks.lock().unwrap_or_else(|e| e.into_inner());
        match only {
            Some(tag_id) => {
                if locks.get(tag_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                    locks.remove(tag_id);
                }
            }
            None => locks.retain(|_, lock| Arc::strong_count(lock) > 1),
        }
    }

    // A poisoned table is still structurally valid; keep serving it.
    fn read_grants(&self) -> RwLockReadGuard<'_, HashMap<Uuid, AccessGrant>> {
        self.grants.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_grants(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, AccessGrant>> {
        self.grants.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_unlocking(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.unlocking.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AccessSessionManager {
    fn drop(&mut self) {
        self.clear_all_access();
    }
}
