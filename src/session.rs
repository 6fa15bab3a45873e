//! Per-user staged uploads.
//!
//! A [`SessionStore`] holds at most one [`SessionEntry`] per user. It is the
//! only mutable state shared between event handlers; `DashMap` shards it so
//! concurrent users never contend on one lock, and every operation on a
//! single user's slot is one atomic map call.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::registry::Category;

/// Transport-assigned user identity.
pub type UserId = i64;

/// Opaque handle to the transport message that shows a job's status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An upload waiting for the user to pick a conversion.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Temp file holding the upload; owned by this entry.
    pub input_path: PathBuf,
    /// Filename as declared by the user, used to name the result.
    pub original_filename: String,
    /// Category detected from `original_filename`.
    pub category: Category,
    /// Message being edited with status updates.
    pub pending_message_ref: MessageRef,
    pub staged_at: Instant,
}

impl SessionEntry {
    pub fn new(
        input_path: PathBuf,
        original_filename: impl Into<String>,
        category: Category,
        pending_message_ref: MessageRef,
    ) -> Self {
        Self {
            input_path,
            original_filename: original_filename.into(),
            category,
            pending_message_ref,
            staged_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.staged_at.elapsed()
    }
}

/// Concurrent map of user → staged upload.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: DashMap<UserId, SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entry` for `user`, returning the entry it replaced.
    pub fn stage(&self, user: UserId, entry: SessionEntry) -> Option<SessionEntry> {
        self.entries.insert(user, entry)
    }

    /// Remove and return the user's entry.
    pub fn take(&self, user: UserId) -> Option<SessionEntry> {
        self.entries.remove(&user).map(|(_, entry)| entry)
    }

    /// Put a previously taken entry back, unless a newer upload has
    /// claimed the slot in the meantime.
    ///
    /// Returns the entry when it could not be restored so the caller can
    /// release its file.
    pub fn restore(&self, user: UserId, entry: SessionEntry) -> Option<SessionEntry> {
        match self.entries.entry(user) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                None
            }
            Entry::Occupied(_) => Some(entry),
        }
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.entries.contains_key(&user)
    }

    /// Snapshot of the user's entry without removing it.
    pub fn peek(&self, user: UserId) -> Option<SessionEntry> {
        self.entries.get(&user).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry staged longer than `ttl` ago.
    pub fn evict_older_than(&self, ttl: Duration) -> Vec<(UserId, SessionEntry)> {
        let stale: Vec<UserId> = self
            .entries
            .iter()
            .filter(|e| e.value().age() >= ttl)
            .map(|e| *e.key())
            .collect();

        // Re-check under the shard lock: the user may have re-uploaded
        // between the scan and the removal.
        stale
            .into_iter()
            .filter_map(|user| self.entries.remove_if(&user, |_, e| e.age() >= ttl))
            .collect()
    }

    /// Input paths currently owned by staged entries.
    pub fn live_paths(&self) -> HashSet<PathBuf> {
        self.entries
            .iter()
            .map(|e| e.value().input_path.clone())
            .collect()
    }
}
