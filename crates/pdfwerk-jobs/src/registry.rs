// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Expiring in-memory registry for split sessions and compression jobs.
//
// Entries live for a fixed time-to-live. Expiry is lazy: an expired entry
// reads as not found straight away, but is only dropped (releasing whatever
// it owns, such as a session's temp directory) by `sweep_expired`.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument};

use pdfwerk_core::error::{PdfwerkError, Result};

struct Entry<V> {
    value: V,
    /// Creation time, or the last update.
    touched_at: DateTime<Utc>,
}

/// Concurrency-safe keyed store with a time-to-live.
///
/// All methods take `&self`; share the registry behind an `Arc`.
pub struct Registry<K, V> {
    /// What the entries are, for error messages and logs ("session", "job").
    kind: &'static str,
    ttl: TimeDelta,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Copy + Display,
{
    pub fn new(kind: &'static str, ttl: Duration) -> Self {
        Self {
            kind,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    // -- Writes -----------------------------------------------------------------

    /// Insert or replace an entry, stamped with the current time.
    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Utc::now());
    }

    /// Insert or replace an entry with an explicit timestamp.
    pub fn put_at(&self, key: K, value: V, now: DateTime<Utc>) {
        let replaced = self
            .lock()
            .insert(
                key,
                Entry {
                    value,
                    touched_at: now,
                },
            )
            .is_some();
        debug!(kind = self.kind, id = %key, replaced, "registry entry stored");
    }

    /// Insert an entry unless a live one already holds `key`. An expired
    /// entry is replaced.
    pub fn put_new(&self, key: K, value: V) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.lock();
        if entries.get(&key).is_some_and(|entry| !self.is_expired(entry, now)) {
            return Err(PdfwerkError::InvalidInput(format!("{} {} already exists", self.kind, key)));
        }
        entries.insert(
            key,
            Entry {
                value,
                touched_at: now,
            },
        );
        debug!(kind = self.kind, id = %key, "registry entry created");
        Ok(())
    }

    /// Modify a live entry in place and refresh its timestamp. Returns what
    /// `f` returns.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Result<R> {
        let now = Utc::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if !self.is_expired(entry, now) => {
                let result = f(&mut entry.value);
                entry.touched_at = now;
                Ok(result)
            }
            _ => Err(self.not_found(key)),
        }
    }

    /// Remove an entry, returning it. Removing a missing key is a no-op.
    pub fn delete(&self, key: &K) -> Option<V> {
        let removed = self.lock().remove(key).map(|entry| entry.value);
        if removed.is_some() {
            debug!(kind = self.kind, id = %key, "registry entry deleted");
        }
        removed
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// [`Registry::sweep_expired`] against an explicit clock.
    #[instrument(skip(self), fields(kind = self.kind))]
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        // Expired values are dropped after the lock is released.
        let expired: Vec<V> = {
            let mut entries = self.lock();
            let keys: Vec<K> = entries
                .iter()
                .filter(|(_, entry)| self.is_expired(entry, now))
                .map(|(key, _)| *key)
                .collect();
            keys.iter()
                .filter_map(|key| entries.remove(key))
                .map(|entry| entry.value)
                .collect()
        };

        if !expired.is_empty() {
            info!(kind = self.kind, swept = expired.len(), "expired entries removed");
        }
        expired.len()
    }

    // -- Reads ------------------------------------------------------------------

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        let now = Utc::now();
        self.lock()
            .get(key)
            .is_some_and(|entry| !self.is_expired(entry, now))
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Helpers ----------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &Entry<V>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.touched_at) >= self.ttl
    }

    fn not_found(&self, key: &K) -> PdfwerkError {
        PdfwerkError::NotFound(format!("{} {} not found", self.kind, key))
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Copy + Display,
    V: Clone,
{
    /// A copy of the live entry for `key`; missing and expired entries are
    /// both `NotFound`.
    pub fn get(&self, key: &K) -> Result<V> {
        self.get_at(key, Utc::now())
    }

    /// [`Registry::get`] against an explicit clock.
    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Result<V> {
        match self.lock().get(key) {
            Some(entry) if !self.is_expired(entry, now) => Ok(entry.value.clone()),
            _ => Err(self.not_found(key)),
        }
    }
}
