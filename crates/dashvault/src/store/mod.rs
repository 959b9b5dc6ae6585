//! Per-user record persistence.
//!
//! [`UserDataStore`] maps a user id to one JSON document in a
//! [`KeyValueStore`] under `key_prefix + user_id`. Reads never fail: a
//! missing or unreadable record yields defaults. Writes either go straight
//! through or are coalesced per user by a debounce timer.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dashvault::{MemoryStore, UserDataStore};
//!
//! let store = UserDataStore::new(Arc::new(MemoryStore::new()));
//! let mut record = store.get_user_data("alice");
//! record.track_flights(["BA123"]);
//! store.save_user_data("alice", &record).unwrap();
//!
//! assert_eq!(store.get_user_data("alice").flight_count, 1);
//! assert_eq!(store.all_user_ids().unwrap(), vec!["alice"]);
//! ```

mod debounce;
pub mod legacy;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_DEBOUNCE_MS, DEFAULT_KEY_PREFIX};
use crate::error::{Error, Result};
use crate::record::UserRecord;
use crate::substrate::KeyValueStore;

use debounce::PendingWrites;

/// Handle to the user data store. Cheap to clone; clones share the
/// substrate and the pending-write map.
#[derive(Debug, Clone)]
pub struct UserDataStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    substrate: Arc<dyn KeyValueStore>,
    prefix: String,
    debounce: Duration,
    pending: PendingWrites,
}

impl UserDataStore {
    /// Create a store with the default key prefix and debounce period.
    #[must_use]
    pub fn new(substrate: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(
            substrate,
            DEFAULT_KEY_PREFIX,
            Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        )
    }

    /// Create a store using the prefix and debounce period from `config`.
    #[must_use]
    pub fn from_config(substrate: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::with_options(substrate, &config.storage.key_prefix, config.debounce())
    }

    /// Create a store with an explicit prefix and debounce period.
    #[must_use]
    pub fn with_options(
        substrate: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                substrate,
                prefix: prefix.into(),
                debounce,
                pending: PendingWrites::default(),
            }),
        }
    }

    /// The substrate this store writes to.
    #[must_use]
    pub fn substrate(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.substrate
    }

    /// The key prefix for user records.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// The debounce period.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// The substrate key holding `user_id`'s record.
    #[must_use]
    pub fn key_for(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.inner.prefix)
    }

    /// A fresh record with every field at its default.
    #[must_use]
    pub fn default_user_data() -> UserRecord {
        UserRecord::default()
    }

    /// Load a user's record.
    ///
    /// Returns defaults when the record is absent, malformed, or the
    /// substrate cannot be read. Nothing is written.
    #[must_use]
    pub fn get_user_data(&self, user_id: &str) -> UserRecord {
        let key = self.key_for(user_id);
        match self.inner.substrate.read(&key) {
            Ok(Some(raw)) => match UserRecord::from_json(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(user_id, error = %e, "Stored user data is malformed, using defaults");
                    UserRecord::default()
                }
            },
            Ok(None) => UserRecord::default(),
            Err(e) => {
                error!(user_id, error = %e, "Failed to read user data, using defaults");
                UserRecord::default()
            }
        }
    }

    /// Write a user's record now.
    ///
    /// Does not touch a pending debounced write; see
    /// [`save_user_data_immediate`](Self::save_user_data_immediate).
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate rejects the write.
    pub fn save_user_data(&self, user_id: &str, record: &UserRecord) -> Result<()> {
        write_record(self.inner.substrate.as_ref(), &self.key_for(user_id), record)
    }

    /// Schedule a write after the debounce period.
    ///
    /// A later call for the same user replaces this one and restarts the
    /// timer. Needs a tokio runtime; without one the write happens now.
    /// Failures of the deferred write are logged.
    ///
    /// # Errors
    ///
    /// Returns an error only when there is no runtime and the immediate
    /// write fails.
    pub fn save_user_data_debounced(&self, user_id: &str, record: UserRecord) -> Result<()> {
        let substrate = Arc::clone(&self.inner.substrate);
        let key = self.key_for(user_id);
        let scheduled = self.inner.pending.schedule(
            user_id,
            record,
            self.inner.debounce,
            move |user_id, record| {
                if write_record(substrate.as_ref(), &key, &record).is_ok() {
                    debug!(user_id, "Debounced user data write completed");
                }
            },
        );

        match scheduled {
            Ok(()) => Ok(()),
            Err(record) => {
                warn!(user_id, "No async runtime available, writing user data immediately");
                self.save_user_data_immediate(user_id, &record)
            }
        }
    }

    /// Cancel any pending debounced write for the user, then write now.
    ///
    /// A debounced write already in progress for the user finishes first,
    /// so this record is the one left stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate rejects the write.
    pub fn save_user_data_immediate(&self, user_id: &str, record: &UserRecord) -> Result<()> {
        self.inner.pending.claim(user_id, |pending| {
            if pending.is_some() {
                debug!(user_id, "Cancelled pending debounced write");
            }
            self.save_user_data(user_id, record)
        })
    }

    /// Load a record, apply `f`, and save it immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn update_user_data<F>(&self, user_id: &str, f: F) -> Result<UserRecord>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut record = self.get_user_data(user_id);
        f(&mut record);
        self.save_user_data_immediate(user_id, &record)?;
        Ok(record)
    }

    /// Like [`update_user_data`](Self::update_user_data) for fallible edits.
    /// Nothing is written when `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from the write.
    pub fn try_update_user_data<T, F>(&self, user_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut UserRecord) -> Result<T>,
    {
        let mut record = self.get_user_data(user_id);
        let value = f(&mut record)?;
        self.save_user_data_immediate(user_id, &record)?;
        Ok(value)
    }

    /// Fold legacy top-level keys into the user's record.
    ///
    /// Starts from the user's existing record (or defaults), overlays every
    /// legacy key that parses, saves, then deletes the keys it used. Keys
    /// that fail to parse are logged and kept. When nothing was migrated
    /// and the user already has a record, nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error only if saving the merged record fails; legacy keys
    /// are left untouched in that case.
    pub fn migrate_to_user_data(&self, user_id: &str) -> Result<UserRecord> {
        let key = self.key_for(user_id);
        let existing = match self.inner.substrate.read(&key) {
            Ok(Some(raw)) => UserRecord::from_json(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(user_id, error = %e, "Could not read existing user data before migration");
                None
            }
        };
        let had_record = existing.is_some();

        let collected = legacy::collect(self.inner.substrate.as_ref(), existing.unwrap_or_default());

        if collected.migrated.is_empty() && had_record {
            debug!(user_id, "No legacy data to migrate");
            return Ok(collected.record);
        }

        self.save_user_data_immediate(user_id, &collected.record)?;
        legacy::remove_migrated(self.inner.substrate.as_ref(), &collected.migrated);

        info!(
            user_id,
            migrated = collected.migrated.len(),
            skipped = collected.skipped.len(),
            "Migrated legacy data"
        );
        Ok(collected.record)
    }

    /// Legacy keys still present in the substrate.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read.
    pub fn legacy_keys_present(&self) -> Result<Vec<&'static str>> {
        legacy::present(self.inner.substrate.as_ref())
    }

    /// The user's record as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_user_data(&self, user_id: &str) -> Result<String> {
        self.get_user_data(user_id).to_json_pretty()
    }

    /// Replace the user's record with an exported document.
    ///
    /// The payload is validated first; on failure the stored record is left
    /// as it was. A pending debounced write is discarded on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for a payload that is not a valid
    /// record, or a write error.
    pub fn import_user_data(&self, user_id: &str, payload: &str) -> Result<()> {
        let record = UserRecord::from_json(payload).map_err(|e| {
            warn!(user_id, error = %e, "Rejected user data import");
            match e {
                Error::Json(json) => Error::invalid_record(json.to_string()),
                other => other,
            }
        })?;
        self.save_user_data_immediate(user_id, &record)?;
        info!(user_id, "Imported user data");
        Ok(())
    }

    /// Delete the user's record and discard any pending write.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be modified.
    pub fn clear_user_data(&self, user_id: &str) -> Result<()> {
        let key = self.key_for(user_id);
        self.inner
            .pending
            .claim(user_id, |_| self.inner.substrate.delete(&key))?;
        info!(user_id, "Cleared user data");
        Ok(())
    }

    /// Ids of every user with a stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be enumerated.
    pub fn all_user_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .substrate
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(self.inner.prefix.as_str()).map(str::to_string))
            .collect())
    }

    /// Number of debounced writes waiting for their timer.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether the user has a debounced write waiting.
    #[must_use]
    pub fn has_pending_write(&self, user_id: &str) -> bool {
        self.inner.pending.contains(user_id)
    }

    /// Users with a debounced write waiting, sorted.
    #[must_use]
    pub fn pending_user_ids(&self) -> Vec<String> {
        self.inner.pending.user_ids()
    }

    /// Write every pending debounced record now.
    ///
    /// All pending records are attempted; returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns the first write failure after attempting the rest.
    pub fn flush(&self) -> Result<usize> {
        let mut written = 0;
        let mut first_error = None;
        for user_id in self.inner.pending.user_ids() {
            let result = self.inner.pending.claim(&user_id, |pending| {
                pending.map(|record| self.save_user_data(&user_id, &record))
            });
            match result {
                Some(Ok(())) => written += 1,
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => {}
            }
        }
        if written > 0 {
            debug!(written, "Flushed pending user data writes");
        }
        first_error.map_or(Ok(written), Err)
    }
}

fn write_record(substrate: &dyn KeyValueStore, key: &str, record: &UserRecord) -> Result<()> {
    let payload = record.to_json()?;
    substrate.write(key, &payload).inspect_err(|e| {
        error!(key, error = %e, "Failed to persist user data");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::MemoryStore;

    fn create_test_store() -> (Arc<MemoryStore>, UserDataStore) {
        let substrate = Arc::new(MemoryStore::new());
        let store = UserDataStore::new(Arc::clone(&substrate) as Arc<dyn KeyValueStore>);
        (substrate, store)
    }

    #[test]
    fn test_absent_record_is_default_and_not_written() {
        let (substrate, store) = create_test_store();
        assert_eq!(store.get_user_data("nobody"), UserRecord::default());
        assert_eq!(substrate.write_count(), 0);
    }

    #[test]
    fn test_round_trip() {
        let (_, store) = create_test_store();
        let mut record = UserRecord::default();
        record.track_flights(["a", "b"]);
        store.save_user_data("alice", &record).unwrap();
        assert_eq!(store.get_user_data("alice"), record);
    }

    #[test]
    fn test_key_uses_prefix() {
        let (substrate, store) = create_test_store();
        store.save_user_data("alice", &UserRecord::default()).unwrap();
        assert!(substrate.read("user_data_alice").unwrap().is_some());
    }

    #[test]
    fn test_malformed_record_falls_back_to_default() {
        let (substrate, store) = create_test_store();
        substrate.write("user_data_alice", "{broken").unwrap();
        assert_eq!(store.get_user_data("alice"), UserRecord::default());
        // untouched
        assert_eq!(substrate.read("user_data_alice").unwrap().as_deref(), Some("{broken"));
    }

    #[test]
    fn test_write_failure_is_returned() {
        let substrate: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_quota(10));
        let store = UserDataStore::new(substrate);
        let err = store.save_user_data("alice", &UserRecord::default()).unwrap_err();
        assert!(err.is_write_failure());
    }

    #[test]
    fn test_debounced_without_runtime_writes_now() {
        let (substrate, store) = create_test_store();
        let record = UserRecord {
            flight_count: 4,
            ..UserRecord::default()
        };
        store.save_user_data_debounced("alice", record).unwrap();
        assert_eq!(substrate.write_count(), 1);
        assert_eq!(store.get_user_data("alice").flight_count, 4);
        assert_eq!(store.pending_writes(), 0);
    }

    #[test]
    fn test_update_user_data() {
        let (_, store) = create_test_store();
        let updated = store
            .update_user_data("alice", |r| {
                r.track_flights(["x"]);
            })
            .unwrap();
        assert_eq!(updated.flight_count, 1);
        assert_eq!(store.get_user_data("alice").flight_count, 1);
    }

    #[test]
    fn test_try_update_does_not_write_on_error() {
        let (substrate, store) = create_test_store();
        let result: Result<()> =
            store.try_update_user_data("alice", |r| r.move_card("missing", None).map(|_| ()));
        assert!(result.is_err());
        assert_eq!(substrate.write_count(), 0);
    }

    #[test]
    fn test_import_rejects_invalid_payload() {
        let (_, store) = create_test_store();
        let record = UserRecord {
            flight_count: 9,
            ..UserRecord::default()
        };
        store.save_user_data("alice", &record).unwrap();

        let err = store.import_user_data("alice", "not json").unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
        assert_eq!(store.get_user_data("alice").flight_count, 9);
    }

    #[test]
    fn test_export_import_between_users() {
        let (_, store) = create_test_store();
        let mut record = UserRecord::default();
        record.track_flights(["a"]);
        record.reset_cards();
        store.save_user_data("alice", &record).unwrap();

        let exported = store.export_user_data("alice").unwrap();
        store.import_user_data("bob", &exported).unwrap();
        assert_eq!(store.get_user_data("bob"), record);
    }

    #[test]
    fn test_all_user_ids_ignores_other_keys() {
        let (substrate, store) = create_test_store();
        substrate.write("users", "[]").unwrap();
        substrate.write("totalFlightsTracked", "3").unwrap();
        store.save_user_data("alice", &UserRecord::default()).unwrap();
        store.save_user_data("bob", &UserRecord::default()).unwrap();

        let mut ids = store.all_user_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["alice", "bob"]);
    }

    #[test]
    fn test_clear_user_data() {
        let (_, store) = create_test_store();
        store.save_user_data("alice", &UserRecord::default()).unwrap();
        store.clear_user_data("alice").unwrap();
        assert!(store.all_user_ids().unwrap().is_empty());
        // clearing twice is fine
        store.clear_user_data("alice").unwrap();
    }

    #[test]
    fn test_custom_prefix() {
        let substrate: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let store = UserDataStore::with_options(Arc::clone(&substrate), "dash_", Duration::from_millis(50));
        store.save_user_data("carol", &UserRecord::default()).unwrap();
        assert!(substrate.read("dash_carol").unwrap().is_some());
        assert_eq!(store.all_user_ids().unwrap(), vec!["carol"]);
    }

    #[test]
    fn test_migrate_without_legacy_data_creates_default_record() {
        let (substrate, store) = create_test_store();
        let record = store.migrate_to_user_data("alice").unwrap();
        assert_eq!(record, UserRecord::default());
        assert!(substrate.read("user_data_alice").unwrap().is_some());
    }

    #[test]
    fn test_migrate_without_legacy_data_keeps_existing_record() {
        let (substrate, store) = create_test_store();
        let record = UserRecord {
            flight_count: 5,
            ..UserRecord::default()
        };
        store.save_user_data("alice", &record).unwrap();
        let writes = substrate.write_count();

        assert_eq!(store.migrate_to_user_data("alice").unwrap().flight_count, 5);
        assert_eq!(substrate.write_count(), writes);
    }

    #[test]
    fn test_migrate_failed_save_keeps_legacy_keys() {
        let substrate = Arc::new(MemoryStore::with_quota(40));
        substrate.write(legacy::TOTAL_FLIGHTS_KEY, "12").unwrap();
        let store = UserDataStore::new(Arc::clone(&substrate) as Arc<dyn KeyValueStore>);

        assert!(store.migrate_to_user_data("alice").is_err());
        assert_eq!(
            substrate.read(legacy::TOTAL_FLIGHTS_KEY).unwrap().as_deref(),
            Some("12")
        );
    }
}
