//! The signed-in user's working copy of their record.

use tracing::{debug, warn};

use crate::accounts::Accounts;
use crate::error::Result;
use crate::record::UserRecord;
use crate::store::UserDataStore;

/// Holds the loaded record of the active user and writes edits through to
/// the store.
///
/// Nothing is loaded until [`load`](Self::load) is called; edits made while
/// nothing is loaded are ignored with a warning.
#[derive(Debug)]
pub struct UserDataContext {
    store: UserDataStore,
    loaded: Option<Loaded>,
}

#[derive(Debug)]
struct Loaded {
    user_id: String,
    record: UserRecord,
}

impl UserDataContext {
    /// Create a context with nothing loaded.
    #[must_use]
    pub fn new(store: UserDataStore) -> Self {
        Self {
            store,
            loaded: None,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &UserDataStore {
        &self.store
    }

    /// Load `user_id`'s record, replacing whatever was loaded.
    pub fn load(&mut self, user_id: &str) -> &UserRecord {
        debug!(user_id, "Loading user data");
        let record = self.store.get_user_data(user_id);
        &self
            .loaded
            .insert(Loaded {
                user_id: user_id.to_string(),
                record,
            })
            .record
    }

    /// Load the signed-in account's record, or unload when signed out.
    pub fn load_current(&mut self, accounts: &Accounts) -> Option<&UserRecord> {
        match accounts.current_user() {
            Some(account) => Some(self.load(&account.id)),
            None => {
                self.reset();
                None
            }
        }
    }

    /// Unload the record (sign-out). Nothing is written.
    pub fn reset(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            debug!(user_id = %loaded.user_id, "Unloaded user data");
        }
    }

    /// Id of the loaded user.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.user_id.as_str())
    }

    /// The loaded record.
    #[must_use]
    pub fn record(&self) -> Option<&UserRecord> {
        self.loaded.as_ref().map(|l| &l.record)
    }

    /// Read a value from the loaded record.
    pub fn get<T>(&self, f: impl FnOnce(&UserRecord) -> T) -> Option<T> {
        self.record().map(f)
    }

    /// Edit the loaded record and save it immediately.
    ///
    /// Returns `Ok(None)` without doing anything when nothing is loaded. The
    /// in-memory copy keeps the edit even if the save fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn update<T>(&mut self, f: impl FnOnce(&mut UserRecord) -> T) -> Result<Option<T>> {
        let Some(loaded) = self.loaded.as_mut() else {
            warn!("Cannot update user data: nothing loaded");
            return Ok(None);
        };
        let value = f(&mut loaded.record);
        self.store
            .save_user_data_immediate(&loaded.user_id, &loaded.record)?;
        Ok(Some(value))
    }

    /// Edit the loaded record and schedule a debounced save.
    ///
    /// Suited to rapid successive edits such as typing or dragging.
    ///
    /// # Errors
    ///
    /// Returns an error only when there is no async runtime and the
    /// immediate fallback write fails.
    pub fn update_debounced<T>(
        &mut self,
        f: impl FnOnce(&mut UserRecord) -> T,
    ) -> Result<Option<T>> {
        let Some(loaded) = self.loaded.as_mut() else {
            warn!("Cannot update user data: nothing loaded");
            return Ok(None);
        };
        let value = f(&mut loaded.record);
        self.store
            .save_user_data_debounced(&loaded.user_id, loaded.record.clone())?;
        Ok(Some(value))
    }

    /// Write the loaded record now. Returns `false` when nothing is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn save(&self) -> Result<bool> {
        let Some(loaded) = &self.loaded else {
            warn!("Cannot save user data: nothing loaded");
            return Ok(false);
        };
        self.store
            .save_user_data_immediate(&loaded.user_id, &loaded.record)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn create_test_context() -> (Arc<MemoryStore>, UserDataContext) {
        let substrate = Arc::new(MemoryStore::new());
        let store = UserDataStore::new(Arc::clone(&substrate) as Arc<dyn KeyValueStore>);
        (substrate, UserDataContext::new(store))
    }

    #[test]
    fn test_update_without_load_is_ignored() {
        let (substrate, mut ctx) = create_test_context();
        assert_eq!(ctx.update(|r| r.flight_count = 3).unwrap(), None);
        assert!(!ctx.save().unwrap());
        assert_eq!(substrate.write_count(), 0);
    }

    #[test]
    fn test_load_update_persists() {
        let (_, mut ctx) = create_test_context();
        ctx.load("alice");
        let added = ctx.update(|r| r.track_flights(["a", "b"])).unwrap();
        assert_eq!(added, Some(2));
        assert_eq!(ctx.get(|r| r.flight_count), Some(2));
        assert_eq!(ctx.store().get_user_data("alice").flight_count, 2);
    }

    #[test]
    fn test_reset_unloads() {
        let (_, mut ctx) = create_test_context();
        ctx.load("alice");
        assert_eq!(ctx.user_id(), Some("alice"));
        ctx.reset();
        assert!(ctx.record().is_none());
        assert!(ctx.user_id().is_none());
    }

    #[test]
    fn test_load_current_follows_session() {
        let (substrate, mut ctx) = create_test_context();
        let accounts = Accounts::new(Arc::clone(&substrate) as Arc<dyn KeyValueStore>);

        assert!(ctx.load_current(&accounts).is_none());

        let account = accounts.sign_up("Alice", "alice@example.com", "secret1").unwrap();
        assert!(ctx.load_current(&accounts).is_some());
        assert_eq!(ctx.user_id(), Some(account.id.as_str()));

        accounts.logout().unwrap();
        assert!(ctx.load_current(&accounts).is_none());
        assert!(ctx.record().is_none());
    }

    #[test]
    fn test_save_forces_write() {
        let (substrate, mut ctx) = create_test_context();
        ctx.load("alice");
        assert!(ctx.save().unwrap());
        assert_eq!(substrate.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_debounced_coalesces() {
        let (substrate, mut ctx) = create_test_context();
        ctx.load("alice");
        for id in ["a", "b", "c"] {
            ctx.update_debounced(|r| r.track_flights([id])).unwrap();
        }
        assert_eq!(substrate.write_count(), 0);

        tokio::time::sleep(ctx.store().debounce() * 2).await;
        assert_eq!(substrate.write_count(), 1);
        assert_eq!(ctx.store().get_user_data("alice").flight_count, 3);
    }
}
