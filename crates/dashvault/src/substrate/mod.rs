//! Key-value substrates for dashvault.
//!
//! The user data store never touches a database directly. It talks to a
//! [`KeyValueStore`], a synchronous string-to-string map with enumeration,
//! which is all a browser's local storage offers:
//!
//! - [`MemoryStore`]: in-process map with an optional byte quota
//! - [`SqliteStore`]: durable `SQLite`-backed map used by the CLI

mod memory;
pub mod migrations;
pub mod schema;
mod sqlite;

use std::fmt::Debug;

use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SubstrateStats};

/// A synchronous key-value storage substrate.
///
/// Implementations must be safe to share between the caller and the
/// debounce timer tasks, hence `Send + Sync`.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read the value stored at `key`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` at `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate rejects the write (quota, I/O).
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be modified.
    fn delete(&self, key: &str) -> Result<()>;

    /// Enumerate every key currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read.
    fn keys(&self) -> Result<Vec<String>>;

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read.
    fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// Whether the substrate holds no keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
