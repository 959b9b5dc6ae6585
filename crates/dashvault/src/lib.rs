//! `dashvault` - Per-user dashboard data store
//!
//! This library keeps the data a personal dashboard remembers for each user
//! (tracked flights, weather locations, saved businesses, medications, card
//! layout and preferences) as one JSON record per user in a key-value
//! substrate, with debounced writes and migration of pre-account data.
//!
//! ```
//! use std::sync::Arc;
//! use dashvault::{KeyValueStore, MemoryStore, UserDataStore};
//!
//! let substrate: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
//! let store = UserDataStore::new(substrate);
//!
//! let record = store
//!     .update_user_data("alice", |r| {
//!         r.track_flights(["EZY123", "RYR456"]);
//!     })
//!     .unwrap();
//! assert_eq!(record.flight_count, 2);
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod accounts;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod session;
pub mod store;
pub mod substrate;

pub use accounts::{Account, Accounts, ResetToken};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::{
    default_cards, BusinessRecord, CardPrefab, CardRecord, CardSize, ContentType, LocationRef,
    MedicationRecord, NetworkSpeedTest, Theme, UserRecord, CARD_PREFABS,
};
pub use session::UserDataContext;
pub use store::UserDataStore;
pub use substrate::{KeyValueStore, MemoryStore, SqliteStore, SubstrateStats};
