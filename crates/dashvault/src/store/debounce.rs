//! Per-user write coalescing.
//!
//! Each user has at most one pending write. Scheduling a new one replaces
//! the record and restarts the timer, so only the last record of a burst is
//! written. Timers run as tasks on the ambient tokio runtime; a generation
//! number tells a woken timer whether it was superseded while it slept.
//!
//! Every user also has a write gate. A timer holds it from the moment it
//! claims its record until the write returns, and [`PendingWrites::claim`]
//! takes it before discarding the pending entry. A cancelled or superseded
//! record therefore never lands after the write that replaced it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::record::UserRecord;

#[derive(Debug)]
struct PendingWrite {
    generation: u64,
    record: UserRecord,
    timer: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Shared {
    entries: Mutex<HashMap<String, PendingWrite>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingWrite>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(user_id.to_string()).or_default())
    }
}

fn hold(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pending debounced writes, keyed by user id.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    shared: Arc<Shared>,
    generation: AtomicU64,
}

impl PendingWrites {
    /// Schedule `record` to be handed to `write` after `delay`, replacing
    /// any write already pending for `user_id`.
    ///
    /// Returns the record back when no tokio runtime is available, in which
    /// case nothing was scheduled.
    pub(crate) fn schedule<F>(
        &self,
        user_id: &str,
        record: UserRecord,
        delay: Duration,
        write: F,
    ) -> Result<(), UserRecord>
    where
        F: FnOnce(&str, UserRecord) + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            return Err(record);
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = Arc::clone(&self.shared);
        let key = user_id.to_string();

        // Held across spawn so the timer cannot observe the map before the
        // new entry is in place.
        let mut map = self.shared.entries();
        if let Some(previous) = map.remove(user_id) {
            previous.timer.abort();
        }

        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // No await below this point: the gate is a blocking lock.
            let gate = shared.gate(&key);
            let _held = hold(&gate);
            let due = {
                let mut map = shared.entries();
                match map.get(&key) {
                    Some(pending) if pending.generation == generation => {
                        map.remove(&key).map(|pending| pending.record)
                    }
                    _ => None,
                }
            };
            if let Some(record) = due {
                write(&key, record);
            }
        });

        map.insert(
            user_id.to_string(),
            PendingWrite {
                generation,
                record,
                timer,
            },
        );
        Ok(())
    }

    /// Take the user's write gate, remove any pending write, and run `f`
    /// with the removed record while the gate is still held.
    ///
    /// Waits for a timer that is writing for this user to finish first, so
    /// whatever `f` writes lands after it.
    pub(crate) fn claim<T>(&self, user_id: &str, f: impl FnOnce(Option<UserRecord>) -> T) -> T {
        let gate = self.shared.gate(user_id);
        let _held = hold(&gate);
        let pending = self.shared.entries().remove(user_id).map(|pending| {
            pending.timer.abort();
            pending.record
        });
        f(pending)
    }

    /// Drop the pending write for `user_id`. Returns whether one existed.
    #[cfg(test)]
    pub(crate) fn cancel(&self, user_id: &str) -> bool {
        self.claim(user_id, |pending| pending.is_some())
    }

    /// User ids with a write pending, sorted.
    pub(crate) fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn contains(&self, user_id: &str) -> bool {
        self.shared.entries().contains_key(user_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.shared.entries().len()
    }
}

impl Drop for PendingWrites {
    fn drop(&mut self) {
        for (_, pending) in self.shared.entries().drain() {
            pending.timer.abort();
        }
    }
}
