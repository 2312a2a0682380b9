//! Registry of actively relayed generations

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::cancel::CancelHandle;
use crate::error::RelayError;
use crate::session::GenerationIds;

pub(crate) type Entries = Mutex<HashMap<GenerationIds, CancelHandle>>;

/// Map from generation ids to the cancel handle of their relay
///
/// Owned by the [`RelayManager`](crate::RelayManager) and injected wherever
/// a generation has to be found by id. Cloning shares the same map. Entries
/// are added when a relay is spawned and removed when it ends or is
/// cancelled, whichever happens first.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<Entries>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relay; fails if the generation already has one
    pub fn register(&self, handle: CancelHandle) -> Result<(), RelayError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(handle.ids()) {
            return Err(RelayError::AlreadyRelaying {
                ids: handle.ids().clone(),
            });
        }
        entries.insert(handle.ids().clone(), handle);
        Ok(())
    }

    /// Cancel handle of the relay for `ids`, if one is active
    pub fn get(&self, ids: &GenerationIds) -> Option<CancelHandle> {
        self.entries.lock().get(ids).cloned()
    }

    /// Handles of every active relay in a conversation
    pub fn in_conversation(&self, conversation_id: &str) -> Vec<CancelHandle> {
        self.entries
            .lock()
            .values()
            .filter(|handle| handle.ids().conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Remove `handle`'s entry, but only if it is still the registered one
    pub fn remove(&self, handle: &CancelHandle) -> bool {
        remove_entry(&self.entries, handle)
    }

    pub fn contains(&self, ids: &GenerationIds) -> bool {
        self.entries.lock().contains_key(ids)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub(crate) fn downgrade(&self) -> Weak<Entries> {
        Arc::downgrade(&self.entries)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active", &self.len())
            .finish()
    }
}

pub(crate) fn remove_entry(entries: &Entries, handle: &CancelHandle) -> bool {
    let mut entries = entries.lock();
    match entries.get(handle.ids()) {
        Some(current) if current.ptr_eq(handle) => {
            entries.remove(handle.ids());
            true
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
