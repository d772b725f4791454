//! A module which contains an in-memory implementation of the stable storage contract, suitable
//! for tests and for simulations living inside a single process.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::api::StableStorage;
use crate::error::PaxosError;
use crate::suggestion_id::{LastAccepted, SuggestionId};

struct Slots<T> {
    last_granted: Option<SuggestionId>,

    last_accepted: Option<LastAccepted<T>>,
}

// I had to implement Default manually. See https://github.com/rust-lang/rust/issues/45036.
impl<T> Default for Slots<T> {
    fn default() -> Self {
        Slots {
            last_granted: None,
            last_accepted: None,
        }
    }
}

/// A stable storage which keeps the two per-uid slots in a map. Nothing survives the process, so
/// it only makes sense where losing an acceptor's promises is acceptable: tests and local
/// simulations.
pub struct MemoryStorage<T> {
    slots: Mutex<HashMap<String, Slots<T>>>,
}

impl<T> MemoryStorage<T> {
    pub fn new() -> Self {
        MemoryStorage {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemoryStorage<T> {
    fn default() -> Self {
        MemoryStorage::new()
    }
}

impl<T> MemoryStorage<T> {
    fn with_slots<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Slots<T>>) -> R,
    ) -> Result<R, PaxosError> {
        match self.slots.lock() {
            Ok(mut slots) => Ok(f(&mut slots)),
            Err(_) => Err(PaxosError::Storage(
                "storage mutex poisoned by a panicking writer".to_owned(),
            )),
        }
    }
}

impl<T> StableStorage<T> for MemoryStorage<T>
where
    T: Clone + Send,
{
    fn get_last_granted_suggestion_id(
        &self,
        uid: &str,
    ) -> Result<Option<SuggestionId>, PaxosError> {
        self.with_slots(|slots| slots.get(uid).and_then(|s| s.last_granted.clone()))
    }

    fn store_last_granted_suggestion_id(
        &self,
        uid: &str,
        sid: &SuggestionId,
    ) -> Result<(), PaxosError> {
        self.with_slots(|slots| {
            slots.entry(uid.to_owned()).or_default().last_granted = Some(sid.clone());
        })
    }

    fn get_last_accepted_data(&self, uid: &str) -> Result<Option<LastAccepted<T>>, PaxosError> {
        self.with_slots(|slots| slots.get(uid).and_then(|s| s.last_accepted.clone()))
    }

    fn store_last_accepted_data(
        &self,
        uid: &str,
        data: &LastAccepted<T>,
    ) -> Result<(), PaxosError> {
        self.with_slots(|slots| {
            slots.entry(uid.to_owned()).or_default().last_accepted = Some(data.clone());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::api::StableStorage;
    use crate::suggestion_id::{LastAccepted, SuggestionId};

    #[test]
    fn both_slots_start_empty() {
        let storage: MemoryStorage<u32> = MemoryStorage::new();
        assert!(storage
            .get_last_granted_suggestion_id("n1")
            .unwrap()
            .is_none());
        assert!(storage.get_last_accepted_data("n1").unwrap().is_none());
    }

    #[test]
    fn stored_slots_are_read_back() {
        let storage: MemoryStorage<u32> = MemoryStorage::new();
        let sid = SuggestionId::new(4, "n1");

        storage.store_last_granted_suggestion_id("n1", &sid).unwrap();
        storage
            .store_last_accepted_data("n1", &LastAccepted::new(sid.clone(), 17))
            .unwrap();

        assert_eq!(
            storage.get_last_granted_suggestion_id("n1").unwrap(),
            Some(sid.clone())
        );
        let accepted = storage.get_last_accepted_data("n1").unwrap().unwrap();
        assert_eq!(accepted.sid, sid);
        assert_eq!(accepted.value, 17);
    }

    #[test]
    fn slots_are_isolated_per_uid() {
        let storage: MemoryStorage<u32> = MemoryStorage::new();
        storage
            .store_last_granted_suggestion_id("n1", &SuggestionId::new(1, "n1"))
            .unwrap();

        assert!(storage
            .get_last_granted_suggestion_id("n2")
            .unwrap()
            .is_none());
    }

    #[test]
    fn a_later_store_replaces_the_slot() {
        let storage: MemoryStorage<u32> = MemoryStorage::new();
        storage
            .store_last_granted_suggestion_id("n1", &SuggestionId::new(1, "n1"))
            .unwrap();
        storage
            .store_last_granted_suggestion_id("n1", &SuggestionId::new(2, "n2"))
            .unwrap();

        assert_eq!(
            storage.get_last_granted_suggestion_id("n1").unwrap(),
            Some(SuggestionId::new(2, "n2"))
        );
    }
}
