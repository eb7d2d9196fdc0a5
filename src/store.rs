//! Cache store.
//!
//! The store maps each [`CacheKey`] to its current [`CacheEntry`] and to the callbacks subscribed
//! to it. It is the only owner of entries: callers read snapshots with [`CacheStore::get`] and
//! are told about changes through their callbacks, never by holding on to an entry.
//!
//! Writes are crate-private and go through the coordinator. Every write replaces the entry as a
//! whole and then notifies the key's subscribers. Callbacks run while no borrow of the store is
//! held, so a callback may read the store or start another fetch.
use crate::{CacheEntry, CacheKey, FetchError, RequestId};
use serde_json::Value as JsonValue;
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};
use web_time::{Instant, SystemTime};

/// Callback invoked with the new entry whenever a subscribed key changes.
pub type Callback = Rc<dyn Fn(&CacheEntry)>;

/// Identifies one registered callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
struct Slot {
    entry: CacheEntry,
    /// Bumped on every write, so that an interrupted broadcast can tell it is outdated.
    version: u64,
    subscribers: Vec<(SubscriberId, Callback)>,
}

#[derive(Default)]
struct Entries {
    slots: BTreeMap<CacheKey, Slot>,
    next_subscriber: u64,
}

/// Shared handle to the cache state.
#[derive(Clone, Default)]
pub struct CacheStore {
    entries: Rc<RefCell<Entries>>,
}

impl PartialEq for CacheStore {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        f.debug_map()
            .entries(
                entries
                    .slots
                    .iter()
                    .map(|(key, slot)| (key, slot.entry.status())),
            )
            .finish()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry for this key, [`CacheEntry::Absent`] if the key is unknown.
    pub fn get(&self, key: &CacheKey) -> CacheEntry {
        self.entries
            .borrow()
            .slots
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_default()
    }

    /// Keys the store has seen, in order.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.borrow().slots.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().slots.is_empty()
    }

    /// Number of callbacks registered for this key.
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.entries
            .borrow()
            .slots
            .get(key)
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// Register a callback for changes to this key.
    pub fn register(&self, key: &CacheKey, callback: Callback) -> SubscriberId {
        let mut entries = self.entries.borrow_mut();
        entries.next_subscriber += 1;
        let id = SubscriberId(entries.next_subscriber);
        entries
            .slots
            .entry(key.clone())
            .or_default()
            .subscribers
            .push((id, callback));
        id
    }

    /// Remove a callback. The entry itself is kept.
    pub fn unregister(&self, key: &CacheKey, id: SubscriberId) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.slots.get_mut(key) {
            Some(slot) => {
                let before = slot.subscribers.len();
                slot.subscribers.retain(|(subscriber, _)| *subscriber != id);
                slot.subscribers.len() != before
            }
            None => false,
        }
    }

    /// Mark this key as being fetched by `request_id`, replacing whatever was there.
    pub(crate) fn set_pending(&self, key: &CacheKey, request_id: RequestId, since: Instant) {
        self.replace(key, CacheEntry::Pending { request_id, since });
    }

    /// Store a fetched value, unless `request_id` has been superseded.
    pub(crate) fn resolve(
        &self,
        key: &CacheKey,
        request_id: RequestId,
        value: JsonValue,
        now: SystemTime,
    ) -> bool {
        self.settle(key, request_id, || CacheEntry::Ready {
            value: Rc::new(value),
            last_updated: now,
        })
    }

    /// Store a fetch failure, unless `request_id` has been superseded.
    pub(crate) fn reject(
        &self,
        key: &CacheKey,
        request_id: RequestId,
        error: FetchError,
        now: SystemTime,
    ) -> bool {
        self.settle(key, request_id, || CacheEntry::Failed {
            error,
            last_updated: now,
        })
    }

    /// Reset this key to [`CacheEntry::Absent`], whatever its status. Returns false if the key
    /// is unknown, in which case nothing happens.
    pub(crate) fn invalidate(&self, key: &CacheKey) -> bool {
        let known = self.entries.borrow().slots.contains_key(key);
        if known {
            self.replace(key, CacheEntry::Absent);
        }
        known
    }

    /// Invalidate every entry matching the predicate. Entries that are already absent are left
    /// alone. Returns the invalidated keys.
    pub(crate) fn invalidate_where<F: Fn(&CacheKey, &CacheEntry) -> bool>(
        &self,
        predicate: F,
    ) -> Vec<CacheKey> {
        let keys: Vec<CacheKey> = self
            .entries
            .borrow()
            .slots
            .iter()
            .filter(|(key, slot)| slot.entry != CacheEntry::Absent && predicate(*key, &slot.entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.invalidate(key);
        }
        keys
    }

    /// Invalidate every entry of an operation, whatever its arguments.
    pub(crate) fn invalidate_operation(&self, operation: &str) -> Vec<CacheKey> {
        self.invalidate_where(|key, _| key.operation() == operation)
    }

    pub(crate) fn invalidate_all(&self) -> Vec<CacheKey> {
        self.invalidate_where(|_, _| true)
    }

    /// Send the current entry of this key to all of its subscribers.
    ///
    /// Each subscriber is called at most once. If a callback changes the entry again, delivery of
    /// the now outdated entry stops: the nested write has already broadcast the newer one.
    pub fn notify(&self, key: &CacheKey) {
        let (entry, version, subscribers) = {
            let entries = self.entries.borrow();
            match entries.slots.get(key) {
                Some(slot) => (slot.entry.clone(), slot.version, slot.subscribers.clone()),
                None => return,
            }
        };

        #[cfg(feature = "log")]
        log::trace!(
            "notify {key}: {:?} to {} subscribers",
            entry.status(),
            subscribers.len()
        );

        for (id, callback) in subscribers {
            if !self.still_current(key, version, id) {
                if self.version(key) != Some(version) {
                    break;
                }
                continue;
            }
            callback(&entry);
        }
    }

    fn version(&self, key: &CacheKey) -> Option<u64> {
        self.entries.borrow().slots.get(key).map(|slot| slot.version)
    }

    fn still_current(&self, key: &CacheKey, version: u64, id: SubscriberId) -> bool {
        self.entries.borrow().slots.get(key).map_or(false, |slot| {
            slot.version == version && slot.subscribers.iter().any(|(other, _)| *other == id)
        })
    }

    fn replace(&self, key: &CacheKey, entry: CacheEntry) {
        {
            let mut entries = self.entries.borrow_mut();
            let slot = entries.slots.entry(key.clone()).or_default();
            slot.entry = entry;
            slot.version += 1;
        }
        self.notify(key);
    }

    fn settle<F: FnOnce() -> CacheEntry>(
        &self,
        key: &CacheKey,
        request_id: RequestId,
        entry: F,
    ) -> bool {
        let current = self
            .entries
            .borrow()
            .slots
            .get(key)
            .and_then(|slot| slot.entry.in_flight_request_id());
        if current != Some(request_id) {
            return false;
        }
        self.replace(key, entry());
        true
    }
}
