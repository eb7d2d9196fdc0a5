//! Subscriptions.
//!
//! A [`Subscription`] is a consumer's declared interest in one key. Creating it hands back the
//! entry as it was at that moment, registers the consumer's callback and asks the coordinator to
//! fetch. Dropping it removes the callback; the cached entry stays.
use crate::{CacheEntry, CacheKey, Callback, Coordinator, FetchMode, Request, SubscriberId};
use std::{fmt, rc::Rc};

pub struct Subscription {
    coordinator: Rc<Coordinator>,
    mode: FetchMode,
    callback: Callback,
    key: CacheKey,
    id: SubscriberId,
    initial: CacheEntry,
}

impl Subscription {
    pub(crate) fn new(
        coordinator: Rc<Coordinator>,
        request: &Request,
        mode: FetchMode,
        callback: Callback,
    ) -> Self {
        let key = request.key();
        let (id, initial) = Self::attach(&coordinator, request, &key, mode, &callback);
        Self {
            coordinator,
            mode,
            callback,
            key,
            id,
            initial,
        }
    }

    fn attach(
        coordinator: &Coordinator,
        request: &Request,
        key: &CacheKey,
        mode: FetchMode,
        callback: &Callback,
    ) -> (SubscriberId, CacheEntry) {
        let initial = coordinator.store().get(key);
        let id = coordinator.store().register(key, callback.clone());
        coordinator.ensure_fetched(request, mode);
        (id, initial)
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Entry as it was when this subscription was made, before any fetch it triggered.
    pub fn initial(&self) -> &CacheEntry {
        &self.initial
    }

    /// Entry as it is now.
    pub fn current(&self) -> CacheEntry {
        self.coordinator.store().get(&self.key)
    }

    /// Move this subscription to another request.
    ///
    /// The callback is detached from the old key before it is attached to the new one, so it
    /// never hears about the old key again. Returns the new key's entry as it was before any
    /// fetch this triggered. Moving to the same key does nothing.
    pub fn rekey(&mut self, request: &Request) -> CacheEntry {
        let key = request.key();
        if key == self.key {
            return self.current();
        }
        self.coordinator.store().unregister(&self.key, self.id);
        let (id, initial) =
            Self::attach(&self.coordinator, request, &key, self.mode, &self.callback);
        self.key = key;
        self.id = id;
        self.initial = initial;
        self.initial.clone()
    }

    /// Stop receiving updates. Same as dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.coordinator.store().unregister(&self.key, self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}
