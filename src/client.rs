use crate::{
    CacheConfig, CacheEntry, CacheKey, CacheStore, Clock, Coordinator, FetchError, FetchMode,
    FetchOutcome, Invalidation, Invalidator, MaxAge, Request, Spawner, Staleness, Subscription,
    Transport,
};
use serde_json::Value as JsonValue;
use std::{fmt, rc::Rc};

/// Request cache.
///
/// This is the handle consumers hold. It is cheap to clone, and clones share the same state;
/// independent caches (one per test, say) are simply separate `Cache` values.
#[derive(Clone)]
pub struct Cache {
    coordinator: Rc<Coordinator>,
    config: Rc<CacheConfig>,
}

impl PartialEq for Cache {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.coordinator, &other.coordinator)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("entries", self.store())
            .finish()
    }
}

impl Cache {
    pub fn new<T: Transport + 'static, S: Spawner + 'static>(transport: T, spawner: S) -> Self {
        CacheBuilder::new(transport, spawner).build()
    }

    pub fn builder<T: Transport + 'static, S: Spawner + 'static>(
        transport: T,
        spawner: S,
    ) -> CacheBuilder {
        CacheBuilder::new(transport, spawner)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Read-only view of the cached entries.
    pub fn store(&self) -> &CacheStore {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &Rc<Coordinator> {
        &self.coordinator
    }

    /// Current entry for a request, without fetching.
    pub fn get(&self, request: &Request) -> CacheEntry {
        self.store().get(&request.key())
    }

    /// Subscribe to a request.
    ///
    /// The callback is invoked with the new entry every time it changes, until the returned
    /// [`Subscription`] is dropped. Subscribing also fetches, according to the configured
    /// [`FetchPolicy`](crate::FetchPolicy).
    pub fn subscribe<F: Fn(&CacheEntry) + 'static>(
        &self,
        request: &Request,
        on_change: F,
    ) -> Subscription {
        Subscription::new(
            self.coordinator.clone(),
            request,
            self.config.fetch_policy.into(),
            Rc::new(on_change),
        )
    }

    /// Fetch unless a usable entry exists.
    pub fn fetch(&self, request: &Request) -> FetchOutcome {
        self.coordinator.ensure_fetched(request, FetchMode::Cached)
    }

    /// Fetch even if the entry is ready. Joins a request already in flight.
    pub fn refetch(&self, request: &Request) -> FetchOutcome {
        self.coordinator.ensure_fetched(request, FetchMode::Force)
    }

    /// Fetch again after a failure.
    pub fn retry(&self, request: &Request) -> FetchOutcome {
        self.fetch(request)
    }

    /// Drop the entry of a request, so the next read fetches it again.
    ///
    /// Returns false if the request was never seen.
    pub fn invalidate(&self, request: &Request) -> bool {
        self.coordinator.invalidate(&request.key())
    }

    pub fn invalidate_key(&self, key: &CacheKey) -> bool {
        self.coordinator.invalidate(key)
    }

    /// Drop the entries of an operation, for all arguments.
    pub fn invalidate_operation(&self, operation: &str) -> Vec<CacheKey> {
        self.coordinator.apply(&Invalidation::operation(operation))
    }

    pub fn invalidate_all(&self) -> Vec<CacheKey> {
        self.coordinator.apply(&Invalidation::All)
    }

    /// Perform a write, then invalidate what it changed.
    pub async fn mutate<I: Invalidator + ?Sized>(
        &self,
        request: &Request,
        invalidator: &I,
    ) -> Result<JsonValue, FetchError> {
        self.coordinator.mutate(request, invalidator).await
    }
}

/// Builds a [`Cache`] with a custom configuration, staleness policy or clock.
pub struct CacheBuilder {
    transport: Rc<dyn Transport>,
    spawner: Rc<dyn Spawner>,
    config: CacheConfig,
    staleness: Option<Rc<dyn Staleness>>,
    clock: Option<Rc<dyn Clock>>,
}

impl CacheBuilder {
    pub fn new<T: Transport + 'static, S: Spawner + 'static>(transport: T, spawner: S) -> Self {
        Self {
            transport: Rc::new(transport),
            spawner: Rc::new(spawner),
            config: CacheConfig::default(),
            staleness: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the staleness policy. Takes precedence over `max_age` from the configuration.
    pub fn staleness<P: Staleness + 'static>(mut self, staleness: P) -> Self {
        self.staleness = Some(Rc::new(staleness));
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Rc::new(clock));
        self
    }

    pub fn build(self) -> Cache {
        let mut coordinator = Coordinator::new(CacheStore::new(), self.transport, self.spawner)
            .with_pending_timeout(self.config.pending_timeout);
        if let Some(staleness) = self
            .staleness
            .or_else(|| self.config.max_age.map(|age| Rc::new(MaxAge(age)) as Rc<dyn Staleness>))
        {
            coordinator = coordinator.with_staleness(staleness);
        }
        if let Some(clock) = self.clock {
            coordinator = coordinator.with_clock(clock);
        }
        Cache {
            coordinator: Rc::new(coordinator),
            config: Rc::new(self.config),
        }
    }
}
