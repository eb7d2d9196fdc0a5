//! Request coordinator.
//!
//! The coordinator decides when a remote read is needed, makes sure there is at most one read in
//! flight per key, and writes the outcome back into the [`CacheStore`]. Every read gets a fresh
//! [`RequestId`]; the store only accepts an outcome whose id is still the pending one, so a late
//! response from a superseded read has no effect.
//!
//! Reads are spawned onto a [`Spawner`], so that [`Coordinator::ensure_fetched`] itself never
//! waits. There is no retry and no cancellation.
use crate::{
    CacheEntry, CacheKey, CacheStore, Clock, FetchError, FetchMode, Invalidation, Invalidator,
    NeverStale, Request, RequestId, Staleness, SystemClock, Transport,
};
use futures::{
    executor::LocalSpawner,
    future::LocalBoxFuture,
    task::{LocalSpawnExt, SpawnError},
};
use serde_json::Value as JsonValue;
use std::{cell::Cell, rc::Rc, time::Duration};

/// Runs spawned reads to completion on the current thread.
pub trait Spawner {
    fn spawn(&self, future: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError>;
}

impl Spawner for LocalSpawner {
    fn spawn(&self, future: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        self.spawn_local(future)
    }
}

/// Spawns onto the browser's microtask queue.
#[cfg(any(feature = "yew", feature = "http"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct WasmSpawner;

#[cfg(any(feature = "yew", feature = "http"))]
impl Spawner for WasmSpawner {
    fn spawn(&self, future: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// What [`Coordinator::ensure_fetched`] decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A read for this key was already in flight.
    Coalesced(RequestId),
    /// The entry is ready and fresh.
    Fresh,
    /// A new read was issued.
    Started(RequestId),
}

pub struct Coordinator {
    store: CacheStore,
    transport: Rc<dyn Transport>,
    spawner: Rc<dyn Spawner>,
    staleness: Rc<dyn Staleness>,
    clock: Rc<dyn Clock>,
    pending_timeout: Option<Duration>,
    last_request: Cell<u64>,
}

impl Coordinator {
    pub fn new(store: CacheStore, transport: Rc<dyn Transport>, spawner: Rc<dyn Spawner>) -> Self {
        Self {
            store,
            transport,
            spawner,
            staleness: Rc::new(NeverStale),
            clock: Rc::new(SystemClock),
            pending_timeout: None,
            last_request: Cell::new(0),
        }
    }

    pub fn with_staleness(mut self, staleness: Rc<dyn Staleness>) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Treat reads pending for longer than this as lost and let the next fetch supersede them.
    pub fn with_pending_timeout(mut self, pending_timeout: Option<Duration>) -> Self {
        self.pending_timeout = pending_timeout;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Make sure the entry for this request is ready, or being fetched.
    pub fn ensure_fetched(&self, request: &Request, mode: FetchMode) -> FetchOutcome {
        let key = request.key();
        let entry = self.store.get(&key);
        match &entry {
            CacheEntry::Pending { request_id, since } => {
                if !self.abandoned(*since) {
                    #[cfg(feature = "log")]
                    log::debug!("fetch {key}: joining request {request_id}");
                    return FetchOutcome::Coalesced(*request_id);
                }
                #[cfg(feature = "log")]
                log::warn!("fetch {key}: request {request_id} timed out, superseding it");
            }
            CacheEntry::Ready { .. }
                if mode == FetchMode::Cached
                    && !self.staleness.is_stale(&key, &entry, self.clock.now()) =>
            {
                #[cfg(feature = "log")]
                log::debug!("fetch {key}: fresh");
                return FetchOutcome::Fresh;
            }
            _ => {}
        }
        FetchOutcome::Started(self.start(key, request))
    }

    /// Reset an entry to absent. A read in flight for it is discarded when it completes.
    ///
    /// Returns false if the key was never seen.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        #[cfg(feature = "log")]
        log::debug!("invalidate {key}");
        self.store.invalidate(key)
    }

    /// Apply invalidations, returning the keys that were reset.
    pub fn apply<I: Invalidator + ?Sized>(&self, invalidator: &I) -> Vec<CacheKey> {
        let mut keys = Vec::new();
        for invalidation in invalidator.invalidations() {
            match invalidation {
                Invalidation::Key(key) => {
                    if self.invalidate(&key) {
                        keys.push(key);
                    }
                }
                Invalidation::Operation(operation) => {
                    keys.extend(self.store.invalidate_operation(&operation));
                }
                Invalidation::All => keys.extend(self.store.invalidate_all()),
            }
        }
        keys
    }

    /// Send a write to the transport and, if it succeeds, apply its invalidations.
    ///
    /// Writes are never cached and never coalesced.
    pub async fn mutate<I: Invalidator + ?Sized>(
        &self,
        request: &Request,
        invalidator: &I,
    ) -> Result<JsonValue, FetchError> {
        let result = self
            .transport
            .call(request.operation(), request.args())
            .await;
        match &result {
            Ok(_) => {
                self.apply(invalidator);
            }
            Err(_error) => {
                #[cfg(feature = "log")]
                log::warn!("mutation {} failed: {_error}", request.key());
            }
        }
        result
    }

    fn abandoned(&self, since: web_time::Instant) -> bool {
        self.pending_timeout.map_or(false, |timeout| {
            self.clock.instant().saturating_duration_since(since) >= timeout
        })
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.last_request.get() + 1;
        self.last_request.set(id);
        RequestId(id)
    }

    fn start(&self, key: CacheKey, request: &Request) -> RequestId {
        let request_id = self.next_request_id();
        #[cfg(feature = "log")]
        log::debug!("fetch {key}: starting request {request_id}");
        self.store
            .set_pending(&key, request_id, self.clock.instant());

        let store = self.store.clone();
        let transport = self.transport.clone();
        let clock = self.clock.clone();
        let operation = request.operation().to_owned();
        let args = request.args().clone();
        let fetch_key = key.clone();
        let future = async move {
            let key = fetch_key;
            let applied = match transport.call(&operation, &args).await {
                Ok(value) => store.resolve(&key, request_id, value, clock.now()),
                Err(error) => {
                    #[cfg(feature = "log")]
                    log::warn!("fetch {key}: request {request_id} failed: {error}");
                    store.reject(&key, request_id, error, clock.now())
                }
            };
            if !applied {
                #[cfg(feature = "log")]
                log::debug!("fetch {key}: discarding stale response to {request_id}");
            }
        };

        if let Err(error) = self.spawner.spawn(Box::pin(future)) {
            #[cfg(feature = "log")]
            log::warn!("fetch {key}: cannot spawn request {request_id}: {error}");
            self.store.reject(
                &key,
                request_id,
                FetchError::TransportFailure(error.to_string()),
                self.clock.now(),
            );
        }
        request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::ScriptedTransport, Args, ManualClock, MaxAge, Status};
    use futures::executor::LocalPool;
    use serde_json::json;

    struct Harness {
        pool: LocalPool,
        transport: Rc<ScriptedTransport>,
        clock: Rc<ManualClock>,
        coordinator: Coordinator,
    }

    impl Harness {
        fn new() -> Self {
            Self::build(|coordinator| coordinator)
        }

        fn build(configure: impl FnOnce(Coordinator) -> Coordinator) -> Self {
            let pool = LocalPool::new();
            let transport = ScriptedTransport::new();
            let clock = Rc::new(ManualClock::new());
            let coordinator = configure(
                Coordinator::new(
                    CacheStore::new(),
                    transport.clone(),
                    Rc::new(pool.spawner()),
                )
                .with_clock(clock.clone()),
            );
            Self {
                pool,
                transport,
                clock,
                coordinator,
            }
        }

        fn run(&mut self) {
            self.pool.run_until_stalled();
        }

        fn entry(&self, request: &Request) -> CacheEntry {
            self.coordinator.store().get(&request.key())
        }
    }

    fn action() -> Request {
        Request::new("actions.info", Args::new().with("action_id", 42))
    }

    #[test]
    fn concurrent_fetches_share_one_call() {
        let mut harness = Harness::new();
        let request = action();

        let first = harness.coordinator.ensure_fetched(&request, FetchMode::Cached);
        let FetchOutcome::Started(id) = first else {
            panic!("expected a new request, got {first:?}");
        };
        for _ in 0..5 {
            assert_eq!(
                harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
                FetchOutcome::Coalesced(id)
            );
        }
        assert_eq!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Force),
            FetchOutcome::Coalesced(id)
        );

        harness.run();
        assert_eq!(harness.transport.call_count(), 1);
        assert_eq!(harness.transport.operation(0), "actions.info");
        assert_eq!(harness.transport.args(0), *request.args());
    }

    #[test]
    fn ready_entry_is_not_refetched() {
        let mut harness = Harness::new();
        let request = action();
        harness.coordinator.ensure_fetched(&request, FetchMode::Cached);
        harness.run();
        harness.transport.reply(0, Ok(json!({"title": "Bike to work"})));
        harness.run();

        assert_eq!(harness.entry(&request).status(), Status::Ready);
        assert_eq!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
            FetchOutcome::Fresh
        );
        harness.run();
        assert_eq!(harness.transport.call_count(), 1);
    }

    #[test]
    fn forced_fetch_refreshes_ready_entry() {
        let mut harness = Harness::new();
        let request = action();
        harness.coordinator.ensure_fetched(&request, FetchMode::Cached);
        harness.run();
        harness.transport.reply(0, Ok(json!(1)));
        harness.run();

        assert!(matches!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Force),
            FetchOutcome::Started(_)
        ));
        assert_eq!(harness.entry(&request).status(), Status::Pending);
        harness.run();
        harness.transport.reply(1, Ok(json!(2)));
        harness.run();
        assert_eq!(harness.entry(&request).value().map(|v| (**v).clone()), Some(json!(2)));
    }

    #[test]
    fn failure_is_recorded_and_retry_issues_new_call() {
        let mut harness = Harness::new();
        let request = Request::new("users.info", Args::new());
        harness.coordinator.ensure_fetched(&request, FetchMode::Cached);
        harness.run();
        harness
            .transport
            .reply(0, Err(FetchError::TransportFailure("network unreachable".into())));
        harness.run();

        let entry = harness.entry(&request);
        assert_eq!(entry.status(), Status::Failed);
        assert_eq!(entry.error().map(ToString::to_string).as_deref(), Some("network unreachable"));

        assert!(matches!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
            FetchOutcome::Started(_)
        ));
        harness.run();
        assert_eq!(harness.transport.call_count(), 2);
    }

    #[test]
    fn late_response_of_superseded_request_is_discarded() {
        let mut harness = Harness::new();
        let request = action();

        let FetchOutcome::Started(first) =
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached)
        else {
            panic!("expected a new request");
        };
        harness.run();
        harness.coordinator.invalidate(&request.key());
        let FetchOutcome::Started(second) =
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached)
        else {
            panic!("expected a new request");
        };
        assert!(second > first);
        harness.run();
        assert_eq!(harness.transport.call_count(), 2);

        harness.transport.reply(1, Ok(json!("from B")));
        harness.run();
        harness.transport.reply(0, Ok(json!("from A")));
        harness.run();

        assert_eq!(
            harness.entry(&request).value().map(|v| (**v).clone()),
            Some(json!("from B"))
        );
    }

    #[test]
    fn abandoned_request_is_superseded_after_timeout() {
        let mut harness =
            Harness::build(|c| c.with_pending_timeout(Some(Duration::from_secs(30))));
        let request = action();

        harness.coordinator.ensure_fetched(&request, FetchMode::Cached);
        harness.run();
        harness.clock.advance(Duration::from_secs(29));
        assert!(matches!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
            FetchOutcome::Coalesced(_)
        ));
        harness.clock.advance(Duration::from_secs(1));
        assert!(matches!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
            FetchOutcome::Started(_)
        ));
        harness.run();

        harness.transport.reply(1, Ok(json!("B")));
        harness.run();
        harness.transport.reply(0, Err(FetchError::TransportFailure("too late".into())));
        harness.run();
        assert_eq!(harness.entry(&request).value().map(|v| (**v).clone()), Some(json!("B")));
    }

    #[test]
    fn stale_ready_entry_is_refetched() {
        let mut harness =
            Harness::build(|c| c.with_staleness(Rc::new(MaxAge(Duration::from_secs(60)))));
        let request = action();
        harness.coordinator.ensure_fetched(&request, FetchMode::Cached);
        harness.run();
        harness.transport.reply(0, Ok(json!(1)));
        harness.run();

        harness.clock.advance(Duration::from_secs(10));
        assert_eq!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
            FetchOutcome::Fresh
        );
        harness.clock.advance(Duration::from_secs(50));
        assert!(matches!(
            harness.coordinator.ensure_fetched(&request, FetchMode::Cached),
            FetchOutcome::Started(_)
        ));
    }

    #[test]
    fn different_args_are_different_keys() {
        let mut harness = Harness::new();
        harness.coordinator.ensure_fetched(
            &Request::new("teams.info", Args::new().with("id", 1)),
            FetchMode::Cached,
        );
        harness.coordinator.ensure_fetched(
            &Request::new("teams.info", Args::new().with("id", 2)),
            FetchMode::Cached,
        );
        harness.run();
        assert_eq!(harness.transport.call_count(), 2);
    }

    #[test]
    fn spawn_failure_rejects_the_request() {
        struct Closed;

        impl Spawner for Closed {
            fn spawn(&self, _future: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
                Err(SpawnError::shutdown())
            }
        }

        let coordinator =
            Coordinator::new(CacheStore::new(), ScriptedTransport::new(), Rc::new(Closed));
        let request = action();
        coordinator.ensure_fetched(&request, FetchMode::Cached);
        assert!(matches!(
            coordinator.store().get(&request.key()).error(),
            Some(FetchError::TransportFailure(_))
        ));
    }

    #[test]
    fn mutation_invalidates_on_success_only() {
        let mut harness = Harness::new();
        let members = Request::new("teams.members", Args::new().with("team_id", 5));
        harness.coordinator.ensure_fetched(&members, FetchMode::Cached);
        harness.run();
        harness.transport.reply(0, Ok(json!([])));
        harness.run();

        let join = Request::new("teams.join", Args::new().with("team_id", 5));
        let invalidations = [Invalidation::request(&members)];

        let Harness {
            pool,
            transport,
            coordinator,
            ..
        } = &mut harness;

        let failed = pool.run_until(async {
            let mutation = coordinator.mutate(&join, &invalidations);
            futures::pin_mut!(mutation);
            assert!(futures::poll!(mutation.as_mut()).is_pending());
            transport.reply(1, Err(FetchError::RemoteRejection("team is full".into())));
            mutation.await
        });
        assert_eq!(failed, Err(FetchError::RemoteRejection("team is full".into())));
        assert_eq!(coordinator.store().get(&members.key()).status(), Status::Ready);

        let joined = pool.run_until(async {
            let mutation = coordinator.mutate(&join, &invalidations);
            futures::pin_mut!(mutation);
            assert!(futures::poll!(mutation.as_mut()).is_pending());
            transport.reply(2, Ok(json!({"joined": true})));
            mutation.await
        });
        assert_eq!(joined, Ok(json!({"joined": true})));
        assert_eq!(coordinator.store().get(&members.key()), CacheEntry::Absent);
        assert_eq!(transport.operation(2), "teams.join");
    }

    #[test]
    fn apply_reports_reset_keys() {
        let mut harness = Harness::new();
        for id in [1, 2] {
            harness.coordinator.ensure_fetched(
                &Request::new("teams.info", Args::new().with("id", id)),
                FetchMode::Cached,
            );
        }
        harness.run();
        let keys = harness.coordinator.apply(&Invalidation::operation("teams.info"));
        assert_eq!(keys.len(), 2);
        assert!(keys
            .iter()
            .all(|key| harness.coordinator.store().get(key) == CacheEntry::Absent));
    }

    #[test]
    fn apply_skips_unknown_keys() {
        let mut harness = Harness::new();
        let known = action();
        harness.coordinator.ensure_fetched(&known, FetchMode::Cached);
        harness.run();
        let unknown = Request::new("teams.info", Args::new().with("id", 3));

        let keys = harness
            .coordinator
            .apply(&[Invalidation::request(&known), Invalidation::request(&unknown)]);
        assert_eq!(keys, vec![known.key()]);
        assert!(!harness.coordinator.store().keys().contains(&unknown.key()));
    }
}
