//! Pluggable policies: when to refetch, when an entry is stale, and what time it is.
use crate::{CacheEntry, CacheKey};
use serde::Deserialize;
use std::{cell::Cell, rc::Rc, time::Duration};
use web_time::{Instant, SystemTime};

/// What subscribing does to the network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Subscribing only fetches when there is no usable entry.
    #[default]
    CacheFirst,
    /// Every subscription forces a new fetch, even when a fresh entry exists.
    AlwaysRefetch,
}

/// How a single fetch treats an existing entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Reuse a ready entry unless it is stale.
    #[default]
    Cached,
    /// Refetch even if the entry is ready. In-flight requests are still shared.
    Force,
}

impl From<FetchPolicy> for FetchMode {
    fn from(policy: FetchPolicy) -> Self {
        match policy {
            FetchPolicy::CacheFirst => Self::Cached,
            FetchPolicy::AlwaysRefetch => Self::Force,
        }
    }
}

/// Decides whether a ready entry should be refetched.
pub trait Staleness {
    fn is_stale(&self, key: &CacheKey, entry: &CacheEntry, now: SystemTime) -> bool;
}

impl<F: Fn(&CacheKey, &CacheEntry, SystemTime) -> bool> Staleness for F {
    fn is_stale(&self, key: &CacheKey, entry: &CacheEntry, now: SystemTime) -> bool {
        self(key, entry, now)
    }
}

/// Entries stay fresh until invalidated.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverStale;

impl Staleness for NeverStale {
    fn is_stale(&self, _key: &CacheKey, _entry: &CacheEntry, _now: SystemTime) -> bool {
        false
    }
}

/// Entries go stale once they are older than the given age.
#[derive(Clone, Copy, Debug)]
pub struct MaxAge(pub Duration);

impl Staleness for MaxAge {
    fn is_stale(&self, _key: &CacheKey, entry: &CacheEntry, now: SystemTime) -> bool {
        entry
            .last_updated()
            .and_then(|updated| now.duration_since(updated).ok())
            .map_or(false, |age| age >= self.0)
    }
}

/// Source of time.
pub trait Clock {
    /// Wall-clock time, recorded as an entry's last update.
    fn now(&self) -> SystemTime;

    /// Monotonic time, used to age pending requests.
    fn instant(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }

    fn instant(&self) -> Instant {
        (**self).instant()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    system: SystemTime,
    instant: Instant,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            system: SystemTime::UNIX_EPOCH,
            instant: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.system + self.elapsed.get()
    }

    fn instant(&self) -> Instant {
        self.instant + self.elapsed.get()
    }
}
