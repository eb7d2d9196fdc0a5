//! Cache entries.
//!
//! This module contains [`CacheEntry`], the snapshot of what the cache knows about one key, and
//! the identifiers used to fence in-flight requests.
use crate::{CacheKey, FetchError};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::{fmt, rc::Rc};
use web_time::{Instant, SystemTime};

/// Identifies one request issued by the coordinator.
///
/// Identifiers increase monotonically, so a response carrying an identifier other than the one
/// recorded in the pending entry belongs to a superseded request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse state of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Absent,
    Pending,
    Ready,
    Failed,
}

/// What the cache knows about a key.
///
/// Entries are replaced as a whole, never edited in place. Cloning is cheap: the value is
/// reference-counted.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CacheEntry {
    /// Nothing fetched yet, or invalidated.
    #[default]
    Absent,
    /// A request is in flight.
    Pending {
        request_id: RequestId,
        /// When the request was issued.
        since: Instant,
    },
    /// Latest successful response.
    Ready {
        value: Rc<JsonValue>,
        last_updated: SystemTime,
    },
    /// Latest request failed.
    Failed {
        error: FetchError,
        last_updated: SystemTime,
    },
}

impl CacheEntry {
    pub fn status(&self) -> Status {
        match self {
            Self::Absent => Status::Absent,
            Self::Pending { .. } => Status::Pending,
            Self::Ready { .. } => Status::Ready,
            Self::Failed { .. } => Status::Failed,
        }
    }

    /// Fetched value, if ready.
    pub fn value(&self) -> Option<&Rc<JsonValue>> {
        match self {
            Self::Ready { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Error of the latest fetch, if failed.
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Time of the last resolution, successful or not.
    pub fn last_updated(&self) -> Option<SystemTime> {
        match self {
            Self::Ready { last_updated, .. } | Self::Failed { last_updated, .. } => {
                Some(*last_updated)
            }
            _ => None,
        }
    }

    pub fn in_flight_request_id(&self) -> Option<RequestId> {
        match self {
            Self::Pending { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    /// Whether a consumer should show a loading indicator.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Decode the ready value into a concrete type.
    ///
    /// Returns `None` unless the entry is ready, and an error if the value does not have the
    /// expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, FetchError>> {
        self.value()
            .map(|value| T::deserialize(&**value).map_err(FetchError::from))
    }
}

/// An entry together with the key it was read for.
///
/// Consumers that switch between keys hold one of these, so that an entry kept from the previous
/// key is never shown for the new one.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyedEntry {
    pub key: CacheKey,
    pub entry: CacheEntry,
}

impl KeyedEntry {
    pub fn new(key: CacheKey, entry: CacheEntry) -> Self {
        Self { key, entry }
    }

    /// The entry, if it was read for `key`.
    pub fn entry_for(&self, key: &CacheKey) -> Option<&CacheEntry> {
        (self.key == *key).then_some(&self.entry)
    }
}
