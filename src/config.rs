//! Cache and API configuration.
use crate::FetchPolicy;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_LOCAL_URL: &str = "http://localhost:8000/api";
const DEFAULT_REMOTE_URL: &str = "https://api.example.org";

/// Cache behaviour.
///
/// Durations are given in milliseconds when deserialized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// What subscribing does to the network.
    pub fetch_policy: FetchPolicy,
    /// Ready entries older than this are refetched. `None` keeps them until invalidated.
    #[serde(rename = "max_age_ms", with = "millis")]
    pub max_age: Option<Duration>,
    /// Pending requests older than this are superseded by the next fetch. `None` waits forever.
    #[serde(rename = "pending_timeout_ms", with = "millis")]
    pub pending_timeout: Option<Duration>,
}

impl CacheConfig {
    pub fn with_fetch_policy(mut self, fetch_policy: FetchPolicy) -> Self {
        self.fetch_policy = fetch_policy;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_pending_timeout(mut self, pending_timeout: Duration) -> Self {
        self.pending_timeout = Some(pending_timeout);
        self
    }
}

/// Where remote operations are sent.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Use the local development server instead of the remote one.
    pub local: bool,
    pub local_url: String,
    pub remote_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            local: false,
            local_url: DEFAULT_LOCAL_URL.into(),
            remote_url: DEFAULT_REMOTE_URL.into(),
        }
    }
}

impl ApiConfig {
    /// Configuration baked in at build time.
    ///
    /// Reads `FETCH_CACHE_API_LOCAL` (`1` or `true` selects the local server),
    /// `FETCH_CACHE_LOCAL_URL` and `FETCH_CACHE_REMOTE_URL` from the compile-time environment.
    pub fn from_build_env() -> Self {
        Self::from_values(
            option_env!("FETCH_CACHE_API_LOCAL"),
            option_env!("FETCH_CACHE_LOCAL_URL"),
            option_env!("FETCH_CACHE_REMOTE_URL"),
        )
    }

    fn from_values(local: Option<&str>, local_url: Option<&str>, remote_url: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            local: local.map_or(false, |flag| {
                matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
            }),
            local_url: local_url.map_or(defaults.local_url, Into::into),
            remote_url: remote_url.map_or(defaults.remote_url, Into::into),
        }
    }

    /// Base URL selected by the `local` flag.
    pub fn base_url(&self) -> &str {
        if self.local {
            &self.local_url
        } else {
            &self.remote_url
        }
    }

    /// Full URL for an operation.
    pub fn endpoint_url(&self, operation: &str) -> String {
        format!(
            "{}/{}",
            self.base_url().trim_end_matches('/'),
            crate::normalize_endpoint(operation)
        )
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
