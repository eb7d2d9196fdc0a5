//! Fetch failures.
use thiserror::Error;

/// Reason a remote read did not produce a value.
///
/// All variants end up in a [`CacheEntry::Failed`](crate::CacheEntry::Failed) entry. The cache
/// itself treats them identically (there is no retry policy), but the kind is kept so that a
/// consumer can decide how to present it.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response, for example because the network is unreachable.
    #[error("{0}")]
    TransportFailure(String),

    /// The remote endpoint answered with `success: false`.
    #[error("{0}")]
    RemoteRejection(String),

    /// The response could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Human-readable message carried by this error.
    pub fn message(&self) -> &str {
        match self {
            Self::TransportFailure(message)
            | Self::RemoteRejection(message)
            | Self::MalformedResponse(message) => message,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedResponse(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_message() {
        let error = FetchError::TransportFailure("network unreachable".into());
        assert_eq!(error.to_string(), "network unreachable");
        assert_eq!(error.message(), "network unreachable");
    }

    #[test]
    fn json_errors_are_malformed() {
        let error: FetchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(error, FetchError::MalformedResponse(_)));
    }
}
