//! Remote operations.
//!
//! The cache never talks to the network itself. It calls a [`Transport`], which performs a
//! single named remote operation and hands back the data or a [`FetchError`]. No caching or
//! retrying happens at this layer.
use crate::{Args, FetchError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::rc::Rc;

const DEFAULT_REJECTION: &str = "request was rejected";

/// Performs remote operations.
#[async_trait(?Send)]
pub trait Transport {
    /// Call `operation` with `args`, returning the response data.
    async fn call(&self, operation: &str, args: &Args) -> Result<JsonValue, FetchError>;
}

#[async_trait(?Send)]
impl<T: Transport + ?Sized> Transport for Rc<T> {
    async fn call(&self, operation: &str, args: &Args) -> Result<JsonValue, FetchError> {
        (**self).call(operation, args).await
    }
}

/// Response body shared by all remote operations.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Envelope {
    /// Parse a response body.
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Unwrap the data, or turn an unsuccessful response into an error.
    pub fn into_result(self) -> Result<JsonValue, FetchError> {
        if self.success {
            Ok(self.data.unwrap_or(JsonValue::Null))
        } else {
            Err(FetchError::RemoteRejection(
                self.error
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| DEFAULT_REJECTION.into()),
            ))
        }
    }
}

/// Strip leading slashes from an endpoint path.
pub fn normalize_endpoint(operation: &str) -> &str {
    operation.trim_start_matches('/')
}

#[cfg(feature = "http")]
pub use self::http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{Envelope, Transport};
    use crate::{ApiConfig, Args, FetchError};
    use async_trait::async_trait;
    use gloo_net::http::Request;
    use serde_json::Value as JsonValue;
    use web_sys::{RequestCredentials, UrlSearchParams};

    /// Sends operations as form-encoded `POST` requests, with credentials.
    #[derive(Clone, Debug)]
    pub struct HttpTransport {
        config: ApiConfig,
    }

    impl HttpTransport {
        pub fn new(config: ApiConfig) -> Self {
            Self { config }
        }

        pub fn config(&self) -> &ApiConfig {
            &self.config
        }

        fn form(args: &Args) -> Result<UrlSearchParams, FetchError> {
            let form = UrlSearchParams::new().map_err(|error| {
                FetchError::TransportFailure(format!("cannot build form: {error:?}"))
            })?;
            for (name, value) in args {
                form.append(name, &value.to_form_value());
            }
            Ok(form)
        }
    }

    impl Default for HttpTransport {
        fn default() -> Self {
            Self::new(ApiConfig::from_build_env())
        }
    }

    fn failure(error: gloo_net::Error) -> FetchError {
        match error {
            gloo_net::Error::SerdeError(error) => FetchError::MalformedResponse(error.to_string()),
            other => FetchError::TransportFailure(other.to_string()),
        }
    }

    #[async_trait(?Send)]
    impl Transport for HttpTransport {
        async fn call(&self, operation: &str, args: &Args) -> Result<JsonValue, FetchError> {
            let url = self.config.endpoint_url(operation);
            #[cfg(feature = "log")]
            log::trace!("POST {url}");
            let response = Request::post(&url)
                .credentials(RequestCredentials::Include)
                .body(Self::form(args)?)
                .map_err(failure)?
                .send()
                .await
                .map_err(failure)?;
            let body = response.text().await.map_err(failure)?;
            Envelope::parse(&body)?.into_result()
        }
    }
}
