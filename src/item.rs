use crate::{Args, CacheKey};

/// Remote read that can be cached.
///
/// A request names a remote operation (such as `actions.info`) and the arguments it is called
/// with. The response is cached under the request's [`CacheKey`], so that future reads of the
/// same request can reuse the previously fetched data.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    operation: String,
    args: Args,
}

impl Request {
    pub fn new(operation: impl Into<String>, args: Args) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Key under which the response to this request is cached.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.operation, &self.args)
    }
}
