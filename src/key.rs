use crate::Args;
use std::{fmt, rc::Rc};

/// Identifies one cached remote read.
///
/// A key is the operation name together with the canonical encoding of its arguments, so two
/// requests for the same operation with the same arguments (in any order) share a cache entry.
/// Keys are immutable and cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    operation: Rc<str>,
    args: Rc<str>,
}

impl CacheKey {
    pub fn new(operation: &str, args: &Args) -> Self {
        Self {
            operation: operation.into(),
            args: args.canonical().into(),
        }
    }

    /// Operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Canonical argument encoding.
    pub fn canonical_args(&self) -> &str {
        &self.args
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.args)
    }
}
