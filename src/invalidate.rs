//! Invalidations produced by mutations.
use crate::{CacheKey, Request};

/// Which cached entries a mutation makes obsolete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invalidation {
    /// A single entry.
    Key(CacheKey),
    /// Every entry of an operation, whatever its arguments.
    Operation(String),
    /// Everything.
    All,
}

impl Invalidation {
    pub fn request(request: &Request) -> Self {
        Self::Key(request.key())
    }

    pub fn operation(operation: impl Into<String>) -> Self {
        Self::Operation(operation.into())
    }

    /// Whether this invalidation covers the key.
    pub fn applies_to(&self, key: &CacheKey) -> bool {
        match self {
            Self::Key(other) => other == key,
            Self::Operation(operation) => key.operation() == operation,
            Self::All => true,
        }
    }
}

impl From<&Request> for Invalidation {
    fn from(request: &Request) -> Self {
        Self::request(request)
    }
}

impl From<CacheKey> for Invalidation {
    fn from(key: CacheKey) -> Self {
        Self::Key(key)
    }
}

/// Something which produces invalidations, such as a mutation request type.
pub trait Invalidator {
    fn invalidations(&self) -> Vec<Invalidation>;
}

impl Invalidator for Invalidation {
    fn invalidations(&self) -> Vec<Invalidation> {
        vec![self.clone()]
    }
}

impl Invalidator for [Invalidation] {
    fn invalidations(&self) -> Vec<Invalidation> {
        self.to_vec()
    }
}

impl<const N: usize> Invalidator for [Invalidation; N] {
    fn invalidations(&self) -> Vec<Invalidation> {
        self.to_vec()
    }
}

impl Invalidator for Vec<Invalidation> {
    fn invalidations(&self) -> Vec<Invalidation> {
        self.clone()
    }
}
