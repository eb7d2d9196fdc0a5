//! # Fetch Cache
//!
//! This crate provides a keyed request cache for single-threaded (browser WebAssembly)
//! applications. Remote reads are identified by an operation name and its arguments. The cache
//! keeps the latest response per read, shares one in-flight request between everyone asking for
//! the same read, and tells subscribers whenever an entry changes.
//!
//! The network is reached through a [`Transport`], and background work runs on a [`Spawner`], so
//! the cache can be driven by a local executor in tests and by the browser in production.
//!
//! It is intended to be used with the Yew framework (feature `yew`), with an HTTP transport for
//! form-encoded `POST` APIs (feature `http`).
mod args;
mod client;
mod config;
mod coordinator;
mod error;
mod invalidate;
mod item;
mod key;
mod policy;
mod store;
mod subscription;
mod transport;
mod value;
#[cfg(feature = "yew")]
pub mod yew;

#[cfg(test)]
mod testing;

pub use crate::{
    args::*, client::*, config::*, coordinator::*, error::*, invalidate::*, item::*, key::*,
    policy::*, store::*, subscription::*, transport::*, value::*,
};
