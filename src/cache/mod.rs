//! On-disk cache of remote fetch bodies.
//!
//! Provides a [`CacheStore`] that owns the cache directory: one
//! content-addressed `.cache` file per fetched URL, a per-entry TTL based on
//! file mtime, and an epoch sentinel whose expiry purges the whole
//! directory at once.

pub mod store;

pub use store::CacheStore;
