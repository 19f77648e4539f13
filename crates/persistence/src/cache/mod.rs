//! Key-value caching.
//!
//! [`TypedCache`] is a typed facade over any [`CacheBackend`]. The cache has
//! no knowledge of the record stores: writes through a store never
//! invalidate cached values.

mod backend;
mod memory;
mod typed;

pub use backend::CacheBackend;
pub use memory::MemoryCache;
pub use typed::TypedCache;
