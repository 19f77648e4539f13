//! Store decorators that work over any backend.
//!
//! Backend-specific decorators (the label index and version history) live
//! with their backend in [`crate::backends`].

pub mod soft_delete;

pub use soft_delete::{SoftDeleteStore, DEFAULT_FLAG};
