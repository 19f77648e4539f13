//! Core types for the persistence layer.
//!
//! This module provides the value types used throughout the persistence layer:
//!
//! - [`Filter`], [`FilterValue`], [`Predicate`] - Column constraints and raw
//!   SQL conditions for reads and bulk writes
//! - [`SortRule`] - Ordering terms
//! - [`Page`] - A page of results with its total count
//!
//! # Examples
//!
//! ```
//! use tessera_persistence::types::{Filter, FilterValue, SortRule};
//!
//! let filter = Filter::new()
//!     .eq("team", "core")
//!     .any("id", [1, 2, 3]);
//! assert!(matches!(filter.get("id"), Some(FilterValue::In(ids)) if ids.len() == 3));
//!
//! let order = SortRule::parse_all(["name asc", "id desc"]).unwrap();
//! assert_eq!(order.len(), 2);
//! ```

pub mod filter;
pub mod pagination;

pub use filter::{validate_column, Filter, FilterValue, Predicate, SortDirection, SortRule};
pub use pagination::{one_indexed_offset, zero_indexed_offset, Page};
