//! Page results and offset arithmetic.
//!
//! Record pages are one-indexed (`page = 1` is the first page). History pages
//! are zero-indexed. Both conventions are kept because callers of each store
//! already depend on them.

use serde::{Deserialize, Serialize};

/// A page of items together with the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total number of rows matching the query, across all pages.
    pub total: u64,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    /// An empty page with a zero total.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if this page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Offset of a one-indexed page. Page 0 is treated as page 1.
pub fn one_indexed_offset(page: u32, size: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(size)
}

/// Offset of a zero-indexed page.
pub fn zero_indexed_offset(page: u32, size: u32) -> u64 {
    u64::from(page) * u64::from(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_indexed_offset() {
        assert_eq!(one_indexed_offset(1, 20), 0);
        assert_eq!(one_indexed_offset(3, 20), 40);
        assert_eq!(one_indexed_offset(0, 20), 0);
    }

    #[test]
    fn test_zero_indexed_offset() {
        assert_eq!(zero_indexed_offset(0, 10), 0);
        assert_eq!(zero_indexed_offset(2, 10), 20);
    }

    #[test]
    fn test_page_helpers() {
        let page = Page::new(vec![1, 2], 5);
        assert_eq!(page.len(), 2);
        assert!(!page.is_empty());
        assert!(Page::<u8>::empty().is_empty());
    }
}
