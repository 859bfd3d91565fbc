//! Offset pagination shared by directory and ledger listings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Build a request, normalising out-of-range values.
    ///
    /// `page < 1` becomes 1. A size of 0 or above [`MAX_PAGE_SIZE`] falls back to
    /// [`DEFAULT_PAGE_SIZE`] rather than being clamped.
    pub fn new(page: u32, page_size: u32) -> Self {
        let page = if page < 1 { DEFAULT_PAGE } else { page };
        let page_size = if page_size < 1 || page_size > MAX_PAGE_SIZE {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        }
    }

    pub fn has_more(&self) -> bool {
        self.total > u64::from(self.page) * u64::from(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_values_fall_back_to_defaults() {
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 20));
        assert_eq!(PageRequest::new(3, 101).page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 100).page_size, 100);
    }

    #[test]
    fn offset_is_zero_based() {
        let req = PageRequest::new(3, 25);
        assert_eq!(req.offset(), 50);
        assert_eq!(req.limit(), 25);
    }

    #[test]
    fn has_more_compares_against_consumed_rows() {
        let page: Page<u8> = Page::new(vec![1, 2], 5, PageRequest::new(2, 2));
        assert!(page.has_more());
        let last: Page<u8> = Page::new(vec![5], 5, PageRequest::new(3, 2));
        assert!(!last.has_more());
    }
}
