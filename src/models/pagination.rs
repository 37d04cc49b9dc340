//! Page-based listing parameters and results

use serde::{Deserialize, Serialize};

/// Largest page a client may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// One page of items plus the total across all pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = self.per_page as i64;
        ((self.total + per_page - 1) / per_page) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// A previous page exists for any page past the first, including pages past the end
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// The page a "previous" link should point at
    pub fn prev_page(&self) -> Option<u32> {
        if !self.has_prev() {
            return None;
        }
        Some((self.page - 1).min(self.total_pages().max(1)))
    }

    pub fn next_page(&self) -> Option<u32> {
        self.has_next().then(|| self.page + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

impl<T> Default for PagedResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            per_page: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_list_params_clamp() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, MAX_PAGE_SIZE);
        assert_eq!(ListParams::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_paged_result_links() {
        let params = ListParams::new(2, 10);
        let result = PagedResult::new(vec![1, 2, 3], 25, &params);
        assert_eq!(result.total_pages(), 3);
        assert_eq!(result.next_page(), Some(3));
        assert_eq!(result.prev_page(), Some(1));

        let last = PagedResult::new(Vec::<i32>::new(), 25, &ListParams::new(3, 10));
        assert_eq!(last.next_page(), None);
    }

    #[test]
    fn test_past_the_end_points_back_to_last_page() {
        let result = PagedResult::new(Vec::<i32>::new(), 25, &ListParams::new(9, 10));
        assert_eq!(result.prev_page(), Some(3));
        assert_eq!(result.next_page(), None);
    }

    #[test]
    fn test_empty_result() {
        let result = PagedResult::new(Vec::<i32>::new(), 0, &ListParams::default());
        assert_eq!(result.total_pages(), 0);
        assert_eq!(result.next_page(), None);
        assert_eq!(result.prev_page(), None);
    }

    proptest! {
        #[test]
        fn pages_cover_total(total in 0i64..10_000, per_page in 1u32..=100) {
            let result = PagedResult::new(Vec::<i32>::new(), total, &ListParams::new(1, per_page));
            let pages = result.total_pages() as i64;
            prop_assert!(pages * per_page as i64 >= total);
            prop_assert!((pages - 1).max(0) * (per_page as i64) < total.max(1));
        }

        #[test]
        fn next_implies_more_items(total in 0i64..1_000, page in 1u32..50, per_page in 1u32..=100) {
            let params = ListParams::new(page, per_page);
            let result = PagedResult::new(Vec::<i32>::new(), total, &params);
            if result.next_page().is_some() {
                prop_assert!(params.offset() + params.limit() < total);
            }
        }
    }
}
