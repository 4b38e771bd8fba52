//! Pagination of display rows.
//!
//! Slices an ordered snapshot of rows into pages with stable navigation
//! state: the same page number always yields the same slice for the same
//! input, and out-of-range page numbers clamp to the last valid page
//! instead of returning an empty one.

use serde::Serialize;

/// Default rows per page when the request does not override it.
pub const DEFAULT_PER_PAGE: usize = 25;

/// One page of display rows plus the navigation state needed to render
/// a pager.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number after clamping.
    pub page: usize,
    pub per_page: usize,
    /// Row count of the full snapshot, not of this page.
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Slice `rows` into the requested page.
///
/// `requested_page` clamps into `[1, total_pages]` (page 1 when the
/// snapshot is empty). A `per_page` of 0 is treated as 1.
pub fn paginate<T>(rows: Vec<T>, per_page: usize, requested_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total = rows.len();
    let last_page = total.div_ceil(per_page).max(1);
    let page = requested_page.clamp(1, last_page);

    let items = rows
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    Page {
        items,
        page,
        per_page,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_page() {
        let page = paginate((0..23).collect(), 10, 1);
        assert_eq!(page.items, (0..10).collect::<Vec<_>>());
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 23);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.has_prev());
        assert!(page.has_next());
    }

    #[test]
    fn test_out_of_range_clamps_to_last_page() {
        let page = paginate((1..=23).collect(), 10, 999);
        assert_eq!(page.items, vec![21, 22, 23]);
        assert_eq!(page.page, 3);
        assert_eq!(page.total, 23);
        assert!(!page.has_next());
    }

    #[test]
    fn test_page_zero_clamps_to_first() {
        let page = paginate((0..5).collect(), 2, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.items, vec![0, 1]);
    }

    #[test]
    fn test_empty_snapshot() {
        let page = paginate(Vec::<u8>::new(), 10, 7);
        assert!(page.items.is_empty());
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages(), 1);
    }

    #[test]
    fn test_exact_multiple_has_no_partial_page() {
        let page = paginate((0..20).collect(), 10, 2);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total_pages(), 2);
    }

    #[test]
    fn test_stable_slices() {
        let rows: Vec<u32> = (0..100).collect();
        let a = paginate(rows.clone(), 7, 4);
        let b = paginate(rows, 7, 4);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_total(
            total in 0usize..500,
            per_page in 0usize..50,
            requested in 0usize..1000,
        ) {
            let page = paginate((0..total).collect(), per_page, requested);
            let per_page = per_page.max(1);

            prop_assert!(page.page >= 1);
            prop_assert!(page.page <= total.div_ceil(per_page).max(1));
            prop_assert!(page.items.len() <= per_page);
            prop_assert!((page.page - 1) * per_page <= total.max(1) - 1 || total == 0);

            // Every page except a clamped last one is full.
            if page.page < page.total_pages() {
                prop_assert_eq!(page.items.len(), per_page);
            }
        }
    }
}
