/// Position inside a listing split into fixed-size, 1-based pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_count: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Out-of-range pages are clamped to the nearest existing one. An empty
    /// listing still has a single (empty) page.
    pub fn new(total: u64, requested_page: u32, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        let page_count = u32::try_from(total.div_ceil(u64::from(page_size)))
            .unwrap_or(u32::MAX)
            .max(1);

        Self {
            page: requested_page.clamp(1, page_count),
            page_count,
            page_size,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_page() {
        let p = Pagination::new(3, 1, 6);
        assert_eq!(p.page_count, 1);
        assert!(!p.has_previous());
        assert!(!p.has_next());
    }

    #[test]
    fn test_clamps_out_of_range_requests() {
        assert_eq!(Pagination::new(13, 0, 6).page, 1);
        assert_eq!(Pagination::new(13, 99, 6).page, 3);
    }

    #[test]
    fn test_empty_listing_has_one_page() {
        let p = Pagination::new(0, 4, 6);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_count, 1);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_offset() {
        assert_eq!(Pagination::new(20, 3, 6).offset(), 12);
    }

    proptest! {
        #[test]
        fn boundaries_match_first_and_last_page(total in 1u64..500, size in 1u32..50) {
            let count = Pagination::new(total, 1, size).page_count;
            for page in 1..=count {
                let p = Pagination::new(total, page, size);
                prop_assert_eq!(p.has_next(), page != count);
                prop_assert_eq!(p.has_previous(), page != 1);
            }
        }

        #[test]
        fn page_always_within_bounds(total in 0u64..500, size in 0u32..50, page in 0u32..100) {
            let p = Pagination::new(total, page, size);
            prop_assert!(p.page >= 1 && p.page <= p.page_count);
            prop_assert!(total == 0 || p.offset() < total);
        }
    }
}
