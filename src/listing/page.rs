/// One page of a filtered and sorted result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-indexed page that was requested
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_filtered: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1 && self.page <= self.total_pages + 1
    }
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}

/// Slices `[(page-1)*page_size, page*page_size)`. Pages outside
/// `1..=total_pages` yield no items; nothing is clamped.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let total_filtered = items.len();
    let total_pages = total_pages(total_filtered, page_size);

    let window = if page == 0 || page_size == 0 {
        &[][..]
    } else {
        let start = (page - 1).saturating_mul(page_size);
        if start >= total_filtered {
            &[][..]
        } else {
            let end = start.saturating_add(page_size).min(total_filtered);
            &items[start..end]
        }
    };

    Page {
        items: window.to_vec(),
        page,
        page_size,
        total_pages,
        total_filtered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_windows() {
        let items: Vec<u32> = (1..=23).collect();
        let first = paginate(&items, 1, 9);
        assert_eq!(first.items, (1..=9).collect::<Vec<_>>());
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_filtered, 23);
        assert!(first.has_next());
        assert!(!first.has_prev());

        let last = paginate(&items, 3, 9);
        assert_eq!(last.items, (19..=23).collect::<Vec<_>>());
        assert!(!last.has_next());
        assert!(last.has_prev());
    }

    #[test]
    fn test_out_of_range_is_empty() {
        let items: Vec<u32> = (1..=5).collect();
        assert!(paginate(&items, 0, 2).items.is_empty());
        let beyond = paginate(&items, 4, 2);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 3);
        assert!(paginate(&items, usize::MAX, 2).items.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let page = paginate::<u32>(&[], 1, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_filtered, 0);
    }

    #[test]
    fn test_pages_cover_input() {
        let items: Vec<u32> = (0..47).collect();
        for size in [1, 9, 10, 12, 20, 47, 50] {
            let total = total_pages(items.len(), size);
            let rebuilt: Vec<u32> = (1..=total)
                .flat_map(|p| paginate(&items, p, size).items)
                .collect();
            assert_eq!(rebuilt, items, "page size {}", size);
        }
    }
}
