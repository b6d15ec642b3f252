use serde::Serialize;

use crate::Config;

/// The largest offset a listing accepts, so it always fits a database offset
pub const MAX_SKIP: usize = i32::MAX as usize;

/// An offset based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub skip: usize,
}

/// A page of items, newest first, along with the total amount of items.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
    pub has_more: bool,
}

impl PageRequest {
    /// Creates a page request from user input.
    /// A missing or zero limit falls back to the default page size. Both limit and skip are capped.
    pub fn new(limit: Option<usize>, skip: Option<usize>, config: &Config) -> Self {
        let limit = match limit {
            Some(0) | None => config.default_page_size,
            Some(limit) => limit.min(config.max_page_size),
        };

        Self {
            limit,
            skip: skip.unwrap_or(0).min(MAX_SKIP),
        }
    }

    /// Applies the request to an already sorted list of items
    pub fn slice<T: Clone>(&self, items: &[T]) -> Page<T> {
        let page = items
            .iter()
            .skip(self.skip)
            .take(self.limit)
            .cloned()
            .collect();

        Page {
            items: page,
            total: items.len(),
            limit: self.limit,
            skip: self.skip,
        }
    }
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.skip.saturating_add(self.items.len()) < self.total
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            has_more: self.has_more(),
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            skip: self.skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_falls_back_and_is_capped() {
        let config = Config::default();

        assert_eq!(PageRequest::new(None, None, &config).limit, 50);
        assert_eq!(PageRequest::new(Some(0), None, &config).limit, 50);
        assert_eq!(PageRequest::new(Some(500), None, &config).limit, 100);
        assert_eq!(PageRequest::new(Some(5), Some(3), &config).skip, 3);
    }

    #[test]
    fn skip_is_capped() {
        let config = Config::default();
        let request = PageRequest::new(None, Some(usize::MAX), &config);

        assert_eq!(request.skip, MAX_SKIP);
        assert!(i64::try_from(request.skip).is_ok());

        let page = request.slice(&[1, 2, 3]);
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[test]
    fn has_more_counts_returned_items() {
        let items: Vec<_> = (0..7).collect();
        let request = PageRequest { limit: 3, skip: 3 };

        let page = request.slice(&items);
        assert_eq!(page.items, vec![3, 4, 5]);
        assert!(page.has_more());

        let last = PageRequest { limit: 3, skip: 6 }.slice(&items);
        assert_eq!(last.items, vec![6]);
        assert!(!last.has_more());

        let beyond = PageRequest { limit: 3, skip: 10 }.slice(&items);
        assert!(beyond.items.is_empty());
        assert!(!beyond.pagination().has_more);
    }
}
