//! Limit/offset paging over an existing resource.

use crate::components::QueryItem;
use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub fn first(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }

    /// The page after this one, fetching `limit` items.
    pub fn next(&self, limit: u32) -> Self {
        Self {
            limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }

    fn query(&self) -> [QueryItem; 2] {
        [
            QueryItem::new("limit", self.limit.to_string()),
            QueryItem::new("offset", self.offset.to_string()),
        ]
    }
}

/// Decoded contents together with the window that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<A> {
    pub contents: A,
    pub pagination: Pagination,
}

impl<A> Page<A> {
    pub fn next(&self, limit: u32) -> Pagination {
        self.pagination.next(limit)
    }
}

impl<A: 'static> Resource<A> {
    /// The same resource restricted to one page. `limit` and `offset` are
    /// appended after any query items already present.
    pub fn paginated(&self, pagination: Pagination) -> Resource<Page<A>> {
        let mut query = self.query().to_vec();
        query.extend(pagination.query());
        self.map(move |contents| Page {
            contents,
            pagination,
        })
        .with_query(query)
    }
}
