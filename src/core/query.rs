//! Query descriptors and pagination utilities

use crate::core::error::ValidationError;
use crate::core::predicate::{self, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page size the console grids start with
pub const DEFAULT_PER_PAGE: u64 = 25;

/// Page sizes offered by the console grids
pub const PAGE_SIZE_OPTIONS: [u64; 6] = [25, 50, 100, 250, 500, 1000];

/// Requested page window
///
/// Invariant: `page >= 1` and `per_page > 0`. Use [`Pagination::new`] when the
/// numbers come from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Page number (starts at 1)
    pub page: u64,

    /// Number of rows per page
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Result<Self, ValidationError> {
        let last_row = (page.saturating_sub(1))
            .checked_mul(per_page)
            .and_then(|start| start.checked_add(per_page));
        if page == 0 || per_page == 0 || last_row.is_none() {
            return Err(ValidationError::InvalidPagination { page, per_page });
        }
        Ok(Self { page, per_page })
    }

    /// Zero-based index of the first row on this page
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn is_valid(&self) -> bool {
        self.page >= 1 && self.per_page > 0
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key; a list of these is ordered by priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// The normalized query descriptor handed to a remote source
///
/// # Format
///
/// ```json
/// {
///   "filters": [{"and": [{"field": "users.role", "op": "eq", "value": "U"}]}],
///   "sort": [{"field": "created_at", "direction": "desc"}],
///   "pagination": {"page": 1, "perPage": 25}
/// }
/// ```
///
/// `sort` is omitted when absent: the backend then applies its default
/// ordering. It is never sent as an empty array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Top-level predicate groups, combined with AND by the backend
    #[serde(default)]
    pub filters: Vec<Node>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortSpec>>,

    #[serde(default)]
    pub pagination: Pagination,
}

impl QueryOptions {
    pub fn new(filters: Vec<Node>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Set the sort keys; an empty list clears sorting
    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = if sort.is_empty() { None } else { Some(sort) };
        self
    }

    /// Whether any filter targets `field`
    pub fn filters_on(&self, field: &str) -> bool {
        predicate::contains_field(&self.filters, field)
    }

    /// No empty groups, no empty sort list, valid pagination
    pub fn is_well_formed(&self) -> bool {
        self.pagination.is_valid()
            && !predicate::has_empty_group(&self.filters)
            && self.sort.as_ref().is_none_or(|s| !s.is_empty())
    }
}

/// One page of rows returned by a remote source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemotePage {
    pub rows: Vec<Value>,

    /// Total number of rows matching the filters (all pages)
    pub total: u64,

    /// Server-computed summary row, when the endpoint provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Value>,
}

impl RemotePage {
    pub fn new(rows: Vec<Value>, total: u64) -> Self {
        Self {
            rows,
            total,
            aggregate: None,
        }
    }

    pub fn with_aggregate(mut self, aggregate: Value) -> Self {
        self.aggregate = Some(aggregate);
        self
    }
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: u64,

    /// Number of rows per page
    pub per_page: u64,

    /// Total number of rows (after filters)
    pub total: u64,

    /// Total number of pages
    pub total_pages: u64,

    /// Whether there is a next page
    pub has_next: bool,

    /// Whether there is a previous page
    pub has_prev: bool,

    /// One-based index of the first displayed row (0 when empty)
    pub from: u64,

    /// One-based index of the last displayed row
    pub to: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        // Ensure per_page is at least 1 to avoid division by zero
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(per_page) };
        let start = (page - 1).saturating_mul(per_page);
        let end = start.saturating_add(per_page);

        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: end < total,
            has_prev: page > 1,
            from: if start < total { start + 1 } else { 0 },
            to: end.min(total),
        }
    }

    pub fn from_options(options: &QueryOptions, total: u64) -> Self {
        Self::new(options.pagination.page, options.pagination.per_page, total)
    }
}
