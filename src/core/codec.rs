//! Mapping between data-grid interactions and [`QueryOptions`]
//!
//! The grid widget reports every interaction as a
//! `(pagination, column filters, sorter, extra)` tuple. Search boxes, date
//! pickers and dropdown selectors sit next to the grid and edit the same
//! filter list. [`TableOptionsCodec`] turns all of these into a fresh
//! [`QueryOptions`]; the input options are never touched.
//!
//! Ownership of predicates inside the filter list:
//!
//! - seeded predicates come from the codec's base filters
//! - column filters and selectors own direct leaves of the root AND-group
//! - a search box owns one OR-group over its fields (its bucket)
//! - a date picker owns one OR-group of `gte`/`lte` leaves on its field
//!
//! Malformed input never produces a malformed tree. The `try_*` forms report
//! a [`ValidationError`]; the plain forms log it and return the previous
//! options unchanged.

use crate::core::error::ValidationError;
use crate::core::predicate::{
    self, FilterValue, Node, Op, append_to_root, remove_bucket, remove_root_leaves,
    validate_field_path,
};
use crate::core::query::{DEFAULT_PER_PAGE, Pagination, QueryOptions, SortDirection, SortSpec};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Pagination part of a grid event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePagination {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
}

impl TablePagination {
    pub fn new(current: u64, page_size: u64) -> Self {
        Self {
            current: Some(current),
            page_size: Some(page_size),
        }
    }
}

/// Column key to selected filter values; `None` or an empty list is inactive
///
/// Insertion order is preserved so identical events build identical trees.
pub type ColumnFilters = IndexMap<String, Option<Vec<FilterValue>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascend,
    Descend,
}

impl From<SortOrder> for SortDirection {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Ascend => SortDirection::Asc,
            SortOrder::Descend => SortDirection::Desc,
        }
    }
}

/// A column's data path: `"profile.nickname"` or `["profile", "nickname"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SorterField {
    Path(String),
    Segments(Vec<String>),
}

impl SorterField {
    fn to_path(&self) -> String {
        match self {
            SorterField::Path(p) => p.clone(),
            SorterField::Segments(segments) => segments.join("."),
        }
    }
}

/// Sort state of one column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SorterResult {
    #[serde(default)]
    pub column_key: Option<String>,
    #[serde(default)]
    pub field: Option<SorterField>,
    /// `None` when the column is not sorted
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl SorterResult {
    pub fn column(key: impl Into<String>, order: SortOrder) -> Self {
        Self {
            column_key: Some(key.into()),
            field: None,
            order: Some(order),
        }
    }
}

/// Sorter part of a grid event; multi-column sorts arrive as an array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sorter {
    #[default]
    None,
    Multiple(Vec<SorterResult>),
    Single(SorterResult),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAction {
    #[default]
    Paginate,
    Sort,
    Filter,
}

/// Extra metadata of a grid event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableExtra {
    #[serde(default)]
    pub action: TableAction,
}

/// A complete grid event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableEvent {
    #[serde(default)]
    pub pagination: TablePagination,
    #[serde(default)]
    pub filters: ColumnFilters,
    #[serde(default)]
    pub sorter: Sorter,
    #[serde(default)]
    pub extra: TableExtra,
}

/// Stateless translator from UI interactions to query options
///
/// Configured once per list page; every method is a pure function of its
/// arguments and this configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOptionsCodec {
    base_filters: Vec<Node>,
    free_text_columns: Vec<String>,
    column_fields: IndexMap<String, String>,
    default_per_page: u64,
    page_size_options: Vec<u64>,
}

impl Default for TableOptionsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TableOptionsCodec {
    pub fn new() -> Self {
        Self {
            base_filters: Vec::new(),
            free_text_columns: Vec::new(),
            column_fields: IndexMap::new(),
            default_per_page: DEFAULT_PER_PAGE,
            page_size_options: Vec::new(),
        }
    }

    /// Seed predicates every rebuilt query starts from
    pub fn with_base_filters(mut self, filters: Vec<Node>) -> Self {
        self.base_filters = filters;
        self
    }

    /// Columns whose filters are case-insensitive text matches
    pub fn with_free_text_columns<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.free_text_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Map a UI column key to a backend field path
    pub fn with_column_field(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.column_fields.insert(column.into(), field.into());
        self
    }

    pub fn with_default_per_page(mut self, per_page: u64) -> Self {
        self.default_per_page = per_page.max(1);
        self
    }

    /// Page sizes the grid's size changer offers; empty allows any size
    pub fn with_page_size_options(mut self, options: impl IntoIterator<Item = u64>) -> Self {
        self.page_size_options = options.into_iter().collect();
        self
    }

    pub fn base_filters(&self) -> &[Node] {
        &self.base_filters
    }

    pub fn default_per_page(&self) -> u64 {
        self.default_per_page
    }

    pub fn page_size_options(&self) -> &[u64] {
        &self.page_size_options
    }

    /// Options a page mounts with: the seed predicates on the first page
    pub fn initial_options(&self) -> QueryOptions {
        QueryOptions {
            filters: self.base_filters.clone(),
            sort: None,
            pagination: Pagination {
                page: 1,
                per_page: self.default_per_page,
            },
        }
    }

    /// Backend field path for a column key
    pub fn resolve_field(&self, column: &str) -> String {
        self.column_fields
            .get(column)
            .cloned()
            .unwrap_or_else(|| column.to_string())
    }

    /// Pagination for a grid event; a requested size must be one of the offered ones
    fn event_pagination(
        &self,
        page: u64,
        requested: Option<u64>,
        fallback: u64,
    ) -> Result<Pagination, ValidationError> {
        let per_page = requested.unwrap_or(fallback);
        let offered = self.page_size_options.is_empty() || self.page_size_options.contains(&per_page);
        if requested.is_some() && !offered {
            return Err(ValidationError::InvalidPagination { page, per_page });
        }
        Pagination::new(page, per_page)
    }

    // =========================================================================
    // Grid events
    // =========================================================================

    /// Build options from scratch for a grid event
    ///
    /// Column filter leaves are anded into the root group of the base
    /// filters. Sorters keep their array order as priority order. When no
    /// column is sorted, `sort` is omitted.
    pub fn try_from_table_event(
        &self,
        pagination: &TablePagination,
        filters: &ColumnFilters,
        sorter: &Sorter,
        extra: &TableExtra,
    ) -> Result<QueryOptions, ValidationError> {
        let page = match extra.action {
            TableAction::Filter => 1,
            _ => pagination.current.unwrap_or(1),
        };
        let pagination = self.event_pagination(page, pagination.page_size, self.default_per_page)?;

        let mut tree = self.base_filters.clone();
        for leaf in self.column_leaves(filters)? {
            append_to_root(&mut tree, leaf);
        }

        Ok(QueryOptions {
            filters: tree,
            sort: self.sort_specs(sorter)?,
            pagination,
        })
    }

    /// Never-failing form of [`Self::try_from_table_event`]
    ///
    /// Returns `previous` unchanged when the event is malformed.
    pub fn from_table_event(
        &self,
        previous: &QueryOptions,
        pagination: &TablePagination,
        filters: &ColumnFilters,
        sorter: &Sorter,
        extra: &TableExtra,
    ) -> QueryOptions {
        recover(
            previous,
            self.try_from_table_event(pagination, filters, sorter, extra),
            "table event",
        )
    }

    /// Merge a grid event into existing options
    ///
    /// Search and date buckets and seeded predicates survive. Leaves of every
    /// column named in `filters` are replaced, sort is replaced, and missing
    /// pagination fields keep their previous values.
    pub fn try_apply_table_event(
        &self,
        previous: &QueryOptions,
        pagination: &TablePagination,
        filters: &ColumnFilters,
        sorter: &Sorter,
        extra: &TableExtra,
    ) -> Result<QueryOptions, ValidationError> {
        let page = match extra.action {
            TableAction::Filter => 1,
            _ => pagination.current.unwrap_or(previous.pagination.page),
        };
        let pagination =
            self.event_pagination(page, pagination.page_size, previous.pagination.per_page)?;
        let leaves = self.column_leaves(filters)?;
        let sort = self.sort_specs(sorter)?;

        let mut next = previous.clone();
        for column in filters.keys() {
            remove_root_leaves(&mut next.filters, &self.resolve_field(column));
        }
        for leaf in leaves {
            append_to_root(&mut next.filters, leaf);
        }
        next.sort = sort;
        next.pagination = pagination;
        Ok(next)
    }

    pub fn apply_table_event(
        &self,
        previous: &QueryOptions,
        pagination: &TablePagination,
        filters: &ColumnFilters,
        sorter: &Sorter,
        extra: &TableExtra,
    ) -> QueryOptions {
        recover(
            previous,
            self.try_apply_table_event(previous, pagination, filters, sorter, extra),
            "table event",
        )
    }

    fn column_leaves(&self, filters: &ColumnFilters) -> Result<Vec<Node>, ValidationError> {
        let mut leaves = Vec::new();
        for (column, values) in filters {
            let values: Vec<&FilterValue> = values
                .iter()
                .flatten()
                .filter(|v| !v.is_empty())
                .collect();
            let Some(first) = values.first() else {
                continue;
            };

            let field = self.resolve_field(column);
            validate_field_path(&field)?;

            let leaf = if self.free_text_columns.iter().any(|c| c == column) {
                let Some(text) = first.as_text() else {
                    return Err(ValidationError::UnsupportedFilterValue {
                        field,
                        message: "free-text columns take a string".to_string(),
                    });
                };
                Node::leaf(field, Op::Ilike, text)
            } else if values.len() == 1 {
                Node::leaf(field, Op::Eq, (*first).clone())
            } else {
                let list: Vec<FilterValue> = values.into_iter().cloned().collect();
                Node::leaf(field, Op::In, FilterValue::List(list))
            };
            leaves.push(leaf);
        }
        Ok(leaves)
    }

    fn sort_specs(&self, sorter: &Sorter) -> Result<Option<Vec<SortSpec>>, ValidationError> {
        let entries: Vec<&SorterResult> = match sorter {
            Sorter::None => Vec::new(),
            Sorter::Single(s) => vec![s],
            Sorter::Multiple(list) => list.iter().collect(),
        };

        let mut specs = Vec::new();
        for entry in entries {
            let Some(order) = entry.order else {
                continue;
            };
            let column = entry
                .column_key
                .clone()
                .or_else(|| entry.field.as_ref().map(SorterField::to_path))
                .ok_or_else(|| ValidationError::InvalidFieldPath {
                    field: String::new(),
                })?;
            let field = self.resolve_field(&column);
            validate_field_path(&field)?;
            specs.push(SortSpec {
                field,
                direction: order.into(),
            });
        }

        Ok(if specs.is_empty() { None } else { Some(specs) })
    }

    // =========================================================================
    // Date range, search and selectors
    // =========================================================================

    /// Replace the date bucket on `field`
    ///
    /// Both bounds present: the bucket becomes `{field gte start}`,
    /// `{field lte end}`. Either bound missing: the date predicate is removed
    /// and nothing is added. A start after the end is rejected.
    pub fn try_apply_date_range(
        &self,
        options: &QueryOptions,
        field: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<QueryOptions, ValidationError> {
        validate_field_path(field)?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ValidationError::InvalidDateRange {
                    start: to_iso(start),
                    end: to_iso(end),
                });
            }
        }

        let mut next = options.clone();
        remove_bucket(&mut next.filters, &[field]);
        if let (Some(start), Some(end)) = (start, end) {
            append_to_root(
                &mut next.filters,
                Node::or(vec![
                    Node::leaf(field, Op::Gte, to_iso(start)),
                    Node::leaf(field, Op::Lte, to_iso(end)),
                ]),
            );
        }
        Ok(next)
    }

    pub fn apply_date_range(
        &self,
        options: &QueryOptions,
        field: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> QueryOptions {
        recover(
            options,
            self.try_apply_date_range(options, field, start, end),
            "date range",
        )
    }

    /// Replace the search bucket over `fields`
    ///
    /// Every field gets a leaf with the same value, `like` when
    /// `case_sensitive` and `ilike` otherwise. A blank value clears the
    /// bucket.
    pub fn try_apply_search<S: AsRef<str>>(
        &self,
        options: &QueryOptions,
        fields: &[S],
        value: &str,
        case_sensitive: bool,
    ) -> Result<QueryOptions, ValidationError> {
        if fields.is_empty() {
            return Err(ValidationError::EmptySearchFields);
        }
        for field in fields {
            validate_field_path(field.as_ref())?;
        }

        let mut next = options.clone();
        remove_bucket(&mut next.filters, fields);

        let value = value.trim();
        if !value.is_empty() {
            let op = Op::text_search(case_sensitive);
            let bucket = fields
                .iter()
                .map(|f| Node::leaf(f.as_ref(), op, value))
                .collect();
            append_to_root(&mut next.filters, Node::or(bucket));
        }
        Ok(next)
    }

    pub fn apply_search<S: AsRef<str>>(
        &self,
        options: &QueryOptions,
        fields: &[S],
        value: &str,
        case_sensitive: bool,
    ) -> QueryOptions {
        recover(
            options,
            self.try_apply_search(options, fields, value, case_sensitive),
            "search",
        )
    }

    /// Replace the selector leaf on `field`; `None` or an empty value clears it
    pub fn try_apply_field(
        &self,
        options: &QueryOptions,
        field: &str,
        value: Option<FilterValue>,
        op: Op,
    ) -> Result<QueryOptions, ValidationError> {
        validate_field_path(field)?;
        let mut next = options.clone();
        remove_root_leaves(&mut next.filters, field);
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            append_to_root(&mut next.filters, Node::leaf(field, op, value));
        }
        Ok(next)
    }

    pub fn apply_field(
        &self,
        options: &QueryOptions,
        field: &str,
        value: Option<FilterValue>,
        op: Op,
    ) -> QueryOptions {
        recover(
            options,
            self.try_apply_field(options, field, value, op),
            "field filter",
        )
    }

    /// Drop every predicate on `field`, wherever it sits
    pub fn clear_field(&self, options: &QueryOptions, field: &str) -> QueryOptions {
        let mut next = options.clone();
        predicate::remove_field(&mut next.filters, field);
        next
    }
}

fn recover(
    previous: &QueryOptions,
    result: Result<QueryOptions, ValidationError>,
    source: &'static str,
) -> QueryOptions {
    match result {
        Ok(options) => options,
        Err(error) => {
            tracing::debug!(source, error = %error, "Ignoring malformed filter input");
            previous.clone()
        }
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix
pub fn to_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Start of `start` and end of `end` (inclusive, millisecond precision) in `tz`
///
/// Returns `None` when a day boundary does not exist in `tz`.
pub fn day_bounds<Tz: TimeZone>(
    start: NaiveDate,
    end: NaiveDate,
    tz: &Tz,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = start
        .and_hms_opt(0, 0, 0)?
        .and_local_timezone(tz.clone())
        .earliest()?;
    let to = end
        .and_hms_milli_opt(23, 59, 59, 999)?
        .and_local_timezone(tz.clone())
        .latest()?;
    Some((from.with_timezone(&Utc), to.with_timezone(&Utc)))
}
