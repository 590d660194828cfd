use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

/// A single read predicate. Filters on a query are ANDed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Column equals the given (non-null) value.
    Eq { column: String, value: Value },
    /// Column is explicitly null (or absent). Distinct from `Eq` with a null
    /// value, which — as in SQL — matches nothing.
    IsNull { column: String },
}

/// Case-insensitive substring search ORed across the listed columns: a row
/// matches when ANY listed column contains the term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub term: String,
    pub columns: Vec<String>,
}

/// A single sort key. With no `OrderBy`, backend default order applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// The shape of one read against a collection.
///
/// Built incrementally with the `eq`/`is_null`/`search`/`order_by`/`range`
/// helpers; an empty query selects every row of the collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Columns to return. None = all columns.
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub search: Option<SearchFilter>,
    pub order: Option<OrderBy>,
    /// Zero-indexed inclusive (from, to) row range, applied after
    /// filter/search/order.
    pub range: Option<(usize, usize)>,
    /// Request an exact count of all matching rows, ignoring `range`.
    pub count: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value,
        });
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.filters.push(Filter::IsNull {
            column: column.into(),
        });
        self
    }

    pub fn search(mut self, term: impl Into<String>, columns: Vec<String>) -> Self {
        self.search = Some(SearchFilter {
            term: term.into(),
            columns,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.range = Some((from, to));
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// The response to a `select`: the requested slice of rows, plus the exact
/// total match count when the query asked for one. The count reflects the
/// same filter/search state as the rows, ignoring the range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResponse {
    pub rows: Vec<Record>,
    pub count: Option<u64>,
}
