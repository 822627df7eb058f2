//! Read query descriptors and their rendering to PostgREST query parameters.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// One row of a response, as returned by the data source.
pub type Row = Map<String, Value>;

/// Rows of a successful read, with the exact total when it was requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResponse {
    pub rows: Vec<Row>,
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(String),
    Gte(String),
    Lt(String),
    In(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

impl Filter {
    fn render(&self) -> String {
        match &self.op {
            FilterOp::Eq(v) => format!("eq.{v}"),
            FilterOp::Gte(v) => format!("gte.{v}"),
            FilterOp::Lt(v) => format!("lt.{v}"),
            FilterOp::In(values) => {
                let values: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
                format!("in.({})", values.join(","))
            }
        }
    }
}

// Reserved characters inside `in.(...)` lists need double quotes
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// A read against a single table.
///
/// ```
/// use mtdash::client::QueryDescriptor;
///
/// let query = QueryDescriptor::new("trips")
///     .select(["user_id", "created_at"])
///     .gte("created_at", "2024-05-01T00:00:00Z")
///     .order_by("created_at", true)
///     .limit(20);
/// assert_eq!(query.table, "trips");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Ask the source for the exact number of matching rows
    pub count: bool,
}

impl QueryDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
            count: false,
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filter(column, FilterOp::Eq(value.to_string()))
    }

    pub fn gte(self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filter(column, FilterOp::Gte(value.to_string()))
    }

    pub fn lt(self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filter(column, FilterOp::Lt(value.to_string()))
    }

    pub fn in_list<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filter(column, FilterOp::In(values))
    }

    fn filter(mut self, column: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(Filter { column: column.into(), op });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Query parameters in PostgREST syntax, in a stable order.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 4);

        let select = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        };
        pairs.push(("select".to_string(), select));

        for filter in &self.filters {
            pairs.push((filter.column.clone(), filter.render()));
        }

        if let Some(order) = &self.order {
            let direction = if order.descending { "desc" } else { "asc" };
            pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }

        pairs
    }
}

/// Timestamp filter value in the form the data source compares correctly.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
