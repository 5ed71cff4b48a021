//! Query and mutation descriptions handed to the resource client

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BackoffKind;
use crate::impl_wire_name_conversions;

/// Comparison applied by a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl_wire_name_conversions!(FilterOp {
    Eq => "eq",
    Neq => "neq",
    Gt => "gt",
    Gte => "gte",
    Lt => "lt",
    Lte => "lte",
    Like => "like",
    Ilike => "ilike",
    In => "in",
    Is => "is",
});

/// Column filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self { column: column.into(), op, value: value.into() }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }
}

/// Result ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

const fn default_ascending() -> bool {
    true
}

/// Zero-based page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Inclusive row range covered by this page, `None` for an empty page size
    pub fn row_range(self) -> Option<RowRange> {
        if self.page_size == 0 {
            return None;
        }
        let from = u64::from(self.page) * u64::from(self.page_size);
        Some(RowRange { from, to: from + u64::from(self.page_size) - 1 })
    }
}

/// Inclusive row range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub from: u64,
    pub to: u64,
}

/// Per-call overrides of the request retry settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
}

/// Caller-facing read options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub pagination: Option<Pagination>,
    pub limit: Option<u32>,
    pub retry: Option<RetryOverrides>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy { column: column.into(), ascending });
        self
    }

    #[must_use]
    pub const fn page(mut self, page: u32, page_size: u32) -> Self {
        self.pagination = Some(Pagination { page, page_size });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn retry(mut self, overrides: RetryOverrides) -> Self {
        self.retry = Some(overrides);
        self
    }

    /// The client-facing part of these options
    pub fn to_spec(&self) -> QuerySpec {
        QuerySpec {
            columns: self.columns.clone(),
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            range: self.pagination.and_then(Pagination::row_range),
            limit: self.limit,
        }
    }
}

/// Read request as seen by the resource client
///
/// An empty column list selects every column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub range: Option<RowRange>,
    pub limit: Option<u32>,
}

/// Kind of write, used as the metric operation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl_wire_name_conversions!(MutationKind {
    Insert => "insert",
    Update => "update",
    Delete => "delete",
    Upsert => "upsert",
});

/// Write request as seen by the resource client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Mutation {
    Insert { values: Value },
    Update { values: Value, filters: Vec<Filter> },
    Delete { filters: Vec<Filter> },
    Upsert { values: Value },
}

impl Mutation {
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Insert { .. } => MutationKind::Insert,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete { .. } => MutationKind::Delete,
            Self::Upsert { .. } => MutationKind::Upsert,
        }
    }
}

/// Caller-facing write options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationOptions {
    pub retry: Option<RetryOverrides>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_pagination_range_is_inclusive_and_zero_based() {
        assert_eq!(Pagination { page: 0, page_size: 20 }.row_range(), Some(RowRange { from: 0, to: 19 }));
        assert_eq!(Pagination { page: 2, page_size: 10 }.row_range(), Some(RowRange { from: 20, to: 29 }));
        assert_eq!(Pagination { page: 3, page_size: 0 }.row_range(), None);
    }

    #[test]
    fn test_options_to_spec() {
        let spec = QueryOptions::new()
            .columns(["id", "name"])
            .filter(Filter::eq("owner_id", "u-1"))
            .filter(Filter::new("year", FilterOp::Gte, 1990))
            .order_by("created_at", false)
            .page(1, 25)
            .limit(25)
            .to_spec();

        assert_eq!(spec.columns, vec!["id", "name"]);
        assert_eq!(spec.filters.len(), 2);
        assert_eq!(spec.filters[1].value, json!(1990));
        assert_eq!(spec.order_by, Some(OrderBy { column: "created_at".into(), ascending: false }));
        assert_eq!(spec.range, Some(RowRange { from: 25, to: 49 }));
        assert_eq!(spec.limit, Some(25));
    }

    #[test]
    fn test_order_defaults_to_ascending() {
        let order: OrderBy = serde_json::from_value(json!({"column": "name"})).unwrap();
        assert!(order.ascending);
    }

    #[test]
    fn test_mutation_kind_and_tagging() {
        let mutation = Mutation::Update { values: json!({"name": "G-Wagen"}), filters: vec![Filter::eq("id", 7)] };
        assert_eq!(mutation.kind(), MutationKind::Update);
        assert_eq!(mutation.kind().to_string(), "update");

        let json = serde_json::to_value(&mutation).unwrap();
        assert_eq!(json["operation"], "update");
        assert_eq!(json["filters"][0]["op"], "eq");
    }
}
