//! Per-call metric records

use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::impl_wire_name_conversions;

/// History bucket a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Query,
    Mutation,
}

impl_wire_name_conversions!(MetricCategory {
    Query => "query",
    Mutation => "mutation",
});

impl MetricCategory {
    pub const ALL: [Self; 2] = [Self::Query, Self::Mutation];
}

/// Outcome of one facade call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub resource: String,
    /// `select` for queries, the mutation kind for writes
    pub operation: String,
    pub latency_ms: u64,
    pub success: bool,
    pub retry_count: u32,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}
