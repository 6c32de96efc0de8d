//! Backend boundary - source identifiers, result envelope, executor traits
//!
//! Execution lives outside this crate: the pipeline hands a translated query
//! to whatever implements `SearchBackend` or `SqlBackend` and gets back a
//! `SourceResult`. A failed or timed-out execution is surfaced to the merger
//! as an absent result, never as a pipeline failure.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::search_translator::SearchRequest;
use crate::sql_translator::SqlStatement;

/// One of the two data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Search,
    Sql,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Search => "search",
            Backend::Sql => "sql",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single result record: field name to scalar or nested value.
pub type Record = serde_json::Map<String, Value>;

/// One bucket of a terms-style aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    pub key: Value,
    pub count: u64,
}

/// Aggregation outcome: either a single scalar or a bucket list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationValue {
    Buckets(Vec<AggregationBucket>),
    Scalar(Value),
}

/// Result envelope returned by either backend executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: Backend,

    pub total_results: u64,

    #[serde(default)]
    pub results: Vec<Record>,

    #[serde(default)]
    pub aggregations: BTreeMap<String, AggregationValue>,

    /// Diagnostic metadata (generated query text, index name, timings).
    #[serde(default)]
    pub query_info: BTreeMap<String, Value>,
}

impl SourceResult {
    /// Empty result for a source, used when execution failed or timed out.
    pub fn empty(source: Backend) -> Self {
        Self {
            source,
            total_results: 0,
            results: Vec::new(),
            aggregations: BTreeMap::new(),
            query_info: BTreeMap::new(),
        }
    }
}

/// Full-text search executor.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SourceResult>;
}

/// Relational store executor.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn query(&self, statement: &SqlStatement) -> Result<SourceResult>;
}
