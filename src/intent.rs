//! Normalized intent model - the upstream contract
//!
//! The NLU stage hands us an already-extracted representation of the user's
//! question: an intent label, entities, filters, aggregations, and temporal
//! constraints. Everything downstream (scorer, router, translators, merger)
//! consumes this value read-only.
//!
//! Filters, aggregations, and relative time are closed sum types rather than
//! open string maps, so an unsupported operator is an exhaustiveness gap at
//! compile time instead of a silent fall-through.

use serde::{Deserialize, Serialize};

/// Classified purpose of the query, as produced by the intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    SearchData,
    CountRecords,
    AggregateData,
    FilterData,
    TimeAnalysis,
    CompareData,
    GetSchema,
    TrendAnalysis,
    StatisticalAnalysis,
}

impl QueryIntent {
    /// Wire label, matching the classifier's snake_case output.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::SearchData => "search_data",
            QueryIntent::CountRecords => "count_records",
            QueryIntent::AggregateData => "aggregate_data",
            QueryIntent::FilterData => "filter_data",
            QueryIntent::TimeAnalysis => "time_analysis",
            QueryIntent::CompareData => "compare_data",
            QueryIntent::GetSchema => "get_schema",
            QueryIntent::TrendAnalysis => "trend_analysis",
            QueryIntent::StatisticalAnalysis => "statistical_analysis",
        }
    }
}

/// Named entity span extracted from the query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,

    /// NER label, e.g. "PERSON", "ORG", "MONEY", "CARDINAL".
    pub label: String,

    pub start: usize,
    pub end: usize,
}

/// Relative time offset. Negative values point into the past
/// ("last week" arrives as `Days(-7)`), zero means the current period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeTime {
    Days(i64),
    Months(i64),
    Years(i64),
}

/// Temporal constraints detected in the query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalInfo {
    #[serde(default)]
    pub has_time_constraint: bool,

    /// Raw expressions as matched in the text ("last week", "this month").
    #[serde(default)]
    pub expressions: Vec<String>,

    #[serde(default)]
    pub relative: Option<RelativeTime>,

    /// ISO dates mentioned literally in the query.
    #[serde(default)]
    pub specific_dates: Vec<String>,
}

impl TemporalInfo {
    pub fn relative(rel: RelativeTime, expression: &str) -> Self {
        Self {
            has_time_constraint: true,
            expressions: vec![expression.to_string()],
            relative: Some(rel),
            specific_dates: Vec::new(),
        }
    }
}

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "is_not")]
    IsNot,
}

/// Filter value. `Pair` carries the two bounds of a `between` filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Pair(f64, f64),
}

/// One filter condition extracted from the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,

    #[serde(rename = "operator")]
    pub op: FilterOp,

    pub value: FilterValue,

    /// Value kind hint from the extractor ("string", "numeric", "date").
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: FilterValue) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
            kind: None,
        }
    }
}

/// Aggregation function requested by the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    GroupBy,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Max => "max",
            AggregateFn::Min => "min",
            AggregateFn::GroupBy => "group_by",
        }
    }
}

/// One aggregation request, e.g. `{"type": "count", "field": "*"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(rename = "type")]
    pub func: AggregateFn,

    pub field: String,
}

impl Aggregation {
    pub fn new(func: AggregateFn, field: &str) -> Self {
        Self {
            func,
            field: field.to_string(),
        }
    }
}

/// Fully normalized query intent, immutable once produced by the NLU stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedIntent {
    pub original_query: String,

    /// Lowercased, whitespace-normalized variant of the query.
    pub processed_query: String,

    pub intent: QueryIntent,

    #[serde(default)]
    pub entities: Vec<Entity>,

    #[serde(default)]
    pub temporal_info: TemporalInfo,

    #[serde(default)]
    pub filters: Vec<Filter>,

    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

impl NormalizedIntent {
    /// Minimal intent for a raw query string; the processed form defaults to
    /// the lowercased original.
    pub fn new(original_query: &str, intent: QueryIntent) -> Self {
        Self {
            original_query: original_query.to_string(),
            processed_query: original_query.to_lowercase(),
            intent,
            entities: Vec::new(),
            temporal_info: TemporalInfo::default(),
            filters: Vec::new(),
            aggregations: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalInfo) -> Self {
        self.temporal_info = temporal;
        self
    }
}
