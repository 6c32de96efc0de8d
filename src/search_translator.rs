//! Search-query translation - intent to full-text query AST
//!
//! Two layers, matching the backend's own split: `SearchQueryParams` is the
//! backend-neutral intermediate built at routing time, `SearchRequest` is the
//! bool-query AST handed to the executor. Filter operators map per entry;
//! an operator that cannot be represented is dropped rather than failed,
//! since a degraded query beats no query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::intent::{
    AggregateFn, Aggregation, Filter, FilterOp, FilterValue, NormalizedIntent, QueryIntent,
    TemporalInfo,
};
use crate::time::window_from_relative;

/// Command words stripped from the query when deriving the search phrase.
const COMMAND_STOPWORDS: &[&str] = &["find", "search", "get", "show", "list", "count", "total"];

/// Multi-word command phrases stripped before tokenization.
const COMMAND_PHRASES: &[&str] = &["how many"];

/// Weighted full-text fields: title boosted highest, then body, then
/// tags/author.
const MULTI_MATCH_FIELDS: &[&str] = &["title^3", "content^2", "tags", "author"];

/// Date field carrying document timestamps in the search index.
const INDEX_DATE_FIELD: &str = "created_at";

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Intermediate search parameters produced by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQueryParams {
    /// Cleaned search phrase; empty means match-all.
    pub search_text: String,

    pub filters: Vec<Filter>,

    /// Aggregations adapted for the search engine (`group_by` becomes a
    /// terms aggregation over the keyword sub-field).
    pub aggregations: Vec<Aggregation>,

    pub temporal_info: TemporalInfo,

    pub limit: usize,

    /// `_score` sorts by relevance.
    pub sort_field: String,

    pub sort_order: SortOrder,
}

/// Result limit by intent.
fn intent_limit(intent: QueryIntent) -> usize {
    match intent {
        QueryIntent::CountRecords => 0,
        QueryIntent::AggregateData => 100,
        QueryIntent::SearchData => 50,
        QueryIntent::FilterData => 100,
        QueryIntent::TimeAnalysis => 200,
        QueryIntent::CompareData => 100,
        _ => 50,
    }
}

/// Derive the search phrase: strip command phrases and stop-words, keep
/// terms longer than two characters, and fall back to the unmodified
/// original query when the cleaned phrase collapses below three characters.
fn extract_search_text(intent: &NormalizedIntent) -> String {
    let mut processed = intent.processed_query.clone();
    for phrase in COMMAND_PHRASES {
        processed = processed.replace(phrase, " ");
    }

    let cleaned = processed
        .split_whitespace()
        .filter(|w| !COMMAND_STOPWORDS.contains(w) && w.len() > 2)
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.trim().len() < 3 {
        intent.original_query.clone()
    } else {
        cleaned
    }
}

/// Adapt aggregations for the search engine: the scalar functions map 1:1,
/// `group_by` becomes a terms aggregation over the keyword sub-field.
fn adapt_aggregations(aggregations: &[Aggregation]) -> Vec<Aggregation> {
    aggregations
        .iter()
        .map(|agg| match agg.func {
            AggregateFn::GroupBy => {
                let field = if agg.field.is_empty() {
                    "category.keyword".to_string()
                } else {
                    format!("{}.keyword", agg.field)
                };
                Aggregation {
                    func: AggregateFn::GroupBy,
                    field,
                }
            }
            _ => agg.clone(),
        })
        .collect()
}

/// Build the intermediate search parameters for an intent.
pub fn build_params(intent: &NormalizedIntent) -> SearchQueryParams {
    let mut params = SearchQueryParams {
        search_text: extract_search_text(intent),
        filters: intent.filters.clone(),
        aggregations: adapt_aggregations(&intent.aggregations),
        temporal_info: intent.temporal_info.clone(),
        limit: intent_limit(intent.intent),
        sort_field: "_score".to_string(),
        sort_order: SortOrder::Desc,
    };

    match intent.intent {
        QueryIntent::CountRecords => {
            // Only the count matters; skip fetching documents.
            params.limit = 0;
            params
                .aggregations
                .push(Aggregation::new(AggregateFn::Count, "_id"));
        }
        QueryIntent::TimeAnalysis => {
            params.sort_field = INDEX_DATE_FIELD.to_string();
            params
                .aggregations
                .push(Aggregation::new(AggregateFn::GroupBy, INDEX_DATE_FIELD));
        }
        _ => {}
    }

    params
}

/// Range bounds of a range clause; only the set bounds are rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

/// One node of the bool-query AST.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    MatchAll,
    MultiMatch {
        query: String,
        fields: Vec<String>,
        match_type: String,
        fuzziness: String,
    },
    Term {
        field: String,
        value: Value,
    },
    Range {
        field: String,
        bounds: RangeBounds,
    },
    Wildcard {
        field: String,
        pattern: String,
    },
    Bool(Box<BoolQuery>),
}

/// Boolean query with the four standard clause lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<QueryNode>,
    pub filter: Vec<QueryNode>,
    pub should: Vec<QueryNode>,
    pub must_not: Vec<QueryNode>,
}

/// One sort entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// One aggregation entry keyed by its output name.
#[derive(Debug, Clone, PartialEq)]
pub enum AggNode {
    ValueCount { field: String },
    Sum { field: String },
    Avg { field: String },
    Max { field: String },
    Min { field: String },
    Terms { field: String, size: usize },
}

/// Executable search request: bool query, sort list, aggregation map, size.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: QueryNode,
    pub sort: Vec<SortSpec>,
    pub aggs: Vec<(String, AggNode)>,
    pub size: usize,
}

impl QueryNode {
    /// Render to the search engine's wire DSL.
    pub fn to_value(&self) -> Value {
        match self {
            QueryNode::MatchAll => json!({ "match_all": {} }),
            QueryNode::MultiMatch {
                query,
                fields,
                match_type,
                fuzziness,
            } => json!({
                "multi_match": {
                    "query": query,
                    "fields": fields,
                    "type": match_type,
                    "fuzziness": fuzziness,
                }
            }),
            QueryNode::Term { field, value } => {
                json!({ "term": keyed(field, value.clone()) })
            }
            QueryNode::Range { field, bounds } => {
                let mut body = serde_json::Map::new();
                if let Some(v) = &bounds.gt {
                    body.insert("gt".to_string(), v.clone());
                }
                if let Some(v) = &bounds.gte {
                    body.insert("gte".to_string(), v.clone());
                }
                if let Some(v) = &bounds.lt {
                    body.insert("lt".to_string(), v.clone());
                }
                if let Some(v) = &bounds.lte {
                    body.insert("lte".to_string(), v.clone());
                }
                json!({ "range": keyed(field, Value::Object(body)) })
            }
            QueryNode::Wildcard { field, pattern } => {
                json!({ "wildcard": keyed(field, json!(pattern)) })
            }
            QueryNode::Bool(inner) => {
                json!({
                    "bool": {
                        "must": inner.must.iter().map(QueryNode::to_value).collect::<Vec<_>>(),
                        "filter": inner.filter.iter().map(QueryNode::to_value).collect::<Vec<_>>(),
                        "should": inner.should.iter().map(QueryNode::to_value).collect::<Vec<_>>(),
                        "must_not": inner.must_not.iter().map(QueryNode::to_value).collect::<Vec<_>>(),
                    }
                })
            }
        }
    }
}

impl AggNode {
    pub fn to_value(&self) -> Value {
        match self {
            AggNode::ValueCount { field } => json!({ "value_count": { "field": field } }),
            AggNode::Sum { field } => json!({ "sum": { "field": field } }),
            AggNode::Avg { field } => json!({ "avg": { "field": field } }),
            AggNode::Max { field } => json!({ "max": { "field": field } }),
            AggNode::Min { field } => json!({ "min": { "field": field } }),
            AggNode::Terms { field, size } => {
                json!({ "terms": { "field": field, "size": size } })
            }
        }
    }
}

impl SearchRequest {
    /// Full request body in the engine's wire DSL.
    pub fn to_value(&self) -> Value {
        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|s| keyed(&s.field, json!({ "order": s.order.as_str() })))
            .collect();
        let mut aggs = serde_json::Map::new();
        for (name, agg) in &self.aggs {
            aggs.insert(name.clone(), agg.to_value());
        }
        json!({
            "query": self.query.to_value(),
            "sort": sort,
            "aggs": Value::Object(aggs),
            "size": self.size,
        })
    }
}

/// Single-key JSON object, for DSL nodes keyed by a field name.
fn keyed(key: &str, value: Value) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), value);
    Value::Object(body)
}

fn filter_value_to_json(value: &FilterValue) -> Value {
    match value {
        FilterValue::Flag(b) => json!(b),
        FilterValue::Number(n) => json!(n),
        FilterValue::Text(s) => json!(s),
        FilterValue::Pair(lo, hi) => json!([lo, hi]),
    }
}

/// Translate one filter into a clause. Returns `None` for combinations that
/// have no representation (e.g. `between` without a value pair); those are
/// dropped from the query.
fn filter_to_clause(filter: &Filter) -> Option<QueryNode> {
    let field = filter.field.clone();
    match filter.op {
        FilterOp::Eq | FilterOp::Is => Some(QueryNode::Term {
            field,
            value: filter_value_to_json(&filter.value),
        }),
        FilterOp::NotEq | FilterOp::IsNot => Some(QueryNode::Bool(Box::new(BoolQuery {
            must_not: vec![QueryNode::Term {
                field,
                value: filter_value_to_json(&filter.value),
            }],
            ..BoolQuery::default()
        }))),
        FilterOp::Gt => Some(QueryNode::Range {
            field,
            bounds: RangeBounds {
                gt: Some(filter_value_to_json(&filter.value)),
                ..RangeBounds::default()
            },
        }),
        FilterOp::Gte => Some(QueryNode::Range {
            field,
            bounds: RangeBounds {
                gte: Some(filter_value_to_json(&filter.value)),
                ..RangeBounds::default()
            },
        }),
        FilterOp::Lt => Some(QueryNode::Range {
            field,
            bounds: RangeBounds {
                lt: Some(filter_value_to_json(&filter.value)),
                ..RangeBounds::default()
            },
        }),
        FilterOp::Lte => Some(QueryNode::Range {
            field,
            bounds: RangeBounds {
                lte: Some(filter_value_to_json(&filter.value)),
                ..RangeBounds::default()
            },
        }),
        FilterOp::Contains => {
            let text = match &filter.value {
                FilterValue::Text(s) => s.clone(),
                FilterValue::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(QueryNode::Wildcard {
                field,
                pattern: format!("*{text}*"),
            })
        }
        FilterOp::Between => match &filter.value {
            FilterValue::Pair(lo, hi) => Some(QueryNode::Range {
                field,
                bounds: RangeBounds {
                    gte: Some(json!(lo)),
                    lte: Some(json!(hi)),
                    ..RangeBounds::default()
                },
            }),
            _ => None,
        },
    }
}

/// Temporal range clause over the index's document timestamp.
fn temporal_clause(temporal: &TemporalInfo, now: DateTime<Utc>) -> Option<QueryNode> {
    if !temporal.has_time_constraint {
        return None;
    }
    let rel = temporal.relative?;
    let window = window_from_relative(rel, now);
    Some(QueryNode::Range {
        field: INDEX_DATE_FIELD.to_string(),
        bounds: RangeBounds {
            gte: Some(json!(window.start.to_rfc3339())),
            lte: Some(json!(window.end.to_rfc3339())),
            ..RangeBounds::default()
        },
    })
}

fn aggregation_to_node(agg: &Aggregation) -> AggNode {
    match agg.func {
        AggregateFn::Count => AggNode::ValueCount {
            field: agg.field.clone(),
        },
        AggregateFn::Sum => AggNode::Sum {
            field: agg.field.clone(),
        },
        AggregateFn::Avg => AggNode::Avg {
            field: agg.field.clone(),
        },
        AggregateFn::Max => AggNode::Max {
            field: agg.field.clone(),
        },
        AggregateFn::Min => AggNode::Min {
            field: agg.field.clone(),
        },
        AggregateFn::GroupBy => AggNode::Terms {
            field: agg.field.clone(),
            size: 100,
        },
    }
}

/// Build the executable request from intermediate parameters.
///
/// `now` anchors the temporal window so translation stays deterministic
/// under test.
pub fn build_request(params: &SearchQueryParams, now: DateTime<Utc>) -> SearchRequest {
    let mut bool_query = BoolQuery::default();

    if !params.search_text.is_empty() {
        bool_query.must.push(QueryNode::MultiMatch {
            query: params.search_text.clone(),
            fields: MULTI_MATCH_FIELDS.iter().map(|f| f.to_string()).collect(),
            match_type: "best_fields".to_string(),
            fuzziness: "AUTO".to_string(),
        });
    }

    for filter in &params.filters {
        match filter_to_clause(filter) {
            Some(clause) => bool_query.filter.push(clause),
            None => debug!(field = %filter.field, "dropping untranslatable search filter"),
        }
    }

    if let Some(clause) = temporal_clause(&params.temporal_info, now) {
        bool_query.filter.push(clause);
    }

    // Without a text clause or filters there is nothing to constrain on.
    let query = if bool_query.must.is_empty()
        && bool_query.filter.is_empty()
        && bool_query.must_not.is_empty()
    {
        QueryNode::MatchAll
    } else {
        QueryNode::Bool(Box::new(bool_query))
    };

    let aggs = params
        .aggregations
        .iter()
        .map(|agg| {
            let name = format!("{}_{}", agg.func.as_str(), agg.field);
            (name, aggregation_to_node(agg))
        })
        .collect();

    SearchRequest {
        query,
        sort: vec![SortSpec {
            field: params.sort_field.clone(),
            order: params.sort_order,
        }],
        aggs,
        size: params.limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn strips_command_words_from_search_text() {
        let intent = NormalizedIntent::new(
            "find documents about machine learning",
            QueryIntent::SearchData,
        );
        let params = build_params(&intent);
        assert_eq!(params.search_text, "documents about machine learning");
    }

    #[test]
    fn short_cleaned_phrase_falls_back_to_original() {
        let intent = NormalizedIntent::new("find it", QueryIntent::SearchData);
        let params = build_params(&intent);
        assert_eq!(params.search_text, "find it");
    }

    #[test]
    fn count_intent_zeroes_limit_and_adds_count_agg() {
        let intent = NormalizedIntent::new("how many documents", QueryIntent::CountRecords);
        let params = build_params(&intent);
        assert_eq!(params.limit, 0);
        assert!(params
            .aggregations
            .iter()
            .any(|a| a.func == AggregateFn::Count && a.field == "_id"));
    }

    #[test]
    fn time_analysis_sorts_and_groups_by_date() {
        let intent = NormalizedIntent::new("documents over time", QueryIntent::TimeAnalysis);
        let params = build_params(&intent);
        assert_eq!(params.sort_field, "created_at");
        assert!(params
            .aggregations
            .iter()
            .any(|a| a.func == AggregateFn::GroupBy && a.field == "created_at"));
    }

    #[test]
    fn group_by_gets_keyword_subfield() {
        let intent = NormalizedIntent::new("group by category", QueryIntent::AggregateData)
            .with_aggregations(vec![Aggregation::new(AggregateFn::GroupBy, "category")]);
        let params = build_params(&intent);
        assert_eq!(params.aggregations[0].field, "category.keyword");
    }

    #[test]
    fn between_filter_renders_two_sided_range() {
        let filter = Filter::new("price", FilterOp::Between, FilterValue::Pair(10.0, 50.0));
        let clause = filter_to_clause(&filter).unwrap();
        assert_eq!(
            clause.to_value(),
            json!({ "range": { "price": { "gte": 10.0, "lte": 50.0 } } })
        );
    }

    #[test]
    fn negated_term_lands_in_must_not() {
        let filter = Filter::new(
            "status",
            FilterOp::IsNot,
            FilterValue::Text("draft".to_string()),
        );
        let clause = filter_to_clause(&filter).unwrap();
        assert_eq!(
            clause.to_value(),
            json!({ "bool": {
                "must": [], "filter": [], "should": [],
                "must_not": [ { "term": { "status": "draft" } } ],
            }})
        );
    }

    #[test]
    fn contains_maps_to_wildcard() {
        let filter = Filter::new(
            "title",
            FilterOp::Contains,
            FilterValue::Text("rust".to_string()),
        );
        assert_eq!(
            filter_to_clause(&filter).unwrap().to_value(),
            json!({ "wildcard": { "title": "*rust*" } })
        );
    }

    #[test]
    fn between_without_pair_is_dropped() {
        let filter = Filter::new(
            "price",
            FilterOp::Between,
            FilterValue::Text("cheap".to_string()),
        );
        assert!(filter_to_clause(&filter).is_none());
    }

    #[test]
    fn empty_params_produce_match_all() {
        let intent = NormalizedIntent::new("", QueryIntent::SearchData);
        let mut params = build_params(&intent);
        params.search_text = String::new();
        let request = build_request(&params, fixed_now());
        assert_eq!(request.query, QueryNode::MatchAll);
    }

    #[test]
    fn full_request_shape() {
        let intent = NormalizedIntent::new(
            "find documents about machine learning",
            QueryIntent::SearchData,
        )
        .with_filters(vec![Filter::new(
            "views",
            FilterOp::Gte,
            FilterValue::Number(100.0),
        )]);
        let params = build_params(&intent);
        let request = build_request(&params, fixed_now());
        let body = request.to_value();

        assert_eq!(
            body["query"]["bool"]["must"][0]["multi_match"]["fields"][0],
            "title^3"
        );
        assert_eq!(
            body["query"]["bool"]["filter"][0],
            json!({ "range": { "views": { "gte": 100.0 } } })
        );
        assert_eq!(body["sort"][0], json!({ "_score": { "order": "desc" } }));
        assert_eq!(body["size"], 50);
    }

    #[test]
    fn relative_window_becomes_range_filter() {
        use crate::intent::{RelativeTime, TemporalInfo};
        let intent = NormalizedIntent::new("documents from last week", QueryIntent::SearchData)
            .with_temporal(TemporalInfo::relative(RelativeTime::Days(-7), "last week"));
        let params = build_params(&intent);
        let request = build_request(&params, fixed_now());
        let body = request.to_value();
        let range = &body["query"]["bool"]["filter"][0]["range"]["created_at"];
        assert_eq!(range["gte"], "2024-06-08T12:00:00+00:00");
        assert_eq!(range["lte"], "2024-06-15T12:00:00+00:00");
    }
}
