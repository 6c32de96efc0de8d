//! Result merging - heterogeneous source results into one response
//!
//! Dispatches on the intent label to one of six strategies; intents without
//! a dedicated strategy fall back to the search-results strategy. Search-hit
//! relevance passes through, relational rows get a computed relevance, and
//! every merged result carries a metadata block and a human-readable summary.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::backend::{AggregationValue, Backend, Record, SourceResult};
use crate::intent::{Filter, NormalizedIntent, QueryIntent, TemporalInfo};
use crate::scoring::clamp_score;

/// Record fields recognized as timestamps, in probing order.
const DATE_FIELDS: &[&str] = &["created_at", "updated_at", "order_date", "hire_date"];

/// Cap on records returned by the search/filter strategies.
const MAX_MERGED_RESULTS: usize = 20;

/// Sample sizes used by the time-analysis and comparison strategies.
const TIMELINE_SAMPLE: usize = 3;
const COMPARISON_SAMPLE: usize = 5;

/// Base relevance of a relational row before query-term and recency boosts.
const SQL_BASE_RELEVANCE: f64 = 0.5;

/// Results gathered from the two sources. Iteration order is fixed:
/// search first, then sql.
#[derive(Debug, Clone, Default)]
pub struct SourceResults {
    pub search: Option<SourceResult>,
    pub sql: Option<SourceResult>,
}

impl SourceResults {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, result: SourceResult) -> Self {
        self.search = Some(result);
        self
    }

    pub fn with_sql(mut self, result: SourceResult) -> Self {
        self.sql = Some(result);
        self
    }

    /// Present sources in fixed search-then-sql order.
    pub fn iter(&self) -> impl Iterator<Item = (Backend, &SourceResult)> {
        self.search
            .iter()
            .map(|r| (Backend::Search, r))
            .chain(self.sql.iter().map(|r| (Backend::Sql, r)))
    }

    pub fn sources(&self) -> Vec<Backend> {
        self.iter().map(|(backend, _)| backend).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.sql.is_none()
    }
}

/// One record in a merged result, tagged with its origin and relevance.
#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    #[serde(rename = "_source")]
    pub source: Backend,

    #[serde(rename = "_relevance_score")]
    pub relevance: f64,

    #[serde(flatten)]
    pub fields: Record,
}

/// Payload of the search/filter strategies.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMerge {
    pub total_results: u64,
    pub results: Vec<MergedRecord>,
    pub sources: Vec<Backend>,

    /// Per-source aggregation maps, keyed by source name.
    pub aggregations: BTreeMap<String, BTreeMap<String, AggregationValue>>,

    /// Generated SQL text when the relational source reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    pub truncated: bool,
    pub total_shown: usize,
}

/// Payload of the count strategy.
#[derive(Debug, Clone, Serialize)]
pub struct CountMerge {
    pub total_count: u64,
    pub breakdown: BTreeMap<String, u64>,
    pub sources: Vec<Backend>,
}

/// Payload of the aggregate strategy.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateMerge {
    /// Per-source aggregation values, keyed by source name.
    pub aggregations: BTreeMap<String, BTreeMap<String, AggregationValue>>,
    pub sources: Vec<Backend>,

    /// Raw relational rows backing the extracted aggregates.
    pub details: Vec<Record>,
}

/// Per-source slice kept by the time-analysis strategy.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSlice {
    pub count: u64,
    pub results: Vec<Record>,
}

/// One day of the relational timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineBucket {
    pub date: NaiveDate,
    pub count: usize,
    pub items: Vec<Record>,
}

/// Payload of the time-analysis strategy.
#[derive(Debug, Clone, Serialize)]
pub struct TimeMerge {
    pub time_period: TemporalInfo,
    pub results_by_source: BTreeMap<String, SourceSlice>,
    pub timeline: Vec<TimelineBucket>,
    pub total_results: u64,
}

/// One side of a comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonSide {
    pub total_records: u64,
    pub sample_data: Vec<Record>,
}

/// Comparison metrics, present when both sources reported.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMetrics {
    pub search_total: u64,
    pub sql_total: u64,
    pub difference: u64,

    /// search total divided by sql total; infinite when sql reported zero.
    pub ratio: f64,
}

/// Payload of the comparison strategy.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMerge {
    pub comparison_data: BTreeMap<String, ComparisonSide>,
    pub sources: Vec<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ComparisonMetrics>,
}

/// Strategy-specific payload; the tag mirrors the intent family.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MergedPayload {
    SearchResults(SearchMerge),
    FilterResults {
        #[serde(flatten)]
        base: SearchMerge,
        applied_filters: Vec<Filter>,
    },
    CountResults(CountMerge),
    AggregateResults(AggregateMerge),
    TimeAnalysis(TimeMerge),
    ComparisonResults(ComparisonMerge),
}

/// Summary of the query that produced a merged result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryInfo {
    pub original_query: String,
    pub intent: QueryIntent,
    pub entities_found: usize,
    pub filters_applied: usize,
    pub aggregations_requested: usize,
}

/// Metadata attached to every merged result.
#[derive(Debug, Clone, Serialize)]
pub struct MergeMetadata {
    pub query_info: QueryInfo,
    pub sources_queried: Vec<Backend>,
    pub result_counts: BTreeMap<String, u64>,
    pub processing_time: String,
}

/// Terminal value of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct MergedResult {
    #[serde(flatten)]
    pub payload: MergedPayload,
    pub metadata: MergeMetadata,
    pub summary: String,
}

impl MergedResult {
    /// Total record/count figure of the payload, whichever form it takes.
    pub fn total(&self) -> u64 {
        match &self.payload {
            MergedPayload::SearchResults(m) => m.total_results,
            MergedPayload::FilterResults { base, .. } => base.total_results,
            MergedPayload::CountResults(m) => m.total_count,
            MergedPayload::AggregateResults(m) => m.details.len() as u64,
            MergedPayload::TimeAnalysis(m) => m.total_results,
            MergedPayload::ComparisonResults(m) => {
                m.comparison_data.values().map(|s| s.total_records).sum()
            }
        }
    }
}

/// Parse a record field into a timestamp. Accepts RFC 3339, bare dates, and
/// the common `YYYY-MM-DDTHH:MM:SS` form without offset.
fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// First recognized date field on a record, with its parsed value.
fn first_date_field(record: &Record) -> Option<(&'static str, DateTime<Utc>)> {
    DATE_FIELDS.iter().find_map(|field| {
        record
            .get(*field)
            .and_then(parse_date_value)
            .map(|ts| (*field, ts))
    })
}

/// Relevance of a relational row: base 0.5, +0.1 per query term found in any
/// string field, +0.2 when the row's date field is under 30 days old, +0.1
/// under 90 days, clamped to [0, 1].
fn sql_relevance(record: &Record, intent: &NormalizedIntent, now: DateTime<Utc>) -> f64 {
    let mut relevance = SQL_BASE_RELEVANCE;

    let query = intent.original_query.to_lowercase();
    for term in query.split_whitespace() {
        let hit = record.values().any(|value| {
            value
                .as_str()
                .map(|s| s.to_lowercase().contains(term))
                .unwrap_or(false)
        });
        if hit {
            relevance += 0.1;
        }
    }

    if let Some((_, ts)) = first_date_field(record) {
        let days_old = (now - ts).num_days();
        if (0..30).contains(&days_old) {
            relevance += 0.2;
        } else if (30..90).contains(&days_old) {
            relevance += 0.1;
        }
    }

    clamp_score(relevance)
}

/// Native relevance reported by the search engine, if any.
fn search_relevance(record: &Record) -> f64 {
    record
        .get("_score")
        .and_then(Value::as_f64)
        .map(clamp_score)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone)]
pub struct Merger {
    max_results: usize,
}

impl Default for Merger {
    fn default() -> Self {
        Self::new()
    }
}

impl Merger {
    pub fn new() -> Self {
        Self {
            max_results: MAX_MERGED_RESULTS,
        }
    }

    pub fn with_max_results(max_results: usize) -> Self {
        Self { max_results }
    }

    /// Merge at the current instant.
    pub fn merge(&self, results: &SourceResults, intent: &NormalizedIntent) -> MergedResult {
        self.merge_at(results, intent, Utc::now())
    }

    /// Merge with an explicit `now`, keeping relevance and timestamps
    /// deterministic under test.
    pub fn merge_at(
        &self,
        results: &SourceResults,
        intent: &NormalizedIntent,
        now: DateTime<Utc>,
    ) -> MergedResult {
        let payload = match intent.intent {
            QueryIntent::CountRecords => self.merge_counts(results),
            QueryIntent::AggregateData => self.merge_aggregates(results),
            QueryIntent::FilterData => MergedPayload::FilterResults {
                base: self.merge_search(results, intent, now),
                applied_filters: intent.filters.clone(),
            },
            QueryIntent::TimeAnalysis => self.merge_time_analysis(results, intent),
            QueryIntent::CompareData => self.merge_comparison(results),
            // search_data and everything without a dedicated strategy
            other => {
                if other != QueryIntent::SearchData {
                    debug!(intent = other.as_str(), "no merge strategy, using search");
                }
                MergedPayload::SearchResults(self.merge_search(results, intent, now))
            }
        };

        let summary = summarize(&payload);
        let metadata = build_metadata(results, intent, now);

        MergedResult {
            payload,
            metadata,
            summary,
        }
    }

    fn merge_search(
        &self,
        results: &SourceResults,
        intent: &NormalizedIntent,
        now: DateTime<Utc>,
    ) -> SearchMerge {
        let mut merged = SearchMerge {
            total_results: 0,
            results: Vec::new(),
            sources: results.sources(),
            aggregations: BTreeMap::new(),
            sql_query: None,
            truncated: false,
            total_shown: 0,
        };

        if let Some(search) = &results.search {
            merged.total_results += search.total_results;
            for record in &search.results {
                merged.results.push(MergedRecord {
                    source: Backend::Search,
                    relevance: search_relevance(record),
                    fields: record.clone(),
                });
            }
            if !search.aggregations.is_empty() {
                merged
                    .aggregations
                    .insert(Backend::Search.to_string(), search.aggregations.clone());
            }
        }

        if let Some(sql) = &results.sql {
            merged.total_results += sql.total_results;
            for record in &sql.results {
                merged.results.push(MergedRecord {
                    source: Backend::Sql,
                    relevance: sql_relevance(record, intent, now),
                    fields: record.clone(),
                });
            }
            merged.sql_query = sql
                .query_info
                .get("sql_query")
                .and_then(Value::as_str)
                .map(String::from);
        }

        // Mixed origins need a common order; single-source results keep the
        // backend's own ranking.
        if merged.sources.len() > 1 {
            merged
                .results
                .sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        }

        if merged.results.len() > self.max_results {
            merged.results.truncate(self.max_results);
            merged.truncated = true;
        }
        merged.total_shown = merged.results.len();

        merged
    }

    fn merge_counts(&self, results: &SourceResults) -> MergedPayload {
        let mut merged = CountMerge {
            total_count: 0,
            breakdown: BTreeMap::new(),
            sources: results.sources(),
        };

        if let Some(search) = &results.search {
            merged
                .breakdown
                .insert(Backend::Search.to_string(), search.total_results);
            merged.total_count += search.total_results;
        }

        if let Some(sql) = &results.sql {
            // A count_-prefixed projection is authoritative over the raw
            // row count.
            let mut count = sql.total_results;
            'rows: for record in &sql.results {
                for (key, value) in record {
                    if key.starts_with("count_") {
                        let n = value
                            .as_u64()
                            .or_else(|| value.as_f64().map(|f| f as u64));
                        if let Some(n) = n {
                            count = n;
                            break 'rows;
                        }
                    }
                }
            }
            merged.breakdown.insert(Backend::Sql.to_string(), count);
            merged.total_count += count;
        }

        MergedPayload::CountResults(merged)
    }

    fn merge_aggregates(&self, results: &SourceResults) -> MergedPayload {
        let mut merged = AggregateMerge {
            aggregations: BTreeMap::new(),
            sources: Vec::new(),
            details: Vec::new(),
        };

        if let Some(search) = &results.search {
            if !search.aggregations.is_empty() {
                merged
                    .aggregations
                    .insert(Backend::Search.to_string(), search.aggregations.clone());
                merged.sources.push(Backend::Search);
            }
        }

        if let Some(sql) = &results.sql {
            let mut extracted: BTreeMap<String, AggregationValue> = BTreeMap::new();
            for record in &sql.results {
                for (key, value) in record {
                    let is_aggregate = ["sum_", "avg_", "max_", "min_", "count_"]
                        .iter()
                        .any(|prefix| key.starts_with(prefix));
                    if is_aggregate {
                        extracted.insert(key.clone(), AggregationValue::Scalar(value.clone()));
                    }
                }
            }
            if !extracted.is_empty() {
                merged
                    .aggregations
                    .insert(Backend::Sql.to_string(), extracted);
                merged.sources.push(Backend::Sql);
                merged.details = sql.results.clone();
            }
        }

        MergedPayload::AggregateResults(merged)
    }

    fn merge_time_analysis(
        &self,
        results: &SourceResults,
        intent: &NormalizedIntent,
    ) -> MergedPayload {
        let mut merged = TimeMerge {
            time_period: intent.temporal_info.clone(),
            results_by_source: BTreeMap::new(),
            timeline: Vec::new(),
            total_results: 0,
        };

        for (backend, result) in results.iter() {
            merged.results_by_source.insert(
                backend.to_string(),
                SourceSlice {
                    count: result.total_results,
                    results: result.results.clone(),
                },
            );
            merged.total_results += result.total_results;
        }

        if let Some(sql) = &results.sql {
            merged.timeline = build_timeline(&sql.results);
        }

        MergedPayload::TimeAnalysis(merged)
    }

    fn merge_comparison(&self, results: &SourceResults) -> MergedPayload {
        let mut merged = ComparisonMerge {
            comparison_data: BTreeMap::new(),
            sources: results.sources(),
            metrics: None,
        };

        for (backend, result) in results.iter() {
            merged.comparison_data.insert(
                backend.to_string(),
                ComparisonSide {
                    total_records: result.total_results,
                    sample_data: result
                        .results
                        .iter()
                        .take(COMPARISON_SAMPLE)
                        .cloned()
                        .collect(),
                },
            );
        }

        if let (Some(search), Some(sql)) = (&results.search, &results.sql) {
            let ratio = if sql.total_results > 0 {
                search.total_results as f64 / sql.total_results as f64
            } else {
                f64::INFINITY
            };
            merged.metrics = Some(ComparisonMetrics {
                search_total: search.total_results,
                sql_total: sql.total_results,
                difference: search.total_results.abs_diff(sql.total_results),
                ratio,
            });
        }

        MergedPayload::ComparisonResults(merged)
    }
}

/// Group relational rows by the date portion of their first recognized date
/// field, chronologically, keeping a few sample items per day.
fn build_timeline(records: &[Record]) -> Vec<TimelineBucket> {
    let mut by_date: BTreeMap<NaiveDate, Vec<Record>> = BTreeMap::new();
    for record in records {
        if let Some((_, ts)) = first_date_field(record) {
            by_date.entry(ts.date_naive()).or_default().push(record.clone());
        }
    }

    by_date
        .into_iter()
        .map(|(date, items)| TimelineBucket {
            date,
            count: items.len(),
            items: items.into_iter().take(TIMELINE_SAMPLE).collect(),
        })
        .collect()
}

fn build_metadata(
    results: &SourceResults,
    intent: &NormalizedIntent,
    now: DateTime<Utc>,
) -> MergeMetadata {
    let result_counts = results
        .iter()
        .map(|(backend, result)| (backend.to_string(), result.total_results))
        .collect();

    MergeMetadata {
        query_info: QueryInfo {
            original_query: intent.original_query.clone(),
            intent: intent.intent,
            entities_found: intent.entities.len(),
            filters_applied: intent.filters.len(),
            aggregations_requested: intent.aggregations.len(),
        },
        sources_queried: results.sources(),
        result_counts,
        processing_time: now.to_rfc3339(),
    }
}

/// Intent-specific one- or two-sentence summary.
fn summarize(payload: &MergedPayload) -> String {
    match payload {
        MergedPayload::SearchResults(m) | MergedPayload::FilterResults { base: m, .. } => {
            let mut summary = format!("Found {} total results", m.total_results);
            if m.sources.len() > 1 {
                summary.push_str(&format!(" across {} data sources", m.sources.len()));
            }
            if (m.total_shown as u64) < m.total_results {
                summary.push_str(&format!(", showing top {}", m.total_shown));
            }
            summary
        }
        MergedPayload::CountResults(m) => {
            let mut summary = format!("Total count: {}", m.total_count);
            if m.breakdown.len() > 1 {
                let details = m
                    .breakdown
                    .iter()
                    .map(|(source, count)| format!("{source}: {count}"))
                    .join(", ");
                summary.push_str(&format!(" ({details})"));
            }
            summary
        }
        MergedPayload::AggregateResults(m) => {
            format!("Aggregation results from {} source(s)", m.aggregations.len())
        }
        MergedPayload::TimeAnalysis(m) => {
            let mut summary = format!("Time analysis: {} records", m.total_results);
            if !m.time_period.expressions.is_empty() {
                summary.push_str(&format!(" for {}", m.time_period.expressions.iter().join(", ")));
            }
            summary
        }
        MergedPayload::ComparisonResults(_) => "Query processed successfully".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{FilterOp, FilterValue, RelativeTime};
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn search_result(total: u64, records: Vec<Record>) -> SourceResult {
        SourceResult {
            source: Backend::Search,
            total_results: total,
            results: records,
            aggregations: BTreeMap::new(),
            query_info: BTreeMap::new(),
        }
    }

    fn sql_result(total: u64, records: Vec<Record>) -> SourceResult {
        SourceResult {
            source: Backend::Sql,
            total_results: total,
            results: records,
            aggregations: BTreeMap::new(),
            query_info: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_results_still_summarize() {
        let intent = NormalizedIntent::new("anything", QueryIntent::SearchData);
        let merged = Merger::new().merge_at(&SourceResults::empty(), &intent, fixed_now());
        assert_eq!(merged.total(), 0);
        assert!(!merged.summary.is_empty());
        assert!(merged.metadata.sources_queried.is_empty());
    }

    #[test]
    fn empty_count_merge_is_zero_with_summary() {
        let intent = NormalizedIntent::new("how many", QueryIntent::CountRecords);
        let merged = Merger::new().merge_at(&SourceResults::empty(), &intent, fixed_now());
        assert_eq!(merged.total(), 0);
        assert_eq!(merged.summary, "Total count: 0");
    }

    #[test]
    fn count_prefix_overrides_row_count() {
        let intent = NormalizedIntent::new("how many users", QueryIntent::CountRecords);
        let results = SourceResults::empty()
            .with_sql(sql_result(5, vec![record(&[("count_all", json!(5))])]));
        let merged = Merger::new().merge_at(&results, &intent, fixed_now());

        match &merged.payload {
            MergedPayload::CountResults(m) => {
                assert_eq!(m.total_count, 5);
                assert_eq!(m.breakdown.get("sql"), Some(&5));
            }
            other => panic!("expected count payload, got {other:?}"),
        }
        assert_eq!(merged.summary, "Total count: 5");
    }

    #[test]
    fn mixed_sources_sort_by_relevance_descending() {
        let intent = NormalizedIntent::new(
            "find documents about machine learning",
            QueryIntent::SearchData,
        );
        let results = SourceResults::empty()
            .with_search(search_result(
                2,
                vec![
                    record(&[("title", json!("intro")), ("_score", json!(0.9))]),
                    record(&[("title", json!("advanced")), ("_score", json!(0.4))]),
                ],
            ))
            .with_sql(sql_result(
                1,
                vec![record(&[("full_name", json!("machine learning lead"))])],
            ));
        let merged = Merger::new().merge_at(&results, &intent, fixed_now());

        match &merged.payload {
            MergedPayload::SearchResults(m) => {
                assert_eq!(m.sources, vec![Backend::Search, Backend::Sql]);
                assert!(!m.truncated);
                let scores: Vec<f64> = m.results.iter().map(|r| r.relevance).collect();
                let mut sorted = scores.clone();
                sorted.sort_by(|a, b| b.total_cmp(a));
                assert_eq!(scores, sorted);
            }
            other => panic!("expected search payload, got {other:?}"),
        }
    }

    #[test]
    fn truncation_at_cap() {
        let intent = NormalizedIntent::new("find things", QueryIntent::SearchData);
        let many: Vec<Record> = (0..25)
            .map(|i| record(&[("title", json!(format!("doc {i}"))), ("_score", json!(0.5))]))
            .collect();
        let results = SourceResults::empty()
            .with_search(search_result(25, many))
            .with_sql(sql_result(0, vec![]));
        let merged = Merger::new().merge_at(&results, &intent, fixed_now());
        match &merged.payload {
            MergedPayload::SearchResults(m) => {
                assert!(m.truncated);
                assert_eq!(m.total_shown, 20);
                assert_eq!(m.total_results, 25);
            }
            other => panic!("expected search payload, got {other:?}"),
        }
        assert_eq!(merged.summary, "Found 25 total results across 2 data sources, showing top 20");
    }

    #[test]
    fn sql_relevance_respects_bounds_and_boosts() {
        let intent = NormalizedIntent::new("machine learning", QueryIntent::SearchData);
        let recent = record(&[
            ("title", json!("machine learning rollout")),
            ("created_at", json!("2024-06-10T00:00:00Z")),
        ]);
        // base 0.5 + 2 terms * 0.1 + recency 0.2
        let score = sql_relevance(&recent, &intent, fixed_now());
        assert!((score - 0.9).abs() < 1e-9, "score={score}");

        let stale = record(&[("created_at", json!("2019-01-01T00:00:00Z"))]);
        assert!((sql_relevance(&stale, &intent, fixed_now()) - 0.5).abs() < 1e-9);

        let loaded = record(&[
            ("a", json!("machine learning")),
            ("b", json!("machine learning")),
            ("c", json!("machine learning machine learning machine")),
            ("created_at", json!("2024-06-14T00:00:00Z")),
        ]);
        let capped = sql_relevance(&loaded, &intent, fixed_now());
        assert!((0.0..=1.0).contains(&capped));
    }

    #[test]
    fn filter_strategy_attaches_applied_filters() {
        let intent = NormalizedIntent::new("products under 50", QueryIntent::FilterData)
            .with_filters(vec![Filter::new(
                "price",
                FilterOp::Lt,
                FilterValue::Number(50.0),
            )]);
        let merged =
            Merger::new().merge_at(&SourceResults::empty(), &intent, fixed_now());
        match &merged.payload {
            MergedPayload::FilterResults {
                applied_filters, ..
            } => {
                assert_eq!(applied_filters.len(), 1);
                assert_eq!(applied_filters[0].field, "price");
            }
            other => panic!("expected filter payload, got {other:?}"),
        }
    }

    #[test]
    fn aggregate_strategy_extracts_prefixed_fields() {
        let intent = NormalizedIntent::new("average salary", QueryIntent::AggregateData);
        let results = SourceResults::empty().with_sql(sql_result(
            1,
            vec![record(&[
                ("avg_salary", json!(81000.0)),
                ("department", json!("Engineering")),
            ])],
        ));
        let merged = Merger::new().merge_at(&results, &intent, fixed_now());
        match &merged.payload {
            MergedPayload::AggregateResults(m) => {
                let sql_aggs = m.aggregations.get("sql").expect("sql aggregations");
                assert_eq!(
                    sql_aggs.get("avg_salary"),
                    Some(&AggregationValue::Scalar(json!(81000.0)))
                );
                assert!(!sql_aggs.contains_key("department"));
                assert_eq!(m.details.len(), 1);
            }
            other => panic!("expected aggregate payload, got {other:?}"),
        }
        assert_eq!(merged.summary, "Aggregation results from 1 source(s)");
    }

    #[test]
    fn timeline_groups_by_day_chronologically() {
        let rows = vec![
            record(&[("order_date", json!("2024-06-02T09:00:00Z")), ("id", json!(2))]),
            record(&[("order_date", json!("2024-06-01T10:00:00Z")), ("id", json!(1))]),
            record(&[("order_date", json!("2024-06-02T17:00:00Z")), ("id", json!(3))]),
            record(&[("note", json!("no date here"))]),
        ];
        let timeline = build_timeline(&rows);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].date.to_string(), "2024-06-01");
        assert_eq!(timeline[1].date.to_string(), "2024-06-02");
        assert_eq!(timeline[1].count, 2);
    }

    #[test]
    fn time_analysis_carries_sources_and_timeline() {
        let intent = NormalizedIntent::new("orders this week", QueryIntent::TimeAnalysis)
            .with_temporal(TemporalInfo::relative(RelativeTime::Days(-7), "this week"));
        let results = SourceResults::empty().with_sql(sql_result(
            2,
            vec![
                record(&[("order_date", json!("2024-06-12T00:00:00Z"))]),
                record(&[("order_date", json!("2024-06-13T00:00:00Z"))]),
            ],
        ));
        let merged = Merger::new().merge_at(&results, &intent, fixed_now());
        match &merged.payload {
            MergedPayload::TimeAnalysis(m) => {
                assert_eq!(m.total_results, 2);
                assert_eq!(m.timeline.len(), 2);
                assert!(m.results_by_source.contains_key("sql"));
            }
            other => panic!("expected time payload, got {other:?}"),
        }
        assert_eq!(merged.summary, "Time analysis: 2 records for this week");
    }

    #[test]
    fn comparison_metrics_need_both_sources() {
        let intent = NormalizedIntent::new("compare", QueryIntent::CompareData);
        let one_sided = SourceResults::empty().with_search(search_result(4, vec![]));
        let merged = Merger::new().merge_at(&one_sided, &intent, fixed_now());
        match &merged.payload {
            MergedPayload::ComparisonResults(m) => assert!(m.metrics.is_none()),
            other => panic!("expected comparison payload, got {other:?}"),
        }

        let both = SourceResults::empty()
            .with_search(search_result(6, vec![]))
            .with_sql(sql_result(0, vec![]));
        let merged = Merger::new().merge_at(&both, &intent, fixed_now());
        match &merged.payload {
            MergedPayload::ComparisonResults(m) => {
                let metrics = m.metrics.as_ref().expect("metrics");
                assert_eq!(metrics.difference, 6);
                assert!(metrics.ratio.is_infinite());
            }
            other => panic!("expected comparison payload, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_intents_fall_back_to_search_strategy() {
        for intent_kind in [
            QueryIntent::GetSchema,
            QueryIntent::TrendAnalysis,
            QueryIntent::StatisticalAnalysis,
        ] {
            let intent = NormalizedIntent::new("whatever", intent_kind);
            let merged =
                Merger::new().merge_at(&SourceResults::empty(), &intent, fixed_now());
            assert!(matches!(merged.payload, MergedPayload::SearchResults(_)));
        }
    }

    #[test]
    fn metadata_counts_inputs_and_sources() {
        let intent = NormalizedIntent::new("find users", QueryIntent::SearchData)
            .with_filters(vec![Filter::new(
                "department",
                FilterOp::Eq,
                FilterValue::Text("HR".to_string()),
            )]);
        let results = SourceResults::empty()
            .with_search(search_result(3, vec![]))
            .with_sql(sql_result(2, vec![]));
        let merged = Merger::new().merge_at(&results, &intent, fixed_now());
        assert_eq!(
            merged.metadata.sources_queried,
            vec![Backend::Search, Backend::Sql]
        );
        assert_eq!(merged.metadata.result_counts.get("search"), Some(&3));
        assert_eq!(merged.metadata.result_counts.get("sql"), Some(&2));
        assert_eq!(merged.metadata.query_info.filters_applied, 1);
        assert_eq!(merged.metadata.processing_time, fixed_now().to_rfc3339());
    }

    #[test]
    fn merged_record_serializes_with_underscore_keys() {
        let rec = MergedRecord {
            source: Backend::Sql,
            relevance: 0.75,
            fields: record(&[("id", json!(1))]),
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["_source"], "sql");
        assert_eq!(value["_relevance_score"], 0.75);
        assert_eq!(value["id"], 1);
    }
}
