//! SQL translation - intent to a single relational statement
//!
//! Mirrors the search side's two layers: `SqlQueryParams` is built at routing
//! time, `SqlStatement` is the assembled query handed to the executor.
//! Assembly order is fixed: SELECT, FROM, JOIN, WHERE, GROUP BY, ORDER BY,
//! LIMIT.
//!
//! Filter and entity values are bound as numbered parameters instead of being
//! interpolated into the statement text. The interpolated form of the source
//! system was injection-prone; `rendered()` reproduces that exact query shape
//! for diagnostics, with string values single-quote escaped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::intent::{
    AggregateFn, Aggregation, Entity, Filter, FilterOp, FilterValue, NormalizedIntent, QueryIntent,
    TemporalInfo,
};
use crate::time::{sql_bound_from_relative, SqlTimeBound};

/// Known tables and the raw-query keywords that select them.
const TABLE_KEYWORDS: &[(&str, &[&str])] = &[
    ("users", &["user", "employee", "person", "staff", "worker"]),
    ("products", &["product", "item", "inventory", "goods"]),
    ("orders", &["order", "purchase", "transaction", "sale"]),
];

const DEFAULT_TABLE: &str = "users";

/// Date column used for temporal predicates, per table.
const TABLE_DATE_FIELDS: &[(&str, &str)] = &[
    ("users", "hire_date"),
    ("products", "created_at"),
    ("orders", "order_date"),
];

/// Tables carrying a soft-delete flag; they get an implicit
/// `is_active = true` predicate.
const SOFT_DELETE_TABLES: &[&str] = &["users", "products"];

/// Default sort per table when the intent does not specify one.
const TABLE_DEFAULT_SORT: &[(&str, &str)] = &[
    ("users", "created_at DESC"),
    ("products", "created_at DESC"),
    ("orders", "order_date DESC"),
];

/// Intermediate SQL parameters produced by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlQueryParams {
    pub intent: QueryIntent,

    pub entities: Vec<Entity>,

    pub filters: Vec<Filter>,

    /// The relational store handles all aggregation types natively.
    pub aggregations: Vec<Aggregation>,

    pub temporal_info: TemporalInfo,

    pub limit: usize,

    pub sort_field: Option<String>,

    pub sort_order: String,

    pub original_query: String,
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

/// Build the intermediate SQL parameters for an intent.
pub fn build_params(intent: &NormalizedIntent) -> SqlQueryParams {
    let mut params = SqlQueryParams {
        intent: intent.intent,
        entities: intent.entities.clone(),
        filters: intent.filters.clone(),
        aggregations: intent.aggregations.clone(),
        temporal_info: intent.temporal_info.clone(),
        limit: intent_limit(intent.intent),
        sort_field: None,
        sort_order: "DESC".to_string(),
        original_query: intent.original_query.clone(),
    };

    if intent.intent == QueryIntent::CountRecords {
        params
            .aggregations
            .push(Aggregation::new(AggregateFn::Count, "*"));
    }

    params
}

/// Bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SqlValue {
    /// Literal form used by `rendered()`. Strings are single-quote escaped,
    /// numbers drop a redundant trailing `.0`.
    fn render(&self) -> String {
        match self {
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// A single executable statement with its bound parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlStatement {
    /// Statement text with `$1`-style placeholders.
    pub text: String,

    pub params: Vec<SqlValue>,

    /// Primary table the statement was built around.
    pub table: String,
}

impl SqlStatement {
    /// Diagnostic form with parameters inlined as literals. Matches the
    /// query shape the source system generated by interpolation; never
    /// execute this form.
    pub fn rendered(&self) -> String {
        let mut out = self.text.clone();
        // Substitute from the highest index down so $10 is not clobbered by $1.
        for (idx, value) in self.params.iter().enumerate().rev() {
            out = out.replace(&format!("${}", idx + 1), &value.render());
        }
        out
    }
}

/// Collects predicates and their bound values while the statement is built.
#[derive(Default)]
struct PredicateSet {
    conditions: Vec<String>,
    params: Vec<SqlValue>,
}

impl PredicateSet {
    /// Register a value and return its placeholder.
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn push(&mut self, condition: String) {
        self.conditions.push(condition);
    }
}

/// Pick the primary table: entity text matching a table name wins, then the
/// first table keyword found in the raw query, then the default.
fn determine_table(entities: &[Entity], original_query: &str) -> String {
    for entity in entities {
        let text = entity.text.to_lowercase();
        if TABLE_KEYWORDS.iter().any(|(table, _)| *table == text) {
            return text;
        }
    }

    let query = original_query.to_lowercase();
    for (table, keywords) in TABLE_KEYWORDS {
        if keywords.iter().any(|k| query.contains(k)) {
            return table.to_string();
        }
    }

    DEFAULT_TABLE.to_string()
}

/// Projection list: aggregate expressions with `<fn>_<field>` aliases, the
/// bare field for group-by entries, `*` otherwise.
fn build_select(aggregations: &[Aggregation]) -> String {
    if aggregations.is_empty() {
        return "*".to_string();
    }

    let parts: Vec<String> = aggregations
        .iter()
        .map(|agg| match agg.func {
            AggregateFn::Count => {
                if agg.field == "*" || agg.field.is_empty() {
                    "COUNT(*) AS count_all".to_string()
                } else {
                    format!("COUNT({0}) AS count_{0}", agg.field)
                }
            }
            AggregateFn::Sum => format!("SUM({0}) AS sum_{0}", agg.field),
            AggregateFn::Avg => format!("AVG({0}) AS avg_{0}", agg.field),
            AggregateFn::Max => format!("MAX({0}) AS max_{0}", agg.field),
            AggregateFn::Min => format!("MIN({0}) AS min_{0}", agg.field),
            AggregateFn::GroupBy => agg.field.clone(),
        })
        .collect();

    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(", ")
    }
}

/// Join heuristic: only the orders table fans out, to users and/or products,
/// when the entities mention them.
fn build_joins(table: &str, entities: &[Entity]) -> Vec<String> {
    let mut joins = Vec::new();
    if table != "orders" {
        return joins;
    }

    let texts: Vec<String> = entities.iter().map(|e| e.text.to_lowercase()).collect();

    if texts
        .iter()
        .any(|t| t.contains("user") || t.contains("employee"))
    {
        joins.push("JOIN users ON orders.user_id = users.id".to_string());
    }
    if texts
        .iter()
        .any(|t| t.contains("product") || t.contains("item"))
    {
        joins.push("JOIN products ON orders.product_id = products.id".to_string());
    }

    joins
}

fn filter_value_to_sql(value: &FilterValue) -> Option<SqlValue> {
    match value {
        FilterValue::Flag(b) => Some(SqlValue::Bool(*b)),
        FilterValue::Number(n) => Some(SqlValue::Number(*n)),
        FilterValue::Text(s) => Some(SqlValue::Text(s.clone())),
        FilterValue::Pair(_, _) => None,
    }
}

/// Translate one filter into a predicate, binding its values. Filters whose
/// operator/value combination has no SQL form are dropped.
fn apply_filter(filter: &Filter, set: &mut PredicateSet) {
    let field = &filter.field;
    let condition = match filter.op {
        FilterOp::Eq | FilterOp::Is => filter_value_to_sql(&filter.value)
            .map(|v| format!("{field} = {}", set.bind(v))),
        FilterOp::NotEq | FilterOp::IsNot => filter_value_to_sql(&filter.value)
            .map(|v| format!("{field} != {}", set.bind(v))),
        FilterOp::Gt => filter_value_to_sql(&filter.value)
            .map(|v| format!("{field} > {}", set.bind(v))),
        FilterOp::Gte => filter_value_to_sql(&filter.value)
            .map(|v| format!("{field} >= {}", set.bind(v))),
        FilterOp::Lt => filter_value_to_sql(&filter.value)
            .map(|v| format!("{field} < {}", set.bind(v))),
        FilterOp::Lte => filter_value_to_sql(&filter.value)
            .map(|v| format!("{field} <= {}", set.bind(v))),
        FilterOp::Contains => match &filter.value {
            FilterValue::Text(s) => {
                let placeholder = set.bind(SqlValue::Text(format!("%{s}%")));
                Some(format!("{field} ILIKE {placeholder}"))
            }
            FilterValue::Number(n) => {
                let placeholder = set.bind(SqlValue::Text(format!("%{n}%")));
                Some(format!("{field} ILIKE {placeholder}"))
            }
            _ => None,
        },
        FilterOp::Between => match &filter.value {
            FilterValue::Pair(lo, hi) => {
                let lo_ph = set.bind(SqlValue::Number(*lo));
                let hi_ph = set.bind(SqlValue::Number(*hi));
                Some(format!("{field} BETWEEN {lo_ph} AND {hi_ph}"))
            }
            _ => None,
        },
    };

    match condition {
        Some(c) => set.push(c),
        None => debug!(field = %filter.field, "dropping untranslatable sql filter"),
    }
}

fn date_field_for(table: &str) -> Option<&'static str> {
    TABLE_DATE_FIELDS
        .iter()
        .find(|(t, _)| *t == table)
        .map(|(_, field)| *field)
}

/// Temporal predicate from the per-table date-field map.
fn apply_temporal(
    temporal: &TemporalInfo,
    table: &str,
    now: DateTime<Utc>,
    set: &mut PredicateSet,
) {
    if !temporal.has_time_constraint {
        return;
    }
    let Some(rel) = temporal.relative else {
        return;
    };
    let Some(field) = date_field_for(table) else {
        return;
    };

    let condition = match sql_bound_from_relative(rel, now) {
        SqlTimeBound::Today => format!("DATE({field}) = CURRENT_DATE"),
        SqlTimeBound::CurrentMonth => format!(
            "EXTRACT(MONTH FROM {field}) = EXTRACT(MONTH FROM CURRENT_DATE) \
             AND EXTRACT(YEAR FROM {field}) = EXTRACT(YEAR FROM CURRENT_DATE)"
        ),
        SqlTimeBound::CurrentYear => {
            format!("EXTRACT(YEAR FROM {field}) = EXTRACT(YEAR FROM CURRENT_DATE)")
        }
        SqlTimeBound::After(ts) => {
            let placeholder = set.bind(SqlValue::Text(ts.to_rfc3339()));
            format!("{field} >= {placeholder}")
        }
    };
    set.push(condition);
}

/// GROUP BY fields from the group-by aggregations.
fn build_group_by(aggregations: &[Aggregation]) -> Option<String> {
    let fields: Vec<&str> = aggregations
        .iter()
        .filter(|a| a.func == AggregateFn::GroupBy)
        .map(|a| a.field.as_str())
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields.join(", "))
    }
}

fn build_order_by(params: &SqlQueryParams, table: &str) -> String {
    if let Some(ref field) = params.sort_field {
        return format!("{field} {}", params.sort_order);
    }
    TABLE_DEFAULT_SORT
        .iter()
        .find(|(t, _)| *t == table)
        .map(|(_, sort)| sort.to_string())
        .unwrap_or_else(|| "id DESC".to_string())
}

/// Assemble the statement. `now` anchors temporal predicates so the output
/// is deterministic under test.
pub fn build_statement(params: &SqlQueryParams, now: DateTime<Utc>) -> SqlStatement {
    let table = determine_table(&params.entities, &params.original_query);

    let select = build_select(&params.aggregations);
    let joins = build_joins(&table, &params.entities);

    let mut predicates = PredicateSet::default();
    for filter in &params.filters {
        apply_filter(filter, &mut predicates);
    }
    apply_temporal(&params.temporal_info, &table, now, &mut predicates);
    if SOFT_DELETE_TABLES.contains(&table.as_str()) {
        predicates.push(format!("{table}.is_active = true"));
    }

    let mut parts = vec![format!("SELECT {select}"), format!("FROM {table}")];
    parts.extend(joins);
    if !predicates.conditions.is_empty() {
        parts.push(format!("WHERE {}", predicates.conditions.join(" AND ")));
    }
    if let Some(group_by) = build_group_by(&params.aggregations) {
        parts.push(format!("GROUP BY {group_by}"));
    }
    parts.push(format!("ORDER BY {}", build_order_by(params, &table)));
    parts.push(format!("LIMIT {}", params.limit));

    let statement = SqlStatement {
        text: parts.join(" "),
        params: predicates.params,
        table,
    };
    info!(sql = %statement.rendered(), "assembled sql statement");
    statement
}
