//! Routing policy - which backend(s) answer this intent
//!
//! The router scores the intent against both backend profiles, enables each
//! backend whose score clears the threshold, and picks the primary source.
//! When neither clears the threshold it queries both; the pipeline never
//! answers from zero backends. The router only decides and translates -
//! execution belongs to the caller.

use serde::Serialize;
use tracing::info;

use crate::backend::Backend;
use crate::intent::NormalizedIntent;
use crate::scoring::{score, search_profile, sql_profile};
use crate::search_translator::{self, SearchQueryParams};
use crate::sql_translator::{self, SqlQueryParams};

/// Minimum confidence for a backend to be selected on its own merit.
pub const CONFIDENCE_THRESHOLD: f64 = 0.4;

/// Confidence of each backend for one intent.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfidenceScores {
    pub search: f64,
    pub sql: f64,
}

/// Routing outcome for one request. Constructed once, never mutated after.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub use_search: bool,
    pub use_sql: bool,

    /// Backend with the strictly higher score; ties resolve to sql.
    pub primary_source: Backend,

    pub confidence: ConfidenceScores,

    pub search_query: Option<SearchQueryParams>,
    pub sql_query: Option<SqlQueryParams>,

    /// Human-readable trail of why this decision was made; never empty
    /// once the decision is finalized.
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Router {
    threshold: f64,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Decide which backends to query and translate the intent for each
    /// enabled one.
    pub fn route(&self, intent: &NormalizedIntent) -> RoutingDecision {
        let search_score = score(intent, search_profile());
        let sql_score = score(intent, sql_profile());

        let mut decision = RoutingDecision {
            use_search: false,
            use_sql: false,
            primary_source: if search_score > sql_score {
                Backend::Search
            } else {
                Backend::Sql
            },
            confidence: ConfidenceScores {
                search: search_score,
                sql: sql_score,
            },
            search_query: None,
            sql_query: None,
            reasoning: Vec::new(),
        };

        if search_score >= self.threshold {
            decision.use_search = true;
            decision
                .reasoning
                .push(format!("search selected (score: {search_score:.2})"));
        }
        if sql_score >= self.threshold {
            decision.use_sql = true;
            decision
                .reasoning
                .push(format!("sql selected (score: {sql_score:.2})"));
        }

        // Below-threshold on both sides: query both rather than nothing.
        if !decision.use_search && !decision.use_sql {
            decision.use_search = true;
            decision.use_sql = true;
            decision
                .reasoning
                .push("low confidence - querying both sources".to_string());
        }

        if decision.use_search {
            decision.search_query = Some(search_translator::build_params(intent));
        }
        if decision.use_sql {
            decision.sql_query = Some(sql_translator::build_params(intent));
        }

        info!(
            intent = intent.intent.as_str(),
            search_score,
            sql_score,
            primary = %decision.primary_source,
            "routing decision"
        );

        decision
    }
}
