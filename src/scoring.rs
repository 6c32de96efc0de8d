//! Confidence scoring between the two backends.
//!
//! Each backend has an affinity profile: keyword and operation-phrase lists,
//! entity affinities, free-text phrase patterns, and structural bonuses. The
//! scorer is a pure function over an intent and a profile; identical input
//! always yields the identical score. All rule tables live here as data so
//! individual entries are testable without touching control flow.

use lazy_static::lazy_static;
use regex::Regex;

use crate::backend::Backend;
use crate::intent::{NormalizedIntent, QueryIntent};

/// Clamp a score or relevance value into [0, 1].
///
/// Every scoring site in the crate goes through this single clamp.
pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Base affinity of each intent label toward the two backends.
/// Order: (intent, search affinity, sql affinity).
const INTENT_AFFINITY: &[(QueryIntent, f64, f64)] = &[
    (QueryIntent::SearchData, 0.8, 0.3),
    (QueryIntent::CountRecords, 0.4, 0.9),
    (QueryIntent::AggregateData, 0.2, 0.95),
    (QueryIntent::FilterData, 0.7, 0.8),
    (QueryIntent::TimeAnalysis, 0.6, 0.8),
    (QueryIntent::CompareData, 0.5, 0.7),
    (QueryIntent::GetSchema, 0.3, 0.9),
    (QueryIntent::TrendAnalysis, 0.6, 0.9),
    (QueryIntent::StatisticalAnalysis, 0.3, 0.95),
];

/// Weight of the intent-affinity contribution.
const AFFINITY_WEIGHT: f64 = 0.4;

/// Per-hit keyword contribution, capped at `KEYWORD_CAP`.
const KEYWORD_HIT: f64 = 0.1;
const KEYWORD_CAP: f64 = 0.3;

/// Per-hit operation-phrase contribution, capped at `OPERATION_CAP`.
const OPERATION_HIT: f64 = 0.15;
const OPERATION_CAP: f64 = 0.2;

/// Entity contributions: label matches are weaker than text matches.
const ENTITY_LABEL_HIT: f64 = 0.05;
const ENTITY_TEXT_HIT: f64 = 0.1;
const ENTITY_CAP: f64 = 0.1;

/// Affinity profile of one backend.
pub struct BackendProfile {
    pub backend: Backend,

    /// Substrings of the raw query that indicate this backend.
    pub keywords: &'static [&'static str],

    /// Operation phrasings ("full-text", "group by") indicating this backend.
    pub operations: &'static [&'static str],

    /// NER labels whose presence weakly favors this backend.
    pub entity_labels: &'static [&'static str],

    /// Entity-text substrings that strongly favor this backend.
    pub entity_keywords: &'static [&'static str],

    /// Free-text phrase patterns; the bonus applies once on first match.
    pub phrase_patterns: &'static [Regex],

    pub phrase_bonus: f64,

    /// Structural bonus when the intent carries aggregations (sql only).
    pub aggregation_bonus: f64,

    /// Structural bonus when the intent carries filters (sql only).
    pub filter_bonus: f64,
}

lazy_static! {
    static ref SEARCH_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"search for").unwrap(),
        Regex::new(r"find.*containing").unwrap(),
        Regex::new(r"documents about").unwrap(),
        Regex::new(r"articles on").unwrap(),
    ];
    static ref SQL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"how many").unwrap(),
        Regex::new(r"count.*").unwrap(),
        Regex::new(r"sum of").unwrap(),
        Regex::new(r"average.*").unwrap(),
        Regex::new(r"group by").unwrap(),
        Regex::new(r"total.*").unwrap(),
    ];
    static ref SEARCH_PROFILE_STATIC: BackendProfile = BackendProfile {
        backend: Backend::Search,
        keywords: &[
            "search", "find", "text", "document", "content", "title", "author", "tag",
        ],
        operations: &[
            "full-text", "fuzzy", "match", "similarity", "relevance", "score",
        ],
        entity_labels: &["PERSON", "ORG", "GPE", "WORK_OF_ART"],
        entity_keywords: &["document", "article", "content"],
        phrase_patterns: &SEARCH_PATTERNS,
        phrase_bonus: 0.1,
        aggregation_bonus: 0.0,
        filter_bonus: 0.0,
    };
    static ref SQL_PROFILE_STATIC: BackendProfile = BackendProfile {
        backend: Backend::Sql,
        keywords: &[
            "user", "employee", "product", "order", "customer", "count", "sum", "average",
        ],
        operations: &[
            "aggregate", "group", "join", "calculate", "total", "statistics",
        ],
        entity_labels: &["MONEY", "PERCENT", "QUANTITY", "CARDINAL"],
        entity_keywords: &["user", "product", "order", "customer"],
        phrase_patterns: &SQL_PATTERNS,
        phrase_bonus: 0.15,
        aggregation_bonus: 0.3,
        filter_bonus: 0.1,
    };
}

/// Built-in profile for the search engine.
pub fn search_profile() -> &'static BackendProfile {
    &SEARCH_PROFILE_STATIC
}

/// Built-in profile for the relational store.
pub fn sql_profile() -> &'static BackendProfile {
    &SQL_PROFILE_STATIC
}

/// Base affinity of an intent toward a backend. Intents missing from the
/// table contribute zero, not an error.
fn base_affinity(intent: QueryIntent, backend: Backend) -> f64 {
    INTENT_AFFINITY
        .iter()
        .find(|(i, _, _)| *i == intent)
        .map(|(_, search, sql)| match backend {
            Backend::Search => *search,
            Backend::Sql => *sql,
        })
        .unwrap_or(0.0)
}

/// Score an intent against one backend's profile. Pure and deterministic;
/// the result is always in [0, 1].
pub fn score(intent: &NormalizedIntent, profile: &BackendProfile) -> f64 {
    let query = intent.original_query.to_lowercase();

    let mut total = base_affinity(intent.intent, profile.backend) * AFFINITY_WEIGHT;

    let keyword_hits = profile
        .keywords
        .iter()
        .filter(|k| query.contains(*k))
        .count() as f64;
    total += (keyword_hits * KEYWORD_HIT).min(KEYWORD_CAP);

    let operation_hits = profile
        .operations
        .iter()
        .filter(|op| query.contains(*op))
        .count() as f64;
    total += (operation_hits * OPERATION_HIT).min(OPERATION_CAP);

    let mut entity_score = 0.0;
    for entity in &intent.entities {
        let text = entity.text.to_lowercase();
        if profile.entity_labels.contains(&entity.label.as_str()) {
            entity_score += ENTITY_LABEL_HIT;
        } else if profile.entity_keywords.iter().any(|k| text.contains(k)) {
            entity_score += ENTITY_TEXT_HIT;
        }
    }
    total += entity_score.min(ENTITY_CAP);

    if profile.phrase_patterns.iter().any(|p| p.is_match(&query)) {
        total += profile.phrase_bonus;
    }

    if profile.aggregation_bonus > 0.0 && !intent.aggregations.is_empty() {
        total += profile.aggregation_bonus;
    }
    if profile.filter_bonus > 0.0 && !intent.filters.is_empty() {
        total += profile.filter_bonus;
    }

    clamp_score(total)
}
