//! crossquery - intent-driven query federation
//!
//! Takes a `NormalizedIntent` produced by an upstream NLU stage, decides
//! which of two backends to query (a full-text search engine and a
//! relational store), translates the intent into each backend's native query
//! representation, executes both concurrently where warranted, and merges
//! the heterogeneous result sets into one unified, explainable response.
//!
//! The crate never talks to a real backend itself: execution happens behind
//! the [`backend::SearchBackend`] and [`backend::SqlBackend`] traits.

pub mod backend;
pub mod config;
pub mod error;
pub mod intent;
pub mod merger;
pub mod pipeline;
pub mod router;
pub mod scoring;
pub mod search_translator;
pub mod sql_translator;
pub mod time;

pub use backend::{Backend, SearchBackend, SourceResult, SqlBackend};
pub use config::PipelineConfig;
pub use error::{CrossQueryError, Result};
pub use intent::{NormalizedIntent, QueryIntent};
pub use merger::{MergedResult, Merger, SourceResults};
pub use pipeline::{PipelineResponse, QueryPipeline};
pub use router::{Router, RoutingDecision};
