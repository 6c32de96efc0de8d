//! Query pipeline - route, fan out, fan in, merge
//!
//! One logical pipeline per incoming intent; no shared mutable state. The
//! two backend executions are independent and dispatched concurrently. A
//! backend failure or timeout surfaces as an absent source result: partial
//! results always beat no response.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::backend::{Backend, SearchBackend, SourceResult, SqlBackend};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::intent::NormalizedIntent;
use crate::merger::{MergedResult, Merger, SourceResults};
use crate::router::{Router, RoutingDecision};
use crate::search_translator::build_request;
use crate::sql_translator::build_statement;

/// Pipeline outcome: the merged result plus the routing decision that
/// produced it, for callers that surface query diagnostics.
#[derive(Debug)]
pub struct PipelineResponse {
    pub merged: MergedResult,
    pub routing: RoutingDecision,
}

/// The routing-translation-merge pipeline over two backend executors.
pub struct QueryPipeline {
    router: Router,
    merger: Merger,
    search: Arc<dyn SearchBackend>,
    sql: Arc<dyn SqlBackend>,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(search: Arc<dyn SearchBackend>, sql: Arc<dyn SqlBackend>) -> Self {
        Self::with_config(search, sql, PipelineConfig::default())
    }

    pub fn with_config(
        search: Arc<dyn SearchBackend>,
        sql: Arc<dyn SqlBackend>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            router: Router::with_threshold(config.confidence_threshold),
            merger: Merger::with_max_results(config.max_merged_results),
            search,
            sql,
            config,
        }
    }

    /// Run one intent through the pipeline.
    pub async fn execute(&self, intent: &NormalizedIntent) -> Result<PipelineResponse> {
        let decision = self.router.route(intent);
        let now = Utc::now();

        let search_task = async {
            let params = decision.search_query.as_ref().filter(|_| decision.use_search)?;
            let request = build_request(params, now);
            self.run_source(Backend::Search, self.search.search(&request))
                .await
        };

        let sql_task = async {
            let params = decision.sql_query.as_ref().filter(|_| decision.use_sql)?;
            let statement = build_statement(params, now);
            self.run_source(Backend::Sql, self.sql.query(&statement)).await
        };

        let (search_result, sql_result) = tokio::join!(search_task, sql_task);

        let results = SourceResults {
            search: search_result,
            sql: sql_result,
        };
        let merged = self.merger.merge_at(&results, intent, now);

        info!(
            intent = intent.intent.as_str(),
            sources = results.sources().len(),
            total = merged.total(),
            "pipeline complete"
        );

        Ok(PipelineResponse {
            merged,
            routing: decision,
        })
    }

    /// Await one backend, mapping error or timeout to an absent result.
    async fn run_source(
        &self,
        backend: Backend,
        fut: impl std::future::Future<Output = Result<SourceResult>>,
    ) -> Option<SourceResult> {
        let outcome = match self.config.backend_timeout {
            Some(limit) => match timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%backend, timeout_ms = limit.as_millis() as u64, "backend timed out");
                    return None;
                }
            },
            None => fut.await,
        };

        match outcome {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(%backend, error = %err, "backend failed, continuing without it");
                None
            }
        }
    }
}
