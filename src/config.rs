//! Pipeline configuration, env-var driven with sensible defaults.

use std::env;
use std::time::Duration;

use crate::error::{CrossQueryError, Result};
use crate::router::CONFIDENCE_THRESHOLD;

/// Tunables of the query pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum confidence for a backend to be selected on its own merit.
    pub confidence_threshold: f64,

    /// Per-backend execution timeout; `None` leaves timing out to the
    /// executor.
    pub backend_timeout: Option<Duration>,

    /// Cap on records returned by the search/filter merge strategies.
    pub max_merged_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: CONFIDENCE_THRESHOLD,
            backend_timeout: None,
            max_merged_results: 20,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| CrossQueryError::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(None),
    }
}

impl PipelineConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// * `CROSSQUERY_THRESHOLD` - confidence threshold in [0, 1]
    /// * `CROSSQUERY_TIMEOUT_MS` - per-backend timeout; 0 disables it
    /// * `CROSSQUERY_MAX_MERGED` - merged-result cap
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(threshold) = parse_var::<f64>("CROSSQUERY_THRESHOLD")? {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CrossQueryError::Config(format!(
                    "CROSSQUERY_THRESHOLD must be in [0, 1], got {threshold}"
                )));
            }
            config.confidence_threshold = threshold;
        }

        if let Some(ms) = parse_var::<u64>("CROSSQUERY_TIMEOUT_MS")? {
            config.backend_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(max) = parse_var::<usize>("CROSSQUERY_MAX_MERGED")? {
            config.max_merged_results = max;
        }

        Ok(config)
    }
}
