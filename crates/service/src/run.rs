use chrono::{DateTime, Utc};
use serde::Serialize;

use fieldwork_engine::config::RunConfig;
use fieldwork_engine::model::{PopulationMetrics, SamplingMetrics};
use fieldwork_engine::recon::ReconSummary;

pub type RunId = u64;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Run lifecycle: draft → active → finalized. Finalized is terminal; every
/// mutation on a finalized run is rejected at the store boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Draft,
    Active,
    Finalized,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Aggregate metrics snapshot, refreshed by the operation that owns each
/// section. `None` means the step has not run yet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub population: Option<PopulationMetrics>,
    pub sampling: Option<SamplingMetrics>,
    pub reconciliation: Option<ReconSummary>,
}

/// One audit engagement instance. Owns its population, samples, findings,
/// and audit trail by identity; those collections live in the store cell,
/// not embedded here.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub run_id: RunId,
    pub name: String,
    pub status: RunStatus,
    pub config: RunConfig,
    pub metrics: RunMetrics,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(run_id: RunId, name: &str, config: RunConfig) -> Self {
        Self {
            run_id,
            name: name.to_string(),
            status: RunStatus::Draft,
            config,
            metrics: RunMetrics::default(),
            created_at: Utc::now(),
            finalized_at: None,
        }
    }
}
