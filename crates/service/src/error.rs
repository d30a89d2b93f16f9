use std::fmt;

use fieldwork_engine::EngineError;

use crate::run::{RunId, RunStatus};

#[derive(Debug)]
pub enum ServiceError {
    /// Propagated engine error (validation, config, empty population).
    Engine(EngineError),
    RunNotFound(RunId),
    SampleNotFound { run_id: RunId, sample_id: u64 },
    FindingNotFound { run_id: RunId, finding_id: u64 },
    /// Attempted mutation on a finalized run. Rejected, never retried.
    RunFinalized(RunId),
    InvalidTransition { from: RunStatus, to: RunStatus },
    /// Lost-update race on a sample: the caller's revision is stale.
    /// Retrying with fresh state is the caller's job, not the engine's.
    ConcurrentModification { sample_id: u64, expected: u64, actual: u64 },
    NoLedgerLoaded(RunId),
    NoPopulation(RunId),
    NoSamples(RunId),
    /// Finalize attempted while attribute testing is still open.
    IncompleteTestwork { run_id: RunId, pending: usize },
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "{e}"),
            Self::RunNotFound(id) => write!(f, "run {id} not found"),
            Self::SampleNotFound { run_id, sample_id } => {
                write!(f, "run {run_id}: sample {sample_id} not found")
            }
            Self::FindingNotFound { run_id, finding_id } => {
                write!(f, "run {run_id}: finding {finding_id} not found")
            }
            Self::RunFinalized(id) => write!(f, "run {id} is finalized and immutable"),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid run transition {from} -> {to}")
            }
            Self::ConcurrentModification { sample_id, expected, actual } => write!(
                f,
                "sample {sample_id}: revision {expected} is stale (now {actual}); retry with fresh state"
            ),
            Self::NoLedgerLoaded(id) => write!(f, "run {id}: no ledger extract loaded"),
            Self::NoPopulation(id) => write!(f, "run {id}: population has not been built"),
            Self::NoSamples(id) => write!(f, "run {id}: no samples generated"),
            Self::IncompleteTestwork { run_id, pending } => write!(
                f,
                "run {run_id}: {pending} sample(s) still have open attribute testing"
            ),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}
