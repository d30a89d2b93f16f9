//! `fieldwork-engine` — Audit sampling & testwork engine.
//!
//! Pure engine crate: receives pre-normalized ledger and trial-balance
//! records, returns populations, sample plans, testwork state, and findings.
//! No IO, no locking, no persistence — run lifecycle and the audit trail
//! live in `fieldwork-service`.

pub mod attributes;
pub mod classify;
pub mod config;
pub mod error;
pub mod findings;
pub mod model;
pub mod population;
pub mod recon;
pub mod sampler;

pub use config::{Band, RunConfig};
pub use error::EngineError;
pub use model::{
    AttributesStatus, CheckStatus, Classification, Finding, FindingKind, FindingStatus,
    LedgerItem, LedgerRecord, Sample, SampleType, Severity, SupportDocument, SupportStatus,
    TbRow,
};
pub use population::build_population;
pub use recon::reconcile;
pub use sampler::generate_samples;
