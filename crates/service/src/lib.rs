//! `fieldwork-service` — run lifecycle over the testwork engine.
//!
//! Owns what the engine deliberately does not: run registration and the
//! draft/active/finalized lifecycle, concurrency control across parallel
//! fieldwork sessions, and the tamper-evident audit trail. All state is
//! in-memory; persistence is a host concern.

pub mod error;
pub mod run;
pub mod store;
pub mod trail;

pub use error::ServiceError;
pub use run::{Run, RunId, RunMetrics, RunStatus};
pub use store::{RunSnapshot, RunStore};
pub use trail::{AuditLogEntry, AuditTrail, IntegrityReport};
