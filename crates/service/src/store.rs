use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;

use fieldwork_engine::attributes::{self, AttributeSummary};
use fieldwork_engine::config::RunConfig;
use fieldwork_engine::findings::{finding_from_failed_check, scan_below_threshold};
use fieldwork_engine::model::{
    CheckStatus, Finding, FindingKind, FindingStatus, LedgerItem, LedgerRecord, Sample,
    SupportDocument, TbRow,
};
use fieldwork_engine::recon::{self, ReconReport};
use fieldwork_engine::{build_population, generate_samples};

use crate::error::ServiceError;
use crate::run::{Run, RunId, RunStatus};
use crate::trail::{content_digest, AuditLogEntry, AuditTrail, IntegrityReport};

// ============================================================================
// Per-run state
// ============================================================================

/// Everything that lives and dies with one run.
///
/// Samples sit behind individual mutexes so testwork on different samples
/// proceeds in parallel under the state read lock, while two writers on the
/// same sample serialize. Lock order is fixed: state, then one sample, then
/// findings, then trail. Nothing ever takes two sample locks at once.
struct RunState {
    run: Run,
    ledger: Vec<LedgerRecord>,
    trial_balance: Vec<TbRow>,
    population: Vec<LedgerItem>,
    samples: Vec<Mutex<Sample>>,
    sample_index: HashMap<u64, usize>,
    recon: Option<ReconReport>,
}

struct RunCell {
    state: RwLock<RunState>,
    findings: Mutex<FindingLog>,
    trail: Mutex<AuditTrail>,
}

#[derive(Default)]
struct FindingLog {
    items: Vec<Finding>,
    next_id: u64,
}

impl FindingLog {
    fn register(&mut self, mut finding: Finding) -> Finding {
        finding.finding_id = self.next_id;
        self.next_id += 1;
        self.items.push(finding.clone());
        finding
    }

    fn purge(&mut self, kinds: &[FindingKind]) -> usize {
        let before = self.items.len();
        self.items.retain(|f| !kinds.contains(&f.kind));
        before - self.items.len()
    }
}

/// Full point-in-time view of a run, for the rendering collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run: Run,
    pub population: Vec<LedgerItem>,
    pub samples: Vec<Sample>,
    pub findings: Vec<Finding>,
    pub recon: Option<ReconReport>,
}

// ============================================================================
// Store
// ============================================================================

/// In-memory run registry and the single entry point for every operation.
///
/// The outer map lock is held only long enough to clone the run's `Arc`;
/// all real work happens under that run's own locks, so operations on
/// different runs never contend.
pub struct RunStore {
    runs: RwLock<HashMap<RunId, Arc<RunCell>>>,
    next_run_id: AtomicU64,
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            next_run_id: AtomicU64::new(1),
        }
    }

    fn cell(&self, run_id: RunId) -> Result<Arc<RunCell>, ServiceError> {
        self.runs
            .read()
            .get(&run_id)
            .cloned()
            .ok_or(ServiceError::RunNotFound(run_id))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn create_run(
        &self,
        name: &str,
        config: RunConfig,
        actor: &str,
    ) -> Result<Run, ServiceError> {
        config.validate()?;
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let run = Run::new(run_id, name, config);

        let cell = Arc::new(RunCell {
            state: RwLock::new(RunState {
                run: run.clone(),
                ledger: Vec::new(),
                trial_balance: Vec::new(),
                population: Vec::new(),
                samples: Vec::new(),
                sample_index: HashMap::new(),
                recon: None,
            }),
            findings: Mutex::new(FindingLog::default()),
            trail: Mutex::new(AuditTrail::new()),
        });
        cell.trail.lock().append(
            actor,
            "run_created",
            "run",
            &run_id.to_string(),
            json!({ "name": name }),
        );
        self.runs.write().insert(run_id, cell);

        log::info!("run {run_id} created: {name}");
        Ok(run)
    }

    pub fn update_config(
        &self,
        run_id: RunId,
        config: RunConfig,
        actor: &str,
    ) -> Result<Run, ServiceError> {
        config.validate()?;
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        ensure_mutable(&state.run)?;

        state.run.config = config;
        let run = state.run.clone();
        drop(state);

        cell.trail.lock().append(
            actor,
            "config_updated",
            "run",
            &run_id.to_string(),
            json!({
                "capitalization_threshold_cents": run.config.capitalization_threshold_cents,
                "materiality_cents": run.config.materiality_cents,
                "coverage_target": run.config.coverage_target,
            }),
        );
        log::info!("run {run_id}: config updated");
        Ok(run)
    }

    pub fn activate(&self, run_id: RunId, actor: &str) -> Result<Run, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        if state.run.status != RunStatus::Draft {
            return Err(ServiceError::InvalidTransition {
                from: state.run.status,
                to: RunStatus::Active,
            });
        }
        if state.population.is_empty() {
            return Err(ServiceError::NoPopulation(run_id));
        }

        state.run.status = RunStatus::Active;
        let run = state.run.clone();
        drop(state);

        cell.trail.lock().append(
            actor,
            "run_activated",
            "run",
            &run_id.to_string(),
            json!({ "status": "active" }),
        );
        log::info!("run {run_id}: activated");
        Ok(run)
    }

    /// Close the run. Requires at least one sample and no sample with open
    /// attribute testing; once this succeeds, every mutation is rejected.
    pub fn finalize(&self, run_id: RunId, actor: &str) -> Result<Run, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        if state.run.status != RunStatus::Active {
            return Err(ServiceError::InvalidTransition {
                from: state.run.status,
                to: RunStatus::Finalized,
            });
        }
        if state.samples.is_empty() {
            return Err(ServiceError::NoSamples(run_id));
        }
        let pending = state
            .samples
            .iter()
            .filter(|s| {
                s.lock().attributes_status != fieldwork_engine::AttributesStatus::Complete
            })
            .count();
        if pending > 0 {
            return Err(ServiceError::IncompleteTestwork { run_id, pending });
        }

        state.run.status = RunStatus::Finalized;
        state.run.finalized_at = Some(Utc::now());
        let run = state.run.clone();
        let sample_count = state.samples.len();
        drop(state);

        let finding_count = cell.findings.lock().items.len();
        cell.trail.lock().append(
            actor,
            "run_finalized",
            "run",
            &run_id.to_string(),
            json!({ "samples": sample_count, "findings": finding_count }),
        );
        log::info!("run {run_id}: finalized ({sample_count} samples, {finding_count} findings)");
        Ok(run)
    }

    // ------------------------------------------------------------------
    // Data loading and population
    // ------------------------------------------------------------------

    pub fn load_ledger(
        &self,
        run_id: RunId,
        records: Vec<LedgerRecord>,
        actor: &str,
    ) -> Result<usize, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        ensure_mutable(&state.run)?;

        let count = records.len();
        state.ledger = records;
        drop(state);

        cell.trail.lock().append(
            actor,
            "ledger_loaded",
            "run",
            &run_id.to_string(),
            json!({ "rows": count }),
        );
        log::info!("run {run_id}: ledger loaded ({count} rows)");
        Ok(count)
    }

    pub fn load_trial_balance(
        &self,
        run_id: RunId,
        rows: Vec<TbRow>,
        actor: &str,
    ) -> Result<usize, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        ensure_mutable(&state.run)?;

        let count = rows.len();
        state.trial_balance = rows;
        drop(state);

        cell.trail.lock().append(
            actor,
            "trial_balance_loaded",
            "run",
            &run_id.to_string(),
            json!({ "rows": count }),
        );
        log::info!("run {run_id}: trial balance loaded ({count} rows)");
        Ok(count)
    }

    /// Rebuild the population from the loaded ledger. All-or-nothing: on
    /// engine error the previous population stays untouched. On success the
    /// replacement invalidates every downstream artifact, so samples, the
    /// reconciliation report, and all findings are cleared.
    pub fn rebuild_population(
        &self,
        run_id: RunId,
        actor: &str,
    ) -> Result<Vec<LedgerItem>, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        ensure_mutable(&state.run)?;
        if state.ledger.is_empty() {
            return Err(ServiceError::NoLedgerLoaded(run_id));
        }

        let build = build_population(&state.run.config, &state.ledger)?;
        let metrics = build.metrics.clone();
        state.population = build.items.clone();
        state.samples.clear();
        state.sample_index.clear();
        state.recon = None;
        state.run.metrics.population = Some(build.metrics);
        state.run.metrics.sampling = None;
        state.run.metrics.reconciliation = None;
        // Findings commit under the state guard; the exclusion that protects
        // the population swap must also cover the log derived from it.
        cell.findings.lock().items.clear();
        drop(state);

        cell.trail.lock().append(
            actor,
            "population_rebuilt",
            "run",
            &run_id.to_string(),
            json!({
                "rows_seen": metrics.rows_seen,
                "rows_retained": metrics.rows_retained,
                "isi_count": metrics.isi_count,
            }),
        );
        log::info!(
            "run {run_id}: population rebuilt ({} of {} rows retained)",
            metrics.rows_retained,
            metrics.rows_seen
        );
        Ok(build.items)
    }

    /// Regenerate the sample set from the current population, replacing any
    /// prior set wholesale. Attribute-failure and below-threshold findings
    /// from the prior set are purged, then the below-threshold scan reruns;
    /// reconciliation findings are untouched since they derive from the
    /// trial balance, not from sample selection.
    pub fn generate_samples(
        &self,
        run_id: RunId,
        actor: &str,
    ) -> Result<Vec<Sample>, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut state = cell.state.write();
        ensure_mutable(&state.run)?;
        if state.population.is_empty() {
            return Err(ServiceError::NoPopulation(run_id));
        }

        let plan = generate_samples(&state.run.config, &state.population)?;
        let metrics = plan.metrics.clone();
        state.sample_index = plan
            .samples
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.sample_id, pos))
            .collect();
        let snapshot: Vec<Sample> = plan.samples.clone();
        state.samples = plan.samples.into_iter().map(Mutex::new).collect();
        state.run.metrics.sampling = Some(metrics.clone());

        let below = scan_below_threshold(&state.run.config, &state.population, Utc::now());
        {
            // Still under the state write guard: the purge and re-scan must
            // land against the same population the plan was drawn from.
            let mut findings = cell.findings.lock();
            findings.purge(&[FindingKind::AttributeFailure, FindingKind::BelowThresholdCapital]);
            for finding in below {
                findings.register(finding);
            }
        }
        drop(state);

        cell.trail.lock().append(
            actor,
            "samples_generated",
            "run",
            &run_id.to_string(),
            json!({
                "total": metrics.total_samples,
                "auto_included": metrics.auto_included,
                "stratified": metrics.stratified,
                "coverage_fill": metrics.coverage_fill,
                "coverage": metrics.coverage,
            }),
        );
        log::info!(
            "run {run_id}: {} samples generated ({:.1}% coverage)",
            metrics.total_samples,
            metrics.coverage * 100.0
        );
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Testwork
    // ------------------------------------------------------------------

    /// Attach a support document to a sample. `expected_revision`, when
    /// given, must match the sample's current revision or the update is
    /// rejected as a lost-update race.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_support(
        &self,
        run_id: RunId,
        sample_id: u64,
        filename: &str,
        document_type: &str,
        bytes: &[u8],
        expected_revision: Option<u64>,
        actor: &str,
    ) -> Result<Sample, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.read();
        ensure_mutable(&state.run)?;
        let pos = *state
            .sample_index
            .get(&sample_id)
            .ok_or(ServiceError::SampleNotFound { run_id, sample_id })?;
        let min_docs = state.run.config.min_support_docs;

        let hash = content_digest(bytes);
        let doc = SupportDocument {
            filename: filename.to_string(),
            document_type: document_type.to_string(),
            size_bytes: bytes.len() as u64,
            content_hash: hash.clone(),
            uploaded_at: Utc::now(),
        };

        let updated = {
            let mut sample = state.samples[pos].lock();
            check_revision(&sample, expected_revision)?;
            attributes::attach_support(&mut sample, doc, min_docs);
            sample.clone()
        };
        drop(state);

        cell.trail.lock().append(
            actor,
            "support_uploaded",
            "sample",
            &sample_id.to_string(),
            json!({
                "filename": filename,
                "document_type": document_type,
                "content_hash": hash,
                "support_status": updated.support_status,
            }),
        );
        log::info!("run {run_id}: support doc {filename} attached to sample {sample_id}");
        Ok(updated)
    }

    /// Record one checklist verdict. A `fail` verdict derives a finding in
    /// the same operation; the caller never has to remember a second call.
    #[allow(clippy::too_many_arguments)]
    pub fn update_attribute_check(
        &self,
        run_id: RunId,
        sample_id: u64,
        attribute_number: u8,
        status: CheckStatus,
        comment: Option<&str>,
        checked_by: &str,
        expected_revision: Option<u64>,
    ) -> Result<Sample, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.read();
        ensure_mutable(&state.run)?;
        let pos = *state
            .sample_index
            .get(&sample_id)
            .ok_or(ServiceError::SampleNotFound { run_id, sample_id })?;

        let now = Utc::now();
        let (updated, outcome) = {
            let mut sample = state.samples[pos].lock();
            check_revision(&sample, expected_revision)?;
            let outcome = attributes::apply_check_update(
                &mut sample,
                attribute_number,
                status,
                comment,
                checked_by,
                now,
            )?;
            (sample.clone(), outcome)
        };

        let derived = if outcome.failed {
            let item = &state.population[updated.item_id as usize];
            let finding = finding_from_failed_check(
                item,
                &updated,
                attribute_number,
                comment.map(str::trim).unwrap_or_default(),
                &state.run.config,
                now,
            );
            Some(cell.findings.lock().register(finding))
        } else {
            None
        };
        drop(state);

        let mut trail = cell.trail.lock();
        trail.append(
            checked_by,
            "attribute_check_updated",
            "sample",
            &sample_id.to_string(),
            json!({
                "attribute_number": attribute_number,
                "status": status,
                "attributes_status": updated.attributes_status,
                "revision": updated.revision,
            }),
        );
        if let Some(finding) = &derived {
            trail.append(
                checked_by,
                "finding_created",
                "finding",
                &finding.finding_id.to_string(),
                json!({
                    "kind": finding.kind,
                    "severity": finding.severity,
                    "sample_id": sample_id,
                    "attribute_number": attribute_number,
                }),
            );
        }
        drop(trail);

        log::info!(
            "run {run_id}: sample {sample_id} attribute {attribute_number} -> {status}"
        );
        Ok(updated)
    }

    pub fn resolve_finding(
        &self,
        run_id: RunId,
        finding_id: u64,
        status: FindingStatus,
        actor: &str,
    ) -> Result<Finding, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.read();
        ensure_mutable(&state.run)?;

        // The read guard stays held across the mutation so a concurrent
        // finalize cannot slip between the status check and the write.
        let updated = {
            let mut findings = cell.findings.lock();
            let finding = findings
                .items
                .iter_mut()
                .find(|f| f.finding_id == finding_id)
                .ok_or(ServiceError::FindingNotFound { run_id, finding_id })?;
            finding.status = status;
            finding.resolved_at = match status {
                FindingStatus::Open => None,
                FindingStatus::Resolved | FindingStatus::Dismissed => Some(Utc::now()),
            };
            finding.clone()
        };
        drop(state);

        cell.trail.lock().append(
            actor,
            "finding_status_updated",
            "finding",
            &finding_id.to_string(),
            json!({ "status": status }),
        );
        log::info!("run {run_id}: finding {finding_id} -> {status:?}");
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Reconcile the population against the trial balance and refresh the
    /// variance findings. Reads happen under an upgradable lock so two
    /// concurrent reconciles cannot interleave their finding replacement.
    pub fn reconcile(&self, run_id: RunId, actor: &str) -> Result<ReconReport, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.upgradable_read();
        ensure_mutable(&state.run)?;
        if state.population.is_empty() {
            return Err(ServiceError::NoPopulation(run_id));
        }

        let report = recon::reconcile(&state.population, &state.trial_balance);
        let fresh = recon::variance_findings(
            state.run.config.materiality_cents,
            &report,
            Utc::now(),
        );

        let mut state = parking_lot::RwLockUpgradableReadGuard::upgrade(state);
        state.recon = Some(report.clone());
        state.run.metrics.reconciliation = Some(report.summary.clone());
        {
            let mut findings = cell.findings.lock();
            findings.purge(&[FindingKind::ReconciliationVariance]);
            for finding in fresh {
                findings.register(finding);
            }
        }
        drop(state);

        cell.trail.lock().append(
            actor,
            "reconciliation_performed",
            "run",
            &run_id.to_string(),
            json!({
                "total_accounts": report.summary.total_accounts,
                "variance_accounts": report.summary.variance_accounts,
                "aggregate_variance_cents": report.summary.aggregate_variance_cents,
                "reconciled": report.reconciled,
            }),
        );
        log::info!(
            "run {run_id}: reconciled {} accounts, {} with variances",
            report.summary.total_accounts,
            report.summary.variance_accounts
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn run_meta(&self, run_id: RunId) -> Result<Run, ServiceError> {
        Ok(self.cell(run_id)?.state.read().run.clone())
    }

    pub fn list_runs(&self) -> Vec<Run> {
        let cells: Vec<Arc<RunCell>> = self.runs.read().values().cloned().collect();
        let mut runs: Vec<Run> = cells.iter().map(|c| c.state.read().run.clone()).collect();
        runs.sort_by_key(|r| r.run_id);
        runs
    }

    pub fn population(&self, run_id: RunId) -> Result<Vec<LedgerItem>, ServiceError> {
        Ok(self.cell(run_id)?.state.read().population.clone())
    }

    pub fn samples(&self, run_id: RunId) -> Result<Vec<Sample>, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.read();
        Ok(state.samples.iter().map(|s| s.lock().clone()).collect())
    }

    pub fn findings(&self, run_id: RunId) -> Result<Vec<Finding>, ServiceError> {
        let cell = self.cell(run_id)?;
        let items = cell.findings.lock().items.clone();
        Ok(items)
    }

    pub fn recon_report(&self, run_id: RunId) -> Result<Option<ReconReport>, ServiceError> {
        Ok(self.cell(run_id)?.state.read().recon.clone())
    }

    pub fn sample_attribute_summary(
        &self,
        run_id: RunId,
        sample_id: u64,
    ) -> Result<AttributeSummary, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.read();
        let pos = *state
            .sample_index
            .get(&sample_id)
            .ok_or(ServiceError::SampleNotFound { run_id, sample_id })?;
        let sample = state.samples[pos].lock().clone();
        Ok(attributes::attribute_summary(
            &sample,
            &state.run.config.attribute_checklist,
        ))
    }

    pub fn snapshot(&self, run_id: RunId) -> Result<RunSnapshot, ServiceError> {
        let cell = self.cell(run_id)?;
        let state = cell.state.read();
        let snapshot = RunSnapshot {
            run: state.run.clone(),
            population: state.population.clone(),
            samples: state.samples.iter().map(|s| s.lock().clone()).collect(),
            findings: cell.findings.lock().items.clone(),
            recon: state.recon.clone(),
        };
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Audit trail
    // ------------------------------------------------------------------

    pub fn audit_trail(
        &self,
        run_id: RunId,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, ServiceError> {
        Ok(self.cell(run_id)?.trail.lock().recent(limit))
    }

    pub fn verify_integrity(&self, run_id: RunId) -> Result<IntegrityReport, ServiceError> {
        Ok(self.cell(run_id)?.trail.lock().verify())
    }

    /// Test hook: rewrite a stored trail entry's payload without updating
    /// its digest, so integrity verification has something to catch.
    pub fn tamper_audit_entry(
        &self,
        run_id: RunId,
        entry_id: u64,
        details: serde_json::Value,
    ) -> Result<bool, ServiceError> {
        Ok(self.cell(run_id)?.trail.lock().tamper_details(entry_id, details))
    }
}

fn ensure_mutable(run: &Run) -> Result<(), ServiceError> {
    if run.status == RunStatus::Finalized {
        return Err(ServiceError::RunFinalized(run.run_id));
    }
    Ok(())
}

fn check_revision(sample: &Sample, expected: Option<u64>) -> Result<(), ServiceError> {
    if let Some(expected) = expected {
        if expected != sample.revision {
            return Err(ServiceError::ConcurrentModification {
                sample_id: sample.sample_id,
                expected,
                actual: sample.revision,
            });
        }
    }
    Ok(())
}
