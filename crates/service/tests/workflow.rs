use std::sync::Arc;

use fieldwork_engine::config::RunConfig;
use fieldwork_engine::model::{
    AttributesStatus, CheckStatus, FindingKind, FindingStatus, LedgerRecord, SampleType,
    Severity, SupportStatus, TbRow,
};
use fieldwork_service::{RunStatus, RunStore, ServiceError};

fn record(row: usize, desc: &str, amount_cents: i64, reference: &str) -> LedgerRecord {
    LedgerRecord {
        account_code: "6400".into(),
        account_name: "Repairs & Maintenance".into(),
        description: desc.into(),
        amount_cents,
        date: "2025-09-15".into(),
        reference: reference.into(),
        vendor_name: "Acme Facilities".into(),
        row_number: row,
    }
}

/// Six stratified candidates plus one individually significant item, all on
/// one account, totalling $86,000.
fn ledger() -> Vec<LedgerRecord> {
    vec![
        record(1, "roof repair", 600_000, "INV-101"),
        record(2, "hvac repair", 700_000, "INV-102"),
        record(3, "elevator maintenance", 800_000, "INV-103"),
        record(4, "parking lot repair", 900_000, "INV-104"),
        record(5, "boiler maintenance", 1_200_000, "INV-105"),
        record(6, "chiller repair", 1_400_000, "INV-106"),
        record(7, "facade repair program", 3_000_000, "INV-107"),
    ]
}

fn trial_balance() -> Vec<TbRow> {
    vec![TbRow {
        account_code: "6400".into(),
        account_name: "Repairs & Maintenance".into(),
        balance_cents: 8_600_000,
    }]
}

fn prepared_store() -> (RunStore, u64) {
    let store = RunStore::new();
    let run = store
        .create_run("FY26 R&M testwork", RunConfig::default(), "lead")
        .unwrap();
    store.load_ledger(run.run_id, ledger(), "lead").unwrap();
    store
        .load_trial_balance(run.run_id, trial_balance(), "lead")
        .unwrap();
    store.rebuild_population(run.run_id, "lead").unwrap();
    (store, run.run_id)
}

fn complete_all_testwork(store: &RunStore, run_id: u64) {
    for sample in store.samples(run_id).unwrap() {
        for n in 1..=7 {
            store
                .update_attribute_check(
                    run_id,
                    sample.sample_id,
                    n,
                    CheckStatus::Pass,
                    None,
                    "auditor",
                    None,
                )
                .unwrap();
        }
    }
}

#[test]
fn full_workflow_to_finalization() {
    let (store, run_id) = prepared_store();

    let population = store.population(run_id).unwrap();
    assert_eq!(population.len(), 7);
    assert_eq!(population.iter().filter(|i| i.isi_item).count(), 1);

    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    assert_eq!(samples.len(), 7);
    assert_eq!(
        samples
            .iter()
            .filter(|s| s.sample_type == SampleType::AutoIncluded)
            .count(),
        1
    );

    // Attach the minimum support to the first sample.
    let first = samples[0].sample_id;
    for name in ["invoice.pdf", "po.pdf", "receiving.pdf"] {
        store
            .upload_support(run_id, first, name, "invoice", b"pdf bytes", None, "auditor")
            .unwrap();
    }
    let sample = store
        .samples(run_id)
        .unwrap()
        .into_iter()
        .find(|s| s.sample_id == first)
        .unwrap();
    assert_eq!(sample.support_status, SupportStatus::Complete);
    assert_eq!(sample.support_docs.len(), 3);
    assert!(sample.support_docs[0].content_hash.starts_with("sha256:"));

    complete_all_testwork(&store, run_id);

    let report = store.reconcile(run_id, "lead").unwrap();
    assert!(report.reconciled);
    assert_eq!(report.summary.matched_accounts, 1);

    let run = store.finalize(run_id, "lead").unwrap();
    assert_eq!(run.status, RunStatus::Finalized);
    assert!(run.finalized_at.is_some());
    assert!(run.metrics.population.is_some());
    assert!(run.metrics.sampling.is_some());
    assert!(run.metrics.reconciliation.is_some());

    // Trail covers the whole session and verifies clean.
    let integrity = store.verify_integrity(run_id).unwrap();
    assert!(integrity.is_clean());
    assert!(integrity.total_entries > 10);
}

#[test]
fn finalize_is_gated_on_testwork() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();

    // No samples yet.
    assert!(matches!(
        store.finalize(run_id, "lead"),
        Err(ServiceError::NoSamples(_))
    ));

    store.generate_samples(run_id, "lead").unwrap();

    // All seven samples still have open testwork.
    match store.finalize(run_id, "lead") {
        Err(ServiceError::IncompleteTestwork { pending, .. }) => assert_eq!(pending, 7),
        other => panic!("expected IncompleteTestwork, got {other:?}"),
    }

    complete_all_testwork(&store, run_id);
    store.finalize(run_id, "lead").unwrap();
}

#[test]
fn finalized_run_rejects_every_mutation() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    complete_all_testwork(&store, run_id);
    // A failed check is not pending, so the run still finalizes; the open
    // finding it leaves behind must be frozen along with everything else.
    store
        .update_attribute_check(
            run_id,
            samples[0].sample_id,
            3,
            CheckStatus::Fail,
            Some("document not canceled"),
            "auditor",
            None,
        )
        .unwrap();
    let finding_id = store.findings(run_id).unwrap()[0].finding_id;
    store.finalize(run_id, "lead").unwrap();

    let sample_id = samples[0].sample_id;
    let finalized = |r: Result<_, ServiceError>| matches!(r, Err(ServiceError::RunFinalized(_)));

    assert!(finalized(store.load_ledger(run_id, ledger(), "lead").map(|_| ())));
    assert!(finalized(store.rebuild_population(run_id, "lead").map(|_| ())));
    assert!(finalized(store.generate_samples(run_id, "lead").map(|_| ())));
    assert!(finalized(store.reconcile(run_id, "lead").map(|_| ())));
    assert!(finalized(
        store
            .update_config(run_id, RunConfig::default(), "lead")
            .map(|_| ())
    ));
    assert!(finalized(
        store
            .upload_support(run_id, sample_id, "late.pdf", "invoice", b"x", None, "auditor")
            .map(|_| ())
    ));
    assert!(finalized(
        store
            .update_attribute_check(
                run_id,
                sample_id,
                1,
                CheckStatus::Na,
                None,
                "auditor",
                None,
            )
            .map(|_| ())
    ));
    assert!(finalized(
        store
            .resolve_finding(run_id, finding_id, FindingStatus::Resolved, "lead")
            .map(|_| ())
    ));

    // Reads still work, and the finding stayed open.
    assert_eq!(store.samples(run_id).unwrap().len(), 7);
    assert!(store.snapshot(run_id).unwrap().recon.is_none());
    let findings = store.findings(run_id).unwrap();
    assert_eq!(findings[0].status, FindingStatus::Open);
    assert!(findings[0].resolved_at.is_none());
}

#[test]
fn failed_check_derives_exactly_one_finding() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    let sample_id = samples[0].sample_id;

    // Fail without a comment is rejected and leaves no trace.
    assert!(store
        .update_attribute_check(
            run_id,
            sample_id,
            2,
            CheckStatus::Fail,
            None,
            "auditor",
            None,
        )
        .is_err());
    assert!(store.findings(run_id).unwrap().is_empty());

    store
        .update_attribute_check(
            run_id,
            sample_id,
            2,
            CheckStatus::Fail,
            Some("approval signature missing"),
            "auditor",
            None,
        )
        .unwrap();

    let findings = store.findings(run_id).unwrap();
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.kind, FindingKind::AttributeFailure);
    assert_eq!(finding.severity, Severity::High);
    assert_eq!(finding.sample_id, Some(sample_id));
    assert!(finding.description.contains("approval signature missing"));

    // Resolving stamps the timestamp; reopening clears it.
    let resolved = store
        .resolve_finding(run_id, finding.finding_id, FindingStatus::Resolved, "lead")
        .unwrap();
    assert!(resolved.resolved_at.is_some());
    let reopened = store
        .resolve_finding(run_id, finding.finding_id, FindingStatus::Open, "lead")
        .unwrap();
    assert!(reopened.resolved_at.is_none());
}

#[test]
fn sample_generation_is_deterministic() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();

    let first = store.generate_samples(run_id, "lead").unwrap();
    let second = store.generate_samples(run_id, "lead").unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.sample_id, b.sample_id);
        assert_eq!(a.item_id, b.item_id);
        assert_eq!(a.sample_type, b.sample_type);
        assert_eq!(a.stratum, b.stratum);
    }
}

#[test]
fn rebuild_invalidates_downstream_artifacts() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    store
        .update_attribute_check(
            run_id,
            samples[0].sample_id,
            1,
            CheckStatus::Fail,
            Some("amount disagrees with invoice"),
            "auditor",
            None,
        )
        .unwrap();
    store.reconcile(run_id, "lead").unwrap();
    assert!(!store.findings(run_id).unwrap().is_empty());

    store.rebuild_population(run_id, "lead").unwrap();

    assert!(store.samples(run_id).unwrap().is_empty());
    assert!(store.findings(run_id).unwrap().is_empty());
    assert!(store.recon_report(run_id).unwrap().is_none());
    let run = store.run_meta(run_id).unwrap();
    assert!(run.metrics.sampling.is_none());
    assert!(run.metrics.reconciliation.is_none());
}

#[test]
fn stale_revision_is_rejected() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    let sample_id = samples[0].sample_id;
    assert_eq!(samples[0].revision, 0);

    store
        .upload_support(run_id, sample_id, "a.pdf", "invoice", b"a", Some(0), "auditor")
        .unwrap();

    // A second writer still holding revision 0 loses the race.
    match store.upload_support(run_id, sample_id, "b.pdf", "invoice", b"b", Some(0), "auditor") {
        Err(ServiceError::ConcurrentModification { expected, actual, .. }) => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrentModification, got {other:?}"),
    }

    // The rejected upload must not have attached anything.
    let sample = store
        .samples(run_id)
        .unwrap()
        .into_iter()
        .find(|s| s.sample_id == sample_id)
        .unwrap();
    assert_eq!(sample.support_docs.len(), 1);
}

#[test]
fn same_sample_race_has_one_winner() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    let sample_id = samples[0].sample_id;
    let store = Arc::new(store);

    // Four writers all hold revision 0 of the same sample.
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.upload_support(
                    run_id,
                    sample_id,
                    &format!("doc-{i}.pdf"),
                    "invoice",
                    b"bytes",
                    Some(0),
                    "auditor",
                )
            })
        })
        .collect();

    let mut wins = 0;
    let mut losses = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(sample) => {
                assert_eq!(sample.revision, 1);
                wins += 1;
            }
            Err(ServiceError::ConcurrentModification { expected, actual, .. }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
                losses += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(losses, 3);

    let sample = store
        .samples(run_id)
        .unwrap()
        .into_iter()
        .find(|s| s.sample_id == sample_id)
        .unwrap();
    assert_eq!(sample.support_docs.len(), 1);
    assert_eq!(sample.revision, 1);
}

#[test]
fn parallel_testwork_on_distinct_samples() {
    let (store, run_id) = prepared_store();
    store.activate(run_id, "lead").unwrap();
    let samples = store.generate_samples(run_id, "lead").unwrap();
    let store = Arc::new(store);

    let handles: Vec<_> = samples
        .iter()
        .map(|s| {
            let store = Arc::clone(&store);
            let sample_id = s.sample_id;
            std::thread::spawn(move || {
                store
                    .upload_support(
                        run_id,
                        sample_id,
                        "invoice.pdf",
                        "invoice",
                        b"bytes",
                        None,
                        "auditor",
                    )
                    .unwrap();
                store
                    .update_attribute_check(
                        run_id,
                        sample_id,
                        1,
                        CheckStatus::Pass,
                        None,
                        "auditor",
                        None,
                    )
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for sample in store.samples(run_id).unwrap() {
        assert_eq!(sample.support_docs.len(), 1);
        assert_eq!(sample.checks[0].status, CheckStatus::Pass);
        assert_eq!(sample.attributes_status, AttributesStatus::InProgress);
        assert_eq!(sample.revision, 2);
    }
    assert!(store.verify_integrity(run_id).unwrap().is_clean());
}

#[test]
fn variance_opens_finding_and_tampering_is_caught() {
    let store = RunStore::new();
    let run = store
        .create_run("variance run", RunConfig::default(), "lead")
        .unwrap();
    store.load_ledger(run.run_id, ledger(), "lead").unwrap();
    // Understate the TB by $30,000, beyond materiality.
    store
        .load_trial_balance(
            run.run_id,
            vec![TbRow {
                account_code: "6400".into(),
                account_name: "Repairs & Maintenance".into(),
                balance_cents: 5_600_000,
            }],
            "lead",
        )
        .unwrap();
    store.rebuild_population(run.run_id, "lead").unwrap();

    let report = store.reconcile(run.run_id, "lead").unwrap();
    assert!(!report.reconciled);
    assert_eq!(report.summary.aggregate_variance_cents, 3_000_000);

    let findings = store.findings(run.run_id).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, FindingKind::ReconciliationVariance);
    assert_eq!(findings[0].severity, Severity::High);

    // Re-reconciling replaces, never duplicates.
    store.reconcile(run.run_id, "lead").unwrap();
    assert_eq!(store.findings(run.run_id).unwrap().len(), 1);

    // Doctor one trail entry; verification flags exactly that entry.
    let trail = store.audit_trail(run.run_id, 100).unwrap();
    let victim = trail.last().unwrap().entry_id;
    assert!(store
        .tamper_audit_entry(run.run_id, victim, serde_json::json!({"rows": 0}))
        .unwrap());

    let integrity = store.verify_integrity(run.run_id).unwrap();
    assert_eq!(integrity.mismatches.len(), 1);
    assert_eq!(integrity.mismatches[0].entry_id, victim);
    assert_eq!(integrity.verified_entries, integrity.total_entries - 1);
}

#[test]
fn activation_requires_a_population() {
    let store = RunStore::new();
    let run = store
        .create_run("empty run", RunConfig::default(), "lead")
        .unwrap();

    assert!(matches!(
        store.activate(run.run_id, "lead"),
        Err(ServiceError::NoPopulation(_))
    ));
    assert!(matches!(
        store.rebuild_population(run.run_id, "lead"),
        Err(ServiceError::NoLedgerLoaded(_))
    ));
    assert!(matches!(
        store.run_meta(999),
        Err(ServiceError::RunNotFound(999))
    ));
}
