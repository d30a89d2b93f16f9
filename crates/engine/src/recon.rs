use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    fmt_cents, Finding, FindingKind, FindingStatus, LedgerItem, Severity, TbRow,
};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AccountVariance {
    pub account_code: String,
    pub account_name: String,
    pub gl_cents: i64,
    pub tb_cents: i64,
    pub variance_cents: i64,
    pub matched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub total_accounts: usize,
    pub matched_accounts: usize,
    pub variance_accounts: usize,
    pub gl_total_cents: i64,
    pub tb_total_cents: i64,
    pub aggregate_variance_cents: i64,
    pub reconciliation_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub accounts: Vec<AccountVariance>,
    /// Account codes present in the ledger but absent from the trial balance.
    pub gl_only: Vec<String>,
    /// Account codes present in the trial balance but absent from the ledger.
    pub tb_only: Vec<String>,
    pub summary: ReconSummary,
    /// Aggregate variance within currency-rounding tolerance (< 1 cent).
    pub reconciled: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compare ledger-derived totals against the trial balance, per account code.
///
/// Accounts missing on one side reconcile against zero and are listed in
/// `gl_only` / `tb_only`. BTreeMap grouping keeps account order — and so the
/// whole report — deterministic.
pub fn reconcile(items: &[LedgerItem], tb_rows: &[TbRow]) -> ReconReport {
    let mut gl: BTreeMap<String, (i64, String)> = BTreeMap::new();
    for item in items {
        let entry = gl
            .entry(item.account_code.clone())
            .or_insert_with(|| (0, item.account_name.clone()));
        entry.0 += item.amount_cents;
    }

    let mut tb: BTreeMap<String, (i64, String)> = BTreeMap::new();
    for row in tb_rows {
        let entry = tb
            .entry(row.account_code.clone())
            .or_insert_with(|| (0, row.account_name.clone()));
        entry.0 += row.balance_cents;
    }

    let mut codes: Vec<&String> = gl.keys().chain(tb.keys()).collect();
    codes.sort();
    codes.dedup();

    let mut accounts = Vec::with_capacity(codes.len());
    let mut gl_only = Vec::new();
    let mut tb_only = Vec::new();

    for code in codes {
        let gl_side = gl.get(code);
        let tb_side = tb.get(code);
        match (gl_side, tb_side) {
            (Some(_), None) => gl_only.push(code.clone()),
            (None, Some(_)) => tb_only.push(code.clone()),
            _ => {}
        }
        let gl_cents = gl_side.map_or(0, |(total, _)| *total);
        let tb_cents = tb_side.map_or(0, |(total, _)| *total);
        let account_name = gl_side
            .or(tb_side)
            .map(|(_, name)| name.clone())
            .unwrap_or_default();
        let variance_cents = (gl_cents - tb_cents).abs();
        accounts.push(AccountVariance {
            account_code: code.clone(),
            account_name,
            gl_cents,
            tb_cents,
            variance_cents,
            matched: variance_cents == 0,
        });
    }

    let gl_total_cents: i64 = gl.values().map(|(total, _)| total).sum();
    let tb_total_cents: i64 = tb.values().map(|(total, _)| total).sum();
    let aggregate_variance_cents = (gl_total_cents - tb_total_cents).abs();
    let matched_accounts = accounts.iter().filter(|a| a.matched).count();

    let summary = ReconSummary {
        total_accounts: accounts.len(),
        matched_accounts,
        variance_accounts: accounts.len() - matched_accounts,
        gl_total_cents,
        tb_total_cents,
        aggregate_variance_cents,
        reconciliation_percentage: if accounts.is_empty() {
            100.0
        } else {
            matched_accounts as f64 / accounts.len() as f64 * 100.0
        },
    };

    ReconReport {
        accounts,
        gl_only,
        tb_only,
        summary,
        reconciled: aggregate_variance_cents == 0,
    }
}

/// Derive findings for significant per-account variances: at or above 5% of
/// materiality a finding opens, high severity once the variance itself
/// reaches materiality.
pub fn variance_findings(
    materiality_cents: i64,
    report: &ReconReport,
    now: DateTime<Utc>,
) -> Vec<Finding> {
    let significant = materiality_cents / 20;
    report
        .accounts
        .iter()
        .filter(|a| a.variance_cents >= significant)
        .map(|a| Finding {
            finding_id: 0,
            kind: FindingKind::ReconciliationVariance,
            severity: if a.variance_cents >= materiality_cents {
                Severity::High
            } else {
                Severity::Medium
            },
            sample_id: None,
            item_id: None,
            title: format!("Reconciliation variance for account {}", a.account_code),
            description: format!(
                "GL total {} does not agree to TB balance {}. Variance: {}",
                fmt_cents(a.gl_cents),
                fmt_cents(a.tb_cents),
                fmt_cents(a.variance_cents),
            ),
            recommended_action:
                "Review account postings and TB mapping for accuracy. Investigate source of variance."
                    .to_string(),
            status: FindingStatus::Open,
            proposed_entry: None,
            created_at: now,
            resolved_at: None,
        })
        .collect()
}
