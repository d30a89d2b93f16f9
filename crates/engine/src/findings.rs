use chrono::{DateTime, Utc};

use crate::config::RunConfig;
use crate::model::{
    fmt_cents, AdjustingEntry, Classification, Finding, FindingKind, FindingStatus, LedgerItem,
    Sample, Severity,
};

/// Severity by attribute index. Attributes 1/2/6/7 go to financial accuracy,
/// authorization, control design, and capitalization policy; 3/4/5 are
/// process compliance (documentation, timing, approvals).
pub fn severity_for_attribute(attribute_number: u8) -> Severity {
    match attribute_number {
        1 | 2 | 6 | 7 => Severity::High,
        3 | 4 | 5 => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Canned remediation guidance, keyed by attribute.
pub fn recommended_action(attribute_number: u8) -> &'static str {
    match attribute_number {
        1 => "Verify calculation accuracy and obtain corrected documentation. Review voucher processing controls.",
        2 => "Obtain proper authorization documentation. Review approval hierarchy and delegation of authority.",
        3 => "Ensure documents are properly marked to prevent reprocessing. Review payment system controls.",
        4 => "Verify transaction relates to current fiscal year. Review accrual and cutoff procedures.",
        5 => "Obtain evidence of pre-approval. Review purchase order system and approval workflows.",
        6 => "Review segregation of duties and approval processes. Assess control design and operating effectiveness.",
        7 => "Review capitalization policy and ensure proper expense/capital classification. Consult with accounting team.",
        _ => "Review and remediate identified deficiency.",
    }
}

/// Build the finding for a failed attribute check.
///
/// When the comment matches a known remediation pattern ("threshold"), a
/// proposed reclassifying entry rides along. It is advisory data for the
/// rendering collaborator, never auto-posted.
pub fn finding_from_failed_check(
    item: &LedgerItem,
    sample: &Sample,
    attribute_number: u8,
    comment: &str,
    config: &RunConfig,
    now: DateTime<Utc>,
) -> Finding {
    let description = format!(
        "{}: {}",
        config.attribute_checklist[attribute_number as usize - 1],
        comment
    );

    Finding {
        finding_id: 0, // assigned when registered against a run
        kind: FindingKind::AttributeFailure,
        severity: severity_for_attribute(attribute_number),
        sample_id: Some(sample.sample_id),
        item_id: Some(item.item_id),
        title: format!("Attribute {attribute_number} failed - {}", item.account_name),
        description,
        recommended_action: recommended_action(attribute_number).to_string(),
        status: FindingStatus::Open,
        proposed_entry: proposed_entry_for_comment(comment, item.amount_cents.abs()),
        created_at: now,
        resolved_at: None,
    }
}

/// Recognize remediation patterns in a failing comment. The only pattern the
/// original workflow acts on is an amount capitalized below the policy
/// threshold, which suggests a reclass from PP&E to expense.
pub fn proposed_entry_for_comment(comment: &str, amount_cents: i64) -> Option<AdjustingEntry> {
    if comment.to_lowercase().contains("threshold") {
        Some(AdjustingEntry {
            debit_account: "Repairs & Maintenance Expense".into(),
            credit_account: "Property, Plant & Equipment".into(),
            amount_cents,
            rationale: comment.to_string(),
        })
    } else {
        None
    }
}

/// Population outlier scan: items classified capital whose amount is below
/// the capitalization threshold should not have been capitalized at all.
pub fn scan_below_threshold(
    config: &RunConfig,
    population: &[LedgerItem],
    now: DateTime<Utc>,
) -> Vec<Finding> {
    population
        .iter()
        .filter(|i| {
            i.classification == Classification::Capital
                && i.amount_cents.abs() < config.capitalization_threshold_cents
        })
        .map(|item| {
            let amount = item.amount_cents.abs();
            let rationale = format!(
                "Amount {} capitalized below threshold {}",
                fmt_cents(amount),
                fmt_cents(config.capitalization_threshold_cents),
            );
            Finding {
                finding_id: 0,
                kind: FindingKind::BelowThresholdCapital,
                severity: Severity::Medium,
                sample_id: None,
                item_id: Some(item.item_id),
                title: format!("Below-threshold capitalization - {}", item.account_name),
                description: rationale.clone(),
                recommended_action: recommended_action(7).to_string(),
                status: FindingStatus::Open,
                proposed_entry: Some(AdjustingEntry {
                    debit_account: "Repairs & Maintenance Expense".into(),
                    credit_account: "Property, Plant & Equipment".into(),
                    amount_cents: amount,
                    rationale,
                }),
                created_at: now,
                resolved_at: None,
            }
        })
        .collect()
}
