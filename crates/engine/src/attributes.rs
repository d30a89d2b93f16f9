use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::model::{
    AttributeCheck, AttributesStatus, CheckStatus, Sample, SupportDocument, SupportStatus,
};

/// Outcome of a check update. `failed` tells the caller a finding must be
/// derived for this attribute.
#[derive(Debug, Clone, Copy)]
pub struct CheckOutcome {
    pub failed: bool,
    pub attributes_status: AttributesStatus,
}

/// Upsert one checklist slot and recompute the sample's derived state.
///
/// A `fail` without a comment is rejected: every exception needs a stated
/// basis before it can flow into the findings log.
pub fn apply_check_update(
    sample: &mut Sample,
    attribute_number: u8,
    status: CheckStatus,
    comment: Option<&str>,
    checked_by: &str,
    now: DateTime<Utc>,
) -> Result<CheckOutcome, EngineError> {
    if !(1..=7).contains(&attribute_number) {
        return Err(EngineError::UnknownAttribute { number: attribute_number });
    }
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    if status == CheckStatus::Fail && comment.is_none() {
        return Err(EngineError::Validation(format!(
            "attribute {attribute_number}: a failing check requires a comment"
        )));
    }

    let slot = &mut sample.checks[attribute_number as usize - 1];
    *slot = AttributeCheck {
        attribute_number,
        status,
        comment: comment.map(String::from),
        checked_by: Some(checked_by.to_string()),
        checked_at: Some(now),
    };

    sample.attributes_status = derive_attributes_status(&sample.checks);
    sample.revision += 1;

    Ok(CheckOutcome {
        failed: status == CheckStatus::Fail,
        attributes_status: sample.attributes_status,
    })
}

/// Pure derivation: pending iff every slot is pending, complete iff no slot
/// is pending, in-progress otherwise. Never stored independently.
pub fn derive_attributes_status(checks: &[AttributeCheck; 7]) -> AttributesStatus {
    let pending = checks.iter().filter(|c| c.status == CheckStatus::Pending).count();
    match pending {
        7 => AttributesStatus::Pending,
        0 => AttributesStatus::Complete,
        _ => AttributesStatus::InProgress,
    }
}

/// Append a support document and advance `support_status`.
///
/// The document list keeps growing, but `complete` is sticky: once the
/// minimum count has been reached the status never reverses.
pub fn attach_support(sample: &mut Sample, doc: SupportDocument, min_docs: usize) {
    sample.support_docs.push(doc);
    if sample.support_status != SupportStatus::Complete {
        sample.support_status = if sample.support_docs.len() >= min_docs {
            SupportStatus::Complete
        } else {
            SupportStatus::Partial
        };
    }
    sample.revision += 1;
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AttributeSummaryRow {
    pub attribute_number: u8,
    pub description: String,
    pub status: CheckStatus,
    pub comment: Option<String>,
    pub checked_by: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributeSummary {
    pub sample_id: u64,
    pub rows: Vec<AttributeSummaryRow>,
    pub pending: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_applicable: usize,
    pub completion_percentage: f64,
}

/// Per-sample checklist view for the rendering collaborator.
pub fn attribute_summary(sample: &Sample, checklist: &[String; 7]) -> AttributeSummary {
    let rows: Vec<AttributeSummaryRow> = sample
        .checks
        .iter()
        .map(|c| AttributeSummaryRow {
            attribute_number: c.attribute_number,
            description: checklist[c.attribute_number as usize - 1].clone(),
            status: c.status,
            comment: c.comment.clone(),
            checked_by: c.checked_by.clone(),
            checked_at: c.checked_at,
        })
        .collect();

    let count = |s: CheckStatus| sample.checks.iter().filter(|c| c.status == s).count();
    let pending = count(CheckStatus::Pending);

    AttributeSummary {
        sample_id: sample.sample_id,
        rows,
        pending,
        passed: count(CheckStatus::Pass),
        failed: count(CheckStatus::Fail),
        not_applicable: count(CheckStatus::Na),
        completion_percentage: (7 - pending) as f64 / 7.0 * 100.0,
    }
}
