use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One normalized ledger row as handed over by the import collaborator.
///
/// Ingestion (column guessing, spreadsheet parsing) has already happened;
/// this engine never sees raw files. `row_number` preserves the original
/// extract order and is the stable tie-break key everywhere.
#[derive(Debug, Clone)]
pub struct LedgerRecord {
    pub account_code: String,
    pub account_name: String,
    pub description: String,
    pub amount_cents: i64,
    pub date: String,
    pub reference: String,
    pub vendor_name: String,
    pub row_number: usize,
}

/// One trial-balance line. Independent lifecycle from ledger rows;
/// used only by reconciliation.
#[derive(Debug, Clone)]
pub struct TbRow {
    pub account_code: String,
    pub account_name: String,
    pub balance_cents: i64,
}

// ---------------------------------------------------------------------------
// Population
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Capital,
    Expense,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capital => write!(f, "capital"),
            Self::Expense => write!(f, "expense"),
        }
    }
}

/// A retained population row. `item_id` is dense: it equals the item's
/// position in the rebuilt population, so lookups are plain indexing.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerItem {
    pub item_id: u64,
    pub account_code: String,
    pub account_name: String,
    pub description: String,
    pub amount_cents: i64,
    pub date: String,
    pub reference: String,
    pub vendor_name: String,
    pub row_number: usize,
    pub threshold_met: bool,
    pub isi_item: bool,
    pub near_threshold: bool,
    pub classification: Classification,
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    AutoIncluded,
    Stratified,
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoIncluded => write!(f, "auto_included"),
            Self::Stratified => write!(f, "stratified"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Pass,
    Fail,
    Na,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Na => write!(f, "na"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    Pending,
    Partial,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributesStatus {
    Pending,
    InProgress,
    Complete,
}

/// One of the seven fixed checklist slots.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeCheck {
    pub attribute_number: u8,
    pub status: CheckStatus,
    pub comment: Option<String>,
    pub checked_by: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl AttributeCheck {
    pub fn pending(attribute_number: u8) -> Self {
        Self {
            attribute_number,
            status: CheckStatus::Pending,
            comment: None,
            checked_by: None,
            checked_at: None,
        }
    }
}

/// Supporting documentation attached to a sample. Append-only; the engine
/// stores the content hash, never the bytes.
#[derive(Debug, Clone, Serialize)]
pub struct SupportDocument {
    pub filename: String,
    pub document_type: String,
    pub size_bytes: u64,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A ledger item selected for testing, with its embedded testwork state.
///
/// `attributes_status` and `support_status` are derived; they are only
/// written by `attributes::apply_check_update` / `attributes::attach_support`.
/// `revision` increments on every mutation and backs optimistic concurrency
/// at the service layer.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub sample_id: u64,
    pub item_id: u64,
    pub sample_type: SampleType,
    pub stratum: String,
    pub selection_reason: String,
    pub support_status: SupportStatus,
    pub attributes_status: AttributesStatus,
    pub revision: u64,
    pub support_docs: Vec<SupportDocument>,
    pub checks: [AttributeCheck; 7],
}

impl Sample {
    pub fn new(
        sample_id: u64,
        item_id: u64,
        sample_type: SampleType,
        stratum: String,
        selection_reason: String,
    ) -> Self {
        Self {
            sample_id,
            item_id,
            sample_type,
            stratum,
            selection_reason,
            support_status: SupportStatus::Pending,
            attributes_status: AttributesStatus::Pending,
            revision: 0,
            support_docs: Vec::new(),
            checks: std::array::from_fn(|i| AttributeCheck::pending(i as u8 + 1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    AttributeFailure,
    BelowThresholdCapital,
    ReconciliationVariance,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttributeFailure => write!(f, "attribute_failure"),
            Self::BelowThresholdCapital => write!(f, "below_threshold_capital"),
            Self::ReconciliationVariance => write!(f, "reconciliation_variance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Resolved,
    Dismissed,
}

/// Proposed adjusting journal entry. Advisory output for the rendering
/// collaborator; never posted by this engine.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustingEntry {
    pub debit_account: String,
    pub credit_account: String,
    pub amount_cents: i64,
    pub rationale: String,
}

/// A derived exception/finding. `finding_id` is assigned by the service
/// layer when the finding is registered against a run.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub finding_id: u64,
    pub kind: FindingKind,
    pub severity: Severity,
    pub sample_id: Option<u64>,
    pub item_id: Option<u64>,
    pub title: String,
    pub description: String,
    pub recommended_action: String,
    pub status: FindingStatus,
    pub proposed_entry: Option<AdjustingEntry>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationMetrics {
    pub rows_seen: usize,
    pub rows_retained: usize,
    pub skipped_malformed: usize,
    pub dropped_irrelevant: usize,
    pub dropped_below_threshold: usize,
    pub dropped_adjusting: usize,
    pub capital_count: usize,
    pub expense_count: usize,
    pub capital_cents: i64,
    pub expense_cents: i64,
    pub isi_count: usize,
    pub near_threshold_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StratumBreakdown {
    pub stratum: String,
    pub sample_type: SampleType,
    pub count: usize,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SamplingMetrics {
    pub population_count: usize,
    pub capital_population_cents: i64,
    pub auto_included: usize,
    pub stratified: usize,
    pub coverage_fill: usize,
    pub total_samples: usize,
    pub sampled_cents: i64,
    /// Achieved coverage: sampled value over capital population value.
    pub coverage: f64,
    pub strata: Vec<StratumBreakdown>,
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Render cents as a dollar string with thousands separators: `$12,345.67`.
/// Used in stratum labels and selection reasons, which end up in workpapers.
pub fn fmt_cents(cents: i64) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let dollars = abs / 100;
    let rem = abs % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${grouped}.{rem:02}")
    } else {
        format!("${grouped}.{rem:02}")
    }
}
