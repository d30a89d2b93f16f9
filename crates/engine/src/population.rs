use crate::classify::{classify, matches_any};
use crate::config::RunConfig;
use crate::error::EngineError;
use crate::model::{LedgerItem, LedgerRecord, PopulationMetrics};

#[derive(Debug)]
pub struct PopulationBuild {
    pub items: Vec<LedgerItem>,
    pub metrics: PopulationMetrics,
}

/// Build the eligible population from normalized ledger records.
///
/// Filtering order per record: malformed rows are counted and skipped;
/// rows without a relevance keyword hit are dropped; rows below the
/// capitalization threshold are dropped; adjusting/reversing entries
/// (keyword match on the reference field) are dropped. Survivors get their
/// derived flags and classification.
///
/// Rebuild is idempotent: item ids are dense positions in the fresh output,
/// so the caller replaces any prior population wholesale.
pub fn build_population(
    config: &RunConfig,
    records: &[LedgerRecord],
) -> Result<PopulationBuild, EngineError> {
    let mut metrics = PopulationMetrics {
        rows_seen: records.len(),
        ..Default::default()
    };
    let mut items = Vec::new();

    for record in records {
        // Row-level problems are counted, never fatal.
        if record.account_name.trim().is_empty() && record.description.trim().is_empty() {
            metrics.skipped_malformed += 1;
            continue;
        }
        if record.amount_cents == 0 {
            metrics.skipped_malformed += 1;
            continue;
        }

        let text = format!("{} {}", record.account_name, record.description);
        if !matches_any(&text, &config.allowed_keywords) {
            metrics.dropped_irrelevant += 1;
            continue;
        }
        if record.amount_cents.abs() < config.capitalization_threshold_cents {
            metrics.dropped_below_threshold += 1;
            continue;
        }
        if matches_any(&record.reference, &config.exclusion_keywords) {
            metrics.dropped_adjusting += 1;
            continue;
        }

        let abs = record.amount_cents.abs();
        let threshold = config.capitalization_threshold_cents;
        let classification =
            classify(&record.account_name, &record.description, record.amount_cents, config);

        let item = LedgerItem {
            item_id: items.len() as u64,
            account_code: record.account_code.clone(),
            account_name: record.account_name.clone(),
            description: record.description.clone(),
            amount_cents: record.amount_cents,
            date: record.date.clone(),
            reference: record.reference.clone(),
            vendor_name: record.vendor_name.clone(),
            row_number: record.row_number,
            threshold_met: abs >= threshold,
            isi_item: abs >= config.materiality_cents,
            near_threshold: abs >= threshold * 8 / 10 && abs < threshold * 12 / 10,
            classification,
        };

        match item.classification {
            crate::model::Classification::Capital => {
                metrics.capital_count += 1;
                metrics.capital_cents += abs;
            }
            crate::model::Classification::Expense => {
                metrics.expense_count += 1;
                metrics.expense_cents += abs;
            }
        }
        if item.isi_item {
            metrics.isi_count += 1;
        }
        if item.near_threshold {
            metrics.near_threshold_count += 1;
        }
        items.push(item);
    }

    metrics.rows_retained = items.len();

    if items.is_empty() {
        return Err(EngineError::EmptyPopulation {
            keywords: config.allowed_keywords.clone(),
            rows_seen: metrics.rows_seen,
            rows_dropped: metrics.rows_seen - metrics.rows_retained,
        });
    }

    Ok(PopulationBuild { items, metrics })
}
