use std::collections::HashSet;

use crate::config::RunConfig;
use crate::error::EngineError;
use crate::model::{
    fmt_cents, Classification, LedgerItem, Sample, SampleType, SamplingMetrics, StratumBreakdown,
};

pub const ABOVE_MATERIALITY_STRATUM: &str = "Above Materiality";

#[derive(Debug)]
pub struct SamplePlan {
    pub samples: Vec<Sample>,
    pub metrics: SamplingMetrics,
    /// Self-check violations. Empty for any plan this module produces;
    /// surfaced rather than asserted so workpapers can show the check ran.
    pub issues: Vec<String>,
}

/// Deterministic stratified sample selection.
///
/// Three tiers, in order:
/// 1. auto-include: every individually significant item;
/// 2. stratified: per configured band, top-K by absolute amount, ties broken
///    by original ledger order;
/// 3. coverage fill: highest-value unselected capital items until the
///    coverage target is met, the fill cap is hit, or the pool is exhausted.
///
/// Running this twice on an unchanged population and config yields an
/// identical sample set; audit evidence must be reproducible.
pub fn generate_samples(
    config: &RunConfig,
    population: &[LedgerItem],
) -> Result<SamplePlan, EngineError> {
    if population.is_empty() {
        return Err(EngineError::EmptyPopulation {
            keywords: config.allowed_keywords.clone(),
            rows_seen: 0,
            rows_dropped: 0,
        });
    }

    let capital_population_cents: i64 = population
        .iter()
        .filter(|i| i.classification == Classification::Capital)
        .map(|i| i.amount_cents.abs())
        .sum();

    let mut samples: Vec<Sample> = Vec::new();
    let mut selected: HashSet<u64> = HashSet::new();
    let mut sampled_cents: i64 = 0;

    let mut push = |samples: &mut Vec<Sample>,
                    selected: &mut HashSet<u64>,
                    sampled_cents: &mut i64,
                    item: &LedgerItem,
                    sample_type: SampleType,
                    stratum: String,
                    reason: String| {
        let sample = Sample::new(samples.len() as u64, item.item_id, sample_type, stratum, reason);
        selected.insert(item.item_id);
        *sampled_cents += item.amount_cents.abs();
        samples.push(sample);
    };

    // Tier 1: auto-include every ISI item, in population order.
    for item in population.iter().filter(|i| i.isi_item) {
        let reason = format!(
            "Amount {} meets or exceeds materiality {}",
            fmt_cents(item.amount_cents.abs()),
            fmt_cents(config.materiality_cents),
        );
        push(
            &mut samples,
            &mut selected,
            &mut sampled_cents,
            item,
            SampleType::AutoIncluded,
            ABOVE_MATERIALITY_STRATUM.to_string(),
            reason,
        );
    }
    let auto_included = samples.len();

    // Tier 2: stratify the remainder by configured band, top-K by |amount|.
    for band in &config.bands {
        let mut in_band: Vec<&LedgerItem> = population
            .iter()
            .filter(|i| !i.isi_item && band.contains(i.amount_cents.abs()))
            .collect();
        if in_band.is_empty() {
            continue;
        }
        in_band.sort_by(|a, b| {
            b.amount_cents
                .abs()
                .cmp(&a.amount_cents.abs())
                .then(a.row_number.cmp(&b.row_number))
        });

        let take = band.sample_size.min(in_band.len());
        let band_len = in_band.len();
        for item in in_band.into_iter().take(take) {
            let reason = format!(
                "Top-{take} by value from {band_len} items in stratum {}",
                band.label()
            );
            push(
                &mut samples,
                &mut selected,
                &mut sampled_cents,
                item,
                SampleType::Stratified,
                band.label(),
                reason,
            );
        }
    }
    let stratified = samples.len() - auto_included;

    // Tier 3: coverage fill from the unselected capital pool.
    let target_cents = (config.coverage_target * capital_population_cents as f64).ceil() as i64;
    let mut fill_pool: Vec<&LedgerItem> = population
        .iter()
        .filter(|i| i.classification == Classification::Capital && !selected.contains(&i.item_id))
        .collect();
    fill_pool.sort_by(|a, b| {
        b.amount_cents
            .abs()
            .cmp(&a.amount_cents.abs())
            .then(a.row_number.cmp(&b.row_number))
    });

    let mut coverage_fill = 0;
    for item in fill_pool {
        if sampled_cents >= target_cents || coverage_fill >= config.coverage_fill_cap {
            break;
        }
        let stratum = config
            .band_for(item.amount_cents.abs())
            .map(|b| b.label())
            .unwrap_or_else(|| ABOVE_MATERIALITY_STRATUM.to_string());
        let reason = format!(
            "Coverage fill toward {:.0}% target ({} sampled of {} capital population)",
            config.coverage_target * 100.0,
            fmt_cents(sampled_cents),
            fmt_cents(capital_population_cents),
        );
        push(
            &mut samples,
            &mut selected,
            &mut sampled_cents,
            item,
            SampleType::Stratified,
            stratum,
            reason,
        );
        coverage_fill += 1;
    }

    let coverage = if capital_population_cents > 0 {
        sampled_cents as f64 / capital_population_cents as f64
    } else {
        1.0
    };

    let metrics = SamplingMetrics {
        population_count: population.len(),
        capital_population_cents,
        auto_included,
        stratified,
        coverage_fill,
        total_samples: samples.len(),
        sampled_cents,
        coverage,
        strata: stratum_breakdown(&samples, population),
    };

    let issues = self_check(config, population, &samples);

    Ok(SamplePlan { samples, metrics, issues })
}

/// Per-(stratum, type) counts and value, in selection order.
fn stratum_breakdown(samples: &[Sample], population: &[LedgerItem]) -> Vec<StratumBreakdown> {
    let mut breakdown: Vec<StratumBreakdown> = Vec::new();
    for sample in samples {
        let amount = population[sample.item_id as usize].amount_cents.abs();
        match breakdown
            .iter_mut()
            .find(|b| b.stratum == sample.stratum && b.sample_type == sample.sample_type)
        {
            Some(entry) => {
                entry.count += 1;
                entry.total_cents += amount;
            }
            None => breakdown.push(StratumBreakdown {
                stratum: sample.stratum.clone(),
                sample_type: sample.sample_type,
                count: 1,
                total_cents: amount,
            }),
        }
    }
    breakdown
}

/// Business-rule validation of a finished plan: every ISI item is sampled,
/// no item is referenced twice, and auto-included samples really are at or
/// above materiality.
fn self_check(config: &RunConfig, population: &[LedgerItem], samples: &[Sample]) -> Vec<String> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for sample in samples {
        if !seen.insert(sample.item_id) {
            issues.push(format!("item {} selected more than once", sample.item_id));
        }
        if sample.sample_type == SampleType::AutoIncluded {
            let amount = population[sample.item_id as usize].amount_cents.abs();
            if amount < config.materiality_cents {
                issues.push(format!(
                    "sample {} auto-included but amount {} is below materiality",
                    sample.sample_id,
                    fmt_cents(amount)
                ));
            }
        }
    }

    for item in population.iter().filter(|i| i.isi_item) {
        if !seen.contains(&item.item_id) {
            issues.push(format!(
                "individually significant item {} not sampled",
                item.item_id
            ));
        }
    }

    issues
}
