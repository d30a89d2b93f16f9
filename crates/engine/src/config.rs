use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::fmt_cents;

// ---------------------------------------------------------------------------
// Stratification bands
// ---------------------------------------------------------------------------

/// One contiguous amount band `[min, max)` with its configured sample size.
/// `max_cents = None` means open-ended (the last band).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Band {
    pub min_cents: i64,
    pub max_cents: Option<i64>,
    pub sample_size: usize,
}

impl Band {
    pub fn contains(&self, abs_cents: i64) -> bool {
        abs_cents >= self.min_cents && self.max_cents.map_or(true, |max| abs_cents < max)
    }

    /// Human-readable stratum label, e.g. `$1,000.00-$2,500.00` or `$10,000.00+`.
    pub fn label(&self) -> String {
        match self.max_cents {
            Some(max) => format!("{}-{}", fmt_cents(self.min_cents), fmt_cents(max)),
            None => format!("{}+", fmt_cents(self.min_cents)),
        }
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Per-run configuration. Set at run creation; mutable only while the run is
/// draft or active. All keyword sets are explicit here rather than baked-in
/// constants, so individual engagements can override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_capitalization_threshold")]
    pub capitalization_threshold_cents: i64,
    #[serde(default = "default_materiality")]
    pub materiality_cents: i64,
    #[serde(default = "default_coverage_target")]
    pub coverage_target: f64,
    #[serde(default)]
    pub fy_start: Option<NaiveDate>,
    #[serde(default)]
    pub fy_end: Option<NaiveDate>,
    /// Keywords that make an account/description relevant to this testwork.
    #[serde(default = "default_allowed_keywords")]
    pub allowed_keywords: Vec<String>,
    /// Keywords indicating expense/maintenance nature.
    #[serde(default = "default_expense_keywords")]
    pub expense_keywords: Vec<String>,
    /// Keywords indicating capital nature.
    #[serde(default = "default_capital_keywords")]
    pub capital_keywords: Vec<String>,
    /// Reference/document keywords marking adjusting or reversing entries.
    #[serde(default = "default_exclusion_keywords")]
    pub exclusion_keywords: Vec<String>,
    #[serde(default = "default_bands")]
    pub bands: Vec<Band>,
    /// Support documents required before a sample's support is complete.
    #[serde(default = "default_min_support_docs")]
    pub min_support_docs: usize,
    /// Hard cap on items added by the coverage-fill pass.
    #[serde(default = "default_coverage_fill_cap")]
    pub coverage_fill_cap: usize,
    #[serde(default = "default_checklist")]
    pub attribute_checklist: [String; 7],
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            capitalization_threshold_cents: default_capitalization_threshold(),
            materiality_cents: default_materiality(),
            coverage_target: default_coverage_target(),
            fy_start: None,
            fy_end: None,
            allowed_keywords: default_allowed_keywords(),
            expense_keywords: default_expense_keywords(),
            capital_keywords: default_capital_keywords(),
            exclusion_keywords: default_exclusion_keywords(),
            bands: default_bands(),
            min_support_docs: default_min_support_docs(),
            coverage_fill_cap: default_coverage_fill_cap(),
            attribute_checklist: default_checklist(),
        }
    }
}

impl RunConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.capitalization_threshold_cents < 0 {
            return Err(EngineError::ConfigValidation(
                "capitalization threshold must be non-negative".into(),
            ));
        }
        if self.materiality_cents <= 0 {
            return Err(EngineError::ConfigValidation(
                "materiality must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.coverage_target) {
            return Err(EngineError::ConfigValidation(format!(
                "coverage target {} outside 0..=1",
                self.coverage_target
            )));
        }
        if let (Some(start), Some(end)) = (self.fy_start, self.fy_end) {
            if start > end {
                return Err(EngineError::ConfigValidation(format!(
                    "fiscal year start {start} after end {end}"
                )));
            }
        }
        if self.allowed_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(EngineError::ConfigValidation(
                "at least one allowed keyword is required".into(),
            ));
        }
        self.validate_bands()
    }

    /// Bands must start at zero, ascend contiguously, and end open-ended.
    fn validate_bands(&self) -> Result<(), EngineError> {
        if self.bands.is_empty() {
            return Err(EngineError::ConfigValidation(
                "at least one stratification band is required".into(),
            ));
        }
        if self.bands[0].min_cents != 0 {
            return Err(EngineError::ConfigValidation(
                "first stratification band must start at 0".into(),
            ));
        }
        for pair in self.bands.windows(2) {
            let max = pair[0].max_cents.ok_or_else(|| {
                EngineError::ConfigValidation(
                    "only the last stratification band may be open-ended".into(),
                )
            })?;
            if max <= pair[0].min_cents {
                return Err(EngineError::ConfigValidation(format!(
                    "band {} is empty or inverted",
                    pair[0].label()
                )));
            }
            if pair[1].min_cents != max {
                return Err(EngineError::ConfigValidation(format!(
                    "bands {} and {} are not contiguous",
                    pair[0].label(),
                    pair[1].label()
                )));
            }
        }
        let last = &self.bands[self.bands.len() - 1];
        if last.max_cents.is_some() {
            return Err(EngineError::ConfigValidation(
                "last stratification band must be open-ended".into(),
            ));
        }
        Ok(())
    }

    /// The band covering `abs_cents`. Config validation guarantees full
    /// coverage of `[0, ∞)`, so this only returns `None` for negative input.
    pub fn band_for(&self, abs_cents: i64) -> Option<&Band> {
        self.bands.iter().find(|b| b.contains(abs_cents))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_capitalization_threshold() -> i64 {
    500_000 // $5,000
}

fn default_materiality() -> i64 {
    2_500_000 // $25,000
}

fn default_coverage_target() -> f64 {
    0.75
}

fn default_allowed_keywords() -> Vec<String> {
    ["repair", "maintenance", "r&m", "upkeep"]
        .map(String::from)
        .to_vec()
}

fn default_expense_keywords() -> Vec<String> {
    ["repair", "maintenance", "service", "fix", "replace", "clean", "inspect", "tune"]
        .map(String::from)
        .to_vec()
}

fn default_capital_keywords() -> Vec<String> {
    [
        "purchase",
        "acquisition",
        "installation",
        "construction",
        "improvement",
        "upgrade",
        "addition",
        "asset",
        "equipment",
        "capital",
    ]
    .map(String::from)
    .to_vec()
}

fn default_exclusion_keywords() -> Vec<String> {
    ["aje", "adj", "adjustment"].map(String::from).to_vec()
}

fn default_bands() -> Vec<Band> {
    vec![
        Band { min_cents: 0, max_cents: Some(100_000), sample_size: 3 },
        Band { min_cents: 100_000, max_cents: Some(500_000), sample_size: 5 },
        Band { min_cents: 500_000, max_cents: Some(1_000_000), sample_size: 8 },
        Band { min_cents: 1_000_000, max_cents: Some(2_500_000), sample_size: 10 },
        Band { min_cents: 2_500_000, max_cents: None, sample_size: 15 },
    ]
}

fn default_min_support_docs() -> usize {
    3
}

fn default_coverage_fill_cap() -> usize {
    50
}

fn default_checklist() -> [String; 7] {
    [
        "Amount is calculated correctly and agrees to support",
        "Proper initiation/authorization/recording/classification/presentation",
        "Documents canceled/marked paid to prevent duplicate payment",
        "Disbursement relates to current fiscal year",
        "PO approved before service/purchase",
        "Internal controls followed (segregation, approvals, documentation)",
        "Expenditure correctly accounted for (expense vs capital)",
    ]
    .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn from_toml_overrides() {
        let toml_str = r#"
capitalization_threshold_cents = 500000
materiality_cents = 2500000
coverage_target = 0.75
allowed_keywords = ["repair", "maintenance"]

[[bands]]
min_cents = 0
max_cents = 100000
sample_size = 3

[[bands]]
min_cents = 100000
sample_size = 5
"#;
        let config = RunConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.bands.len(), 2);
        assert_eq!(config.bands[1].sample_size, 5);
        assert!(config.bands[1].max_cents.is_none());
        // Untouched fields keep defaults
        assert_eq!(config.min_support_docs, 3);
        assert_eq!(config.attribute_checklist.len(), 7);
    }

    #[test]
    fn rejects_gap_between_bands() {
        let mut config = RunConfig::default();
        config.bands = vec![
            Band { min_cents: 0, max_cents: Some(100_000), sample_size: 3 },
            Band { min_cents: 200_000, max_cents: None, sample_size: 5 },
        ];
        assert!(matches!(
            config.validate(),
            Err(EngineError::ConfigValidation(_))
        ));
    }

    #[test]
    fn rejects_bounded_last_band() {
        let mut config = RunConfig::default();
        config.bands = vec![Band { min_cents: 0, max_cents: Some(100_000), sample_size: 3 }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_coverage_target_out_of_range() {
        let mut config = RunConfig::default();
        config.coverage_target = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn band_lookup_covers_all_amounts() {
        let config = RunConfig::default();
        assert_eq!(config.band_for(0).unwrap().label(), "$0.00-$1,000.00");
        assert_eq!(config.band_for(99_999).unwrap().sample_size, 3);
        assert_eq!(config.band_for(100_000).unwrap().sample_size, 5);
        assert!(config.band_for(1_000_000_000).unwrap().max_cents.is_none());
    }
}
