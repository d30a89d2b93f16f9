use crate::config::RunConfig;
use crate::model::Classification;

/// Case-insensitive substring match of any keyword against `haystack`.
/// Blank keywords never match.
pub(crate) fn matches_any(haystack: &str, keywords: &[String]) -> bool {
    let lower = haystack.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .any(|k| lower.contains(&k.to_lowercase()))
}

/// Classify one record as capital or expense.
///
/// Fixed precedence pipeline, first match wins:
/// 1. at/above materiality ⇒ capital
/// 2. expense/maintenance keyword ⇒ expense
/// 3. capital keyword ⇒ capital
/// 4. default ⇒ capital (conservative: unclassified spend is treated as
///    capital pending review)
pub fn classify(
    account_name: &str,
    description: &str,
    amount_cents: i64,
    config: &RunConfig,
) -> Classification {
    if amount_cents.abs() >= config.materiality_cents {
        return Classification::Capital;
    }
    let text = format!("{account_name} {description}");
    if matches_any(&text, &config.expense_keywords) {
        return Classification::Expense;
    }
    if matches_any(&text, &config.capital_keywords) {
        return Classification::Capital;
    }
    Classification::Capital
}
