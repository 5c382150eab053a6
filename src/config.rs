// ⚙️ Analysis Configuration - one validated value, passed explicitly
//
// Environment-style keys (GST_RATE, TAX_RATE, ...) are read once, validated
// once, and the resulting AnalysisConfig is handed to every core call.
// Rates are fractions (0.15, not 15).

use crate::error::{AnalysisError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// COST ASSUMPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostAssumptions {
    /// Default insurance cost (used when no quote is available)
    pub insurance: f64,
    pub renovation_budget: f64,
    pub legal_expenses: f64,
    pub council_rates: f64,
    /// Agent commission, fraction of target value
    pub commission_rate: f64,
    pub gst_rate: f64,
    pub tax_rate: f64,
    #[serde(default)]
    pub financing: FinancingTerms,
}

impl Default for CostAssumptions {
    fn default() -> Self {
        CostAssumptions {
            insurance: 1800.0,
            renovation_budget: 100_000.0,
            legal_expenses: 2500.0,
            council_rates: 2000.0,
            commission_rate: 0.018,
            gst_rate: 0.15,
            tax_rate: 0.33,
            financing: FinancingTerms::default(),
        }
    }
}

impl CostAssumptions {
    pub fn validate(&self) -> Result<()> {
        check_fraction("gst_rate", self.gst_rate)?;
        check_fraction("tax_rate", self.tax_rate)?;
        check_fraction("commission_rate", self.commission_rate)?;
        check_non_negative("insurance", self.insurance)?;
        check_non_negative("renovation_budget", self.renovation_budget)?;
        check_non_negative("legal_expenses", self.legal_expenses)?;
        check_non_negative("council_rates", self.council_rates)?;
        self.financing.validate()
    }

    /// Same assumptions with a different insurance figure (e.g. a live quote)
    pub fn with_insurance(&self, insurance: f64) -> Self {
        CostAssumptions { insurance, ..*self }
    }
}

/// Interest carried on purchase + renovation for the renovation period.
/// A zero rate removes financing from the model entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancingTerms {
    pub annual_interest_rate: f64,
    pub months: f64,
}

impl Default for FinancingTerms {
    fn default() -> Self {
        FinancingTerms {
            annual_interest_rate: 0.0,
            months: 6.0,
        }
    }
}

impl FinancingTerms {
    /// Fraction of (PP + renovation budget) paid as interest over the period
    pub fn period_rate(&self) -> f64 {
        self.annual_interest_rate / 12.0 * self.months
    }

    pub fn validate(&self) -> Result<()> {
        check_non_negative("interest_rate", self.annual_interest_rate)?;
        check_non_negative("renovation_months", self.months)
    }
}

// ============================================================================
// VIABILITY THRESHOLDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViabilityThresholds {
    pub minimum_post_tax_profit: f64,
    pub target_profit_min: f64,
    pub target_profit_max: f64,
}

impl Default for ViabilityThresholds {
    fn default() -> Self {
        ViabilityThresholds {
            minimum_post_tax_profit: 25_000.0,
            target_profit_min: 25_000.0,
            target_profit_max: 30_000.0,
        }
    }
}

impl ViabilityThresholds {
    pub fn validate(&self) -> Result<()> {
        check_finite("min_profit_threshold", self.minimum_post_tax_profit)?;
        check_finite("target_profit_min", self.target_profit_min)?;
        check_finite("target_profit_max", self.target_profit_max)?;
        if self.target_profit_min > self.target_profit_max {
            return Err(AnalysisError::invalid_config(
                "target_profit_min",
                format!(
                    "{} is above target_profit_max {}",
                    self.target_profit_min, self.target_profit_max
                ),
            ));
        }
        Ok(())
    }
}

/// Which point of the target range the recommender solves for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPolicy {
    /// (target_profit_min + target_profit_max) / 2
    #[default]
    Midpoint,
    /// Cheapest price still reaching target_profit_min
    Minimum,
}

impl FromStr for TargetPolicy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "midpoint" => Ok(TargetPolicy::Midpoint),
            "minimum" | "min" => Ok(TargetPolicy::Minimum),
            other => Err(AnalysisError::invalid_config(
                "recommendation_policy",
                format!("unknown policy '{}'", other),
            )),
        }
    }
}

// ============================================================================
// CACHE + MATCHING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub max_age_days: i64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy { max_age_days: 7 }
    }
}

impl CachePolicy {
    /// Saturates for day counts chrono cannot represent; `validate` rejects those
    pub fn max_age(&self) -> Duration {
        Duration::try_days(self.max_age_days).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_age_days <= 0 {
            return Err(AnalysisError::invalid_config(
                "cache_expiry_days",
                "must be at least one day",
            ));
        }
        if Duration::try_days(self.max_age_days).is_none() {
            return Err(AnalysisError::invalid_config(
                "cache_expiry_days",
                format!("{} days is out of range", self.max_age_days),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    /// Sales older than this many calendar months are ignored
    pub window_months: u32,
    /// Allowed relative floor-area difference (0.20 = ±20%)
    pub area_tolerance: f64,
}

impl Default for MatchCriteria {
    fn default() -> Self {
        MatchCriteria {
            window_months: 3,
            area_tolerance: 0.20,
        }
    }
}

impl MatchCriteria {
    pub fn validate(&self) -> Result<()> {
        if self.window_months == 0 {
            return Err(AnalysisError::invalid_config(
                "sales_window_months",
                "must be at least one month",
            ));
        }
        check_non_negative("floor_area_tolerance", self.area_tolerance)
    }
}

// ============================================================================
// ANALYSIS CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub costs: CostAssumptions,
    pub thresholds: ViabilityThresholds,
    pub cache: CachePolicy,
    pub matching: MatchCriteria,
    pub target_policy: TargetPolicy,
}

impl AnalysisConfig {
    /// Load from the process environment (and `.env` if present), then validate
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value lookup; absent keys take defaults,
    /// present-but-unparsable keys are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AnalysisConfig::default();
        let d_costs = defaults.costs;
        let d_thresholds = defaults.thresholds;

        let config = AnalysisConfig {
            costs: CostAssumptions {
                insurance: read(&lookup, "DEFAULT_INSURANCE", d_costs.insurance)?,
                renovation_budget: read(
                    &lookup,
                    "DEFAULT_RENOVATION_BUDGET",
                    d_costs.renovation_budget,
                )?,
                legal_expenses: read(&lookup, "DEFAULT_LEGAL_EXPENSES", d_costs.legal_expenses)?,
                council_rates: read(&lookup, "DEFAULT_COUNCIL_RATES", d_costs.council_rates)?,
                commission_rate: read(&lookup, "COMMISSION_RATE", d_costs.commission_rate)?,
                gst_rate: read(&lookup, "GST_RATE", d_costs.gst_rate)?,
                tax_rate: read(&lookup, "TAX_RATE", d_costs.tax_rate)?,
                financing: FinancingTerms {
                    annual_interest_rate: read_first(
                        &lookup,
                        &["INTEREST_RATE", "DEFAULT_INTEREST_RATE"],
                        d_costs.financing.annual_interest_rate,
                    )?,
                    months: read_first(
                        &lookup,
                        &["RENOVATION_MONTHS", "DEFAULT_RENOVATION_MONTHS"],
                        d_costs.financing.months,
                    )?,
                },
            },
            thresholds: ViabilityThresholds {
                minimum_post_tax_profit: read(
                    &lookup,
                    "MIN_PROFIT_THRESHOLD",
                    d_thresholds.minimum_post_tax_profit,
                )?,
                target_profit_min: read(&lookup, "TARGET_PROFIT_MIN", d_thresholds.target_profit_min)?,
                target_profit_max: read(&lookup, "TARGET_PROFIT_MAX", d_thresholds.target_profit_max)?,
            },
            cache: CachePolicy {
                max_age_days: read(&lookup, "CACHE_EXPIRY_DAYS", defaults.cache.max_age_days)?,
            },
            matching: MatchCriteria {
                window_months: read(&lookup, "SALES_WINDOW_MONTHS", defaults.matching.window_months)?,
                area_tolerance: read(
                    &lookup,
                    "FLOOR_AREA_TOLERANCE",
                    defaults.matching.area_tolerance,
                )?,
            },
            target_policy: read(&lookup, "RECOMMENDATION_POLICY", defaults.target_policy)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.costs.validate()?;
        self.thresholds.validate()?;
        self.cache.validate()?;
        self.matching.validate()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn read<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            AnalysisError::invalid_config(&key.to_lowercase(), format!("cannot parse '{}'", raw))
        }),
    }
}

/// First key with a non-empty value wins
fn read_first<T, F>(lookup: &F, keys: &[&str], default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let present = keys
        .iter()
        .find(|key| lookup(**key).is_some_and(|raw| !raw.trim().is_empty()));

    match present {
        Some(key) => read(lookup, key, default),
        None => Ok(default),
    }
}

fn check_finite(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(AnalysisError::invalid_config(field, "must be a finite number"));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<()> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(AnalysisError::invalid_config(
            field,
            format!("{} is negative", value),
        ));
    }
    Ok(())
}

/// Rates live in [0, 1); 1 would make the closed-form inverse undefined
fn check_fraction(field: &str, value: f64) -> Result<()> {
    check_non_negative(field, value)?;
    if value >= 1.0 {
        return Err(AnalysisError::invalid_config(
            field,
            format!("{} is not below 1 (rates are fractions, e.g. 0.15)", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_keys_absent() {
        let config = AnalysisConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.costs.gst_rate, 0.15);
        assert_eq!(config.costs.tax_rate, 0.33);
        assert_eq!(config.thresholds.minimum_post_tax_profit, 25_000.0);
        assert_eq!(config.cache.max_age_days, 7);
        assert_eq!(config.matching.window_months, 3);
        assert_eq!(config.target_policy, TargetPolicy::Midpoint);
    }

    #[test]
    fn test_overrides_are_read() {
        let config = AnalysisConfig::from_lookup(lookup_from(&[
            ("GST_RATE", "0.125"),
            ("DEFAULT_RENOVATION_BUDGET", "80000"),
            ("CACHE_EXPIRY_DAYS", "14"),
            ("RECOMMENDATION_POLICY", "minimum"),
            ("INTEREST_RATE", "0.075"),
        ]))
        .unwrap();

        assert_eq!(config.costs.gst_rate, 0.125);
        assert_eq!(config.costs.renovation_budget, 80_000.0);
        assert_eq!(config.cache.max_age_days, 14);
        assert_eq!(config.target_policy, TargetPolicy::Minimum);
        assert_eq!(config.costs.financing.annual_interest_rate, 0.075);
    }

    #[test]
    fn test_rate_of_one_is_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("TAX_RATE", "1")])).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidConfiguration { ref field, .. } if field == "tax_rate"
        ));
    }

    #[test]
    fn test_percentage_instead_of_fraction_is_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("GST_RATE", "15")])).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_negative_cost_is_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("DEFAULT_LEGAL_EXPENSES", "-1")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidConfiguration { ref field, .. } if field == "legal_expenses"
        ));
    }

    #[test]
    fn test_unparsable_value_is_not_defaulted() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("COMMISSION_RATE", "two percent")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidConfiguration { ref field, .. } if field == "commission_rate"
        ));
    }

    #[test]
    fn test_inverted_target_range_is_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[
            ("TARGET_PROFIT_MIN", "40000"),
            ("TARGET_PROFIT_MAX", "30000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_unrepresentable_cache_expiry_is_rejected_at_load() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("CACHE_EXPIRY_DAYS", "200000000000000")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidConfiguration { ref field, .. } if field == "cache_expiry_days"
        ));

        let policy = CachePolicy { max_age_days: i64::MAX };
        assert!(policy.validate().is_err());
        assert_eq!(policy.max_age(), Duration::MAX);
    }

    #[test]
    fn test_long_form_financing_keys_are_accepted() {
        let config = AnalysisConfig::from_lookup(lookup_from(&[
            ("DEFAULT_INTEREST_RATE", "0.065"),
            ("DEFAULT_RENOVATION_MONTHS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.costs.financing.annual_interest_rate, 0.065);
        assert_eq!(config.costs.financing.months, 4.0);

        // Short form wins when both are set
        let both = AnalysisConfig::from_lookup(lookup_from(&[
            ("INTEREST_RATE", "0.05"),
            ("DEFAULT_INTEREST_RATE", "0.09"),
        ]))
        .unwrap();
        assert_eq!(both.costs.financing.annual_interest_rate, 0.05);

        let err = AnalysisConfig::from_lookup(lookup_from(&[("DEFAULT_RENOVATION_MONTHS", "six")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidConfiguration { ref field, .. } if field == "default_renovation_months"
        ));
    }

    #[test]
    fn test_financing_period_rate() {
        let terms = FinancingTerms {
            annual_interest_rate: 0.075,
            months: 6.0,
        };
        assert!((terms.period_rate() - 0.0375).abs() < 1e-12);
        assert_eq!(FinancingTerms::default().period_rate(), 0.0);
    }

    #[test]
    fn test_target_policy_parsing() {
        assert_eq!("Midpoint".parse::<TargetPolicy>().unwrap(), TargetPolicy::Midpoint);
        assert_eq!(" min ".parse::<TargetPolicy>().unwrap(), TargetPolicy::Minimum);
        assert!("cheapest".parse::<TargetPolicy>().is_err());
    }
}
