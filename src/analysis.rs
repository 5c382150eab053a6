// 📊 Property Analysis - one property's facts → AnalysisResult
//
// Valuation and target-value resolution are independent; both finish
// before the profit model runs. The recommender only runs for deals that
// miss the viability threshold.

use crate::comparables::{match_target_value, SaleRecord, SubjectProperty, TargetValueSource};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::profit::{evaluate, ProfitBreakdown};
use crate::recommender::recommend_price;
use crate::valuation::{freshest, resolve_purchase_price, PurchasePriceSource, ValuationFact, ValuationField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Facts for one property, already passed through the freshness gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub subject: SubjectProperty,
    pub valuations: Vec<ValuationFact>,
    pub sales: Vec<SaleRecord>,
    /// Live insurance quote; config default applies when absent
    pub insurance_quote: Option<f64>,
}

impl AnalysisInput {
    pub fn new(subject: SubjectProperty) -> Self {
        AnalysisInput {
            subject,
            valuations: Vec::new(),
            sales: Vec::new(),
            insurance_quote: None,
        }
    }
}

/// Derived, never mutated; a newer result supersedes an older one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub address: String,
    pub analyzed_at: DateTime<Utc>,

    // Valuation
    pub rateable_value: Option<f64>,
    pub capital_value: Option<f64>,
    pub valuation_field: ValuationField,
    pub valuation_basis: f64,
    pub purchase_price_source: PurchasePriceSource,

    // Target value
    pub target_value_source: TargetValueSource,
    pub comparable_count: usize,

    #[serde(flatten)]
    pub profit: ProfitBreakdown,

    pub is_viable: bool,
    pub recommended_pp: Option<f64>,
    pub recommendation_target: Option<f64>,
}

impl AnalysisResult {
    pub fn purchase_price(&self) -> f64 {
        self.profit.purchase_price
    }

    pub fn target_value(&self) -> f64 {
        self.profit.target_value
    }

    pub fn post_tax_profit(&self) -> f64 {
        self.profit.post_tax_profit
    }

    pub fn summary(&self) -> String {
        let verdict = if self.is_viable { "VIABLE" } else { "NOT VIABLE" };
        let mut line = format!(
            "{}: PP ${:.2} ({}), TV ${:.2} ({} comparables), post-tax ${:.2} → {}",
            self.address,
            self.purchase_price(),
            self.valuation_field.as_str(),
            self.target_value(),
            self.comparable_count,
            self.post_tax_profit(),
            verdict
        );
        if let Some(pp) = self.recommended_pp {
            if pp > 0.0 {
                line.push_str(&format!(", recommended PP ${:.2}", pp));
            } else {
                line.push_str(&format!(", not recoverable by price (solved PP ${:.2})", pp));
            }
        }
        line
    }
}

pub fn analyze(input: &AnalysisInput, config: &AnalysisConfig, now: DateTime<Utc>) -> Result<AnalysisResult> {
    let subject = &input.subject;

    let basis = resolve_purchase_price(&input.valuations, subject.asking_price)?;
    let latest = freshest(&input.valuations);
    let capital_value = latest.and_then(|f| f.usable_capital_value());

    let target = match_target_value(
        subject,
        &input.sales,
        capital_value,
        &config.matching,
        now.date_naive(),
    )?;

    let costs = match input.insurance_quote.filter(|q| q.is_finite() && *q >= 0.0) {
        Some(quote) => config.costs.with_insurance(quote),
        None => config.costs,
    };

    let profit = evaluate(basis.purchase_price, target.value, &costs);
    let is_viable = profit.is_viable(&config.thresholds);

    let recommendation = if is_viable {
        None
    } else {
        Some(recommend_price(target.value, &costs, &config.thresholds, config.target_policy)?)
    };

    Ok(AnalysisResult {
        id: uuid::Uuid::new_v4().to_string(),
        address: subject.address.clone(),
        analyzed_at: now,
        rateable_value: latest.and_then(|f| f.rateable_value),
        capital_value: latest.and_then(|f| f.capital_value),
        valuation_field: basis.valuation.field,
        valuation_basis: basis.valuation.basis_value,
        purchase_price_source: basis.source,
        target_value_source: target.source,
        comparable_count: target.comparable_count,
        profit,
        is_viable,
        recommended_pp: recommendation.map(|r| r.purchase_price),
        recommendation_target: recommendation.map(|r| r.target_post_tax_profit),
    })
}

// ============================================================================
// BATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PropertyOutcome {
    Analyzed(AnalysisResult),
    Failed { address: String, reason: String },
}

impl PropertyOutcome {
    pub fn failed(address: &str, reason: impl ToString) -> Self {
        PropertyOutcome::Failed {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn address(&self) -> &str {
        match self {
            PropertyOutcome::Analyzed(result) => &result.address,
            PropertyOutcome::Failed { address, .. } => address,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            PropertyOutcome::Analyzed(result) => Some(result),
            PropertyOutcome::Failed { .. } => None,
        }
    }
}

/// One outcome per input; a failed property never aborts the rest
pub fn analyze_batch(inputs: &[AnalysisInput], config: &AnalysisConfig, now: DateTime<Utc>) -> Vec<PropertyOutcome> {
    inputs
        .iter()
        .map(|input| match analyze(input, config, now) {
            Ok(result) => PropertyOutcome::Analyzed(result),
            Err(e) => PropertyOutcome::failed(&input.subject.address, e),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap()
    }

    fn subject(address: &str) -> SubjectProperty {
        SubjectProperty {
            address: address.to_string(),
            suburb: Some("Mt Eden".to_string()),
            bedrooms: Some(3),
            floor_area: Some(110.0),
            asking_price: None,
        }
    }

    fn comparable(price: f64) -> SaleRecord {
        SaleRecord {
            address: format!("{} Comparable Rd", price as u64),
            suburb: "Mt Eden".to_string(),
            bedrooms: 3,
            floor_area: Some(105.0),
            sale_price: price,
            sale_date: NaiveDate::from_ymd_opt(2025, 5, 20).unwrap(),
            observed_at: Some(now()),
        }
    }

    fn reference_input() -> AnalysisInput {
        AnalysisInput {
            subject: subject("1 Reference Lane"),
            valuations: vec![ValuationFact::new(Some(750_000.0), None, "council", now())],
            sales: vec![comparable(780_000.0), comparable(820_000.0)],
            insurance_quote: None,
        }
    }

    #[test]
    fn test_reference_scenario_end_to_end() {
        let config = AnalysisConfig::default();
        let result = analyze(&reference_input(), &config, now()).unwrap();

        assert!((result.purchase_price() - 637_500.0).abs() < 1e-6);
        assert!((result.target_value() - 800_000.0).abs() < 1e-6);
        assert_eq!(result.comparable_count, 2);
        assert!((result.profit.post_tax_profit - 21_976.0).abs() < 1e-6);
        assert!(!result.is_viable);
        assert_eq!(result.recommendation_target, Some(27_500.0));

        let pp = result.recommended_pp.unwrap();
        let rerun = evaluate(pp, result.target_value(), &config.costs);
        assert!((rerun.post_tax_profit - 27_500.0).abs() < 1e-6);
    }

    #[test]
    fn test_viable_deal_has_no_recommendation() {
        let mut input = reference_input();
        input.subject.asking_price = Some(550_000.0);

        let result = analyze(&input, &AnalysisConfig::default(), now()).unwrap();

        assert_eq!(result.purchase_price_source, PurchasePriceSource::AskingPrice);
        assert!(result.is_viable);
        assert_eq!(result.recommended_pp, None);
    }

    #[test]
    fn test_capital_value_fallback_for_target() {
        let input = AnalysisInput {
            valuations: vec![ValuationFact::new(None, Some(500_000.0), "council", now())],
            ..AnalysisInput::new(subject("2 Lonely St"))
        };

        let result = analyze(&input, &AnalysisConfig::default(), now()).unwrap();

        assert_eq!(result.valuation_field, ValuationField::CapitalValue);
        assert_eq!(result.target_value_source, TargetValueSource::CapitalValueFallback);
        assert!((result.target_value() - 450_000.0).abs() < 1e-9);
        assert!((result.purchase_price() - 425_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_insurance_quote_replaces_default() {
        let mut input = reference_input();
        input.insurance_quote = Some(2_400.0);

        let result = analyze(&input, &AnalysisConfig::default(), now()).unwrap();

        assert_eq!(result.profit.insurance, 2_400.0);
        assert!((result.profit.gross_profit - (41_800.0 - 600.0)).abs() < 1e-6);
    }

    #[test]
    fn test_missing_valuation_produces_no_result() {
        let err = analyze(&AnalysisInput::new(subject("3 Ghost Rd")), &AnalysisConfig::default(), now()).unwrap_err();
        assert_eq!(err, AnalysisError::MissingValuation);
    }

    #[test]
    fn test_rv_only_without_comparables_has_no_target() {
        let input = AnalysisInput {
            valuations: vec![ValuationFact::new(Some(600_000.0), None, "council", now())],
            ..AnalysisInput::new(subject("4 Sparse Ave"))
        };
        let err = analyze(&input, &AnalysisConfig::default(), now()).unwrap_err();
        assert_eq!(err, AnalysisError::NoTargetValue);
    }

    #[test]
    fn test_batch_keeps_going_after_failure() {
        let inputs = vec![
            AnalysisInput::new(subject("3 Ghost Rd")),
            reference_input(),
        ];

        let outcomes = analyze_batch(&inputs, &AnalysisConfig::default(), now());

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            &outcomes[0],
            PropertyOutcome::Failed { address, reason }
                if address == "3 Ghost Rd" && reason.contains("no rateable or capital value")
        ));
        assert_eq!(outcomes[1].address(), "1 Reference Lane");
        assert!(outcomes[1].result().is_some());
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = analyze(&reference_input(), &AnalysisConfig::default(), now()).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("post_tax_profit").is_some());
        assert!(json.get("net_gst").is_some());
        assert_eq!(json["valuation_field"], "rateable_value");

        let back: AnalysisResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.address, result.address);
        assert_eq!(back.recommended_pp.is_some(), result.recommended_pp.is_some());
    }
}
