// 🏛️ Valuation Resolver - RV/CV facts → purchase-price basis
//
// Resolution is an ordered list of strategies applied to the freshest fact;
// the first strategy that yields a usable figure wins.

use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purchase price as a fraction of the resolved valuation
pub const PURCHASE_DISCOUNT: f64 = 0.85;

// ============================================================================
// VALUATION FACT
// ============================================================================

/// One government-valuation observation. Never mutated; a fresher fact
/// supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationFact {
    pub rateable_value: Option<f64>,
    pub capital_value: Option<f64>,
    pub source: String,
    pub observed_at: Option<DateTime<Utc>>,
}

impl ValuationFact {
    pub fn new(
        rateable_value: Option<f64>,
        capital_value: Option<f64>,
        source: &str,
        observed_at: DateTime<Utc>,
    ) -> Self {
        ValuationFact {
            rateable_value,
            capital_value,
            source: source.to_string(),
            observed_at: Some(observed_at),
        }
    }

    /// Capital value if it is a usable figure
    pub fn usable_capital_value(&self) -> Option<f64> {
        usable(self.capital_value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationField {
    RateableValue,
    CapitalValue,
}

impl ValuationField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationField::RateableValue => "RV",
            ValuationField::CapitalValue => "CV",
        }
    }
}

// ============================================================================
// RESOLUTION STRATEGIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationStrategy {
    RateableValue,
    CapitalValue,
}

/// Resolution order: RV first, CV as fallback
pub const VALUATION_STRATEGIES: [ValuationStrategy; 2] =
    [ValuationStrategy::RateableValue, ValuationStrategy::CapitalValue];

impl ValuationStrategy {
    pub fn apply(&self, fact: &ValuationFact) -> Option<ResolvedValuation> {
        let (value, field) = match self {
            ValuationStrategy::RateableValue => (fact.rateable_value, ValuationField::RateableValue),
            ValuationStrategy::CapitalValue => (fact.capital_value, ValuationField::CapitalValue),
        };
        usable(value).map(|basis_value| ResolvedValuation { basis_value, field })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValuation {
    pub basis_value: f64,
    pub field: ValuationField,
}

/// Freshest fact by observation time; facts without one sort oldest
pub fn freshest(facts: &[ValuationFact]) -> Option<&ValuationFact> {
    facts.iter().max_by_key(|f| f.observed_at)
}

pub fn resolve_valuation(facts: &[ValuationFact]) -> Result<ResolvedValuation> {
    let fact = freshest(facts).ok_or(AnalysisError::MissingValuation)?;

    VALUATION_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.apply(fact))
        .ok_or(AnalysisError::MissingValuation)
}

// ============================================================================
// PURCHASE PRICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasePriceSource {
    /// Asking price supplied by the user, taken verbatim
    AskingPrice,
    /// PURCHASE_DISCOUNT × resolved valuation
    DiscountedValuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PurchaseBasis {
    pub purchase_price: f64,
    pub source: PurchasePriceSource,
    /// Kept for reporting even when the asking price wins
    pub valuation: ResolvedValuation,
}

/// A valuation must resolve even when an asking price overrides it.
pub fn resolve_purchase_price(
    facts: &[ValuationFact],
    asking_price: Option<f64>,
) -> Result<PurchaseBasis> {
    let valuation = resolve_valuation(facts)?;

    let basis = match usable(asking_price) {
        Some(price) => PurchaseBasis {
            purchase_price: price,
            source: PurchasePriceSource::AskingPrice,
            valuation,
        },
        None => PurchaseBasis {
            purchase_price: PURCHASE_DISCOUNT * valuation.basis_value,
            source: PurchasePriceSource::DiscountedValuation,
            valuation,
        },
    };

    Ok(basis)
}

/// Zero, negative and non-finite figures count as absent
fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}
