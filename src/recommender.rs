// 🎯 Purchase Price Recommender - closed-form inverse of the profit model
//
// Post-tax profit is affine in PP with slope −(1 + i − g)(1 − t), so the
// price hitting a target profit P is exact:
//
//   PP = [TV(1−g) − RB(1+i−g) − LE(1−g) − CR − INS − COM − P/(1−t)] / (1+i−g)
//
// With no financing (i = 0) this is
//   PP = TV − RB − LE − (P/(1−t) + CR + INS + COM) / (1−g)
//
// No clamping: a negative price means the deal cannot be rescued by price.

use crate::config::{CostAssumptions, TargetPolicy, ViabilityThresholds};
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub purchase_price: f64,
    /// The post-tax profit the price was solved for
    pub target_post_tax_profit: f64,
}

impl Recommendation {
    /// False when the solved price is zero or negative
    pub fn is_recoverable(&self) -> bool {
        self.purchase_price > 0.0
    }
}

pub fn target_profit(thresholds: &ViabilityThresholds, policy: TargetPolicy) -> f64 {
    match policy {
        TargetPolicy::Midpoint => (thresholds.target_profit_min + thresholds.target_profit_max) / 2.0,
        TargetPolicy::Minimum => thresholds.target_profit_min,
    }
}

/// Price at which post-tax profit equals `target_post_tax` exactly
pub fn solve_purchase_price(target_value: f64, costs: &CostAssumptions, target_post_tax: f64) -> Result<f64> {
    let g = costs.gst_rate;
    let t = costs.tax_rate;
    let i = costs.financing.period_rate();

    let after_tax = 1.0 - t;
    if after_tax.abs() < f64::EPSILON {
        return Err(AnalysisError::DegenerateModel(format!("tax_rate is {}", t)));
    }

    let sensitivity = 1.0 + i - g;
    if sensitivity.abs() < f64::EPSILON {
        return Err(AnalysisError::DegenerateModel(format!(
            "gst_rate {} cancels purchase price out of the model",
            g
        )));
    }

    let commission = costs.commission_rate * target_value;
    let numerator = target_value * (1.0 - g)
        - costs.renovation_budget * sensitivity
        - costs.legal_expenses * (1.0 - g)
        - costs.council_rates
        - costs.insurance
        - commission
        - target_post_tax / after_tax;

    Ok(numerator / sensitivity)
}

pub fn recommend_price(
    target_value: f64,
    costs: &CostAssumptions,
    thresholds: &ViabilityThresholds,
    policy: TargetPolicy,
) -> Result<Recommendation> {
    let target = target_profit(thresholds, policy);
    let purchase_price = solve_purchase_price(target_value, costs, target)?;

    Ok(Recommendation {
        purchase_price,
        target_post_tax_profit: target,
    })
}
