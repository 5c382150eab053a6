// 💰 Profit Model - (PP, TV, costs) → gross / pre-tax / post-tax profit
//
//   gst_claimable   = g × (PP + RB + LE)
//   gst_payable     = g × TV
//   net_gst         = gst_payable − gst_claimable
//   commission      = commission_rate × TV
//   interest        = i × (PP + RB)              (i = 0 unless financed)
//   gross_profit    = TV − PP − RB − LE − CR − INS − commission − interest
//   pre_tax_profit  = gross_profit − net_gst
//   post_tax_profit = pre_tax_profit × (1 − t)
//
// No rounding here; presentation rounds.

use crate::config::{CostAssumptions, ViabilityThresholds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitBreakdown {
    pub purchase_price: f64,
    pub target_value: f64,

    // Cost components
    pub insurance: f64,
    pub renovation_budget: f64,
    pub legal_expenses: f64,
    pub council_rates: f64,
    pub commission: f64,
    pub interest_cost: f64,

    // GST position
    pub gst_claimable: f64,
    pub gst_payable: f64,
    pub net_gst: f64,

    // Profit
    pub gross_profit: f64,
    pub pre_tax_profit: f64,
    pub post_tax_profit: f64,
}

impl ProfitBreakdown {
    pub fn is_viable(&self, thresholds: &ViabilityThresholds) -> bool {
        self.post_tax_profit >= thresholds.minimum_post_tax_profit
    }
}

/// Pure; assumes `costs` passed `CostAssumptions::validate`
pub fn evaluate(purchase_price: f64, target_value: f64, costs: &CostAssumptions) -> ProfitBreakdown {
    let g = costs.gst_rate;
    let t = costs.tax_rate;

    let gst_claimable = g * (purchase_price + costs.renovation_budget + costs.legal_expenses);
    let gst_payable = g * target_value;
    let net_gst = gst_payable - gst_claimable;

    let commission = costs.commission_rate * target_value;
    let interest_cost = costs.financing.period_rate() * (purchase_price + costs.renovation_budget);

    let gross_profit = target_value
        - purchase_price
        - costs.renovation_budget
        - costs.legal_expenses
        - costs.council_rates
        - costs.insurance
        - commission
        - interest_cost;
    let pre_tax_profit = gross_profit - net_gst;
    let post_tax_profit = pre_tax_profit * (1.0 - t);

    ProfitBreakdown {
        purchase_price,
        target_value,
        insurance: costs.insurance,
        renovation_budget: costs.renovation_budget,
        legal_expenses: costs.legal_expenses,
        council_rates: costs.council_rates,
        commission,
        interest_cost,
        gst_claimable,
        gst_payable,
        net_gst,
        gross_profit,
        pre_tax_profit,
        post_tax_profit,
    }
}

/// Change in post-tax profit per extra dollar of purchase price.
/// Always negative for validated costs.
pub fn purchase_price_slope(costs: &CostAssumptions) -> f64 {
    -(1.0 + costs.financing.period_rate() - costs.gst_rate) * (1.0 - costs.tax_rate)
}
