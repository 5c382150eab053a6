// 🔌 Fact Sources - the refetch side of the cache
//
// Scrapers and other collaborators implement these traits. Callers stamp
// `observed_at` on whatever comes back; sources don't have to.

use crate::comparables::{SaleRecord, SubjectProperty};
use crate::valuation::ValuationFact;
use anyhow::Result;
use std::collections::HashMap;

pub trait ValuationSource: Send + Sync {
    /// Latest RV/CV for an address, `None` when the source has nothing
    fn fetch_valuation(&self, address: &str) -> Result<Option<ValuationFact>>;
}

pub trait SalesSource: Send + Sync {
    /// Recent sales in the subject's suburb with the subject's bedroom count
    fn fetch_sales(&self, subject: &SubjectProperty, window_months: u32) -> Result<Vec<SaleRecord>>;
}

pub trait InsuranceSource: Send + Sync {
    fn quote(&self, address: &str, replacement_value: Option<f64>) -> Result<Option<f64>>;
}

// ============================================================================
// STATIC SOURCE
// ============================================================================

/// In-memory source: fixed answers, or nothing at all when empty.
/// Used where no live collaborator is wired in (CLI, server, tests).
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    valuations: HashMap<String, ValuationFact>,
    sales: Vec<SaleRecord>,
    insurance: Option<f64>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_valuation(mut self, address: &str, fact: ValuationFact) -> Self {
        self.valuations.insert(normalize_address(address), fact);
        self
    }

    pub fn with_sales(mut self, sales: Vec<SaleRecord>) -> Self {
        self.sales.extend(sales);
        self
    }

    pub fn with_insurance(mut self, premium: f64) -> Self {
        self.insurance = Some(premium);
        self
    }
}

impl ValuationSource for StaticSource {
    fn fetch_valuation(&self, address: &str) -> Result<Option<ValuationFact>> {
        Ok(self.valuations.get(&normalize_address(address)).cloned())
    }
}

impl SalesSource for StaticSource {
    fn fetch_sales(&self, subject: &SubjectProperty, _window_months: u32) -> Result<Vec<SaleRecord>> {
        let (Some(suburb), Some(bedrooms)) = (subject.suburb.as_deref(), subject.bedrooms) else {
            return Ok(Vec::new());
        };
        let suburb = suburb.trim().to_lowercase();

        Ok(self
            .sales
            .iter()
            .filter(|s| s.bedrooms == bedrooms && s.suburb.trim().to_lowercase() == suburb)
            .cloned()
            .collect())
    }
}

impl InsuranceSource for StaticSource {
    fn quote(&self, _address: &str, _replacement_value: Option<f64>) -> Result<Option<f64>> {
        Ok(self.insurance)
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}
