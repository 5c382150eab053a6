// 🔄 Analysis Pipeline - cache gate → refetch → analyze → persist
//
// Facts older than the cache policy are never handed to the analysis. A
// stale fact is refetched; if the refetch comes back empty the fact is
// dropped and the property fails with whatever that implies.

use crate::analysis::{analyze, AnalysisInput, PropertyOutcome};
use crate::comparables::{SaleRecord, SubjectProperty, TargetValueSource};
use crate::config::AnalysisConfig;
use crate::db;
use crate::error::AnalysisError;
use crate::sources::{InsuranceSource, SalesSource, ValuationSource};
use crate::valuation::{freshest, ValuationFact, ValuationField};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// A gated fact set plus the refetch failure that left it short, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub refetch_error: Option<String>,
}

impl<T> Fetched<T> {
    fn ok(value: T) -> Self {
        Fetched {
            value,
            refetch_error: None,
        }
    }

    fn failed(value: T, error: &anyhow::Error) -> Self {
        Fetched {
            value,
            refetch_error: Some(format!("{:#}", error)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gathered {
    pub input: AnalysisInput,
    pub valuation_refetch_error: Option<String>,
    pub sales_refetch_error: Option<String>,
}

impl Gathered {
    /// Names the source failure behind a missing fact
    pub fn failure_reason(&self, error: &AnalysisError) -> String {
        let cause = match error {
            AnalysisError::MissingValuation => self
                .valuation_refetch_error
                .as_ref()
                .map(|e| format!("valuation refetch failed: {}", e)),
            AnalysisError::NoTargetValue => self
                .sales_refetch_error
                .as_ref()
                .map(|e| format!("sales refetch failed: {}", e)),
            _ => None,
        };

        match cause {
            Some(cause) => format!("{}: {}", cause, error),
            None => error.to_string(),
        }
    }
}

pub struct Analyzer<'a> {
    conn: &'a Connection,
    config: AnalysisConfig,
    valuations: &'a dyn ValuationSource,
    sales: &'a dyn SalesSource,
    insurance: &'a dyn InsuranceSource,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        conn: &'a Connection,
        config: AnalysisConfig,
        valuations: &'a dyn ValuationSource,
        sales: &'a dyn SalesSource,
        insurance: &'a dyn InsuranceSource,
    ) -> Self {
        Self {
            conn,
            config,
            valuations,
            sales,
            insurance,
        }
    }

    /// One collaborator answering all three kinds of fact
    pub fn with_source<S>(conn: &'a Connection, config: AnalysisConfig, source: &'a S) -> Self
    where
        S: ValuationSource + SalesSource + InsuranceSource,
    {
        Self::new(conn, config, source, source, source)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Cached valuation if fresh, otherwise whatever the source has now
    pub fn fresh_valuations(&self, address: &str, now: DateTime<Utc>) -> Result<Fetched<Vec<ValuationFact>>> {
        let cached = db::latest_valuation(self.conn, address)?;

        if let Some(fact) = cached.as_ref() {
            if self.config.cache.is_fresh(fact.observed_at, now) {
                debug!(address, "valuation cache hit");
                return Ok(Fetched::ok(vec![fact.clone()]));
            }
        }

        info!(address, cached = cached.is_some(), "valuation stale or missing, refetching");

        match self.valuations.fetch_valuation(address) {
            Ok(Some(mut fact)) => {
                fact.observed_at = Some(now);
                db::insert_valuation(self.conn, address, &fact)?;
                Ok(Fetched::ok(vec![fact]))
            }
            Ok(None) => {
                warn!(address, "no valuation available from source");
                Ok(Fetched::ok(Vec::new()))
            }
            Err(e) => {
                warn!(address, error = %e, "valuation refetch failed");
                Ok(Fetched::failed(Vec::new(), &e))
            }
        }
    }

    /// Fresh cached sales for the subject's (suburb, bedrooms), refetched
    /// when none are fresh. Subjects missing either key have no comparables.
    pub fn fresh_sales(&self, subject: &SubjectProperty, now: DateTime<Utc>) -> Result<Fetched<Vec<SaleRecord>>> {
        let (Some(suburb), Some(bedrooms)) = (subject.suburb.as_deref(), subject.bedrooms) else {
            debug!(address = %subject.address, "no suburb or bedroom count, skipping comparables");
            return Ok(Fetched::ok(Vec::new()));
        };

        let fresh = self.cached_fresh_sales(suburb, bedrooms, now)?;
        if !fresh.is_empty() {
            debug!(suburb, bedrooms, count = fresh.len(), "sales cache hit");
            return Ok(Fetched::ok(fresh));
        }

        info!(suburb, bedrooms, "no fresh sales cached, refetching");

        let refetch_error = match self.sales.fetch_sales(subject, self.config.matching.window_months) {
            Ok(mut fetched) => {
                for sale in fetched.iter_mut() {
                    sale.observed_at = Some(now);
                }
                let import = db::insert_sales(self.conn, &fetched)?;
                debug!(inserted = import.inserted, refreshed = import.refreshed, "sales refetched");
                None
            }
            Err(e) => {
                warn!(suburb, bedrooms, error = %e, "sales refetch failed");
                Some(format!("{:#}", e))
            }
        };

        Ok(Fetched {
            value: self.cached_fresh_sales(suburb, bedrooms, now)?,
            refetch_error,
        })
    }

    fn cached_fresh_sales(&self, suburb: &str, bedrooms: u32, now: DateTime<Utc>) -> Result<Vec<SaleRecord>> {
        let sales = db::sales_for(self.conn, suburb, bedrooms)?
            .into_iter()
            .filter(|s| self.config.cache.is_fresh(s.observed_at, now))
            .collect();
        Ok(sales)
    }

    pub fn gather(&self, subject: &SubjectProperty, now: DateTime<Utc>) -> Result<Gathered> {
        let valuations = self.fresh_valuations(&subject.address, now)?;
        let sales = self.fresh_sales(subject, now)?;

        let replacement_value = freshest(&valuations.value).and_then(|f| f.usable_capital_value());
        let insurance_quote = match self.insurance.quote(&subject.address, replacement_value) {
            Ok(quote) => quote,
            Err(e) => {
                warn!(address = %subject.address, error = %e, "insurance quote failed, using default");
                None
            }
        };

        Ok(Gathered {
            input: AnalysisInput {
                subject: subject.clone(),
                valuations: valuations.value,
                sales: sales.value,
                insurance_quote,
            },
            valuation_refetch_error: valuations.refetch_error,
            sales_refetch_error: sales.refetch_error,
        })
    }

    /// Store failures propagate; analysis failures become `Failed`
    pub fn analyze_property(&self, address: &str, now: DateTime<Utc>) -> Result<PropertyOutcome> {
        let Some(subject) = db::get_property(self.conn, address)? else {
            warn!(address, "unknown property");
            return Ok(PropertyOutcome::failed(address, "unknown property"));
        };

        let gathered = self.gather(&subject, now)?;

        match analyze(&gathered.input, &self.config, now) {
            Ok(result) => {
                if result.valuation_field == ValuationField::CapitalValue {
                    info!(address, "no usable RV, priced from CV");
                }
                if result.target_value_source == TargetValueSource::CapitalValueFallback {
                    info!(address, "no comparable sales, target value is 90% of CV");
                }
                db::insert_analysis(self.conn, &result)?;
                info!(
                    address,
                    post_tax_profit = result.post_tax_profit(),
                    viable = result.is_viable,
                    "analysis complete"
                );
                Ok(PropertyOutcome::Analyzed(result))
            }
            Err(e) => {
                warn!(address, kind = e.kind(), "analysis failed: {}", e);
                Ok(PropertyOutcome::failed(address, gathered.failure_reason(&e)))
            }
        }
    }

    /// One outcome per address, in order
    pub fn analyze_addresses(&self, addresses: &[String], now: DateTime<Utc>) -> Vec<PropertyOutcome> {
        addresses
            .iter()
            .map(|address| match self.analyze_property(address, now) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(address = %address, error = %e, "store error during analysis");
                    PropertyOutcome::failed(address, e)
                }
            })
            .collect()
    }

    pub fn analyze_all(&self, now: DateTime<Utc>) -> Result<Vec<PropertyOutcome>> {
        let addresses: Vec<String> = db::get_all_properties(self.conn)?
            .into_iter()
            .map(|p| p.address)
            .collect();

        info!(count = addresses.len(), "analyzing all properties");
        Ok(self.analyze_addresses(&addresses, now))
    }
}
