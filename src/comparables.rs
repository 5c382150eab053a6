// 🏘️ Comparable Sales Matcher - recent similar sales → target resale value
//
// A sale qualifies when suburb, bedrooms, sale date and (if both are known)
// floor area all match the subject. Target value is the mean qualifying
// price, falling back to 90% of CV when nothing qualifies.

use crate::config::MatchCriteria;
use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Target value as a fraction of CV when no comparable qualifies
pub const CV_FALLBACK_RATIO: f64 = 0.90;

// ============================================================================
// RECORDS
// ============================================================================

/// The property being analysed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProperty {
    pub address: String,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    /// Square metres
    #[serde(default)]
    pub floor_area: Option<f64>,
    #[serde(default)]
    pub asking_price: Option<f64>,
}

impl SubjectProperty {
    pub fn new(address: &str) -> Self {
        SubjectProperty {
            address: address.to_string(),
            suburb: None,
            bedrooms: None,
            floor_area: None,
            asking_price: None,
        }
    }
}

/// One historical transaction. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub address: String,
    pub suburb: String,
    pub bedrooms: u32,
    #[serde(default)]
    pub floor_area: Option<f64>,
    pub sale_price: f64,
    pub sale_date: NaiveDate,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// MATCHING
// ============================================================================

/// Earliest sale date still inside the window (calendar months, inclusive)
pub fn window_start(today: NaiveDate, window_months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(window_months))
        .unwrap_or(NaiveDate::MIN)
}

fn same_suburb(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn known_area(area: Option<f64>) -> Option<f64> {
    area.filter(|a| a.is_finite() && *a > 0.0)
}

pub fn qualifies(
    subject: &SubjectProperty,
    record: &SaleRecord,
    criteria: &MatchCriteria,
    today: NaiveDate,
) -> bool {
    let (Some(suburb), Some(bedrooms)) = (subject.suburb.as_deref(), subject.bedrooms) else {
        return false;
    };

    if !same_suburb(&record.suburb, suburb) || record.bedrooms != bedrooms {
        return false;
    }

    if record.sale_date < window_start(today, criteria.window_months) || record.sale_date > today {
        return false;
    }

    if !(record.sale_price.is_finite() && record.sale_price > 0.0) {
        return false;
    }

    // Unknown area on either side skips the test
    if let (Some(target), Some(area)) = (known_area(subject.floor_area), known_area(record.floor_area)) {
        if (area - target).abs() / target > criteria.area_tolerance {
            return false;
        }
    }

    true
}

pub fn find_comparables<'a>(
    subject: &SubjectProperty,
    sales: &'a [SaleRecord],
    criteria: &MatchCriteria,
    today: NaiveDate,
) -> Vec<&'a SaleRecord> {
    sales
        .iter()
        .filter(|sale| qualifies(subject, sale, criteria, today))
        .collect()
}

/// Mean price, summed in sorted order so the result does not depend on
/// the order the sales arrived in
pub fn mean_sale_price(comparables: &[&SaleRecord]) -> Option<f64> {
    if comparables.is_empty() {
        return None;
    }

    let mut prices: Vec<f64> = comparables.iter().map(|s| s.sale_price).collect();
    prices.sort_by(|a, b| a.total_cmp(b));

    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

// ============================================================================
// TARGET VALUE RESOLUTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetValueSource {
    ComparableSales,
    CapitalValueFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetValue {
    pub value: f64,
    pub source: TargetValueSource,
    pub comparable_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetValueStrategy {
    ComparableMean,
    CapitalValueFallback,
}

pub const TARGET_VALUE_STRATEGIES: [TargetValueStrategy; 2] = [
    TargetValueStrategy::ComparableMean,
    TargetValueStrategy::CapitalValueFallback,
];

/// Everything a target-value strategy may look at
pub struct TargetContext<'a> {
    pub subject: &'a SubjectProperty,
    pub sales: &'a [SaleRecord],
    pub capital_value: Option<f64>,
    pub criteria: &'a MatchCriteria,
    pub today: NaiveDate,
}

impl TargetValueStrategy {
    pub fn apply(&self, ctx: &TargetContext<'_>) -> Option<TargetValue> {
        match self {
            TargetValueStrategy::ComparableMean => {
                let comparables = find_comparables(ctx.subject, ctx.sales, ctx.criteria, ctx.today);
                mean_sale_price(&comparables).map(|value| TargetValue {
                    value,
                    source: TargetValueSource::ComparableSales,
                    comparable_count: comparables.len(),
                })
            }
            TargetValueStrategy::CapitalValueFallback => ctx
                .capital_value
                .filter(|cv| cv.is_finite() && *cv > 0.0)
                .map(|cv| TargetValue {
                    value: CV_FALLBACK_RATIO * cv,
                    source: TargetValueSource::CapitalValueFallback,
                    comparable_count: 0,
                }),
        }
    }
}

pub fn match_target_value(
    subject: &SubjectProperty,
    sales: &[SaleRecord],
    capital_value: Option<f64>,
    criteria: &MatchCriteria,
    today: NaiveDate,
) -> Result<TargetValue> {
    let ctx = TargetContext {
        subject,
        sales,
        capital_value,
        criteria,
        today,
    };

    TARGET_VALUE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.apply(&ctx))
        .ok_or(AnalysisError::NoTargetValue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn subject() -> SubjectProperty {
        SubjectProperty {
            address: "4 Kowhai Road".to_string(),
            suburb: Some("Ponsonby".to_string()),
            bedrooms: Some(3),
            floor_area: Some(120.0),
            asking_price: None,
        }
    }

    fn sale(address: &str, suburb: &str, bedrooms: u32, area: Option<f64>, price: f64, date: NaiveDate) -> SaleRecord {
        SaleRecord {
            address: address.to_string(),
            suburb: suburb.to_string(),
            bedrooms,
            floor_area: area,
            sale_price: price,
            sale_date: date,
            observed_at: None,
        }
    }

    fn days_ago(days: u64) -> NaiveDate {
        today() - chrono::Days::new(days)
    }

    #[test]
    fn test_matching_sale_qualifies() {
        let record = sale("1 A St", "Ponsonby", 3, Some(130.0), 900_000.0, days_ago(10));
        assert!(qualifies(&subject(), &record, &MatchCriteria::default(), today()));
    }

    #[test]
    fn test_suburb_is_case_insensitive_but_exact() {
        let criteria = MatchCriteria::default();
        let upper = sale("1 A St", " PONSONBY ", 3, None, 900_000.0, days_ago(10));
        let other = sale("2 A St", "Ponsonby East", 3, None, 900_000.0, days_ago(10));

        assert!(qualifies(&subject(), &upper, &criteria, today()));
        assert!(!qualifies(&subject(), &other, &criteria, today()));
    }

    #[test]
    fn test_bedrooms_must_match_exactly() {
        let record = sale("1 A St", "Ponsonby", 4, None, 900_000.0, days_ago(10));
        assert!(!qualifies(&subject(), &record, &MatchCriteria::default(), today()));
    }

    #[test]
    fn test_sale_window_is_calendar_months_inclusive() {
        let criteria = MatchCriteria::default();
        let edge = sale("1 A St", "Ponsonby", 3, None, 900_000.0, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        let outside = sale("2 A St", "Ponsonby", 3, None, 900_000.0, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());

        assert!(qualifies(&subject(), &edge, &criteria, today()));
        assert!(!qualifies(&subject(), &outside, &criteria, today()));
    }

    #[test]
    fn test_floor_area_tolerance() {
        let criteria = MatchCriteria::default();
        let at_limit = sale("1 A St", "Ponsonby", 3, Some(144.0), 900_000.0, days_ago(5));
        let too_big = sale("2 A St", "Ponsonby", 3, Some(145.0), 900_000.0, days_ago(5));
        let too_small = sale("3 A St", "Ponsonby", 3, Some(95.0), 900_000.0, days_ago(5));

        assert!(qualifies(&subject(), &at_limit, &criteria, today()));
        assert!(!qualifies(&subject(), &too_big, &criteria, today()));
        assert!(!qualifies(&subject(), &too_small, &criteria, today()));
    }

    #[test]
    fn test_unknown_record_area_skips_area_test() {
        let record = sale("1 A St", "Ponsonby", 3, None, 900_000.0, days_ago(5));

        let mut tiny = subject();
        tiny.floor_area = Some(20.0);

        assert!(qualifies(&subject(), &record, &MatchCriteria::default(), today()));
        assert!(qualifies(&tiny, &record, &MatchCriteria::default(), today()));
    }

    #[test]
    fn test_unknown_subject_area_skips_area_test() {
        let record = sale("1 A St", "Ponsonby", 3, Some(400.0), 900_000.0, days_ago(5));
        let mut no_area = subject();
        no_area.floor_area = None;

        assert!(qualifies(&no_area, &record, &MatchCriteria::default(), today()));
    }

    #[test]
    fn test_subject_without_suburb_matches_nothing() {
        let record = sale("1 A St", "Ponsonby", 3, None, 900_000.0, days_ago(5));
        let mut unknown = subject();
        unknown.suburb = None;

        assert!(!qualifies(&unknown, &record, &MatchCriteria::default(), today()));
    }

    #[test]
    fn test_mean_of_qualifying_sales() {
        let sales = vec![
            sale("1 A St", "Ponsonby", 3, Some(118.0), 800_000.0, days_ago(5)),
            sale("2 A St", "Ponsonby", 3, None, 900_000.0, days_ago(30)),
            sale("3 A St", "Ponsonby", 2, None, 500_000.0, days_ago(30)),
            sale("4 A St", "Grey Lynn", 3, None, 2_000_000.0, days_ago(30)),
        ];

        let target = match_target_value(&subject(), &sales, Some(1.0e6), &MatchCriteria::default(), today()).unwrap();

        assert_eq!(target.source, TargetValueSource::ComparableSales);
        assert_eq!(target.comparable_count, 2);
        assert!((target.value - 850_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_is_order_independent() {
        let mut sales = vec![
            sale("1 A St", "Ponsonby", 3, None, 812_345.67, days_ago(5)),
            sale("2 A St", "Ponsonby", 3, None, 901_234.11, days_ago(6)),
            sale("3 A St", "Ponsonby", 3, None, 777_777.77, days_ago(7)),
        ];
        let criteria = MatchCriteria::default();

        let forward = match_target_value(&subject(), &sales, None, &criteria, today()).unwrap();
        sales.reverse();
        let backward = match_target_value(&subject(), &sales, None, &criteria, today()).unwrap();

        assert_eq!(forward.value.to_bits(), backward.value.to_bits());
    }

    #[test]
    fn test_capital_value_fallback() {
        let target = match_target_value(&subject(), &[], Some(500_000.0), &MatchCriteria::default(), today()).unwrap();

        assert_eq!(target.source, TargetValueSource::CapitalValueFallback);
        assert_eq!(target.comparable_count, 0);
        assert!((target.value - 450_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_target_value() {
        let err = match_target_value(&subject(), &[], None, &MatchCriteria::default(), today()).unwrap_err();
        assert_eq!(err, AnalysisError::NoTargetValue);
    }
}
