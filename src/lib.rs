// Property Flip Analyzer - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod config;
pub mod freshness;
pub mod valuation;      // RV/CV → purchase price
pub mod comparables;    // Recent sales → target value
pub mod profit;         // Deterministic profit model
pub mod recommender;    // Closed-form inverse of the profit model
pub mod analysis;
pub mod sources;
pub mod db;
pub mod pipeline;
pub mod logging;

// Re-export commonly used types
pub use error::{AnalysisError, Result};
pub use config::{
    AnalysisConfig, CachePolicy, CostAssumptions, FinancingTerms,
    MatchCriteria, TargetPolicy, ViabilityThresholds,
};
pub use freshness::is_fresh;
pub use valuation::{
    ValuationFact, ValuationField, PurchaseBasis, PurchasePriceSource, ResolvedValuation,
    resolve_valuation, resolve_purchase_price, PURCHASE_DISCOUNT,
};
pub use comparables::{
    SubjectProperty, SaleRecord, TargetValue, TargetValueSource,
    find_comparables, match_target_value, CV_FALLBACK_RATIO,
};
pub use profit::{ProfitBreakdown, evaluate};
pub use recommender::{Recommendation, recommend_price, solve_purchase_price, target_profit};
pub use analysis::{AnalysisInput, AnalysisResult, PropertyOutcome, analyze, analyze_batch};
pub use sources::{InsuranceSource, SalesSource, ValuationSource, StaticSource};
pub use db::{
    Event, SaleImport, AnalysisDetail,
    setup_database, load_properties_csv, load_sales_csv,
    save_property, get_property, get_all_properties,
    insert_valuation, latest_valuation,
    insert_sales, sales_for, count_sales,
    insert_analysis, latest_analysis, analysis_detail,
    insert_event, get_events_for_entity,
};
pub use pipeline::{Analyzer, Fetched, Gathered};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
