pub mod bin_utils;
mod cost;
pub mod sweep;

pub use cost::{
    best_case_pages, cache_regime, cost_factors, worst_case_pages, CacheRegime, Cost,
    CostBreakdown, IndexProfile, ParamError, ScanCostEstimator, TableProfile,
};
