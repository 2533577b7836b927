use crate::cost::{
    self, Cost, IndexProfile, ParamError, ScanCostEstimator, TableProfile,
};
use float_ord::FloatOrd;
use serde::Serialize;

/// Selectivity grid step used by the experiment drivers.
pub static DEFAULT_STEP: f64 = 0.01;

/// Evenly spaced selectivity values over [0, 1). Points are generated by
/// index so the grid does not drift from accumulated addition error.
pub fn selectivity_grid(step: f64) -> Result<Vec<f64>, ParamError> {
    if step <= 0. {
        return Err(ParamError::NonPositive {
            name: "step",
            value: step,
        });
    }
    let num_points = (1. / step).ceil() as usize;
    Ok((0..num_points).map(|i| i as f64 * step).collect())
}

/// Which of the two correlation extremes a total or a stack refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Case {
    Best,
    Worst,
}

/// Sums an index scan's components for one side of the best/worst split.
pub fn index_scan_total(breakdown: &cost::CostBreakdown, case: Case) -> Cost {
    let table_io = match case {
        Case::Best => breakdown.table_io_best,
        Case::Worst => breakdown.table_io_worst,
    };
    breakdown.index_cpu + breakdown.index_io + breakdown.table_cpu + table_io
}

#[derive(Debug, Clone, Serialize)]
pub struct PageFetchPoint {
    pub selectivity: f64,
    pub best_case_pages: Cost,
    pub worst_case_pages: Cost,
    pub regime: String,
}

/// Page-fetch curves for both correlation extremes across the grid.
pub fn sweep_page_fetch(
    profile: &TableProfile,
    grid: &[f64],
) -> Result<Vec<PageFetchPoint>, ParamError> {
    grid.iter()
        .map(|&s| {
            Ok(PageFetchPoint {
                selectivity: s,
                best_case_pages: cost::best_case_pages(s, profile)?,
                worst_case_pages: cost::worst_case_pages(s, profile)?,
                regime: cost::cache_regime(s, profile)?.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanCostPoint {
    pub selectivity: f64,
    pub seq_scan: Cost,
    pub index_scan_best: Cost,
    pub index_scan_worst: Cost,
}

/// Index-scan totals against the flat sequential-scan cost across the grid.
pub fn sweep_scan_cost(
    est: &ScanCostEstimator,
    profile: &TableProfile,
    index: &IndexProfile,
    grid: &[f64],
) -> Result<Vec<ScanCostPoint>, ParamError> {
    let seq_scan = est.seq_scan_cost(profile)?;
    grid.iter()
        .map(|&s| {
            let breakdown = est.cost_breakdown(s, profile, index)?;
            Ok(ScanCostPoint {
                selectivity: s,
                seq_scan,
                index_scan_best: index_scan_total(&breakdown, Case::Best),
                index_scan_worst: index_scan_total(&breakdown, Case::Worst),
            })
        })
        .collect()
}

/// Grid point at which the worst-case index-scan total comes closest to the
/// sequential-scan cost.
pub fn crossover_selectivity(points: &[ScanCostPoint]) -> Option<f64> {
    points
        .iter()
        .min_by_key(|point| FloatOrd((point.index_scan_worst - point.seq_scan).abs()))
        .map(|point| point.selectivity)
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownPoint {
    pub selectivity: f64,
    pub index_cpu: Cost,
    pub index_io: Cost,
    pub table_cpu: Cost,
    pub table_io_best: Cost,
    pub table_io_worst: Cost,
}

/// Raw five-component decomposition across the grid.
pub fn sweep_breakdown(
    est: &ScanCostEstimator,
    profile: &TableProfile,
    index: &IndexProfile,
    grid: &[f64],
) -> Result<Vec<BreakdownPoint>, ParamError> {
    grid.iter()
        .map(|&s| {
            let breakdown = est.cost_breakdown(s, profile, index)?;
            Ok(BreakdownPoint {
                selectivity: s,
                index_cpu: breakdown.index_cpu,
                index_io: breakdown.index_io,
                table_cpu: breakdown.table_cpu,
                table_io_best: breakdown.table_io_best,
                table_io_worst: breakdown.table_io_worst,
            })
        })
        .collect()
}

/// One grid point of the cumulative stack consumed by area charts. Each
/// field includes every component before it, so `table_io` is the total.
#[derive(Debug, Clone, Serialize)]
pub struct StackedPoint {
    pub selectivity: f64,
    pub index_cpu: Cost,
    pub index_io: Cost,
    pub table_cpu: Cost,
    pub table_io: Cost,
}

pub fn stack_components(points: &[BreakdownPoint], case: Case) -> Vec<StackedPoint> {
    points
        .iter()
        .map(|point| {
            let index_cpu = point.index_cpu;
            let index_io = index_cpu + point.index_io;
            let table_cpu = index_io + point.table_cpu;
            let table_io = table_cpu
                + match case {
                    Case::Best => point.table_io_best,
                    Case::Worst => point.table_io_worst,
                };
            StackedPoint {
                selectivity: point.selectivity,
                index_cpu,
                index_io,
                table_cpu,
                table_io,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSizePoint {
    pub cache_pages: usize,
    pub worst_case_pages: Cost,
    pub regime: String,
}

/// Worst-case fetches at a fixed selectivity across candidate cache sizes.
pub fn sweep_cache_size(
    profile: &TableProfile,
    s: f64,
    cache_sizes: &[usize],
) -> Result<Vec<CacheSizePoint>, ParamError> {
    cache_sizes
        .iter()
        .map(|&cache_pages| {
            let profile = TableProfile {
                cache_pages,
                ..*profile
            };
            Ok(CacheSizePoint {
                cache_pages,
                worst_case_pages: cost::worst_case_pages(s, &profile)?,
                regime: cost::cache_regime(s, &profile)?.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSizePoint {
    pub heap_pages: usize,
    pub tuples: usize,
    pub worst_case_pages: Cost,
}

/// Worst-case fetches at a fixed selectivity and cache size across
/// (heap pages, tuple count) pairs.
pub fn sweep_table_size(
    profile: &TableProfile,
    s: f64,
    sizes: &[(usize, usize)],
) -> Result<Vec<TableSizePoint>, ParamError> {
    sizes
        .iter()
        .map(|&(heap_pages, tuples)| {
            let profile = TableProfile {
                heap_pages,
                tuples,
                ..*profile
            };
            Ok(TableSizePoint {
                heap_pages,
                tuples,
                worst_case_pages: cost::worst_case_pages(s, &profile)?,
            })
        })
        .collect()
}
