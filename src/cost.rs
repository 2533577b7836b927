use log::debug;
use serde::Serialize;
use thiserror::Error;

pub type Cost = f64;

pub mod cost_factors {
    /// CPU cost of fetching and filtering one heap tuple.
    pub static TUPLE_CPU_FACTOR: f64 = 0.01;
    /// CPU cost of scanning one index entry.
    pub static ENTRY_CPU_FACTOR: f64 = 0.005;
    /// Per-unit CPU weight contributed by the k1/k2 tuning constants.
    pub static K_CPU_FACTOR: f64 = 0.0025;
    /// Weight of a blocking page fetch relative to one CPU cost unit.
    pub static IO_WEIGHT: f64 = 4.;
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("selectivity must lie within [0, 1], got {0}")]
    SelectivityOutOfRange(f64),
}

/// Heap-side sizes of a simulated scan: the table, its tuple count, and the
/// buffer cache in front of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableProfile {
    pub heap_pages: usize,
    pub tuples: usize,
    pub cache_pages: usize,
}

/// Sizes of the index over a table. `entries` usually equals the table's
/// tuple count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexProfile {
    pub pages: usize,
    pub entries: usize,
}

impl TableProfile {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_positive("heap_pages", self.heap_pages)?;
        check_positive("tuples", self.tuples)?;
        check_positive("cache_pages", self.cache_pages)
    }
}

impl IndexProfile {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_positive("index_pages", self.pages)?;
        check_positive("index_entries", self.entries)
    }
}

fn check_positive(name: &'static str, value: usize) -> Result<(), ParamError> {
    if value == 0 {
        return Err(ParamError::NonPositive {
            name,
            value: value as f64,
        });
    }
    Ok(())
}

fn check_selectivity(s: f64) -> Result<(), ParamError> {
    if !(0. ..=1.).contains(&s) {
        return Err(ParamError::SelectivityOutOfRange(s));
    }
    Ok(())
}

/// Which branch of the worst-case model applies at a given selectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CacheRegime {
    /// The whole table fits in the cache; repeat fetches always hit.
    Resident,
    /// The table exceeds the cache but selectivity is low enough that the
    /// cache still absorbs nearly every repeat fetch.
    Absorbed,
    /// Fetches past the cache's absorption capacity spill to disk.
    Spill,
}

/// Pages fetched when heap order agrees perfectly with index order: a
/// selectivity-`s` slice of the rows lands on the same slice of the pages.
pub fn best_case_pages(s: f64, profile: &TableProfile) -> Result<Cost, ParamError> {
    check_selectivity(s)?;
    profile.validate()?;
    Ok(s * profile.heap_pages as f64)
}

/// Expected pages fetched when heap placement is uncorrelated with index
/// order, with the buffer cache absorbing repeat fetches within one scan.
///
/// In the spill regime this counts fetches, including re-fetches of evicted
/// pages, so it can exceed the table's page count.
pub fn worst_case_pages(s: f64, profile: &TableProfile) -> Result<Cost, ParamError> {
    check_selectivity(s)?;
    profile.validate()?;
    Ok(worst_case_pages_unchecked(s, profile))
}

/// Selects the worst-case branch that fires at selectivity `s`.
pub fn cache_regime(s: f64, profile: &TableProfile) -> Result<CacheRegime, ParamError> {
    check_selectivity(s)?;
    profile.validate()?;
    Ok(cache_regime_unchecked(s, profile))
}

fn cache_regime_unchecked(s: f64, profile: &TableProfile) -> CacheRegime {
    let pages = profile.heap_pages as f64;
    let tuples = profile.tuples as f64;
    let cache = profile.cache_pages as f64;

    if profile.heap_pages <= profile.cache_pages {
        CacheRegime::Resident
    } else if s <= 2. * pages * cache / (tuples * (2. * pages - cache)) {
        CacheRegime::Absorbed
    } else {
        CacheRegime::Spill
    }
}

fn worst_case_pages_unchecked(s: f64, profile: &TableProfile) -> Cost {
    let pages = profile.heap_pages as f64;
    let tuples = profile.tuples as f64;
    let cache = profile.cache_pages as f64;

    let regime = cache_regime_unchecked(s, profile);
    debug!("worst-case regime at s = {}: {}", s, regime);

    // 2*T*N*s / (2*T + N*s) approximates the number of distinct bins hit
    // when N*s balls fall uniformly into T bins.
    let absorbed = 2. * pages * tuples * s / (2. * pages + tuples * s);
    match regime {
        CacheRegime::Resident => absorbed.min(pages),
        CacheRegime::Absorbed => absorbed,
        CacheRegime::Spill => {
            cache
                + (tuples * s - 2. * pages * cache / (2. * pages - cache)) * (pages - cache)
                    / pages
        }
    }
}

/// The five additive components of an index scan's cost at one selectivity.
/// Totals are the caller's business; see the sweep module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub index_cpu: Cost,
    pub index_io: Cost,
    pub table_cpu: Cost,
    pub table_io_best: Cost,
    pub table_io_worst: Cost,
}

/// Scan cost estimator parameterized by the two CPU weighting constants,
/// k1 for tuple-level work and k2 for index-entry-level work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanCostEstimator {
    k1: f64,
    k2: f64,
}

impl ScanCostEstimator {
    pub fn new(k1: f64, k2: f64) -> Result<Self, ParamError> {
        for (name, value) in [("k1", k1), ("k2", k2)] {
            if value <= 0. {
                return Err(ParamError::NonPositive { name, value });
            }
        }
        Ok(Self { k1, k2 })
    }

    /// CPU and I/O components of an index scan at selectivity `s`, with the
    /// heap I/O term given under both correlation extremes.
    pub fn cost_breakdown(
        &self,
        s: f64,
        profile: &TableProfile,
        index: &IndexProfile,
    ) -> Result<CostBreakdown, ParamError> {
        check_selectivity(s)?;
        profile.validate()?;
        index.validate()?;

        let tuples = profile.tuples as f64;
        Ok(CostBreakdown {
            index_cpu: (cost_factors::ENTRY_CPU_FACTOR + self.k2 * cost_factors::K_CPU_FACTOR)
                * s
                * index.entries as f64,
            index_io: cost_factors::IO_WEIGHT * s * index.pages as f64,
            table_cpu: (cost_factors::TUPLE_CPU_FACTOR
                + (self.k1 - self.k2) * cost_factors::K_CPU_FACTOR)
                * s
                * tuples,
            table_io_best: s * profile.heap_pages as f64,
            table_io_worst: cost_factors::IO_WEIGHT * worst_case_pages_unchecked(s, profile),
        })
    }

    /// Cost of scanning the whole heap once. Does not depend on selectivity.
    pub fn seq_scan_cost(&self, profile: &TableProfile) -> Result<Cost, ParamError> {
        profile.validate()?;
        Ok(
            (cost_factors::TUPLE_CPU_FACTOR + cost_factors::K_CPU_FACTOR * self.k1)
                * profile.tuples as f64
                + profile.heap_pages as f64,
        )
    }
}

impl Default for ScanCostEstimator {
    fn default() -> Self {
        Self { k1: 1., k2: 1. }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use itertools::Itertools;
    use pretty_assertions::assert_eq;

    fn fits_cache() -> TableProfile {
        TableProfile {
            heap_pages: 161984,
            tuples: 14838350,
            cache_pages: 524288,
        }
    }

    fn exceeds_cache() -> TableProfile {
        TableProfile {
            cache_pages: 131072,
            ..fits_cache()
        }
    }

    fn index() -> IndexProfile {
        IndexProfile {
            pages: 18663,
            entries: 14838350,
        }
    }

    fn grid() -> Vec<f64> {
        (0..100).map(|i| i as f64 * 0.01).collect()
    }

    #[test]
    fn best_case_is_selectivity_fraction_of_pages() {
        let profile = fits_cache();
        for s in grid() {
            assert_eq!(best_case_pages(s, &profile).unwrap(), s * 161984.);
        }
    }

    #[test]
    fn rejects_out_of_range_params() {
        let profile = fits_cache();
        assert_eq!(
            best_case_pages(-0.1, &profile),
            Err(ParamError::SelectivityOutOfRange(-0.1))
        );
        assert_eq!(
            worst_case_pages(1.5, &profile),
            Err(ParamError::SelectivityOutOfRange(1.5))
        );

        let bad = TableProfile {
            tuples: 0,
            ..profile
        };
        assert_eq!(
            worst_case_pages(0.5, &bad),
            Err(ParamError::NonPositive {
                name: "tuples",
                value: 0.
            })
        );

        let est = ScanCostEstimator::default();
        let bad_index = IndexProfile {
            pages: 0,
            entries: 1,
        };
        assert_eq!(
            est.cost_breakdown(0.5, &profile, &bad_index),
            Err(ParamError::NonPositive {
                name: "index_pages",
                value: 0.
            })
        );
        assert_eq!(
            ScanCostEstimator::new(0., 1.),
            Err(ParamError::NonPositive {
                name: "k1",
                value: 0.
            })
        );
    }

    #[test]
    fn zero_selectivity_fetches_nothing() {
        for profile in [fits_cache(), exceeds_cache()] {
            assert_eq!(worst_case_pages(0., &profile).unwrap(), 0.);
        }

        let breakdown = ScanCostEstimator::new(2., 1.)
            .unwrap()
            .cost_breakdown(0., &fits_cache(), &index())
            .unwrap();
        assert_eq!(
            breakdown,
            CostBreakdown {
                index_cpu: 0.,
                index_io: 0.,
                table_cpu: 0.,
                table_io_best: 0.,
                table_io_worst: 0.,
            }
        );
    }

    #[test]
    fn resident_regime_caps_at_table_size() {
        let profile = fits_cache();
        let pages = profile.heap_pages as f64;
        let tuples = profile.tuples as f64;
        for s in grid() {
            assert_eq!(cache_regime(s, &profile).unwrap(), CacheRegime::Resident);
            let raw = 2. * pages * tuples * s / (2. * pages + tuples * s);
            assert_abs_diff_eq!(
                worst_case_pages(s, &profile).unwrap(),
                raw.min(pages),
                epsilon = 1e-6
            );
        }
        // The cap binds well before full selectivity.
        assert_eq!(worst_case_pages(0.99, &profile).unwrap(), pages);
    }

    #[test]
    fn fits_cache_scenario_at_ten_percent() {
        let profile = fits_cache();
        let expected: f64 =
            (2f64 * 161984. * 14838350. * 0.1 / (2. * 161984. + 14838350. * 0.1)).min(161984.);
        assert_abs_diff_eq!(
            worst_case_pages(0.1, &profile).unwrap(),
            expected,
            epsilon = 1e-6
        );
    }

    #[test]
    fn full_selectivity_routes_to_spill_on_big_table() {
        let profile = exceeds_cache();
        let (pages, tuples, cache) = (161984., 14838350., 131072.);

        let threshold = 2. * pages * cache / (tuples * (2. * pages - cache));
        assert!(threshold < 1.);
        assert_eq!(cache_regime(1., &profile).unwrap(), CacheRegime::Spill);

        let expected =
            cache + (tuples - 2. * pages * cache / (2. * pages - cache)) * (pages - cache) / pages;
        let worst = worst_case_pages(1., &profile).unwrap();
        assert_abs_diff_eq!(worst, expected, epsilon = 1e-6);
        // Fetch count, not distinct pages: re-fetches push it past the table.
        assert!(worst > pages);
    }

    #[test]
    fn absorbed_spill_boundary_is_continuous() {
        let profile = exceeds_cache();
        let (pages, tuples, cache) = (161984., 14838350., 131072.);
        let threshold = 2. * pages * cache / (tuples * (2. * pages - cache));

        // Ties go to the absorbed branch, and both formulas meet at exactly
        // the cache size there.
        assert_eq!(
            cache_regime(threshold, &profile).unwrap(),
            CacheRegime::Absorbed
        );
        let at_boundary = worst_case_pages(threshold, &profile).unwrap();
        assert_abs_diff_eq!(at_boundary, cache, epsilon = 1e-6);

        let just_past = threshold + 1e-9;
        assert_eq!(
            cache_regime(just_past, &profile).unwrap(),
            CacheRegime::Spill
        );
        assert_abs_diff_eq!(
            worst_case_pages(just_past, &profile).unwrap(),
            at_boundary,
            epsilon = 1e-2
        );
    }

    #[test]
    fn worst_case_is_monotonic_in_selectivity() {
        for profile in [fits_cache(), exceeds_cache()] {
            for (a, b) in grid().into_iter().tuple_windows() {
                assert!(
                    worst_case_pages(a, &profile).unwrap()
                        <= worst_case_pages(b, &profile).unwrap(),
                    "not monotonic between s = {} and s = {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn absorbed_regime_stays_under_cache_size() {
        let profile = exceeds_cache();
        for s in grid() {
            if cache_regime(s, &profile).unwrap() == CacheRegime::Absorbed {
                assert!(worst_case_pages(s, &profile).unwrap() <= profile.cache_pages as f64);
            }
        }
    }

    #[test]
    fn breakdown_matches_component_formulas() {
        let est = ScanCostEstimator::new(2., 1.).unwrap();
        let profile = fits_cache();
        let s = 0.37;
        let breakdown = est.cost_breakdown(s, &profile, &index()).unwrap();

        assert_abs_diff_eq!(
            breakdown.index_cpu,
            (0.005 + 1. * 0.0025) * s * 14838350.,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(breakdown.index_io, 4. * s * 18663., epsilon = 1e-6);
        assert_abs_diff_eq!(
            breakdown.table_cpu,
            (0.01 + (2. - 1.) * 0.0025) * s * 14838350.,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(breakdown.table_io_best, s * 161984., epsilon = 1e-6);
        assert_abs_diff_eq!(
            breakdown.table_io_worst,
            4. * worst_case_pages(s, &profile).unwrap(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn seq_scan_cost_matches_formula() {
        let est = ScanCostEstimator::new(2., 1.).unwrap();
        assert_abs_diff_eq!(
            est.seq_scan_cost(&fits_cache()).unwrap(),
            (0.01 + 0.0025 * 2.) * 14838350. + 161984.,
            epsilon = 1e-6
        );
    }
}
