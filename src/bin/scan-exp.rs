use clap::Parser;
use gethostname::gethostname;
use log::info;
use scancost::sweep::{self, Case};
use scancost::{bin_utils, IndexProfile, ScanCostEstimator, TableProfile};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    output_prefix: Option<String>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    no_output: bool,

    #[arg(long, default_value_t = sweep::DEFAULT_STEP)]
    step: f64,

    #[arg(long, value_parser = parse_comma_scenario_list)]
    scenario: Option<std::vec::Vec<Scenario>>,

    #[arg(long, value_parser = parse_comma_exp_type_list)]
    exp_type: Option<std::vec::Vec<ExpType>>,

    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
enum ExpType {
    PagesFetched,
    ScanCost,
    Breakdown,
    CacheSize,
    TableSize,
}

/// The named table/cache sizings measured against a live Postgres install;
/// page and entry counts come from pg_class on the loaded order tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
enum Scenario {
    #[strum(serialize = "table_fit_cache_1")]
    TableFitCache1,
    #[strum(serialize = "table_fit_cache_2")]
    TableFitCache2,
    #[strum(serialize = "table_bigger_cache_1")]
    TableBiggerCache1,
    #[strum(serialize = "table_bigger_cache_2")]
    TableBiggerCache2,
}

impl Scenario {
    fn profile(&self) -> TableProfile {
        match self {
            Self::TableFitCache1 => TableProfile {
                heap_pages: 161984,
                tuples: 14838350,
                cache_pages: 524288,
            },
            Self::TableFitCache2 => TableProfile {
                heap_pages: 252687,
                tuples: 36233108,
                cache_pages: 524288,
            },
            Self::TableBiggerCache1 => TableProfile {
                cache_pages: 131072,
                ..Self::TableFitCache1.profile()
            },
            Self::TableBiggerCache2 => TableProfile {
                cache_pages: 131072,
                ..Self::TableFitCache2.profile()
            },
        }
    }

    fn index(&self) -> IndexProfile {
        match self {
            Self::TableFitCache1 | Self::TableBiggerCache1 => IndexProfile {
                pages: 18663,
                entries: 14838350,
            },
            Self::TableFitCache2 | Self::TableBiggerCache2 => IndexProfile {
                pages: 30663,
                entries: 36233108,
            },
        }
    }

    fn estimator(&self) -> ScanCostEstimator {
        match self {
            Self::TableFitCache1 | Self::TableBiggerCache1 => {
                ScanCostEstimator::new(2., 1.).unwrap()
            }
            Self::TableFitCache2 | Self::TableBiggerCache2 => {
                ScanCostEstimator::new(1., 1.).unwrap()
            }
        }
    }
}

#[derive(Serialize)]
struct ScenarioHeader {
    scenario: String,
}

#[derive(Serialize)]
struct StackHeader {
    scenario: String,
    case: String,
}

#[derive(Serialize)]
struct FixedSweepParams {
    selectivity: f64,
    heap_pages: usize,
    tuples: usize,
}

fn exp_pages_fetched(
    args: &Args,
    scenarios: &[Scenario],
) -> Vec<(ScenarioHeader, TableProfile, sweep::PageFetchPoint)> {
    let grid = sweep::selectivity_grid(args.step).unwrap();
    let mut records = vec![];
    for &scenario in scenarios {
        println!("Running exp {} scenario {}", ExpType::PagesFetched, scenario);
        let profile = scenario.profile();
        for point in sweep::sweep_page_fetch(&profile, &grid).unwrap() {
            records.push((
                ScenarioHeader {
                    scenario: scenario.to_string(),
                },
                profile,
                point,
            ));
        }
    }
    records
}

fn exp_scan_cost(
    args: &Args,
    scenarios: &[Scenario],
) -> Vec<(
    ScenarioHeader,
    TableProfile,
    IndexProfile,
    ScanCostEstimator,
    sweep::ScanCostPoint,
)> {
    let grid = sweep::selectivity_grid(args.step).unwrap();
    let mut records = vec![];
    for &scenario in scenarios {
        println!("Running exp {} scenario {}", ExpType::ScanCost, scenario);
        let profile = scenario.profile();
        let index = scenario.index();
        let est = scenario.estimator();

        let points = sweep::sweep_scan_cost(&est, &profile, &index, &grid).unwrap();
        if let Some(s) = sweep::crossover_selectivity(&points) {
            info!("Scenario {} crosses over near s = {}", scenario, s);
        }

        for point in points {
            records.push((
                ScenarioHeader {
                    scenario: scenario.to_string(),
                },
                profile,
                index,
                est,
                point,
            ));
        }
    }
    records
}

fn exp_breakdown(
    args: &Args,
    scenarios: &[Scenario],
) -> Vec<(
    ScenarioHeader,
    TableProfile,
    IndexProfile,
    ScanCostEstimator,
    sweep::BreakdownPoint,
)> {
    let grid = sweep::selectivity_grid(args.step).unwrap();
    let mut records = vec![];
    for &scenario in scenarios {
        println!("Running exp {} scenario {}", ExpType::Breakdown, scenario);
        let profile = scenario.profile();
        let index = scenario.index();
        let est = scenario.estimator();
        for point in sweep::sweep_breakdown(&est, &profile, &index, &grid).unwrap() {
            records.push((
                ScenarioHeader {
                    scenario: scenario.to_string(),
                },
                profile,
                index,
                est,
                point,
            ));
        }
    }
    records
}

fn exp_stacked(
    args: &Args,
    scenarios: &[Scenario],
    case: Case,
) -> Vec<(StackHeader, sweep::StackedPoint)> {
    let grid = sweep::selectivity_grid(args.step).unwrap();
    let mut records = vec![];
    for &scenario in scenarios {
        let points = sweep::sweep_breakdown(
            &scenario.estimator(),
            &scenario.profile(),
            &scenario.index(),
            &grid,
        )
        .unwrap();
        for point in sweep::stack_components(&points, case) {
            records.push((
                StackHeader {
                    scenario: scenario.to_string(),
                    case: case.to_string(),
                },
                point,
            ));
        }
    }
    records
}

fn exp_cache_size() -> Vec<(FixedSweepParams, sweep::CacheSizePoint)> {
    let selectivity = 0.1;
    let profile = TableProfile {
        heap_pages: 600_000,
        tuples: 600_000 * 60,
        cache_pages: 524_288,
    };
    let cache_sizes: Vec<_> = (0..4).map(|i| 524_288 << i).collect();
    println!(
        "Running exp {} over {} cache sizes",
        ExpType::CacheSize,
        cache_sizes.len()
    );

    sweep::sweep_cache_size(&profile, selectivity, &cache_sizes)
        .unwrap()
        .into_iter()
        .map(|point| {
            (
                FixedSweepParams {
                    selectivity,
                    heap_pages: profile.heap_pages,
                    tuples: profile.tuples,
                },
                point,
            )
        })
        .collect()
}

fn exp_table_size() -> Vec<(FixedSweepParams, sweep::TableSizePoint)> {
    let selectivity = 0.2;
    let profile = TableProfile {
        heap_pages: 100_000,
        tuples: 100_000 * 60,
        cache_pages: 524_288,
    };
    let sizes: Vec<_> = (100_000..600_000)
        .step_by(1000)
        .map(|pages| (pages, pages * 60))
        .collect();
    println!(
        "Running exp {} over {} table sizes",
        ExpType::TableSize,
        sizes.len()
    );

    sweep::sweep_table_size(&profile, selectivity, &sizes)
        .unwrap()
        .into_iter()
        .map(|point| {
            (
                FixedSweepParams {
                    selectivity,
                    heap_pages: profile.heap_pages,
                    tuples: profile.tuples,
                },
                point,
            )
        })
        .collect()
}

fn main() {
    let args = Args::parse().with_defaults();
    bin_utils::init_logging(args.verbose);

    let scenarios = args.scenario.clone().unwrap_or(vec![
        Scenario::TableFitCache1,
        Scenario::TableFitCache2,
        Scenario::TableBiggerCache1,
        Scenario::TableBiggerCache2,
    ]);

    for exp_type in args.exp_type.clone().unwrap_or(vec![
        ExpType::PagesFetched,
        ExpType::ScanCost,
        ExpType::Breakdown,
        ExpType::CacheSize,
        ExpType::TableSize,
    ]) {
        match exp_type {
            ExpType::PagesFetched => {
                write_output(&args, exp_type, exp_pages_fetched(&args, &scenarios))
            }
            ExpType::ScanCost => write_output(&args, exp_type, exp_scan_cost(&args, &scenarios)),
            ExpType::Breakdown => {
                write_output(&args, exp_type, exp_breakdown(&args, &scenarios));
                for case in [Case::Best, Case::Worst] {
                    write_output(
                        &args,
                        format!("{}_stacked_{}", exp_type, case),
                        exp_stacked(&args, &scenarios, case),
                    );
                }
            }
            ExpType::CacheSize => write_output(&args, exp_type, exp_cache_size()),
            ExpType::TableSize => write_output(&args, exp_type, exp_table_size()),
        }
    }
}

fn write_output(args: &Args, name: impl fmt::Display, records: Vec<impl Serialize>) {
    if args.no_output {
        return;
    }

    let output = args.output_dir.as_ref().unwrap().join(format!(
        "{}-{}-{}-{}.csv",
        args.output_prefix.as_deref().unwrap_or("scan-exp"),
        name,
        gethostname().to_string_lossy(),
        chrono::Local::now().format("%FT%H%M%S%z")
    ));
    bin_utils::write_records(&output, records).unwrap();
}

impl Args {
    fn with_defaults(mut self) -> Self {
        self.output_dir.get_or_insert(bin_utils::default_output_dir());
        self
    }
}

fn parse_comma_scenario_list(s: &str) -> Result<Vec<Scenario>, strum::ParseError> {
    s.split(",")
        .map(|scenario| Scenario::from_str(scenario))
        .collect::<Result<_, _>>()
}

fn parse_comma_exp_type_list(s: &str) -> Result<Vec<ExpType>, strum::ParseError> {
    s.split(",")
        .map(|exp_type| ExpType::from_str(exp_type))
        .collect::<Result<_, _>>()
}
