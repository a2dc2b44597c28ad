use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

use retail_metrics_core::aggregation::{AggregateRow, SortSpec};
use retail_metrics_core::cohort::{cohort_totals, CohortMembership};
use retail_metrics_core::{parse_dimensions, with_metadata};

use super::SourceArgs;

/// Arguments for cohort segmentation
#[derive(Args)]
pub struct CohortsArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Extra dimensions to break cohort totals down by, e.g. "category"
    #[arg(long, default_value = "")]
    pub by: String,
}

#[derive(Debug, Serialize)]
struct CohortsOutput {
    cohort_sizes: BTreeMap<String, usize>,
    totals: Vec<AggregateRow>,
    members: Vec<CohortMembership>,
}

pub fn run_cohorts(args: CohortsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let extra = parse_dimensions(&args.by)?;

    let (config, prepared) = super::prepare(&args.source)?;
    let totals = cohort_totals(&prepared.lines, &extra, &SortSpec::default())?;

    let output = CohortsOutput {
        cohort_sizes: prepared.cohorts.cohort_sizes(),
        totals,
        members: prepared.cohorts.members.into_values().collect(),
    };
    let result = with_metadata(
        "Closed acquisition-year ranges; customers without an acquisition date use their first order year",
        &config.cohort_ranges,
        prepared.warnings,
        start.elapsed().as_micros() as u64,
        output,
    );
    Ok(serde_json::to_value(result)?)
}
