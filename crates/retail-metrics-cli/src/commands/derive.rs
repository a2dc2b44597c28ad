use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use retail_metrics_core::derivation::RejectedLine;
use retail_metrics_core::dimensions::EnrichedLine;
use retail_metrics_core::with_metadata;

use super::SourceArgs;

/// Arguments for per-line derivation
#[derive(Args)]
pub struct DeriveArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Serialize)]
struct DeriveOutput {
    lines_derived: usize,
    duplicates_skipped: usize,
    lines: Vec<EnrichedLine>,
    rejected: Vec<RejectedLine>,
}

pub fn run_derive(args: DeriveArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let (config, prepared) = super::prepare(&args.source)?;

    let output = DeriveOutput {
        lines_derived: prepared.lines_derived,
        duplicates_skipped: prepared.duplicates_skipped,
        lines: prepared.lines,
        rejected: prepared.rejected,
    };
    let result = with_metadata(
        "revenue = net_price * quantity, cost = unit_cost * quantity (2 dp, half away from zero), profit = revenue - cost",
        &config,
        prepared.warnings,
        start.elapsed().as_micros() as u64,
        output,
    );
    Ok(serde_json::to_value(result)?)
}
