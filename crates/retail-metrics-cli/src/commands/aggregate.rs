use clap::Args;
use serde_json::Value;
use std::time::Instant;

use retail_metrics_core::aggregation::{self, SortSpec};
use retail_metrics_core::{parse_dimensions, with_metadata, Metric};

use super::SourceArgs;

/// Arguments for hierarchical aggregation
#[derive(Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Comma-separated grouping dimensions, e.g. "category,subcategory" (empty for a grand total)
    #[arg(long, default_value = "category")]
    pub by: String,

    /// Metric to order rows by
    #[arg(long, default_value = "total_profit")]
    pub sort: Metric,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,
}

pub fn run_aggregate(args: AggregateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let group_by = parse_dimensions(&args.by)?;
    let sort = SortSpec {
        metric: args.sort,
        descending: !args.ascending,
    };

    let (config, prepared) = super::prepare(&args.source)?;
    let rows = aggregation::aggregate(&prepared.lines, &group_by, &sort)?;

    let assumptions = serde_json::json!({
        "group_by": group_by,
        "sort": sort,
        "filter": config.filter,
    });
    let result = with_metadata(
        "Sums of revenue, cost and profit per group; avg_margin is the mean of per-line profit/revenue ratios",
        &assumptions,
        prepared.warnings,
        start.elapsed().as_micros() as u64,
        rows,
    );
    Ok(serde_json::to_value(result)?)
}
