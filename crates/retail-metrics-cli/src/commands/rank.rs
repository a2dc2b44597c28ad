use clap::Args;
use serde_json::Value;
use std::time::Instant;

use retail_metrics_core::aggregation::{self, SortSpec};
use retail_metrics_core::ranking::{TiePolicy, TopNRanker};
use retail_metrics_core::{parse_dimensions, with_metadata};

use super::SourceArgs;

/// Arguments for top-N ranking
#[derive(Args)]
pub struct RankArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Comma-separated dimensions to aggregate by before ranking
    #[arg(long, default_value = "cohort,category")]
    pub by: String,

    /// Comma-separated dimensions to rank within (empty ranks globally)
    #[arg(long, default_value = "cohort")]
    pub partition: String,

    /// Metric to rank by
    #[arg(long, default_value = "total_revenue")]
    pub metric: String,

    /// Rows to keep per partition
    #[arg(long, default_value = "1")]
    pub top: usize,

    /// Tie handling: all_tied or secondary_key
    #[arg(long, default_value = "all_tied")]
    pub ties: TiePolicy,
}

pub fn run_rank(args: RankArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let partition_by = parse_dimensions(&args.partition)?;
    let mut group_by = parse_dimensions(&args.by)?;
    for d in partition_by.iter().rev() {
        if !group_by.contains(d) {
            group_by.insert(0, *d);
        }
    }
    let ranker = TopNRanker::new(partition_by, &args.metric, args.top, args.ties)?;

    let (_, prepared) = super::prepare(&args.source)?;
    let rows = aggregation::aggregate(
        &prepared.lines,
        &group_by,
        &SortSpec::descending(ranker.metric()),
    )?;
    let ranked = ranker.rank(&rows)?;

    let methodology = match ranker.tie_policy() {
        TiePolicy::AllTied => "Competitive rank within partition; all rows tied at the cut-off are kept",
        TiePolicy::SecondaryKey => "Row number within partition; ties broken by item key ascending",
    };
    let result = with_metadata(
        methodology,
        &ranker,
        prepared.warnings,
        start.elapsed().as_micros() as u64,
        ranked,
    );
    Ok(serde_json::to_value(result)?)
}
