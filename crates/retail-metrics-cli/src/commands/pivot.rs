use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;

use retail_metrics_core::pivot::{seasonality_pivot, LineMetric};
use retail_metrics_core::with_metadata;

use super::{parse_years, SourceArgs};

/// Arguments for the seasonality pivot
#[derive(Args)]
pub struct PivotArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Per-line value to sum: revenue, cost or profit
    #[arg(long, default_value = "profit")]
    pub metric: LineMetric,

    /// Fixed year columns, e.g. "2016,2017,2018" (default: years present in the data)
    #[arg(long)]
    pub periods: Option<String>,
}

#[derive(Debug, Serialize)]
struct PivotOutput {
    columns: Vec<i32>,
    records: Vec<Map<String, Value>>,
    excluded_points: usize,
    excluded_total: Decimal,
}

pub fn run_pivot(args: PivotArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let periods = args.periods.as_deref().map(parse_years).transpose()?;

    let (_, prepared) = super::prepare(&args.source)?;
    let matrix = seasonality_pivot(&prepared.lines, args.metric, periods.clone())?;

    let mut warnings = prepared.warnings;
    if matrix.excluded_points > 0 {
        warnings.push(format!(
            "{} lines outside the requested periods excluded ({} total)",
            matrix.excluded_points, matrix.excluded_total
        ));
    }

    let output = PivotOutput {
        records: matrix.records("month"),
        columns: matrix.columns,
        excluded_points: matrix.excluded_points,
        excluded_total: matrix.excluded_total,
    };
    let assumptions = serde_json::json!({
        "metric": args.metric,
        "periods": periods,
    });
    let result = with_metadata(
        "Sum of the per-line metric for each (year, month); empty cells are null",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    );
    Ok(serde_json::to_value(result)?)
}
