use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;
use std::time::Instant;

use retail_metrics_core::aggregation::{aggregate, SortSpec};
use retail_metrics_core::derivation::{derive_batch, DerivationCache, OrderLine};
use retail_metrics_core::dimensions::Dataset;
use retail_metrics_core::pipeline::{Pipeline, PipelineConfig};
use retail_metrics_core::{with_metadata, Dimension};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DeriveInput {
    order_lines: Vec<OrderLine>,
    #[serde(default)]
    fail_on_malformed: bool,
}

#[napi]
pub fn derive_lines(input_json: String) -> NapiResult<String> {
    let start = Instant::now();
    let input: DeriveInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let mut cache = DerivationCache::new();
    let batch = derive_batch(&input.order_lines, &mut cache, input.fail_on_malformed)
        .map_err(to_napi_error)?;
    let output = with_metadata(
        "revenue = net_price * quantity, cost = unit_cost * quantity (2 dp), profit = revenue - cost",
        &serde_json::json!({ "fail_on_malformed": input.fail_on_malformed }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        batch,
    );
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AggregateInput {
    #[serde(flatten)]
    dataset: Dataset,
    #[serde(default)]
    group_by: Vec<Dimension>,
    #[serde(default)]
    sort: SortSpec,
    #[serde(default)]
    config: PipelineConfig,
}

#[napi]
pub fn aggregate_lines(input_json: String) -> NapiResult<String> {
    let start = Instant::now();
    let input: AggregateInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let pipeline = Pipeline::new(input.config).map_err(to_napi_error)?;
    let prepared = pipeline.prepare(&input.dataset).map_err(to_napi_error)?;
    let rows = aggregate(&prepared.lines, &input.group_by, &input.sort).map_err(to_napi_error)?;
    let output = with_metadata(
        "Sums of revenue, cost and profit per group; avg_margin is the mean of per-line ratios",
        &serde_json::json!({ "group_by": input.group_by, "sort": input.sort }),
        prepared.warnings,
        start.elapsed().as_micros() as u64,
        rows,
    );
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PipelineInput {
    #[serde(flatten)]
    dataset: Dataset,
    #[serde(default)]
    config: PipelineConfig,
}

#[napi]
pub fn run_pipeline(input_json: String) -> NapiResult<String> {
    let input: PipelineInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let pipeline = Pipeline::new(input.config).map_err(to_napi_error)?;
    let output = pipeline.run(&input.dataset).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
