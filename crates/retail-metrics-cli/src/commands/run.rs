use clap::Args;
use serde_json::Value;

use retail_metrics_core::pipeline::{Pipeline, PipelineConfig};

use super::FilterArgs;
use crate::input::{self, DatasetArgs};

/// Arguments for a full pipeline run
#[derive(Args)]
pub struct RunArgs {
    /// Pipeline config (YAML or JSON); defaults apply to anything omitted
    #[arg(long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Filters given here override the config's filter
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Apply each line's exchange_rate to its prices before deriving
    #[arg(long)]
    pub convert_currency: bool,

    /// Abort on the first malformed order line instead of reporting it
    #[arg(long)]
    pub fail_on_malformed: bool,
}

pub fn run_pipeline(args: RunArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut config: PipelineConfig = match &args.config {
        Some(path) => input::file::read_structured(path)?,
        None => PipelineConfig::default(),
    };
    args.filter.apply_to(&mut config.filter);
    config.convert_currency |= args.convert_currency;
    config.fail_on_malformed |= args.fail_on_malformed;

    let pipeline = Pipeline::new(config)?;
    let dataset = input::load_dataset(&args.dataset)?;
    let result = pipeline.run(&dataset)?;
    Ok(serde_json::to_value(result)?)
}
