pub mod aggregate;
pub mod cohorts;
pub mod derive;
pub mod pivot;
pub mod rank;
pub mod run;

use chrono::NaiveDate;
use clap::Args;

use retail_metrics_core::cohort::YearRange;
use retail_metrics_core::dimensions::LineFilter;
use retail_metrics_core::pipeline::{Pipeline, PipelineConfig, PreparedLines};

use crate::input::{self, DatasetArgs};

/// Line filters shared by the analytical commands
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only lines whose product is in this category
    #[arg(long)]
    pub category: Option<String>,

    /// Only lines whose customer is in this country
    #[arg(long)]
    pub country: Option<String>,

    /// First order date to include (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last order date to include (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

impl FilterArgs {
    /// Overlay the flags that were given onto `filter`.
    pub fn apply_to(&self, filter: &mut LineFilter) {
        if let Some(category) = &self.category {
            filter.category = Some(category.clone());
        }
        if let Some(country) = &self.country {
            filter.country = Some(country.clone());
        }
        if self.from.is_some() {
            filter.date_from = self.from;
        }
        if self.to.is_some() {
            filter.date_to = self.to;
        }
    }
}

/// Input and preparation options shared by the analytical commands
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Cohort year ranges, e.g. "1980-1985,1986-1990" (default: five-year ranges 1980-2020)
    #[arg(long)]
    pub cohorts: Option<String>,

    /// Apply each line's exchange_rate to its prices before deriving
    #[arg(long)]
    pub convert_currency: bool,

    /// Abort on the first malformed order line instead of reporting it
    #[arg(long)]
    pub fail_on_malformed: bool,
}

impl SourceArgs {
    pub fn config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = PipelineConfig {
            convert_currency: self.convert_currency,
            fail_on_malformed: self.fail_on_malformed,
            ..Default::default()
        };
        if let Some(spec) = &self.cohorts {
            config.cohort_ranges = parse_year_ranges(spec)?;
        }
        self.filter.apply_to(&mut config.filter);
        Ok(config)
    }
}

/// Load the dataset and run it through derivation, segmentation, enrichment
/// and filtering.
pub fn prepare(
    args: &SourceArgs,
) -> Result<(PipelineConfig, PreparedLines), Box<dyn std::error::Error>> {
    let config = args.config()?;
    let pipeline = Pipeline::new(config.clone())?;
    let dataset = input::load_dataset(&args.dataset)?;
    let prepared = pipeline.prepare(&dataset)?;
    Ok((config, prepared))
}

/// Parse "1980-1985,1986-1990" into closed year ranges.
pub fn parse_year_ranges(spec: &str) -> Result<Vec<YearRange>, Box<dyn std::error::Error>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|part| -> Result<YearRange, Box<dyn std::error::Error>> {
            let (start, end) = part
                .split_once('-')
                .ok_or_else(|| format!("Cohort range must be start-end, got '{}'", part))?;
            Ok(YearRange::new(start.trim().parse()?, end.trim().parse()?))
        })
        .collect()
}

/// Parse a comma-separated list of years.
pub fn parse_years(spec: &str) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| -> Result<i32, Box<dyn std::error::Error>> {
            s.parse::<i32>()
                .map_err(|e| format!("Invalid year '{}': {}", s, e).into())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_ranges() {
        let ranges = parse_year_ranges("1980-1985, 1986-1990").unwrap();
        assert_eq!(ranges, vec![YearRange::new(1980, 1985), YearRange::new(1986, 1990)]);
        assert!(parse_year_ranges("1980").is_err());
        assert!(parse_year_ranges("1980-x").is_err());
    }

    #[test]
    fn test_parse_years() {
        assert_eq!(parse_years("2016,2017").unwrap(), vec![2016, 2017]);
        assert!(parse_years("2016,next").is_err());
    }

    #[test]
    fn test_filter_flags_overlay_config() {
        let mut filter = LineFilter {
            category: Some("Audio".into()),
            country: Some("Germany".into()),
            ..Default::default()
        };
        let flags = FilterArgs {
            category: Some("Computers".into()),
            from: NaiveDate::from_ymd_opt(2019, 1, 1),
            ..Default::default()
        };
        flags.apply_to(&mut filter);
        assert_eq!(filter.category.as_deref(), Some("Computers"));
        assert_eq!(filter.country.as_deref(), Some("Germany"));
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2019, 1, 1));
    }
}
