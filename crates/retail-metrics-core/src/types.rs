use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RetailMetricsError;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Ratios expressed as decimals (0.25 = 25%). Never as percentages.
pub type Rate = Decimal;

/// Decimal places for every currency field.
pub const MONEY_DP: u32 = 2;

/// Decimal places used when presenting averaged margin ratios.
pub const RATIO_DP: u32 = 4;

/// Round a currency amount to 2 dp, half away from zero.
pub fn round_money(value: Decimal) -> Money {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a ratio for presentation.
pub fn round_ratio(value: Decimal) -> Rate {
    value.round_dp_with_strategy(RATIO_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Attribute an enriched order line can be grouped, partitioned or filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Product,
    Subcategory,
    Category,
    State,
    Country,
    Cohort,
    Year,
    Quarter,
    Month,
    MarginBand,
}

impl Dimension {
    /// Column name used in every output record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Product => "product",
            Dimension::Subcategory => "subcategory",
            Dimension::Category => "category",
            Dimension::State => "state",
            Dimension::Country => "country",
            Dimension::Cohort => "cohort",
            Dimension::Year => "year",
            Dimension::Quarter => "quarter",
            Dimension::Month => "month",
            Dimension::MarginBand => "margin_band",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = RetailMetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" => Ok(Dimension::Product),
            "subcategory" => Ok(Dimension::Subcategory),
            "category" => Ok(Dimension::Category),
            "state" => Ok(Dimension::State),
            "country" => Ok(Dimension::Country),
            "cohort" => Ok(Dimension::Cohort),
            "year" => Ok(Dimension::Year),
            "quarter" => Ok(Dimension::Quarter),
            "month" => Ok(Dimension::Month),
            "margin_band" | "band" => Ok(Dimension::MarginBand),
            other => Err(RetailMetricsError::InvalidInput {
                field: "dimension".into(),
                reason: format!("Unknown dimension: {other}"),
            }),
        }
    }
}

/// Aggregate metric used for sorting and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalRevenue,
    TotalCost,
    TotalProfit,
    AvgMargin,
    ItemCount,
    CustomerCount,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TotalRevenue => "total_revenue",
            Metric::TotalCost => "total_cost",
            Metric::TotalProfit => "total_profit",
            Metric::AvgMargin => "avg_margin",
            Metric::ItemCount => "item_count",
            Metric::CustomerCount => "customer_count",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RetailMetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        if name.is_empty() {
            return Err(RetailMetricsError::ConfigurationError(
                "ranking metric must not be empty".into(),
            ));
        }
        match name.as_str() {
            "total_revenue" | "revenue" => Ok(Metric::TotalRevenue),
            "total_cost" | "cost" => Ok(Metric::TotalCost),
            "total_profit" | "profit" => Ok(Metric::TotalProfit),
            "avg_margin" | "margin" => Ok(Metric::AvgMargin),
            "item_count" | "items" => Ok(Metric::ItemCount),
            "customer_count" | "customers" => Ok(Metric::CustomerCount),
            other => Err(RetailMetricsError::ConfigurationError(format!(
                "Unknown metric: {other}"
            ))),
        }
    }
}

/// Parse a comma-separated list of dimensions, e.g. "category,subcategory".
pub fn parse_dimensions(spec: &str) -> Result<Vec<Dimension>, RetailMetricsError> {
    spec.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Dimension::from_str)
        .collect()
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.355)), dec!(2.36));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
    }

    #[test]
    fn test_parse_dimensions() {
        let dims = parse_dimensions("category, subcategory").unwrap();
        assert_eq!(dims, vec![Dimension::Category, Dimension::Subcategory]);
        assert!(parse_dimensions("category,planet").is_err());
    }

    #[test]
    fn test_empty_metric_is_configuration_error() {
        let err = Metric::from_str("  ").unwrap_err();
        assert!(matches!(err, RetailMetricsError::ConfigurationError(_)));
    }

    #[test]
    fn test_metric_aliases() {
        assert_eq!(Metric::from_str("revenue").unwrap(), Metric::TotalRevenue);
        assert_eq!(
            Metric::from_str("total_profit").unwrap(),
            Metric::TotalProfit
        );
    }
}
