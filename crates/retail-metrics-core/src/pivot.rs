//! Time Pivot Builder.
//!
//! Reshapes (period, sub_period, value) triples into a matrix with one row per
//! sub-period and one column per period. Cells are sums; a combination with no
//! input is `None`, which is distinct from a zero sum.

use chrono::{Datelike, Month};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::dimensions::EnrichedLine;
use crate::error::RetailMetricsError;
use crate::types::Money;
use crate::RetailMetricsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One long-form observation, e.g. (2019, 3, profit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotPoint {
    pub period: i32,
    pub sub_period: u32,
    pub value: Decimal,
}

/// Optional fixed axes. Without them the axes are the observed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_periods: Option<Vec<u32>>,
}

/// Per-line value fed into a seasonality pivot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineMetric {
    Revenue,
    Cost,
    #[default]
    Profit,
}

impl std::str::FromStr for LineMetric {
    type Err = RetailMetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "revenue" => Ok(LineMetric::Revenue),
            "cost" => Ok(LineMetric::Cost),
            "profit" => Ok(LineMetric::Profit),
            other => Err(RetailMetricsError::InvalidInput {
                field: "metric".into(),
                reason: format!("Unknown line metric: {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub sub_period: u32,
    pub label: String,
    /// One cell per entry of [`PivotMatrix::columns`].
    pub cells: Vec<Option<Money>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotMatrix {
    pub columns: Vec<i32>,
    pub rows: Vec<PivotRow>,
    /// Points whose period or sub-period was not in an explicit axis list.
    pub excluded_points: usize,
    pub excluded_total: Money,
}

impl PivotMatrix {
    pub fn cell(&self, period: i32, sub_period: u32) -> Option<Money> {
        let col = self.columns.iter().position(|p| *p == period)?;
        self.rows
            .iter()
            .find(|r| r.sub_period == sub_period)
            .and_then(|r| r.cells[col])
    }

    /// Sum over every populated cell, saturating at the decimal bounds.
    pub fn total(&self) -> Money {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter().flatten())
            .fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v))
    }

    /// Wide records: `row_name`, `label`, then one column per period.
    pub fn records(&self, row_name: &str) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = serde_json::Map::new();
                record.insert(row_name.to_string(), row.sub_period.into());
                record.insert("label".to_string(), row.label.clone().into());
                for (period, cell) in self.columns.iter().zip(row.cells.iter()) {
                    let value = match cell {
                        Some(v) => serde_json::Value::String(v.to_string()),
                        None => serde_json::Value::Null,
                    };
                    record.insert(period.to_string(), value);
                }
                record
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Build a pivot matrix. `label` names each sub-period row.
pub fn build_pivot(
    points: &[PivotPoint],
    options: &PivotOptions,
    label: impl Fn(u32) -> String,
) -> RetailMetricsResult<PivotMatrix> {
    let columns: Vec<i32> = match &options.periods {
        Some(periods) => unique_axis("periods", periods)?,
        None => points
            .iter()
            .map(|p| p.period)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let fixed_subs: Option<Vec<u32>> = options
        .sub_periods
        .as_deref()
        .map(|subs| unique_axis("sub_periods", subs))
        .transpose()?;

    let mut sums: BTreeMap<(u32, i32), Money> = BTreeMap::new();
    let mut excluded_points = 0;
    let mut excluded_total = Decimal::ZERO;
    for p in points {
        let outside_periods = options.periods.is_some() && !columns.contains(&p.period);
        let outside_subs = fixed_subs
            .as_ref()
            .is_some_and(|subs| !subs.contains(&p.sub_period));
        if outside_periods || outside_subs {
            excluded_points += 1;
            excluded_total = checked_cell(excluded_total, p.value)?;
            continue;
        }
        let cell = sums.entry((p.sub_period, p.period)).or_insert(Decimal::ZERO);
        *cell = checked_cell(*cell, p.value)?;
    }

    let sub_periods: Vec<u32> = match fixed_subs {
        Some(subs) => subs,
        None => sums
            .keys()
            .map(|(sub, _)| *sub)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let rows = sub_periods
        .iter()
        .map(|&sub| PivotRow {
            sub_period: sub,
            label: label(sub),
            cells: columns
                .iter()
                .map(|&period| sums.get(&(sub, period)).copied())
                .collect(),
        })
        .collect();

    if excluded_points > 0 {
        tracing::warn!(
            excluded_points,
            %excluded_total,
            "pivot points outside the requested periods were excluded"
        );
    }

    Ok(PivotMatrix {
        columns,
        rows,
        excluded_points,
        excluded_total,
    })
}

fn checked_cell(sum: Money, value: Money) -> RetailMetricsResult<Money> {
    sum.checked_add(value)
        .ok_or_else(|| RetailMetricsError::InvalidInput {
            field: "points".into(),
            reason: "pivot cell sum overflows the decimal range".into(),
        })
}

/// Year columns by month rows for one per-line metric.
pub fn seasonality_pivot(
    lines: &[EnrichedLine],
    metric: LineMetric,
    periods: Option<Vec<i32>>,
) -> RetailMetricsResult<PivotMatrix> {
    let points: Vec<PivotPoint> = lines
        .iter()
        .map(|l| PivotPoint {
            period: l.line.order_date.year(),
            sub_period: l.line.order_date.month(),
            value: match metric {
                LineMetric::Revenue => l.line.revenue,
                LineMetric::Cost => l.line.cost,
                LineMetric::Profit => l.line.profit,
            },
        })
        .collect();
    let options = PivotOptions {
        periods,
        sub_periods: None,
    };
    build_pivot(&points, &options, month_name)
}

/// English month name for 1..=12, the number itself otherwise.
pub fn month_name(month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| month.to_string())
}

fn unique_axis<T: Copy + Ord + std::fmt::Display>(
    field: &str,
    values: &[T],
) -> RetailMetricsResult<Vec<T>> {
    let mut seen = BTreeSet::new();
    for v in values {
        if !seen.insert(*v) {
            return Err(RetailMetricsError::InvalidInput {
                field: field.into(),
                reason: format!("{v} listed more than once"),
            });
        }
    }
    Ok(values.to_vec())
}
