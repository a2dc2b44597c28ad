//! Hierarchical Aggregator.
//!
//! Rolls derived metrics up by any combination of dimensions. `avg_margin` is
//! the mean of per-line profit/revenue ratios, not total_profit / total_revenue.
//! Partial aggregates carry the ratio sum and count so they can be reduced per
//! partition and merged in any order.

use rust_decimal::Decimal;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::derivation::DerivedLine;
use crate::dimensions::EnrichedLine;
use crate::error::RetailMetricsError;
use crate::types::{round_ratio, Dimension, Metric, Money, Rate};
use crate::RetailMetricsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One aggregated group. Serializes as a flat record: one column per grouping
/// dimension followed by the metric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub dimensions: Vec<Dimension>,
    pub key: Vec<String>,
    pub total_revenue: Money,
    pub total_cost: Money,
    pub total_profit: Money,
    pub avg_margin: Option<Rate>,
    pub item_count: usize,
    pub customer_count: usize,
}

impl AggregateRow {
    /// Key value for one of the row's grouping dimensions.
    pub fn value(&self, dimension: Dimension) -> Option<&str> {
        self.dimensions
            .iter()
            .position(|d| *d == dimension)
            .map(|i| self.key[i].as_str())
    }

    /// Metric value; `None` only for `avg_margin` of a group without revenue.
    pub fn metric(&self, metric: Metric) -> Option<Decimal> {
        match metric {
            Metric::TotalRevenue => Some(self.total_revenue),
            Metric::TotalCost => Some(self.total_cost),
            Metric::TotalProfit => Some(self.total_profit),
            Metric::AvgMargin => self.avg_margin,
            Metric::ItemCount => Some(Decimal::from(self.item_count as u64)),
            Metric::CustomerCount => Some(Decimal::from(self.customer_count as u64)),
        }
    }

    pub(crate) fn write_fields<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        for (dimension, value) in self.dimensions.iter().zip(self.key.iter()) {
            map.serialize_entry(dimension.as_str(), value)?;
        }
        map.serialize_entry("total_revenue", &self.total_revenue)?;
        map.serialize_entry("total_cost", &self.total_cost)?;
        map.serialize_entry("total_profit", &self.total_profit)?;
        map.serialize_entry("avg_margin", &self.avg_margin)?;
        map.serialize_entry("item_count", &self.item_count)?;
        map.serialize_entry("customer_count", &self.customer_count)?;
        Ok(())
    }
}

impl Serialize for AggregateRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dimensions.len() + 6))?;
        self.write_fields(&mut map)?;
        map.end()
    }
}

/// Presentation order for aggregate rows. Ties fall back to key ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub metric: Metric,
    #[serde(default = "default_descending")]
    pub descending: bool,
}

fn default_descending() -> bool {
    true
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            metric: Metric::TotalProfit,
            descending: true,
        }
    }
}

impl SortSpec {
    pub fn descending(metric: Metric) -> Self {
        Self {
            metric,
            descending: true,
        }
    }
}

/// Running totals for one group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    revenue: Money,
    cost: Money,
    profit: Money,
    ratio_sum: Decimal,
    ratio_count: usize,
    item_count: usize,
    customers: BTreeSet<u64>,
}

impl Accumulator {
    pub fn add(&mut self, line: &DerivedLine) -> RetailMetricsResult<()> {
        self.revenue = checked_total("total_revenue", self.revenue, line.revenue)?;
        self.cost = checked_total("total_cost", self.cost, line.cost)?;
        self.profit = checked_total("total_profit", self.profit, line.profit)?;
        if let Some(ratio) = line.margin_ratio() {
            self.ratio_sum = self.ratio_sum.saturating_add(ratio);
            self.ratio_count += 1;
        }
        self.item_count += 1;
        self.customers.insert(line.customer_id);
        Ok(())
    }

    pub fn merge(&mut self, other: Accumulator) -> RetailMetricsResult<()> {
        self.revenue = checked_total("total_revenue", self.revenue, other.revenue)?;
        self.cost = checked_total("total_cost", self.cost, other.cost)?;
        self.profit = checked_total("total_profit", self.profit, other.profit)?;
        self.ratio_sum = self.ratio_sum.saturating_add(other.ratio_sum);
        self.ratio_count += other.ratio_count;
        self.item_count += other.item_count;
        self.customers.extend(other.customers);
        Ok(())
    }

    pub fn finish(self, dimensions: Vec<Dimension>, key: Vec<String>) -> AggregateRow {
        let avg_margin = if self.ratio_count == 0 {
            None
        } else {
            Some(round_ratio(
                self.ratio_sum / Decimal::from(self.ratio_count as u64),
            ))
        };
        AggregateRow {
            dimensions,
            key,
            total_revenue: self.revenue,
            total_cost: self.cost,
            total_profit: self.profit,
            avg_margin,
            item_count: self.item_count,
            customer_count: self.customers.len(),
        }
    }
}

fn checked_total(field: &str, total: Money, value: Money) -> RetailMetricsResult<Money> {
    total
        .checked_add(value)
        .ok_or_else(|| RetailMetricsError::InvalidInput {
            field: field.into(),
            reason: "sum overflows the decimal range".into(),
        })
}

/// Un-finalised aggregation over one partition of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialAggregate {
    group_by: Vec<Dimension>,
    groups: BTreeMap<Vec<String>, Accumulator>,
}

impl PartialAggregate {
    pub fn new(group_by: &[Dimension]) -> RetailMetricsResult<Self> {
        validate_group_by(group_by)?;
        Ok(Self {
            group_by: group_by.to_vec(),
            groups: BTreeMap::new(),
        })
    }

    pub fn add(&mut self, line: &EnrichedLine) -> RetailMetricsResult<()> {
        let key: Vec<String> = self.group_by.iter().map(|d| line.attribute(*d)).collect();
        self.groups.entry(key).or_default().add(&line.line)
    }

    pub fn extend<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a EnrichedLine>,
    ) -> RetailMetricsResult<()> {
        for line in lines {
            self.add(line)?;
        }
        Ok(())
    }

    /// Combine with a partial built over a disjoint set of lines.
    pub fn merge(mut self, other: PartialAggregate) -> RetailMetricsResult<Self> {
        if self.group_by != other.group_by {
            return Err(RetailMetricsError::InvalidInput {
                field: "group_by".into(),
                reason: "cannot merge partial aggregates with different grouping keys".into(),
            });
        }
        for (key, acc) in other.groups {
            self.groups.entry(key).or_default().merge(acc)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn finish(self, sort: &SortSpec) -> Vec<AggregateRow> {
        let group_by = self.group_by;
        let mut rows: Vec<AggregateRow> = self
            .groups
            .into_iter()
            .map(|(key, acc)| acc.finish(group_by.clone(), key))
            .collect();
        sort_rows(&mut rows, sort);
        rows
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Aggregate `lines` by `group_by`. An empty grouping yields a single grand
/// total row (or none for empty input).
pub fn aggregate(
    lines: &[EnrichedLine],
    group_by: &[Dimension],
    sort: &SortSpec,
) -> RetailMetricsResult<Vec<AggregateRow>> {
    let mut partial = PartialAggregate::new(group_by)?;
    partial.extend(lines)?;
    tracing::debug!(
        lines = lines.len(),
        groups = partial.len(),
        group_by = ?group_by,
        "aggregated lines"
    );
    Ok(partial.finish(sort))
}

/// Aggregate each partition independently, then merge.
pub fn aggregate_partitioned(
    partitions: &[&[EnrichedLine]],
    group_by: &[Dimension],
    sort: &SortSpec,
) -> RetailMetricsResult<Vec<AggregateRow>> {
    let mut merged = PartialAggregate::new(group_by)?;
    for part in partitions {
        let mut partial = PartialAggregate::new(group_by)?;
        partial.extend(part.iter())?;
        merged = merged.merge(partial)?;
    }
    Ok(merged.finish(sort))
}

/// Sort by the requested metric, then by key ascending. A missing
/// `avg_margin` orders below every value.
pub fn sort_rows(rows: &mut [AggregateRow], sort: &SortSpec) {
    rows.sort_by(|a, b| {
        let by_metric = a.metric(sort.metric).cmp(&b.metric(sort.metric));
        let by_metric = if sort.descending {
            by_metric.reverse()
        } else {
            by_metric
        };
        by_metric.then_with(|| a.key.cmp(&b.key))
    });
}

fn validate_group_by(group_by: &[Dimension]) -> RetailMetricsResult<()> {
    let mut seen = BTreeSet::new();
    for d in group_by {
        if !seen.insert(*d) {
            return Err(RetailMetricsError::InvalidInput {
                field: "group_by".into(),
                reason: format!("dimension '{d}' listed twice"),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
