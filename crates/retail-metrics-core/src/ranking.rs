//! Top-N Ranker.
//!
//! Ranks aggregate rows within partitions (e.g. categories within a cohort)
//! by one metric, descending. How ties are handled is an explicit choice:
//!
//! - [`TiePolicy::AllTied`]: competitive ranking (1, 1, 3); every row whose
//!   rank is within N is returned, so a tie at the cut-off returns all tied rows.
//! - [`TiePolicy::SecondaryKey`]: row numbering ordered by metric descending
//!   then item key ascending; exactly N rows per partition.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::aggregation::AggregateRow;
use crate::error::RetailMetricsError;
use crate::types::{Dimension, Metric};
use crate::RetailMetricsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    #[default]
    AllTied,
    SecondaryKey,
}

impl FromStr for TiePolicy {
    type Err = RetailMetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all_tied" | "all" => Ok(TiePolicy::AllTied),
            "secondary_key" | "key" => Ok(TiePolicy::SecondaryKey),
            other => Err(RetailMetricsError::ConfigurationError(format!(
                "Unknown tie policy: {other}"
            ))),
        }
    }
}

/// A ranked aggregate row. Serializes as `rank` followed by the row's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub rank: usize,
    pub row: AggregateRow,
}

impl Serialize for RankedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.dimensions.len() + 7))?;
        map.serialize_entry("rank", &self.rank)?;
        self.row.write_fields(&mut map)?;
        map.end()
    }
}

/// Validated ranking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopNRanker {
    partition_by: Vec<Dimension>,
    metric: Metric,
    top_n: usize,
    tie_policy: TiePolicy,
}

impl TopNRanker {
    /// Build a ranker. An empty or unknown metric name, or `top_n == 0`, is a
    /// configuration error.
    pub fn new(
        partition_by: Vec<Dimension>,
        metric: &str,
        top_n: usize,
        tie_policy: TiePolicy,
    ) -> RetailMetricsResult<Self> {
        let metric = Metric::from_str(metric)?;
        Self::with_metric(partition_by, metric, top_n, tie_policy)
    }

    pub fn with_metric(
        partition_by: Vec<Dimension>,
        metric: Metric,
        top_n: usize,
        tie_policy: TiePolicy,
    ) -> RetailMetricsResult<Self> {
        if top_n == 0 {
            return Err(RetailMetricsError::ConfigurationError(
                "top_n must be at least 1".into(),
            ));
        }
        Ok(Self {
            partition_by,
            metric,
            top_n,
            tie_policy,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn tie_policy(&self) -> TiePolicy {
        self.tie_policy
    }

    /// Rank `rows` within each partition. Output is ordered by partition key,
    /// then rank, then item key.
    pub fn rank(&self, rows: &[AggregateRow]) -> RetailMetricsResult<Vec<RankedRow>> {
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };

        let partition_idx: Vec<usize> = self
            .partition_by
            .iter()
            .map(|d| {
                first.dimensions.iter().position(|x| x == d).ok_or_else(|| {
                    RetailMetricsError::ConfigurationError(format!(
                        "partition dimension '{d}' is not part of the aggregated key"
                    ))
                })
            })
            .collect::<RetailMetricsResult<_>>()?;
        if rows.iter().any(|r| r.dimensions != first.dimensions) {
            return Err(RetailMetricsError::InvalidInput {
                field: "rows".into(),
                reason: "rows to rank must share the same grouping dimensions".into(),
            });
        }

        let item_key = |row: &AggregateRow| -> Vec<String> {
            row.key
                .iter()
                .enumerate()
                .filter(|(i, _)| !partition_idx.contains(i))
                .map(|(_, v)| v.clone())
                .collect()
        };

        let mut partitions: BTreeMap<Vec<String>, Vec<&AggregateRow>> = BTreeMap::new();
        for row in rows {
            let key = partition_idx.iter().map(|&i| row.key[i].clone()).collect();
            partitions.entry(key).or_default().push(row);
        }

        let mut ranked = Vec::new();
        for (_, mut members) in partitions {
            members.sort_by(|a, b| {
                b.metric(self.metric)
                    .cmp(&a.metric(self.metric))
                    .then_with(|| item_key(a).cmp(&item_key(b)))
            });

            let mut rank = 0;
            let mut prev = None;
            for (i, row) in members.into_iter().enumerate() {
                let value = row.metric(self.metric);
                rank = match self.tie_policy {
                    TiePolicy::SecondaryKey => i + 1,
                    TiePolicy::AllTied if prev == Some(value) => rank,
                    TiePolicy::AllTied => i + 1,
                };
                if rank > self.top_n {
                    break;
                }
                prev = Some(value);
                ranked.push(RankedRow {
                    rank,
                    row: row.clone(),
                });
            }
        }

        tracing::debug!(
            rows = rows.len(),
            selected = ranked.len(),
            metric = %self.metric,
            "ranked aggregate rows"
        );

        Ok(ranked)
    }
}
