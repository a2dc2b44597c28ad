//! Cohort Segmenter.
//!
//! Customers are bucketed by acquisition year into closed-closed year ranges.
//! The ranges must be contiguous and non-overlapping; anything outside them is
//! assigned the [`UNBUCKETED`] sentinel rather than dropped.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::aggregation::{aggregate, AggregateRow, SortSpec};
use crate::derivation::DerivedLine;
use crate::dimensions::{CustomerRow, EnrichedLine};
use crate::error::RetailMetricsError;
use crate::types::Dimension;
use crate::RetailMetricsResult;

/// Cohort label for acquisition years outside every configured range.
pub const UNBUCKETED: &str = "unbucketed";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Closed-closed range of acquisition years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Where a customer's acquisition year came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSource {
    /// The customer record carries an acquisition date.
    Recorded,
    /// Taken from the customer's earliest order line.
    FirstOrder,
    /// Neither was available.
    Missing,
}

/// One customer's cohort assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortMembership {
    pub customer_id: u64,
    pub acquisition_year: Option<i32>,
    pub source: AcquisitionSource,
    pub cohort: String,
}

/// customer_id -> cohort for every customer handed to the segmenter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortAssignments {
    pub members: BTreeMap<u64, CohortMembership>,
}

impl CohortAssignments {
    pub fn cohort_of(&self, customer_id: u64) -> Option<&str> {
        self.members.get(&customer_id).map(|m| m.cohort.as_str())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of customers per cohort label.
    pub fn cohort_sizes(&self) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for m in self.members.values() {
            *sizes.entry(m.cohort.clone()).or_insert(0) += 1;
        }
        sizes
    }
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

/// Validated set of cohort ranges, sorted by start year.
#[derive(Debug, Clone)]
pub struct CohortSegmenter {
    ranges: Vec<YearRange>,
}

impl CohortSegmenter {
    /// Build a segmenter, rejecting empty, inverted, overlapping or gapped
    /// range sets.
    pub fn new(ranges: Vec<YearRange>) -> RetailMetricsResult<Self> {
        if ranges.is_empty() {
            return Err(RetailMetricsError::ConfigurationError(
                "at least one cohort year range is required".into(),
            ));
        }
        for r in &ranges {
            if r.start > r.end {
                return Err(RetailMetricsError::ConfigurationError(format!(
                    "cohort range {r} starts after it ends"
                )));
            }
        }

        let mut ranges = ranges;
        ranges.sort_by_key(|r| r.start);

        for pair in ranges.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.start <= prev.end {
                return Err(RetailMetricsError::ConfigurationError(format!(
                    "cohort ranges {prev} and {next} overlap"
                )));
            }
            if prev.end.checked_add(1).is_some_and(|after| next.start > after) {
                return Err(RetailMetricsError::ConfigurationError(format!(
                    "gap between cohort ranges {prev} and {next}"
                )));
            }
        }

        Ok(Self { ranges })
    }

    /// 1980-1985 followed by five-year ranges up to 2016-2020.
    pub fn default_ranges() -> Vec<YearRange> {
        let mut ranges = vec![YearRange::new(1980, 1985)];
        let mut start = 1986;
        while start <= 2016 {
            ranges.push(YearRange::new(start, start + 4));
            start += 5;
        }
        ranges
    }

    pub fn ranges(&self) -> &[YearRange] {
        &self.ranges
    }

    /// The range containing `year`, if any.
    pub fn range_for_year(&self, year: i32) -> Option<YearRange> {
        self.ranges.iter().copied().find(|r| r.contains(year))
    }

    /// Cohort label for an acquisition year.
    pub fn label_for_year(&self, year: Option<i32>) -> String {
        year.and_then(|y| self.range_for_year(y))
            .map(|r| r.label())
            .unwrap_or_else(|| UNBUCKETED.to_string())
    }

    /// Assign every customer to exactly one cohort.
    ///
    /// Customers without a recorded acquisition date fall back to the year of
    /// their earliest order line in `lines`.
    pub fn segment(&self, customers: &[CustomerRow], lines: &[DerivedLine]) -> CohortAssignments {
        let mut first_order: HashMap<u64, i32> = HashMap::new();
        for line in lines {
            let year = line.order_date.year();
            first_order
                .entry(line.customer_id)
                .and_modify(|y| *y = (*y).min(year))
                .or_insert(year);
        }

        let mut assignments = CohortAssignments::default();
        for customer in customers {
            let (acquisition_year, source) = match customer.acquired_on {
                Some(date) => (Some(date.year()), AcquisitionSource::Recorded),
                None => match first_order.get(&customer.customer_id) {
                    Some(&year) => (Some(year), AcquisitionSource::FirstOrder),
                    None => (None, AcquisitionSource::Missing),
                },
            };
            let cohort = self.label_for_year(acquisition_year);
            assignments.members.insert(
                customer.customer_id,
                CohortMembership {
                    customer_id: customer.customer_id,
                    acquisition_year,
                    source,
                    cohort,
                },
            );
        }

        tracing::debug!(
            customers = assignments.len(),
            cohorts = self.ranges.len(),
            "segmented customers into cohorts"
        );

        assignments
    }
}

/// Per-cohort totals, optionally broken down further by `extra` dimensions.
pub fn cohort_totals(
    lines: &[EnrichedLine],
    extra: &[Dimension],
    sort: &SortSpec,
) -> RetailMetricsResult<Vec<AggregateRow>> {
    let mut group_by = vec![Dimension::Cohort];
    group_by.extend(extra.iter().copied().filter(|d| *d != Dimension::Cohort));
    aggregate(lines, &group_by, sort)
}
