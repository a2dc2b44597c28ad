//! Reference dimensions and the fact join.
//!
//! Product -> Subcategory -> Category and Customer -> State -> Country are
//! strict trees. A fact whose key has no reference row is kept under
//! [`UNKNOWN`] and reported as a warning.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::cohort::CohortAssignments;
use crate::derivation::{DerivedLine, OrderLine};
use crate::error::RetailMetricsError;
use crate::margin::{classify, MarginBand};
use crate::types::Dimension;
use crate::RetailMetricsResult;

/// Attribute value used when a foreign key has no reference row.
pub const UNKNOWN: &str = "Unknown";

// ---------------------------------------------------------------------------
// Reference rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: u64,
    pub product_name: String,
    pub subcategory: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRow {
    pub customer_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub state: String,
    pub country: String,
    /// Acquisition date; when absent the first order date is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_on: Option<NaiveDate>,
}

/// Fully materialised input tables for one computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub order_lines: Vec<OrderLine>,
    #[serde(default)]
    pub products: Vec<ProductRow>,
    #[serde(default)]
    pub customers: Vec<CustomerRow>,
}

/// Indexed product and customer hierarchies.
#[derive(Debug, Clone, Default)]
pub struct DimensionTables {
    products: HashMap<u64, ProductRow>,
    customers: HashMap<u64, CustomerRow>,
}

impl DimensionTables {
    /// Index the reference rows, checking the hierarchies are strict trees.
    pub fn new(products: &[ProductRow], customers: &[CustomerRow]) -> RetailMetricsResult<Self> {
        let mut subcategory_parent: HashMap<&str, &str> = HashMap::new();
        let mut product_index = HashMap::with_capacity(products.len());
        for p in products {
            let parent = subcategory_parent
                .entry(p.subcategory.as_str())
                .or_insert(p.category.as_str());
            if *parent != p.category {
                return Err(RetailMetricsError::ConfigurationError(format!(
                    "subcategory '{}' belongs to both '{}' and '{}'",
                    p.subcategory, parent, p.category
                )));
            }
            if let Some(prev) = product_index.insert(p.product_id, p.clone()) {
                if prev != *p {
                    return Err(RetailMetricsError::ConfigurationError(format!(
                        "product {} defined twice with different attributes",
                        p.product_id
                    )));
                }
            }
        }

        let mut state_parent: HashMap<&str, &str> = HashMap::new();
        let mut customer_index = HashMap::with_capacity(customers.len());
        for c in customers {
            let parent = state_parent
                .entry(c.state.as_str())
                .or_insert(c.country.as_str());
            if *parent != c.country {
                return Err(RetailMetricsError::ConfigurationError(format!(
                    "state '{}' belongs to both '{}' and '{}'",
                    c.state, parent, c.country
                )));
            }
            if let Some(prev) = customer_index.insert(c.customer_id, c.clone()) {
                if prev != *c {
                    return Err(RetailMetricsError::ConfigurationError(format!(
                        "customer {} defined twice with different attributes",
                        c.customer_id
                    )));
                }
            }
        }

        Ok(Self {
            products: product_index,
            customers: customer_index,
        })
    }

    pub fn product(&self, product_id: u64) -> Option<&ProductRow> {
        self.products.get(&product_id)
    }

    pub fn customer(&self, customer_id: u64) -> Option<&CustomerRow> {
        self.customers.get(&customer_id)
    }
}

// ---------------------------------------------------------------------------
// Enriched facts
// ---------------------------------------------------------------------------

/// A derived line joined with its band and dimension attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLine {
    #[serde(flatten)]
    pub line: DerivedLine,
    pub margin_band: MarginBand,
    /// `"<product_name> (<product_id>)"`, so products sharing a name stay apart.
    pub product: String,
    pub subcategory: String,
    pub category: String,
    pub state: String,
    pub country: String,
    pub cohort: String,
}

impl EnrichedLine {
    /// Value of a grouping attribute. Months are zero-padded so keys sort
    /// chronologically.
    pub fn attribute(&self, dimension: Dimension) -> String {
        let date = self.line.order_date;
        match dimension {
            Dimension::Product => self.product.clone(),
            Dimension::Subcategory => self.subcategory.clone(),
            Dimension::Category => self.category.clone(),
            Dimension::State => self.state.clone(),
            Dimension::Country => self.country.clone(),
            Dimension::Cohort => self.cohort.clone(),
            Dimension::Year => date.year().to_string(),
            Dimension::Quarter => format!("Q{}", (date.month() - 1) / 3 + 1),
            Dimension::Month => format!("{:02}", date.month()),
            Dimension::MarginBand => self.margin_band.label().to_string(),
        }
    }
}

/// Enriched lines plus one warning per unmapped key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrichment {
    pub lines: Vec<EnrichedLine>,
    pub warnings: Vec<String>,
}

/// Join derived lines with the reference tables and cohort assignments.
pub fn enrich(
    lines: &[DerivedLine],
    tables: &DimensionTables,
    cohorts: &CohortAssignments,
) -> Enrichment {
    let mut unmapped: BTreeSet<(String, String)> = BTreeSet::new();
    let mut enriched = Vec::with_capacity(lines.len());

    for line in lines {
        let (product, subcategory, category) = match tables.product(line.product_id) {
            Some(p) => (
                format!("{} ({})", p.product_name, p.product_id),
                p.subcategory.clone(),
                p.category.clone(),
            ),
            None => {
                unmapped.insert(("product".into(), line.product_id.to_string()));
                (UNKNOWN.into(), UNKNOWN.into(), UNKNOWN.into())
            }
        };
        let (state, country) = match tables.customer(line.customer_id) {
            Some(c) => (c.state.clone(), c.country.clone()),
            None => {
                unmapped.insert(("customer".into(), line.customer_id.to_string()));
                (UNKNOWN.into(), UNKNOWN.into())
            }
        };
        let cohort = cohorts
            .cohort_of(line.customer_id)
            .unwrap_or(UNKNOWN)
            .to_string();

        enriched.push(EnrichedLine {
            line: line.clone(),
            margin_band: classify(line),
            product,
            subcategory,
            category,
            state,
            country,
            cohort,
        });
    }

    let warnings: Vec<String> = unmapped
        .into_iter()
        .map(|(dimension, key)| {
            let w = RetailMetricsError::UnmappedDimension { dimension, key }.to_string();
            tracing::warn!("{w}");
            w
        })
        .collect();

    Enrichment {
        lines: enriched,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Predicate over enriched lines. All set fields must match; dates are
/// inclusive and names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
}

impl LineFilter {
    pub fn validate(&self) -> RetailMetricsResult<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(RetailMetricsError::InvalidInput {
                    field: "date_from".into(),
                    reason: format!("{from} is after date_to {to}"),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == LineFilter::default()
    }

    pub fn matches(&self, line: &EnrichedLine) -> bool {
        let eq = |want: &Option<String>, have: &str| {
            want.as_deref()
                .map_or(true, |w| w.eq_ignore_ascii_case(have))
        };
        let date = line.line.order_date;
        eq(&self.category, &line.category)
            && eq(&self.country, &line.country)
            && self.date_from.map_or(true, |from| date >= from)
            && self.date_to.map_or(true, |to| date <= to)
    }

    pub fn apply(&self, lines: Vec<EnrichedLine>) -> Vec<EnrichedLine> {
        if self.is_empty() {
            return lines;
        }
        lines.into_iter().filter(|l| self.matches(l)).collect()
    }
}
