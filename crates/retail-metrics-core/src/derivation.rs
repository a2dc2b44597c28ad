//! Financial Line Deriver.
//!
//! revenue = net_price * quantity, cost = unit_cost * quantity, each rounded
//! to 2 dp half away from zero; profit = revenue - cost on the rounded values.
//! The exchange rate is carried through unconverted (see [`crate::currency`]).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::RetailMetricsError;
use crate::types::{round_money, Money, Rate};
use crate::RetailMetricsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_exchange_rate() -> Decimal {
    Decimal::ONE
}

/// Raw fact row as produced by the source system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: u64,
    pub line_no: u32,
    pub product_id: u64,
    pub customer_id: u64,
    pub order_date: NaiveDate,
    pub quantity: i64,
    pub unit_price: Option<Money>,
    pub net_price: Option<Money>,
    pub unit_cost: Option<Money>,
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: Decimal,
}

/// Identity of a fact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub order_id: u64,
    pub line_no: u32,
}

/// An order line with its derived financials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedLine {
    pub order_id: u64,
    pub line_no: u32,
    pub product_id: u64,
    pub customer_id: u64,
    pub order_date: NaiveDate,
    pub quantity: i64,
    pub unit_price: Money,
    pub net_price: Money,
    pub unit_cost: Money,
    pub exchange_rate: Decimal,
    pub revenue: Money,
    pub cost: Money,
    pub profit: Money,
}

impl DerivedLine {
    pub fn key(&self) -> LineKey {
        LineKey {
            order_id: self.order_id,
            line_no: self.line_no,
        }
    }

    /// profit / revenue, or `None` when there is no revenue. A quotient too
    /// large for `Decimal` saturates with the sign of the profit.
    pub fn margin_ratio(&self) -> Option<Rate> {
        if self.revenue.is_zero() {
            return None;
        }
        Some(self.profit.checked_div(self.revenue).unwrap_or(
            if self.profit < Decimal::ZERO {
                Decimal::MIN
            } else {
                Decimal::MAX
            },
        ))
    }
}

/// A line the deriver refused, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedLine {
    pub order_id: u64,
    pub line_no: u32,
    pub reason: String,
}

/// Result of deriving a batch of order lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivationBatch {
    pub lines: Vec<DerivedLine>,
    pub rejected: Vec<RejectedLine>,
    pub duplicates_skipped: usize,
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive revenue, cost and profit for a single order line.
pub fn derive_line(line: &OrderLine) -> RetailMetricsResult<DerivedLine> {
    let malformed = |reason: String| RetailMetricsError::MalformedLine {
        order_id: line.order_id,
        line_no: line.line_no,
        reason,
    };

    if line.quantity < 0 {
        return Err(malformed(format!(
            "quantity must not be negative, got {}",
            line.quantity
        )));
    }
    let unit_price = line
        .unit_price
        .ok_or_else(|| malformed("unit_price is null".into()))?;
    let net_price = line
        .net_price
        .ok_or_else(|| malformed("net_price is null".into()))?;
    let unit_cost = line
        .unit_cost
        .ok_or_else(|| malformed("unit_cost is null".into()))?;
    if net_price < Decimal::ZERO {
        return Err(malformed(format!(
            "net_price must not be negative, got {net_price}"
        )));
    }
    if unit_cost < Decimal::ZERO {
        return Err(malformed(format!(
            "unit_cost must not be negative, got {unit_cost}"
        )));
    }

    let quantity = Decimal::from(line.quantity);
    let revenue = net_price
        .checked_mul(quantity)
        .map(round_money)
        .ok_or_else(|| malformed("net_price * quantity overflows".into()))?;
    let cost = unit_cost
        .checked_mul(quantity)
        .map(round_money)
        .ok_or_else(|| malformed("unit_cost * quantity overflows".into()))?;
    let profit = revenue
        .checked_sub(cost)
        .ok_or_else(|| malformed("revenue - cost overflows".into()))?;

    Ok(DerivedLine {
        order_id: line.order_id,
        line_no: line.line_no,
        product_id: line.product_id,
        customer_id: line.customer_id,
        order_date: line.order_date,
        quantity: line.quantity,
        unit_price,
        net_price,
        unit_cost,
        exchange_rate: line.exchange_rate,
        revenue,
        cost,
        profit,
    })
}

/// Memoised derivations for the duration of one pipeline run, keyed by
/// (order_id, line_no).
#[derive(Debug, Default)]
pub struct DerivationCache {
    entries: HashMap<LineKey, (OrderLine, DerivedLine)>,
    hits: usize,
}

impl DerivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a line, reusing the cached value for a key already seen.
    ///
    /// A repeated key whose source row differs from the cached one is a
    /// duplicate fact and is rejected.
    pub fn derive(&mut self, line: &OrderLine) -> RetailMetricsResult<DerivedLine> {
        let key = LineKey {
            order_id: line.order_id,
            line_no: line.line_no,
        };
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                let (source, derived) = entry.get();
                if source != line {
                    return Err(RetailMetricsError::MalformedLine {
                        order_id: line.order_id,
                        line_no: line.line_no,
                        reason: "duplicate (order_id, line_no) with conflicting values".into(),
                    });
                }
                self.hits += 1;
                Ok(derived.clone())
            }
            Entry::Vacant(slot) => {
                let derived = derive_line(line)?;
                slot.insert((line.clone(), derived.clone()));
                Ok(derived)
            }
        }
    }

    pub fn get(&self, key: &LineKey) -> Option<&DerivedLine> {
        self.entries.get(key).map(|(_, derived)| derived)
    }

    pub fn contains(&self, key: &LineKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Derive every line of a batch through `cache`.
///
/// With `fail_on_malformed` the first bad line aborts the batch; otherwise bad
/// lines are collected in `rejected` and the rest proceed. Exact duplicates of
/// an already-derived line are emitted once.
pub fn derive_batch(
    lines: &[OrderLine],
    cache: &mut DerivationCache,
    fail_on_malformed: bool,
) -> RetailMetricsResult<DerivationBatch> {
    let mut batch = DerivationBatch::default();

    for line in lines {
        let key = LineKey {
            order_id: line.order_id,
            line_no: line.line_no,
        };
        let seen = cache.contains(&key);
        match cache.derive(line) {
            Ok(_) if seen => batch.duplicates_skipped += 1,
            Ok(derived) => batch.lines.push(derived),
            Err(e) if fail_on_malformed => return Err(e),
            Err(e) => {
                tracing::warn!(
                    order_id = line.order_id,
                    line_no = line.line_no,
                    "rejected order line: {e}"
                );
                batch.rejected.push(RejectedLine {
                    order_id: line.order_id,
                    line_no: line.line_no,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        derived = batch.lines.len(),
        rejected = batch.rejected.len(),
        duplicates = batch.duplicates_skipped,
        "derived order lines"
    );

    Ok(batch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
