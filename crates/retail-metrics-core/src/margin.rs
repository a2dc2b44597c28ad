//! Margin Classifier.
//!
//! Bands over the profit / revenue ratio. A ratio sitting exactly on an edge
//! shared by two bands belongs to the lower band (0.35 is "25%-35%").

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::derivation::DerivedLine;

/// Margin bands in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarginBand {
    #[serde(rename = "No Revenue")]
    NoRevenue,
    #[serde(rename = "< 25%")]
    Below25,
    #[serde(rename = "25%-35%")]
    From25To35,
    #[serde(rename = "35%-45%")]
    From35To45,
    #[serde(rename = "45%-55%")]
    From45To55,
    #[serde(rename = "55%-65%")]
    From55To65,
    #[serde(rename = "65%-75%")]
    From65To75,
    #[serde(rename = "> 75%")]
    Above75,
}

/// Upper (inclusive) edge of each bounded band, in order.
const BAND_CEILINGS: [(Decimal, MarginBand); 6] = [
    (dec!(0.35), MarginBand::From25To35),
    (dec!(0.45), MarginBand::From35To45),
    (dec!(0.55), MarginBand::From45To55),
    (dec!(0.65), MarginBand::From55To65),
    (dec!(0.75), MarginBand::From65To75),
    (Decimal::MAX, MarginBand::Above75),
];

const LOWEST_BOUNDED_FLOOR: Decimal = dec!(0.25);

impl MarginBand {
    pub const ALL: [MarginBand; 8] = [
        MarginBand::NoRevenue,
        MarginBand::Below25,
        MarginBand::From25To35,
        MarginBand::From35To45,
        MarginBand::From45To55,
        MarginBand::From55To65,
        MarginBand::From65To75,
        MarginBand::Above75,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MarginBand::NoRevenue => "No Revenue",
            MarginBand::Below25 => "< 25%",
            MarginBand::From25To35 => "25%-35%",
            MarginBand::From35To45 => "35%-45%",
            MarginBand::From45To55 => "45%-55%",
            MarginBand::From55To65 => "55%-65%",
            MarginBand::From65To75 => "65%-75%",
            MarginBand::Above75 => "> 75%",
        }
    }

    pub fn from_label(label: &str) -> Option<MarginBand> {
        MarginBand::ALL.iter().copied().find(|b| b.label() == label)
    }
}

impl fmt::Display for MarginBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Band for a ratio. `None` means the line had no revenue.
pub fn band_for_ratio(ratio: Option<Decimal>) -> MarginBand {
    let Some(ratio) = ratio else {
        return MarginBand::NoRevenue;
    };
    if ratio < LOWEST_BOUNDED_FLOOR {
        return MarginBand::Below25;
    }
    BAND_CEILINGS
        .iter()
        .find(|(ceiling, _)| ratio <= *ceiling)
        .map(|(_, band)| *band)
        .unwrap_or(MarginBand::Above75)
}

/// Classify a derived line. The revenue = 0 check runs before any division;
/// an overflowing loss ratio lands in "< 25%".
pub fn classify(line: &DerivedLine) -> MarginBand {
    band_for_ratio(line.margin_ratio())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{derive_line, OrderLine};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn derived(net_price: Decimal, quantity: i64, unit_cost: Decimal) -> DerivedLine {
        derive_line(&OrderLine {
            order_id: 1,
            line_no: 0,
            product_id: 1,
            customer_id: 1,
            order_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            quantity,
            unit_price: Some(net_price),
            net_price: Some(net_price),
            unit_cost: Some(unit_cost),
            exchange_rate: Decimal::ONE,
        })
        .unwrap()
    }

    #[test]
    fn test_reference_bands() {
        assert_eq!(classify(&derived(dec!(100), 2, dec!(30))), MarginBand::From65To75);
        assert_eq!(classify(&derived(dec!(50), 1, dec!(45))), MarginBand::Below25);
    }

    #[test]
    fn test_no_revenue_first() {
        assert_eq!(classify(&derived(dec!(0), 3, dec!(5))), MarginBand::NoRevenue);
        assert_eq!(classify(&derived(dec!(10), 0, dec!(5))), MarginBand::NoRevenue);
    }

    #[test]
    fn test_boundaries_belong_to_lower_band() {
        assert_eq!(band_for_ratio(Some(dec!(0.25))), MarginBand::From25To35);
        assert_eq!(band_for_ratio(Some(dec!(0.35))), MarginBand::From25To35);
        assert_eq!(band_for_ratio(Some(dec!(0.45))), MarginBand::From35To45);
        assert_eq!(band_for_ratio(Some(dec!(0.55))), MarginBand::From45To55);
        assert_eq!(band_for_ratio(Some(dec!(0.65))), MarginBand::From55To65);
        assert_eq!(band_for_ratio(Some(dec!(0.75))), MarginBand::From65To75);
    }

    #[test]
    fn test_just_above_boundaries() {
        assert_eq!(band_for_ratio(Some(dec!(0.3501))), MarginBand::From35To45);
        assert_eq!(band_for_ratio(Some(dec!(0.7501))), MarginBand::Above75);
        assert_eq!(band_for_ratio(Some(dec!(0.2499))), MarginBand::Below25);
    }

    #[test]
    fn test_negative_margin_is_below_25() {
        assert_eq!(classify(&derived(dec!(10), 1, dec!(15))), MarginBand::Below25);
    }

    #[test]
    fn test_overflowing_loss_is_below_25() {
        let line = derived(dec!(0.01), 1, dec!(70000000000000000000000000000));
        assert_eq!(classify(&line), MarginBand::Below25);
    }

    /// Independent statement of the band table with lower-band edge ownership.
    fn band_contains(band: MarginBand, r: Decimal) -> bool {
        match band {
            MarginBand::NoRevenue => false,
            MarginBand::Below25 => r < dec!(0.25),
            MarginBand::From25To35 => r >= dec!(0.25) && r <= dec!(0.35),
            MarginBand::From35To45 => r > dec!(0.35) && r <= dec!(0.45),
            MarginBand::From45To55 => r > dec!(0.45) && r <= dec!(0.55),
            MarginBand::From55To65 => r > dec!(0.55) && r <= dec!(0.65),
            MarginBand::From65To75 => r > dec!(0.65) && r <= dec!(0.75),
            MarginBand::Above75 => r > dec!(0.75),
        }
    }

    #[test]
    fn test_exactly_one_band_over_sweep() {
        let mut ratio = dec!(-0.50);
        while ratio <= dec!(1.20) {
            let owners: Vec<MarginBand> = MarginBand::ALL
                .iter()
                .copied()
                .filter(|b| band_contains(*b, ratio))
                .collect();
            assert_eq!(owners, vec![band_for_ratio(Some(ratio))], "ratio {ratio}");
            ratio += dec!(0.005);
        }
    }

    #[test]
    fn test_from_label() {
        assert_eq!(MarginBand::from_label("> 75%"), Some(MarginBand::Above75));
        assert_eq!(MarginBand::from_label("80%"), None);
    }

    #[test]
    fn test_band_serializes_as_label() {
        let json = serde_json::to_string(&MarginBand::From25To35).unwrap();
        assert_eq!(json, "\"25%-35%\"");
    }
}
