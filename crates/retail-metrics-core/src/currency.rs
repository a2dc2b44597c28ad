//! Explicit exchange-rate conversion.
//!
//! Derivation never applies `exchange_rate`. When reporting in a converted
//! currency is wanted, run this pass over the raw lines first: prices and cost
//! are multiplied by the line's rate and the rate is reset to 1.

use rust_decimal::Decimal;

use crate::derivation::OrderLine;
use crate::error::RetailMetricsError;
use crate::RetailMetricsResult;

pub fn convert_line(line: &OrderLine) -> RetailMetricsResult<OrderLine> {
    let malformed = |reason: String| RetailMetricsError::MalformedLine {
        order_id: line.order_id,
        line_no: line.line_no,
        reason,
    };
    let rate = line.exchange_rate;
    if rate <= Decimal::ZERO {
        return Err(malformed(format!("exchange_rate must be positive, got {rate}")));
    }
    let convert = |field: &str, value: Option<Decimal>| {
        value
            .map(|v| {
                v.checked_mul(rate)
                    .ok_or_else(|| malformed(format!("{field} * exchange_rate overflows")))
            })
            .transpose()
    };
    Ok(OrderLine {
        unit_price: convert("unit_price", line.unit_price)?,
        net_price: convert("net_price", line.net_price)?,
        unit_cost: convert("unit_cost", line.unit_cost)?,
        exchange_rate: Decimal::ONE,
        ..line.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::derive_line;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn line(rate: Decimal) -> OrderLine {
        OrderLine {
            order_id: 9,
            line_no: 1,
            product_id: 2,
            customer_id: 3,
            order_date: NaiveDate::from_ymd_opt(2022, 7, 1).unwrap(),
            quantity: 3,
            unit_price: Some(dec!(12.00)),
            net_price: Some(dec!(10.00)),
            unit_cost: Some(dec!(4.00)),
            exchange_rate: rate,
        }
    }

    #[test]
    fn test_converted_line_derives_in_target_currency() {
        let converted = convert_line(&line(dec!(0.9))).unwrap();
        assert_eq!(converted.exchange_rate, Decimal::ONE);
        let d = derive_line(&converted).unwrap();
        assert_eq!(d.revenue, dec!(27.00));
        assert_eq!(d.cost, dec!(10.80));
        assert_eq!(d.profit, dec!(16.20));
    }

    #[test]
    fn test_null_prices_stay_null() {
        let mut src = line(dec!(1.1));
        src.net_price = None;
        let converted = convert_line(&src).unwrap();
        assert_eq!(converted.net_price, None);
        assert!(derive_line(&converted).is_err());
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        assert!(convert_line(&line(Decimal::ZERO)).is_err());
        assert!(convert_line(&line(dec!(-1))).is_err());
    }

    #[test]
    fn test_overflowing_conversion_rejected() {
        let mut src = line(dec!(1000000000000000000000));
        src.unit_cost = Some(dec!(100000000000));
        let err = convert_line(&src).unwrap_err();
        assert!(matches!(err, RetailMetricsError::MalformedLine { order_id: 9, .. }));
    }
}
