use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use retail_metrics_core::cohort::{CohortSegmenter, YearRange, UNBUCKETED};
use retail_metrics_core::derivation::{derive_batch, derive_line, DerivationCache, OrderLine};
use retail_metrics_core::margin::{band_for_ratio, classify, MarginBand};
use retail_metrics_core::RetailMetricsError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn order(order_id: u64, net_price: Decimal, quantity: i64, unit_cost: Decimal) -> OrderLine {
    OrderLine {
        order_id,
        line_no: 1,
        product_id: 1,
        customer_id: 1,
        order_date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
        quantity,
        unit_price: Some(net_price),
        net_price: Some(net_price),
        unit_cost: Some(unit_cost),
        exchange_rate: Decimal::ONE,
    }
}

// ===========================================================================
// Line derivation
// ===========================================================================

#[test]
fn test_reference_lines() {
    let a = derive_line(&order(1, dec!(100), 2, dec!(30))).unwrap();
    let b = derive_line(&order(2, dec!(50), 1, dec!(45))).unwrap();

    assert_eq!((a.revenue, a.cost, a.profit), (dec!(200), dec!(60), dec!(140)));
    assert_eq!((b.revenue, b.cost, b.profit), (dec!(50), dec!(45), dec!(5)));
    assert_eq!(classify(&a), MarginBand::From65To75);
    assert_eq!(classify(&b), MarginBand::Below25);
    assert_eq!(a.revenue + b.revenue, dec!(250));
    assert_eq!(a.profit + b.profit, dec!(145));
}

#[test]
fn test_rounding_half_away_from_zero_per_component() {
    // 3 x 1.005 = 3.015 -> 3.02; 3 x 0.335 = 1.005 -> 1.01
    let d = derive_line(&order(1, dec!(1.005), 3, dec!(0.335))).unwrap();
    assert_eq!(d.revenue, dec!(3.02));
    assert_eq!(d.cost, dec!(1.01));
    assert_eq!(d.profit, dec!(2.01));
    assert_eq!(d.revenue - d.cost, d.profit);
}

#[test]
fn test_rederivation_is_identical() {
    let line = order(7, dec!(19.99), 4, dec!(7.25));
    assert_eq!(derive_line(&line).unwrap(), derive_line(&line).unwrap());
}

#[test]
fn test_negative_margin_lands_below_25() {
    let d = derive_line(&order(1, dec!(10), 1, dec!(12))).unwrap();
    assert_eq!(d.profit, dec!(-2));
    assert_eq!(classify(&d), MarginBand::Below25);
}

#[test]
fn test_malformed_lines() {
    let mut null_price = order(1, dec!(10), 1, dec!(4));
    null_price.net_price = None;
    let err = derive_line(&null_price).unwrap_err();
    assert!(matches!(err, RetailMetricsError::MalformedLine { order_id: 1, .. }));

    assert!(derive_line(&order(2, dec!(10), -1, dec!(4))).is_err());
    assert!(derive_line(&order(3, dec!(-10), 1, dec!(4))).is_err());
}

#[test]
fn test_batch_cache_serves_duplicates() {
    let lines = vec![
        order(1, dec!(10), 1, dec!(4)),
        order(1, dec!(10), 1, dec!(4)),
        order(2, dec!(10), 1, dec!(4)),
    ];
    let mut cache = DerivationCache::new();
    let batch = derive_batch(&lines, &mut cache, false).unwrap();
    assert_eq!(batch.lines.len(), 2);
    assert_eq!(batch.duplicates_skipped, 1);
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.len(), 2);
}

// ===========================================================================
// Bands and cohorts
// ===========================================================================

#[test]
fn test_shared_edges_go_to_lower_band() {
    assert_eq!(band_for_ratio(Some(dec!(0.25))), MarginBand::From25To35);
    assert_eq!(band_for_ratio(Some(dec!(0.35))), MarginBand::From25To35);
    assert_eq!(band_for_ratio(Some(dec!(0.75))), MarginBand::From65To75);
    assert_eq!(band_for_ratio(Some(dec!(0.7501))), MarginBand::Above75);
    assert_eq!(band_for_ratio(None), MarginBand::NoRevenue);
}

#[test]
fn test_reference_cohort_buckets() {
    let seg =
        CohortSegmenter::new(vec![YearRange::new(1980, 1985), YearRange::new(1986, 1990)]).unwrap();
    assert_eq!(seg.label_for_year(Some(1985)), "1980-1985");
    assert_eq!(seg.label_for_year(Some(1979)), UNBUCKETED);
    assert_eq!(seg.label_for_year(None), UNBUCKETED);
}

#[test]
fn test_gapped_cohorts_rejected() {
    let err = CohortSegmenter::new(vec![YearRange::new(1980, 1984), YearRange::new(1986, 1990)])
        .unwrap_err();
    assert!(matches!(err, RetailMetricsError::ConfigurationError(_)));
}
