use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use retail_metrics_core::cohort::UNBUCKETED;
use retail_metrics_core::derivation::OrderLine;
use retail_metrics_core::dimensions::{CustomerRow, Dataset, LineFilter, ProductRow};
use retail_metrics_core::margin::MarginBand;
use retail_metrics_core::pipeline::{Pipeline, PipelineConfig, RankingConfig};
use retail_metrics_core::ranking::TiePolicy;
use retail_metrics_core::{Dimension, RetailMetricsError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn line(
    order_id: u64,
    product_id: u64,
    customer_id: u64,
    order_date: NaiveDate,
    quantity: i64,
    net_price: Decimal,
    unit_cost: Option<Decimal>,
) -> OrderLine {
    OrderLine {
        order_id,
        line_no: 1,
        product_id,
        customer_id,
        order_date,
        quantity,
        unit_price: Some(net_price),
        net_price: Some(net_price),
        unit_cost,
        exchange_rate: Decimal::ONE,
    }
}

/// Three customers: one acquired in 1984, one with no acquisition date whose
/// first order is in 2018, one acquired before every cohort range.
fn sample_dataset() -> Dataset {
    let products = vec![
        ProductRow {
            product_id: 1,
            product_name: "Laptop A".into(),
            subcategory: "Laptops".into(),
            category: "Computers".into(),
        },
        ProductRow {
            product_id: 2,
            product_name: "Desktop B".into(),
            subcategory: "Desktops".into(),
            category: "Computers".into(),
        },
        ProductRow {
            product_id: 3,
            product_name: "Speaker C".into(),
            subcategory: "Speakers".into(),
            category: "Audio".into(),
        },
    ];
    let customers = vec![
        CustomerRow {
            customer_id: 10,
            name: Some("Ann".into()),
            state: "Ohio".into(),
            country: "United States".into(),
            acquired_on: Some(date(1984, 6, 1)),
        },
        CustomerRow {
            customer_id: 11,
            name: None,
            state: "Georgia".into(),
            country: "United States".into(),
            acquired_on: None,
        },
        CustomerRow {
            customer_id: 12,
            name: None,
            state: "Bavaria".into(),
            country: "Germany".into(),
            acquired_on: Some(date(1975, 1, 1)),
        },
    ];
    let order_lines = vec![
        line(1, 1, 10, date(2019, 3, 5), 2, dec!(100), Some(dec!(30))),
        line(2, 2, 10, date(2019, 3, 20), 1, dec!(50), Some(dec!(45))),
        line(3, 3, 11, date(2018, 7, 1), 5, dec!(20), Some(dec!(8))),
        line(4, 1, 12, date(2020, 1, 15), 1, dec!(70), Some(dec!(35))),
        line(5, 3, 11, date(2019, 3, 2), 0, dec!(20), Some(dec!(8))),
        line(6, 2, 10, date(2019, 4, 1), 1, dec!(50), None),
        // exact re-delivery of order 1
        line(1, 1, 10, date(2019, 3, 5), 2, dec!(100), Some(dec!(30))),
    ];
    Dataset {
        order_lines,
        products,
        customers,
    }
}

fn run(config: PipelineConfig) -> retail_metrics_core::ComputationOutput<
    retail_metrics_core::pipeline::PipelineReport,
> {
    Pipeline::new(config).unwrap().run(&sample_dataset()).unwrap()
}

// ===========================================================================
// End-to-end
// ===========================================================================

#[test]
fn test_pipeline_totals() {
    let output = run(PipelineConfig::default());
    let report = &output.result;

    assert_eq!(report.lines_derived, 5);
    assert_eq!(report.lines_analysed, 5);
    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].order_id, 6);

    let totals = report.totals.as_ref().unwrap();
    assert_eq!(totals.total_revenue, dec!(420));
    assert_eq!(totals.total_cost, dec!(180));
    assert_eq!(totals.total_profit, dec!(240));
    // mean of 0.7, 0.1, 0.6, 0.5; the zero-quantity line has no ratio
    assert_eq!(totals.avg_margin, Some(dec!(0.475)));
    assert_eq!(totals.item_count, 5);
    assert_eq!(totals.customer_count, 3);

    assert_eq!(output.warnings.len(), 2);
}

#[test]
fn test_margin_bands_in_band_order() {
    let report = run(PipelineConfig::default()).result;
    let labels: Vec<&str> = report
        .margin_bands
        .iter()
        .map(|r| r.value(Dimension::MarginBand).unwrap())
        .collect();
    assert_eq!(
        labels,
        vec!["No Revenue", "< 25%", "45%-55%", "55%-65%", "65%-75%"]
    );
    let no_revenue = &report.margin_bands[0];
    assert_eq!(no_revenue.total_revenue, Decimal::ZERO);
    assert_eq!(no_revenue.avg_margin, None);
    assert_eq!(
        MarginBand::from_label(labels[1]),
        Some(MarginBand::Below25)
    );
}

#[test]
fn test_hierarchy_rolls_up() {
    let report = run(PipelineConfig::default()).result;
    let computers = report
        .by_category
        .iter()
        .find(|r| r.value(Dimension::Category) == Some("Computers"))
        .unwrap();
    assert_eq!(computers.total_revenue, dec!(320));

    let sub_revenue: Decimal = report
        .by_subcategory
        .iter()
        .filter(|r| r.value(Dimension::Category) == Some("Computers"))
        .map(|r| r.total_revenue)
        .sum();
    assert_eq!(sub_revenue, computers.total_revenue);

    let country_profit: Decimal = report.by_country.iter().map(|r| r.total_profit).sum();
    let state_profit: Decimal = report.by_state.iter().map(|r| r.total_profit).sum();
    assert_eq!(country_profit, dec!(240));
    assert_eq!(state_profit, dec!(240));
}

// ===========================================================================
// Cohorts
// ===========================================================================

#[test]
fn test_cohort_membership_and_fallbacks() {
    let report = run(PipelineConfig::default()).result;
    assert_eq!(report.cohort_sizes.get("1980-1985"), Some(&1));
    // no acquisition date: first order in 2018
    assert_eq!(report.cohort_sizes.get("2016-2020"), Some(&1));
    assert_eq!(report.cohort_sizes.get(UNBUCKETED), Some(&1));
    let members: usize = report.cohort_sizes.values().sum();
    assert_eq!(members, 3);
}

#[test]
fn test_unbucketed_customers_still_in_totals() {
    let report = run(PipelineConfig::default()).result;
    let unbucketed = report
        .cohort_totals
        .iter()
        .find(|r| r.value(Dimension::Cohort) == Some(UNBUCKETED))
        .unwrap();
    assert_eq!(unbucketed.total_revenue, dec!(70));

    let cohort_revenue: Decimal = report.cohort_totals.iter().map(|r| r.total_revenue).sum();
    assert_eq!(cohort_revenue, report.totals.as_ref().unwrap().total_revenue);
}

#[test]
fn test_top_category_per_cohort() {
    let report = run(PipelineConfig::default()).result;
    let leaders: Vec<(&str, &str)> = report
        .top_category_per_cohort
        .iter()
        .map(|r| {
            (
                r.row.value(Dimension::Cohort).unwrap(),
                r.row.value(Dimension::Category).unwrap(),
            )
        })
        .collect();
    assert_eq!(
        leaders,
        vec![
            ("1980-1985", "Computers"),
            ("2016-2020", "Audio"),
            (UNBUCKETED, "Computers"),
        ]
    );
}

#[test]
fn test_top_states_ties_follow_policy() {
    let all_tied = run(PipelineConfig {
        top_states: 2,
        ..Default::default()
    })
    .result;
    // every state has one customer, so all three share rank 1
    assert_eq!(all_tied.top_states.len(), 3);
    assert!(all_tied.top_states.iter().all(|r| r.rank == 1));

    let by_key = run(PipelineConfig {
        top_states: 2,
        ranking: RankingConfig {
            tie_policy: TiePolicy::SecondaryKey,
            ..Default::default()
        },
        ..Default::default()
    })
    .result;
    let states: Vec<&str> = by_key
        .top_states
        .iter()
        .map(|r| r.row.value(Dimension::State).unwrap())
        .collect();
    assert_eq!(states, vec!["Bavaria", "Georgia"]);
}

// ===========================================================================
// Seasonality
// ===========================================================================

#[test]
fn test_seasonality_preserves_total_profit() {
    let report = run(PipelineConfig::default()).result;
    let pivot = &report.seasonality;
    assert_eq!(pivot.columns, vec![2018, 2019, 2020]);
    assert_eq!(pivot.cell(2019, 3), Some(dec!(145)));
    assert_eq!(pivot.cell(2018, 3), None);
    assert_eq!(pivot.total(), report.totals.as_ref().unwrap().total_profit);
}

#[test]
fn test_seasonality_with_fixed_periods_reports_exclusions() {
    let output = run(PipelineConfig {
        pivot_periods: Some(vec![2019, 2020]),
        ..Default::default()
    });
    let pivot = &output.result.seasonality;
    assert_eq!(pivot.columns, vec![2019, 2020]);
    assert_eq!(pivot.excluded_points, 1);
    assert_eq!(pivot.excluded_total, dec!(60));
    assert_eq!(pivot.total() + pivot.excluded_total, dec!(240));
    assert_eq!(output.warnings.len(), 3);
}

// ===========================================================================
// Filters and failure modes
// ===========================================================================

#[test]
fn test_country_filter_narrows_analysis() {
    let report = run(PipelineConfig {
        filter: LineFilter {
            country: Some("germany".into()),
            ..Default::default()
        },
        ..Default::default()
    })
    .result;
    assert_eq!(report.lines_derived, 5);
    assert_eq!(report.lines_analysed, 1);
    assert_eq!(report.totals.unwrap().total_profit, dec!(35));
}

#[test]
fn test_fail_on_malformed_aborts_run() {
    let pipeline = Pipeline::new(PipelineConfig {
        fail_on_malformed: true,
        ..Default::default()
    })
    .unwrap();
    let err = pipeline.run(&sample_dataset()).unwrap_err();
    match err {
        RetailMetricsError::MalformedLine { order_id, .. } => assert_eq!(order_id, 6),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_conflicting_duplicate_rejected() {
    let mut dataset = sample_dataset();
    dataset
        .order_lines
        .push(line(2, 2, 10, date(2019, 3, 20), 3, dec!(50), Some(dec!(45))));
    let report = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&dataset)
        .unwrap()
        .result;
    assert_eq!(report.lines_derived, 5);
    assert_eq!(report.rejected.len(), 2);
}

#[test]
fn test_currency_pass_is_opt_in() {
    let mut dataset = sample_dataset();
    for l in &mut dataset.order_lines {
        l.exchange_rate = dec!(2);
    }
    let plain = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&dataset)
        .unwrap()
        .result;
    assert_eq!(plain.totals.unwrap().total_revenue, dec!(420));

    let converted = Pipeline::new(PipelineConfig {
        convert_currency: true,
        ..Default::default()
    })
    .unwrap()
    .run(&dataset)
    .unwrap()
    .result;
    let totals = converted.totals.unwrap();
    assert_eq!(totals.total_revenue, dec!(840));
    // ratios are unchanged by a uniform rate
    assert_eq!(totals.avg_margin, Some(dec!(0.475)));
}

#[test]
fn test_unmapped_product_reported_not_dropped() {
    let mut dataset = sample_dataset();
    dataset
        .order_lines
        .push(line(7, 99, 10, date(2019, 5, 1), 1, dec!(10), Some(dec!(4))));
    let output = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&dataset)
        .unwrap();
    let unknown = output
        .result
        .by_category
        .iter()
        .find(|r| r.value(Dimension::Category) == Some("Unknown"))
        .unwrap();
    assert_eq!(unknown.total_revenue, dec!(10));
    assert!(output.warnings.iter().any(|w| w.contains("99")));
}

#[test]
fn test_report_serializes() {
    let output = run(PipelineConfig::default());
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["result"]["lines_derived"], 5);
    assert_eq!(json["result"]["margin_bands"][0]["margin_band"], "No Revenue");
    assert_eq!(json["metadata"]["precision"], "rust_decimal_128bit");
}
