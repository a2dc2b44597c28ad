//! End-to-end profitability run.
//!
//! raw facts -> currency pass (opt-in) -> derivation (cached per run) ->
//! cohort segmentation -> enrichment -> filter -> aggregation / ranking / pivot.
//! Configuration problems surface from [`Pipeline::new`]; conflicting reference
//! tables are reported by [`Pipeline::prepare`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::aggregation::{aggregate, AggregateRow, SortSpec};
use crate::cohort::{cohort_totals, CohortAssignments, CohortSegmenter, YearRange};
use crate::currency::convert_line;
use crate::derivation::{derive_batch, DerivationCache, OrderLine, RejectedLine};
use crate::dimensions::{enrich, Dataset, DimensionTables, EnrichedLine, LineFilter};
use crate::error::RetailMetricsError;
use crate::margin::MarginBand;
use crate::pivot::{seasonality_pivot, LineMetric, PivotMatrix};
use crate::ranking::{RankedRow, TiePolicy, TopNRanker};
use crate::types::{with_metadata, ComputationOutput, Dimension, Metric};
use crate::RetailMetricsResult;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Metric name, e.g. "total_revenue".
    pub metric: String,
    pub top_n: usize,
    pub tie_policy: TiePolicy,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            metric: Metric::TotalRevenue.as_str().to_string(),
            top_n: 1,
            tie_policy: TiePolicy::AllTied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cohort_ranges: Vec<YearRange>,
    /// Apply `exchange_rate` to prices before derivation.
    pub convert_currency: bool,
    /// Abort on the first malformed line instead of reporting it.
    pub fail_on_malformed: bool,
    pub filter: LineFilter,
    /// Order of the aggregate tables in the report.
    pub sort: SortSpec,
    /// Leader selection for categories within each cohort and month.
    pub ranking: RankingConfig,
    /// How many states to report, ranked by distinct customers.
    pub top_states: usize,
    pub pivot_metric: LineMetric,
    /// Fixed year columns for the seasonality pivot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pivot_periods: Option<Vec<i32>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cohort_ranges: CohortSegmenter::default_ranges(),
            convert_currency: false,
            fail_on_malformed: false,
            filter: LineFilter::default(),
            sort: SortSpec::default(),
            ranking: RankingConfig::default(),
            top_states: 4,
            pivot_metric: LineMetric::Profit,
            pivot_periods: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub lines_derived: usize,
    pub lines_analysed: usize,
    pub duplicates_skipped: usize,
    pub rejected: Vec<RejectedLine>,
    pub totals: Option<AggregateRow>,
    pub margin_bands: Vec<AggregateRow>,
    pub by_category: Vec<AggregateRow>,
    pub by_subcategory: Vec<AggregateRow>,
    pub by_country: Vec<AggregateRow>,
    pub by_state: Vec<AggregateRow>,
    pub top_states: Vec<RankedRow>,
    pub cohort_sizes: BTreeMap<String, usize>,
    pub cohort_totals: Vec<AggregateRow>,
    pub top_category_per_cohort: Vec<RankedRow>,
    pub top_category_per_month: Vec<RankedRow>,
    pub seasonality: PivotMatrix,
}

/// Analysis-ready lines for one dataset, before any aggregation.
#[derive(Debug, Clone)]
pub struct PreparedLines {
    /// Enriched lines that passed the filter.
    pub lines: Vec<EnrichedLine>,
    pub lines_derived: usize,
    pub duplicates_skipped: usize,
    pub rejected: Vec<RejectedLine>,
    pub cohorts: CohortAssignments,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    segmenter: CohortSegmenter,
    cohort_ranker: TopNRanker,
    month_ranker: TopNRanker,
    state_ranker: TopNRanker,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> RetailMetricsResult<Self> {
        config
            .filter
            .validate()
            .map_err(|e| RetailMetricsError::ConfigurationError(e.to_string()))?;

        if let Some(periods) = &config.pivot_periods {
            let unique: BTreeSet<i32> = periods.iter().copied().collect();
            if unique.len() != periods.len() {
                return Err(RetailMetricsError::ConfigurationError(
                    "pivot_periods contains duplicate years".into(),
                ));
            }
        }

        let segmenter = CohortSegmenter::new(config.cohort_ranges.clone())?;
        let ranking = &config.ranking;
        let cohort_ranker = TopNRanker::new(
            vec![Dimension::Cohort],
            &ranking.metric,
            ranking.top_n,
            ranking.tie_policy,
        )?;
        let month_ranker = TopNRanker::new(
            vec![Dimension::Year, Dimension::Month],
            &ranking.metric,
            ranking.top_n,
            ranking.tie_policy,
        )?;
        let state_ranker = TopNRanker::with_metric(
            vec![],
            Metric::CustomerCount,
            config.top_states,
            ranking.tie_policy,
        )?;

        Ok(Self {
            config,
            segmenter,
            cohort_ranker,
            month_ranker,
            state_ranker,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn segmenter(&self) -> &CohortSegmenter {
        &self.segmenter
    }

    /// Derive, segment, enrich and filter the dataset's order lines.
    pub fn prepare(&self, dataset: &Dataset) -> RetailMetricsResult<PreparedLines> {
        let cfg = &self.config;
        let mut warnings: Vec<String> = Vec::new();

        let tables = DimensionTables::new(&dataset.products, &dataset.customers)?;

        // --- Currency pass ---
        let mut rejected: Vec<RejectedLine> = Vec::new();
        let converted: Vec<OrderLine>;
        let source: &[OrderLine] = if cfg.convert_currency {
            let mut out = Vec::with_capacity(dataset.order_lines.len());
            for line in &dataset.order_lines {
                match convert_line(line) {
                    Ok(c) => out.push(c),
                    Err(e) if cfg.fail_on_malformed => return Err(e),
                    Err(e) => rejected.push(RejectedLine {
                        order_id: line.order_id,
                        line_no: line.line_no,
                        reason: e.to_string(),
                    }),
                }
            }
            converted = out;
            &converted
        } else {
            &dataset.order_lines
        };

        // --- Derivation ---
        let mut cache = DerivationCache::new();
        let batch = derive_batch(source, &mut cache, cfg.fail_on_malformed)?;
        rejected.extend(batch.rejected);
        if !rejected.is_empty() {
            warnings.push(format!("{} order lines rejected as malformed", rejected.len()));
        }
        if batch.duplicates_skipped > 0 {
            warnings.push(format!(
                "{} duplicate order lines ignored",
                batch.duplicates_skipped
            ));
        }

        // --- Segmentation + enrichment ---
        let cohorts = self.segmenter.segment(&dataset.customers, &batch.lines);
        let enrichment = enrich(&batch.lines, &tables, &cohorts);
        warnings.extend(enrichment.warnings);
        let lines = cfg.filter.apply(enrichment.lines);

        tracing::info!(
            derived = batch.lines.len(),
            analysed = lines.len(),
            rejected = rejected.len(),
            "pipeline inputs prepared"
        );

        Ok(PreparedLines {
            lines,
            lines_derived: batch.lines.len(),
            duplicates_skipped: batch.duplicates_skipped,
            rejected,
            cohorts,
            warnings,
        })
    }

    pub fn run(&self, dataset: &Dataset) -> RetailMetricsResult<ComputationOutput<PipelineReport>> {
        let start = Instant::now();
        let cfg = &self.config;

        let PreparedLines {
            lines,
            lines_derived,
            duplicates_skipped,
            rejected,
            cohorts,
            mut warnings,
        } = self.prepare(dataset)?;

        // --- Aggregation ---
        let sort = &cfg.sort;
        let totals = aggregate(&lines, &[], sort)?.into_iter().next();
        let mut margin_bands = aggregate(&lines, &[Dimension::MarginBand], sort)?;
        margin_bands
            .sort_by_key(|r| r.value(Dimension::MarginBand).and_then(MarginBand::from_label));
        let by_category = aggregate(&lines, &[Dimension::Category], sort)?;
        let by_subcategory =
            aggregate(&lines, &[Dimension::Category, Dimension::Subcategory], sort)?;
        let by_country = aggregate(&lines, &[Dimension::Country], sort)?;
        let by_state = aggregate(&lines, &[Dimension::Country, Dimension::State], sort)?;

        // --- Ranking ---
        let state_rows = aggregate(&lines, &[Dimension::State], sort)?;
        let top_states = self.state_ranker.rank(&state_rows)?;

        let cohort_rows = cohort_totals(&lines, &[], sort)?;
        let cohort_category = cohort_totals(&lines, &[Dimension::Category], sort)?;
        let top_category_per_cohort = self.cohort_ranker.rank(&cohort_category)?;

        let month_category = aggregate(
            &lines,
            &[Dimension::Year, Dimension::Month, Dimension::Category],
            sort,
        )?;
        let top_category_per_month = self.month_ranker.rank(&month_category)?;

        // --- Seasonality ---
        let seasonality = seasonality_pivot(&lines, cfg.pivot_metric, cfg.pivot_periods.clone())?;
        if seasonality.excluded_points > 0 {
            warnings.push(format!(
                "{} lines outside pivot_periods excluded from seasonality ({} total)",
                seasonality.excluded_points, seasonality.excluded_total
            ));
        }

        let report = PipelineReport {
            lines_derived,
            lines_analysed: lines.len(),
            duplicates_skipped,
            rejected,
            totals,
            margin_bands,
            by_category,
            by_subcategory,
            by_country,
            by_state,
            top_states,
            cohort_sizes: cohorts.cohort_sizes(),
            cohort_totals: cohort_rows,
            top_category_per_cohort,
            top_category_per_month,
            seasonality,
        };

        let elapsed = start.elapsed().as_micros() as u64;

        Ok(with_metadata(
            "Per-line derivation, margin banding, hierarchical roll-up, cohort ranking, seasonality pivot",
            cfg,
            warnings,
            elapsed,
            report,
        ))
    }
}
