//! Stateless analysis engine plus the chainable [`DataAnalyzer`] wrapper.
//!
//! Filtering, summary statistics, grouped aggregation and trend analysis.
//! Like the cleaning engine, every function here leaves its input frame
//! untouched and returns fresh data.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;

use super::types::{
    AggFunc, AnalysisReport, FilterValue, Metric, SummaryStats, TrendAnalysis, TrendDirection,
    TrendMetrics, TrendSummary,
};
use crate::error::{Result, VitalsError};

/// Keep rows where `column` equals the scalar or belongs to the set.
/// Row order is preserved.
pub fn filter_by_value(df: &DataFrame, column: &str, value: &FilterValue) -> Result<DataFrame> {
    let predicate = match value {
        FilterValue::One(scalar) => col(column).eq(scalar.to_lit()),
        FilterValue::Many(values) => {
            let members = FilterValue::member_series(values)?;
            col(column).is_in(lit(members))
        }
    };
    Ok(df.clone().lazy().filter(predicate).collect()?)
}

fn datetime_expr(column: &str, dtype: &DataType) -> Expr {
    if dtype.is_temporal() {
        col(column)
    } else if matches!(dtype, DataType::String) {
        // Non-strict parse with format inference: unparsable values become
        // null and drop out of any comparison.
        col(column).str().to_datetime(
            Some(TimeUnit::Milliseconds),
            None,
            StrptimeOptions {
                strict: false,
                ..Default::default()
            },
            lit("raise"),
        )
    } else {
        col(column).cast(DataType::Datetime(TimeUnit::Milliseconds, None))
    }
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    date.and_time(last)
}

/// Keep rows whose date falls within the inclusive `[start, end]` range.
/// A non-datetime column is converted to datetime dtype first, and the
/// returned frame keeps the converted column.
pub fn filter_by_date_range(
    df: &DataFrame,
    column: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DataFrame> {
    let dtype = df.column(column)?.dtype().clone();

    let mut lf = df
        .clone()
        .lazy()
        .with_column(datetime_expr(column, &dtype).alias(column));
    if let Some(start) = start {
        lf = lf.filter(col(column).gt_eq(lit(start.and_time(NaiveTime::MIN))));
    }
    if let Some(end) = end {
        lf = lf.filter(col(column).lt_eq(lit(end_of_day(end))));
    }
    Ok(lf.collect()?)
}

/// Keep rows whose numeric value lies within the inclusive range. Rows with
/// null in `column` never match.
pub fn filter_by_numeric_range(
    df: &DataFrame,
    column: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<DataFrame> {
    let mut lf = df.clone().lazy();
    if let Some(lo) = min {
        lf = lf.filter(col(column).gt_eq(lit(lo)));
    }
    if let Some(hi) = max {
        lf = lf.filter(col(column).lt_eq(lit(hi)));
    }
    Ok(lf.collect()?)
}

/// Apply several column predicates in order, AND-ed together.
pub fn filter_by_predicates(
    df: &DataFrame,
    predicates: &[(String, FilterValue)],
) -> Result<DataFrame> {
    let mut current = df.clone();
    for (column, value) in predicates {
        current = filter_by_value(&current, column, value)?;
    }
    Ok(current)
}

/// Summary statistics for one numeric column.
///
/// `count` is the non-null count. On an empty or all-null column every
/// other metric comes back as NaN. A non-numeric column is an
/// `InvalidArgument` error.
pub fn summary_stats(
    df: &DataFrame,
    column: &str,
    metrics: Option<&[Metric]>,
) -> Result<SummaryStats> {
    let series = df.column(column)?.as_materialized_series();
    if !series.dtype().is_primitive_numeric() {
        return Err(VitalsError::InvalidArgument(format!(
            "column '{column}' is not numeric (dtype {})",
            series.dtype()
        )));
    }

    let floats = series.cast(&DataType::Float64)?;
    let ca = floats.f64()?;
    let count = (ca.len() - ca.null_count()) as f64;

    let metrics = metrics.unwrap_or(&Metric::ALL);
    let mut stats = SummaryStats::new();
    for metric in metrics {
        let value = if count == 0.0 && *metric != Metric::Count {
            f64::NAN
        } else {
            match metric {
                Metric::Mean => ca.mean().unwrap_or(f64::NAN),
                Metric::Median => ca.median().unwrap_or(f64::NAN),
                Metric::Min => ca.min().unwrap_or(f64::NAN),
                Metric::Max => ca.max().unwrap_or(f64::NAN),
                Metric::Sum => ca.sum().unwrap_or(f64::NAN),
                Metric::Count => count,
                Metric::Std => ca.std(1).unwrap_or(f64::NAN),
            }
        };
        stats.insert(*metric, value);
    }
    Ok(stats)
}

/// Names of all numeric columns, in schema order.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| c.dtype().is_primitive_numeric())
        .map(|c| c.name().to_string())
        .collect()
}

/// Summary statistics for several columns at once. Defaults to every
/// numeric column when `columns` is `None` and to all metrics when
/// `metrics` is `None`.
pub fn column_statistics(
    df: &DataFrame,
    columns: Option<&[String]>,
    metrics: Option<&[Metric]>,
) -> Result<BTreeMap<String, SummaryStats>> {
    let targets: Vec<String> = match columns {
        Some(cols) => cols.to_vec(),
        None => numeric_columns(df),
    };

    let mut out = BTreeMap::new();
    for column in targets {
        let stats = summary_stats(df, &column, metrics)?;
        out.insert(column, stats);
    }
    Ok(out)
}

/// Group by one or more key columns and aggregate `agg_column`.
///
/// A single function keeps the aggregated column's name; several functions
/// produce `{column}_{func}` columns. The result is sorted by `sort_by`
/// when given, otherwise by the group keys ascending, so output order is
/// deterministic.
pub fn group_and_aggregate(
    df: &DataFrame,
    group_by: &[String],
    agg_column: &str,
    agg_funcs: &[AggFunc],
    sort_by: Option<&str>,
    ascending: bool,
) -> Result<DataFrame> {
    if group_by.is_empty() {
        return Err(VitalsError::InvalidArgument(
            "group_and_aggregate needs at least one group column".to_owned(),
        ));
    }
    if agg_funcs.is_empty() {
        return Err(VitalsError::InvalidArgument(
            "group_and_aggregate needs at least one aggregation function".to_owned(),
        ));
    }

    let keys: Vec<Expr> = group_by.iter().map(|c| col(c.as_str())).collect();
    let aggs: Vec<Expr> = if agg_funcs.len() == 1 {
        vec![agg_funcs[0].apply(col(agg_column)).alias(agg_column)]
    } else {
        agg_funcs
            .iter()
            .map(|f| {
                f.apply(col(agg_column))
                    .alias(format!("{agg_column}_{}", f.as_str()))
            })
            .collect()
    };

    let grouped = df.clone().lazy().group_by(keys).agg(aggs);
    let sorted = match sort_by {
        Some(column) => grouped.sort_by_exprs(
            vec![col(column)],
            SortMultipleOptions::default().with_order_descending(!ascending),
        ),
        None => {
            let by: Vec<Expr> = group_by.iter().map(|c| col(c.as_str())).collect();
            grouped.sort_by_exprs(by, SortMultipleOptions::default())
        }
    };
    Ok(sorted.collect()?)
}

fn sorted_values(df: &DataFrame, date_column: &str, value_column: &str) -> Result<Vec<f64>> {
    let dtype = df.column(date_column)?.dtype().clone();
    let sorted = df
        .clone()
        .lazy()
        .with_column(datetime_expr(date_column, &dtype).alias("__sort_key"))
        .sort_by_exprs(vec![col("__sort_key")], SortMultipleOptions::default())
        .select([col("*").exclude(["__sort_key"])])
        .collect()?;

    let floats = sorted
        .column(value_column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_iter().flatten().collect())
}

/// First-to-last trend over the series sorted by `date_column`.
pub fn trend(df: &DataFrame, date_column: &str, value_column: &str) -> Result<TrendSummary> {
    let values = sorted_values(df, date_column, value_column)?;
    let (Some(first), Some(last)) = (values.first(), values.last()) else {
        return Err(VitalsError::Validation(format!(
            "column '{value_column}' has no values to analyse"
        )));
    };

    let total_change = last - first;
    let percent_change = if *first == 0.0 {
        0.0
    } else {
        total_change / first * 100.0
    };
    let average_change = if values.len() > 1 {
        total_change / (values.len() - 1) as f64
    } else {
        0.0
    };

    Ok(TrendSummary {
        start_value: *first,
        end_value: *last,
        total_change,
        percent_change,
        average_change,
        period_count: values.len(),
    })
}

fn trend_metrics(df: &DataFrame, date_column: &str, value_column: &str) -> Result<TrendMetrics> {
    let values = sorted_values(df, date_column, value_column)?;
    let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
        return Err(VitalsError::Validation(format!(
            "column '{value_column}' has no values to analyse"
        )));
    };

    let total: f64 = values.iter().sum();
    let average = total / values.len() as f64;
    let growth_rate = if first == 0.0 {
        0.0
    } else {
        (last - first) / first * 100.0
    };

    Ok(TrendMetrics {
        total,
        average,
        growth_rate,
        direction: TrendDirection::from_growth_rate(growth_rate),
        first_value: first,
        last_value: last,
    })
}

fn group_keys(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let series = df.column(column)?.as_materialized_series().clone();
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for row in 0..series.len() {
        let av = series.get(row)?;
        if matches!(av, AnyValue::Null) {
            continue;
        }
        let key = av.to_string();
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    Ok(keys)
}

fn group_mask(df: &DataFrame, column: &str, key: &str) -> Result<BooleanChunked> {
    let series = df.column(column)?.as_materialized_series().clone();
    let mut mask = Vec::with_capacity(series.len());
    for row in 0..series.len() {
        let av = series.get(row)?;
        mask.push(!matches!(av, AnyValue::Null) && av.to_string() == key);
    }
    Ok(BooleanChunked::from_slice(
        PlSmallStr::from_static("group"),
        &mask,
    ))
}

/// Trend metrics over the whole frame, or one set per distinct value of
/// `group_by`. Group keys are reported as strings.
pub fn analyze_trends(
    df: &DataFrame,
    date_column: &str,
    value_column: &str,
    group_by: Option<&str>,
) -> Result<TrendAnalysis> {
    match group_by {
        None => Ok(TrendAnalysis::Overall(trend_metrics(
            df,
            date_column,
            value_column,
        )?)),
        Some(group_column) => {
            let mut by_group = BTreeMap::new();
            for key in group_keys(df, group_column)? {
                let mask = group_mask(df, group_column, &key)?;
                let subset = df.filter(&mask)?;
                by_group.insert(key, trend_metrics(&subset, date_column, value_column)?);
            }
            Ok(TrendAnalysis::ByGroup(by_group))
        }
    }
}

/// Append a `growth_rate` column: percent change of `value_column` over
/// `periods` rows. The first `periods` rows are null.
pub fn growth_rate(df: &DataFrame, value_column: &str, periods: usize) -> Result<DataFrame> {
    if periods == 0 {
        return Err(VitalsError::InvalidArgument(
            "growth_rate periods must be at least 1".to_owned(),
        ));
    }
    let expr = (col(value_column).pct_change(lit(periods as i64)) * lit(100.0))
        .alias("growth_rate");
    Ok(df.clone().lazy().with_column(expr).collect()?)
}

/// Append a rolling mean of `column` over `window` rows. Rows before the
/// window fills are null. The output column defaults to `{column}_ma_{window}`.
pub fn moving_average(
    df: &DataFrame,
    column: &str,
    window: usize,
    output: Option<&str>,
) -> Result<DataFrame> {
    if window == 0 {
        return Err(VitalsError::InvalidArgument(
            "moving_average window must be at least 1".to_owned(),
        ));
    }
    let name = output
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{column}_ma_{window}"));
    let expr = col(column)
        .rolling_mean(RollingOptionsFixedWindow {
            window_size: window,
            min_periods: window,
            weights: None,
            center: false,
            fn_params: None,
        })
        .alias(name);
    Ok(df.clone().lazy().with_column(expr).collect()?)
}

/// Chainable analysis pipeline over an owned working copy.
///
/// Filters narrow the working frame in place; `group_by` only stages key
/// columns, and the following `aggregate` call consumes them. Calling
/// `aggregate` without a staged grouping is an `InvalidState` error.
#[derive(Debug, Clone)]
pub struct DataAnalyzer {
    original: DataFrame,
    current: DataFrame,
    pending_group: Option<Vec<String>>,
    operations: Vec<String>,
}

impl DataAnalyzer {
    pub fn new(df: DataFrame) -> Self {
        Self {
            original: df.clone(),
            current: df,
            pending_group: None,
            operations: Vec::new(),
        }
    }

    pub fn filter_by(mut self, column: &str, value: FilterValue) -> Result<Self> {
        self.current = filter_by_value(&self.current, column, &value)?;
        self.operations
            .push(format!("filter_by('{column}', {value:?})"));
        Ok(self)
    }

    pub fn filter_by_date(
        mut self,
        column: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self> {
        self.current = filter_by_date_range(&self.current, column, start, end)?;
        self.operations
            .push(format!("filter_by_date('{column}', {start:?}..{end:?})"));
        Ok(self)
    }

    pub fn filter_numeric_range(
        mut self,
        column: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Self> {
        self.current = filter_by_numeric_range(&self.current, column, min, max)?;
        self.operations
            .push(format!("filter_numeric_range('{column}', {min:?}..{max:?})"));
        Ok(self)
    }

    pub fn filter_by_conditions(mut self, predicates: &[(String, FilterValue)]) -> Result<Self> {
        self.current = filter_by_predicates(&self.current, predicates)?;
        self.operations
            .push(format!("filter_by_conditions({} predicates)", predicates.len()));
        Ok(self)
    }

    /// Stage group keys for the next `aggregate` call. Does not touch the
    /// working frame.
    pub fn group_by(mut self, columns: Vec<String>) -> Self {
        self.operations.push(format!("group_by({columns:?})"));
        self.pending_group = Some(columns);
        self
    }

    /// Aggregate the staged grouping. The grouped frame becomes the new
    /// working frame and the staged keys are cleared.
    pub fn aggregate(mut self, column: &str, funcs: &[AggFunc]) -> Result<Self> {
        let keys = self.pending_group.take().ok_or_else(|| {
            VitalsError::InvalidState("aggregate() requires a preceding group_by()".to_owned())
        })?;
        self.current = group_and_aggregate(&self.current, &keys, column, funcs, None, true)?;
        self.operations
            .push(format!("aggregate('{column}', {funcs:?})"));
        Ok(self)
    }

    pub fn moving_average(mut self, column: &str, window: usize) -> Result<Self> {
        self.current = moving_average(&self.current, column, window, None)?;
        self.operations
            .push(format!("moving_average('{column}', window={window})"));
        Ok(self)
    }

    /// Defensive copy of the working frame.
    pub fn data(&self) -> DataFrame {
        self.current.clone()
    }

    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Summary statistics over the working frame for the given columns,
    /// optionally restricted to a subset of metrics.
    pub fn summary(
        &self,
        columns: Option<&[String]>,
        metrics: Option<&[Metric]>,
    ) -> Result<BTreeMap<String, SummaryStats>> {
        column_statistics(&self.current, columns, metrics)
    }

    /// Trend metrics over the working frame.
    pub fn trends(
        &self,
        date_column: &str,
        value_column: &str,
        group_by: Option<&str>,
    ) -> Result<TrendAnalysis> {
        analyze_trends(&self.current, date_column, value_column, group_by)
    }

    /// Per-group summary statistics of `value_column`, keyed by the group
    /// value rendered as a string.
    pub fn compare(
        &self,
        group_column: &str,
        value_column: &str,
        metrics: Option<&[Metric]>,
    ) -> Result<BTreeMap<String, SummaryStats>> {
        let mut out = BTreeMap::new();
        for key in group_keys(&self.current, group_column)? {
            let mask = group_mask(&self.current, group_column, &key)?;
            let subset = self.current.filter(&mask)?;
            out.insert(key, summary_stats(&subset, value_column, metrics)?);
        }
        Ok(out)
    }

    /// Snapshot of the working frame: shape, numeric columns with their
    /// statistics and the operations applied so far.
    pub fn report(&self) -> Result<AnalysisReport> {
        let numeric = numeric_columns(&self.current);
        let statistics = column_statistics(&self.current, Some(&numeric), None)?;
        Ok(AnalysisReport {
            record_count: self.current.height(),
            column_count: self.current.width(),
            numeric_columns: numeric,
            statistics,
            operations: self.operations.clone(),
            rows_filtered: self
                .original
                .height()
                .saturating_sub(self.current.height()),
        })
    }

    /// Restore the pristine frame, clear staged grouping and the log.
    pub fn reset(mut self) -> Self {
        self.current = self.original.clone();
        self.pending_group = None;
        self.operations.clear();
        self
    }
}
