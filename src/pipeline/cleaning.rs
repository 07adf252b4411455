//! Stateless cleaning engine plus the chainable [`DataCleaner`] wrapper.
//!
//! Every engine function takes a frame by reference and returns a new frame
//! (or a row mask); nothing mutates its input. The wrapper owns its working
//! copy and threads it through chained calls.

use std::collections::HashSet;

use polars::prelude::*;

use super::types::{
    CleaningIssues, CleaningReport, ConstantFill, ConvertTarget, DuplicateKeep, MissingStrategy,
    OnError, OutlierMethod, TextCleanOptions,
};
use crate::error::{Result, VitalsError};

/// Per-column summary of missing values: `column`, `missing_count`,
/// `missing_percentage` (rounded to 2 dp). An empty frame yields an empty
/// report.
pub fn detect_missing(df: &DataFrame) -> Result<DataFrame> {
    if df.height() == 0 {
        let report = df!(
            "column" => Vec::<String>::new(),
            "missing_count" => Vec::<u32>::new(),
            "missing_percentage" => Vec::<f64>::new(),
        )?;
        return Ok(report);
    }

    let mut names = Vec::with_capacity(df.width());
    let mut counts = Vec::with_capacity(df.width());
    let mut pcts = Vec::with_capacity(df.width());

    for col in df.get_columns() {
        let nulls = col.null_count();
        let pct = (nulls as f64 / df.height() as f64) * 100.0;
        names.push(col.name().to_string());
        counts.push(nulls as u32);
        pcts.push((pct * 100.0).round() / 100.0);
    }

    let report = df!(
        "column" => names,
        "missing_count" => counts,
        "missing_percentage" => pcts,
    )?;
    Ok(report)
}

/// Handle missing values in the target columns (all columns when `columns`
/// is `None`) according to `strategy`.
pub fn handle_missing(
    df: &DataFrame,
    strategy: &MissingStrategy,
    columns: Option<&[String]>,
) -> Result<DataFrame> {
    let targets: Vec<String> = match columns {
        Some(cols) => cols.to_vec(),
        None => df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect(),
    };

    let out = match strategy {
        MissingStrategy::Drop => {
            let subset: Vec<Expr> = targets.iter().map(|c| col(c.as_str())).collect();
            df.clone().lazy().drop_nulls(Some(subset)).collect()?
        }
        MissingStrategy::Mean | MissingStrategy::Median => {
            let mut exprs = Vec::new();
            for name in &targets {
                let dtype = df.column(name)?.dtype();
                if !dtype.is_primitive_numeric() {
                    continue;
                }
                let expr = col(name.as_str());
                let filled = match strategy {
                    MissingStrategy::Mean => expr.clone().fill_null(expr.mean()),
                    _ => expr.clone().fill_null(expr.median()),
                };
                exprs.push(filled.alias(name.as_str()));
            }
            if exprs.is_empty() {
                df.clone()
            } else {
                df.clone().lazy().with_columns(exprs).collect()?
            }
        }
        MissingStrategy::Mode => {
            let exprs: Vec<Expr> = targets
                .iter()
                .map(|name| {
                    let expr = col(name.as_str());
                    // The smallest modal value, so ties resolve the same
                    // way on every run.
                    expr.clone()
                        .fill_null(expr.mode().sort(Default::default()).first())
                        .alias(name.as_str())
                })
                .collect();
            df.clone().lazy().with_columns(exprs).collect()?
        }
        MissingStrategy::Constant(fill) => {
            let mut exprs = Vec::new();
            for name in &targets {
                let value = match fill {
                    ConstantFill::Single(v) => Some(v),
                    ConstantFill::PerColumn(map) => map.get(name),
                };
                if let Some(v) = value {
                    exprs.push(
                        col(name.as_str())
                            .fill_null(v.to_lit())
                            .alias(name.as_str()),
                    );
                }
            }
            if exprs.is_empty() {
                df.clone()
            } else {
                df.clone().lazy().with_columns(exprs).collect()?
            }
        }
        MissingStrategy::ForwardFill => {
            let exprs: Vec<Expr> = targets
                .iter()
                .map(|n| col(n.as_str()).forward_fill(None).alias(n.as_str()))
                .collect();
            df.clone().lazy().with_columns(exprs).collect()?
        }
        MissingStrategy::BackwardFill => {
            let exprs: Vec<Expr> = targets
                .iter()
                .map(|n| col(n.as_str()).backward_fill(None).alias(n.as_str()))
                .collect();
            df.clone().lazy().with_columns(exprs).collect()?
        }
    };

    Ok(out)
}

fn row_key(df: &DataFrame, subset: &[String], row: usize) -> Result<String> {
    let mut key = String::new();
    for name in subset {
        let value = df.column(name)?.as_materialized_series().get(row)?;
        key.push_str(&format!("{value:?}"));
        key.push('\u{1f}');
    }
    Ok(key)
}

/// Rows that duplicate an earlier row. The first occurrence is excluded;
/// every subsequent occurrence is returned.
pub fn detect_duplicates(df: &DataFrame, subset: Option<&[String]>) -> Result<DataFrame> {
    let subset: Vec<String> = match subset {
        Some(cols) => cols.to_vec(),
        None => df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect(),
    };

    let mut seen = HashSet::with_capacity(df.height());
    let mut mask = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let key = row_key(df, &subset, row)?;
        mask.push(!seen.insert(key));
    }

    let mask = BooleanChunked::from_slice(PlSmallStr::from_static("duplicated"), &mask);
    Ok(df.filter(&mask)?)
}

/// Remove duplicate rows, keeping the chosen occurrence. Row order of the
/// survivors is preserved.
pub fn remove_duplicates(
    df: &DataFrame,
    subset: Option<&[String]>,
    keep: DuplicateKeep,
) -> Result<DataFrame> {
    let subset: Option<Vec<String>> = subset.map(|cols| cols.to_vec());
    let strategy = match keep {
        DuplicateKeep::First => UniqueKeepStrategy::First,
        DuplicateKeep::Last => UniqueKeepStrategy::Last,
        DuplicateKeep::None => UniqueKeepStrategy::None,
    };
    Ok(df.unique_stable(subset.as_deref(), strategy, None)?)
}

fn parse_datetime_ms(raw: &str, format: Option<&str>) -> Option<i64> {
    use chrono::{NaiveDate, NaiveDateTime};

    if let Some(fmt) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
        return NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
}

/// Convert one column to a datetime or numeric dtype.
///
/// `OnError::Coerce` turns unparsable values into nulls, `Raise` fails on
/// the first bad value, `Ignore` leaves the column untouched when anything
/// fails to parse.
pub fn convert_type(
    df: &DataFrame,
    column: &str,
    target: &ConvertTarget,
    on_error: OnError,
) -> Result<DataFrame> {
    let series = df.column(column)?.as_materialized_series().clone();

    match target {
        ConvertTarget::Numeric => {
            if series.dtype().is_primitive_numeric() {
                return Ok(df.clone());
            }
            let mut values: Vec<Option<f64>> = Vec::with_capacity(series.len());
            for row in 0..series.len() {
                let av = series.get(row)?;
                let parsed = match &av {
                    AnyValue::Null => None,
                    AnyValue::String(s) => match s.trim().parse::<f64>() {
                        Ok(v) => Some(v),
                        Err(_) => match on_error {
                            OnError::Raise => {
                                return Err(VitalsError::Conversion(format!(
                                    "cannot convert '{s}' in column '{column}' to numeric"
                                )))
                            }
                            OnError::Coerce => None,
                            OnError::Ignore => return Ok(df.clone()),
                        },
                    },
                    other => match other.try_extract::<f64>() {
                        Ok(v) => Some(v),
                        Err(_) => match on_error {
                            OnError::Raise => {
                                return Err(VitalsError::Conversion(format!(
                                    "cannot convert '{other}' in column '{column}' to numeric"
                                )))
                            }
                            OnError::Coerce => None,
                            OnError::Ignore => return Ok(df.clone()),
                        },
                    },
                };
                values.push(parsed);
            }
            let converted = Series::new(column.into(), values);
            let mut out = df.clone();
            out.replace(column, converted)?;
            Ok(out)
        }
        ConvertTarget::Datetime { format } => {
            if series.dtype().is_temporal() {
                return Ok(df.clone());
            }
            let mut values: Vec<Option<i64>> = Vec::with_capacity(series.len());
            for row in 0..series.len() {
                let av = series.get(row)?;
                let parsed = match &av {
                    AnyValue::Null => None,
                    AnyValue::String(s) => match parse_datetime_ms(s, format.as_deref()) {
                        Some(ms) => Some(ms),
                        None => match on_error {
                            OnError::Raise => {
                                return Err(VitalsError::Conversion(format!(
                                    "cannot convert '{s}' in column '{column}' to datetime"
                                )))
                            }
                            OnError::Coerce => None,
                            OnError::Ignore => return Ok(df.clone()),
                        },
                    },
                    other => match on_error {
                        OnError::Raise => {
                            return Err(VitalsError::Conversion(format!(
                                "cannot convert '{other}' in column '{column}' to datetime"
                            )))
                        }
                        OnError::Coerce => None,
                        OnError::Ignore => return Ok(df.clone()),
                    },
                };
                values.push(parsed);
            }
            let converted = Series::new(column.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            let mut out = df.clone();
            out.replace(column, converted)?;
            Ok(out)
        }
    }
}

/// Boolean per-row mask: true when the value lies within `[min, max]`.
/// Either bound may be omitted; null values are never valid.
pub fn validate_range(
    df: &DataFrame,
    column: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<BooleanChunked> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let ca = series.f64()?;

    let mask: Vec<bool> = ca
        .into_iter()
        .map(|v| match v {
            Some(x) => min.map_or(true, |lo| x >= lo) && max.map_or(true, |hi| x <= hi),
            None => false,
        })
        .collect();

    Ok(BooleanChunked::from_slice(
        PlSmallStr::from_static("valid"),
        &mask,
    ))
}

/// Boolean per-row mask flagging outliers in a numeric column.
/// Null rows are never flagged.
pub fn detect_outliers(
    df: &DataFrame,
    column: &str,
    method: OutlierMethod,
    threshold: f64,
) -> Result<BooleanChunked> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let ca = series.f64()?;
    let name = PlSmallStr::from_static("outlier");

    let mask: Vec<bool> = match method {
        OutlierMethod::Iqr => {
            let q1 = ca.quantile(0.25, QuantileMethod::Linear)?;
            let q3 = ca.quantile(0.75, QuantileMethod::Linear)?;
            match (q1, q3) {
                (Some(q1), Some(q3)) => {
                    let iqr = q3 - q1;
                    let lower = q1 - threshold * iqr;
                    let upper = q3 + threshold * iqr;
                    ca.into_iter()
                        .map(|v| v.is_some_and(|x| x < lower || x > upper))
                        .collect()
                }
                _ => vec![false; ca.len()],
            }
        }
        OutlierMethod::ZScore => {
            let values: Vec<f64> = ca.into_iter().flatten().collect();
            if values.is_empty() {
                vec![false; ca.len()]
            } else {
                // Population standard deviation, matching a plain z-score.
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std == 0.0 {
                    vec![false; ca.len()]
                } else {
                    ca.into_iter()
                        .map(|v| v.is_some_and(|x| ((x - mean) / std).abs() > threshold))
                        .collect()
                }
            }
        }
    };

    Ok(BooleanChunked::from_slice(name, &mask))
}

/// Standardise a text column: strip, then lowercase, then drop everything
/// but alphanumerics and spaces. Each step is independent.
pub fn standardize_text(
    df: &DataFrame,
    column: &str,
    options: &TextCleanOptions,
) -> Result<DataFrame> {
    let mut expr = col(column);

    if options.strip {
        expr = expr.str().strip_chars(lit(NULL));
    }
    if options.lowercase {
        expr = expr.str().to_lowercase();
    }
    if options.remove_special {
        expr = expr
            .str()
            .replace_all(lit(r"[^a-zA-Z0-9\s]"), lit(""), false);
    }

    Ok(df
        .clone()
        .lazy()
        .with_column(expr.alias(column))
        .collect()?)
}

/// Chainable cleaning pipeline over an owned working copy.
///
/// Each chainable call applies one engine function, records a description
/// and hands the builder back, so failures propagate with `?`:
///
/// ```no_run
/// use polars::prelude::*;
/// use vitals::pipeline::cleaning::DataCleaner;
/// use vitals::pipeline::types::{DuplicateKeep, MissingStrategy};
///
/// # fn run(df: DataFrame) -> vitals::Result<()> {
/// let cleaned = DataCleaner::new(df)
///     .handle_missing(&MissingStrategy::Drop, None)?
///     .remove_duplicates(None, DuplicateKeep::First)?
///     .data();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DataCleaner {
    original: DataFrame,
    current: DataFrame,
    operations: Vec<String>,
}

impl DataCleaner {
    pub fn new(df: DataFrame) -> Self {
        Self {
            original: df.clone(),
            current: df,
            operations: Vec::new(),
        }
    }

    /// Summarise common quality issues in the working copy.
    pub fn detect_issues(&self) -> Result<CleaningIssues> {
        let missing = detect_missing(&self.current)?;
        let duplicate_count = detect_duplicates(&self.current, None)?.height();
        let dtypes = self
            .current
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.dtype().clone()))
            .collect();
        Ok(CleaningIssues {
            missing,
            duplicate_count,
            dtypes,
        })
    }

    pub fn handle_missing(
        mut self,
        strategy: &MissingStrategy,
        columns: Option<&[String]>,
    ) -> Result<Self> {
        self.current = handle_missing(&self.current, strategy, columns)?;
        self.operations
            .push(format!("handle_missing(strategy={strategy:?})"));
        Ok(self)
    }

    pub fn remove_duplicates(
        mut self,
        subset: Option<&[String]>,
        keep: DuplicateKeep,
    ) -> Result<Self> {
        self.current = remove_duplicates(&self.current, subset, keep)?;
        self.operations
            .push(format!("remove_duplicates(keep={keep:?})"));
        Ok(self)
    }

    pub fn convert_column(
        mut self,
        column: &str,
        target: &ConvertTarget,
        on_error: OnError,
    ) -> Result<Self> {
        self.current = convert_type(&self.current, column, target, on_error)?;
        self.operations
            .push(format!("convert_column('{column}', {target:?})"));
        Ok(self)
    }

    pub fn standardize_column(mut self, column: &str, options: &TextCleanOptions) -> Result<Self> {
        self.current = standardize_text(&self.current, column, options)?;
        self.operations
            .push(format!("standardize_column('{column}')"));
        Ok(self)
    }

    /// Keep only rows whose value in `column` lies within the range.
    pub fn filter_by_range(
        mut self,
        column: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Self> {
        let mask = validate_range(&self.current, column, min, max)?;
        self.current = self.current.filter(&mask)?;
        self.operations
            .push(format!("filter_by_range('{column}', {min:?}, {max:?})"));
        Ok(self)
    }

    /// Drop rows flagged as outliers in `column`.
    pub fn remove_outliers(
        mut self,
        column: &str,
        method: OutlierMethod,
        threshold: f64,
    ) -> Result<Self> {
        let outliers = detect_outliers(&self.current, column, method, threshold)?;
        let keep: Vec<bool> = (&outliers).into_iter().map(|v| !v.unwrap_or(false)).collect();
        let mask = BooleanChunked::from_slice(PlSmallStr::from_static("keep"), &keep);
        self.current = self.current.filter(&mask)?;
        self.operations
            .push(format!("remove_outliers('{column}', method={method:?})"));
        Ok(self)
    }

    /// Defensive copy of the working frame.
    pub fn data(&self) -> DataFrame {
        self.current.clone()
    }

    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Diff the working copy against the frame the cleaner started from.
    pub fn report(&self) -> CleaningReport {
        CleaningReport {
            original_rows: self.original.height(),
            cleaned_rows: self.current.height(),
            rows_removed: self.original.height().saturating_sub(self.current.height()),
            original_columns: self.original.width(),
            cleaned_columns: self.current.width(),
            operations: self.operations.clone(),
        }
    }

    /// Restore the pristine frame and clear the operation log.
    pub fn reset(mut self) -> Self {
        self.current = self.original.clone();
        self.operations.clear();
        self
    }
}
