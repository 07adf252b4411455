use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitalsError};

/// A single typed value, as used by filter predicates and constant fills.
///
/// Closed over the cell types the pipeline understands; anything else is
/// rejected at the type level rather than at runtime.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn to_lit(&self) -> Expr {
        match self {
            Self::Str(s) => lit(s.clone()),
            Self::Int(v) => lit(*v),
            Self::Float(v) => lit(*v),
            Self::Bool(v) => lit(*v),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Equality or membership test against one column.
#[derive(Clone, PartialEq, Debug)]
pub enum FilterValue {
    /// Column equals the scalar.
    One(Scalar),
    /// Column is a member of the set. The list must be homogeneous.
    Many(Vec<Scalar>),
}

impl FilterValue {
    /// Build a membership series from a homogeneous scalar list.
    pub(crate) fn member_series(values: &[Scalar]) -> Result<Series> {
        let first = values.first().ok_or_else(|| {
            VitalsError::InvalidArgument("membership filter needs at least one value".to_owned())
        })?;

        let name = PlSmallStr::from_static("members");
        match first {
            Scalar::Str(_) => {
                let vals: Vec<String> = values
                    .iter()
                    .map(|v| match v {
                        Scalar::Str(s) => Ok(s.clone()),
                        other => Err(mixed_list(other)),
                    })
                    .collect::<Result<_>>()?;
                Ok(Series::new(name, vals))
            }
            Scalar::Int(_) => {
                let vals: Vec<i64> = values
                    .iter()
                    .map(|v| match v {
                        Scalar::Int(i) => Ok(*i),
                        other => Err(mixed_list(other)),
                    })
                    .collect::<Result<_>>()?;
                Ok(Series::new(name, vals))
            }
            Scalar::Float(_) => {
                let vals: Vec<f64> = values
                    .iter()
                    .map(|v| match v {
                        Scalar::Float(x) => Ok(*x),
                        Scalar::Int(i) => Ok(*i as f64),
                        other => Err(mixed_list(other)),
                    })
                    .collect::<Result<_>>()?;
                Ok(Series::new(name, vals))
            }
            Scalar::Bool(_) => {
                let vals: Vec<bool> = values
                    .iter()
                    .map(|v| match v {
                        Scalar::Bool(b) => Ok(*b),
                        other => Err(mixed_list(other)),
                    })
                    .collect::<Result<_>>()?;
                Ok(Series::new(name, vals))
            }
        }
    }
}

fn mixed_list(offending: &Scalar) -> VitalsError {
    VitalsError::InvalidArgument(format!(
        "membership filter values must share one type, found {offending:?}"
    ))
}

/// Fill source for [`MissingStrategy::Constant`].
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantFill {
    /// One value applied to every target column.
    Single(Scalar),
    /// Per-column fill values; columns absent from the map are left alone.
    PerColumn(HashMap<String, Scalar>),
}

/// How to treat missing values.
#[derive(Clone, PartialEq, Debug)]
pub enum MissingStrategy {
    /// Drop rows with any null in the target columns.
    Drop,
    /// Fill numeric columns with their mean; other columns untouched.
    Mean,
    /// Fill numeric columns with their median; other columns untouched.
    Median,
    /// Fill with the smallest modal value; untouched when no mode exists.
    Mode,
    /// Fill with a caller-supplied constant.
    Constant(ConstantFill),
    /// Propagate the last valid value forward along row order.
    ForwardFill,
    /// Propagate the next valid value backward along row order.
    BackwardFill,
}

/// Which occurrence survives duplicate removal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DuplicateKeep {
    First,
    Last,
    /// Drop every row that has a duplicate, including the first occurrence.
    None,
}

/// Target type for [`convert_type`](super::cleaning::convert_type).
#[derive(Clone, PartialEq, Debug)]
pub enum ConvertTarget {
    /// Parse to a millisecond datetime, optionally with a chrono format
    /// string such as `%Y-%m-%d`.
    Datetime { format: Option<String> },
    /// Parse to 64-bit float.
    Numeric,
}

/// What to do with values that fail conversion.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OnError {
    /// Fail with `Conversion` on the first bad value.
    Raise,
    /// Replace unparsable values with null.
    Coerce,
    /// Leave the column untouched if any value fails to parse.
    Ignore,
}

/// Outlier detection method.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutlierMethod {
    /// Flag values outside `[Q1 - t*IQR, Q3 + t*IQR]`.
    Iqr,
    /// Flag values with `|z| > t` over the non-null population.
    ZScore,
}

/// Switches for text standardisation, applied in order: strip, lowercase,
/// remove_special.
#[derive(Clone, Copy, Default, Debug)]
pub struct TextCleanOptions {
    pub strip: bool,
    pub lowercase: bool,
    /// Keep only alphanumerics and spaces.
    pub remove_special: bool,
}

/// Summary statistic selector.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Metric {
    Mean,
    Median,
    Min,
    Max,
    Sum,
    Count,
    Std,
}

impl Metric {
    pub const ALL: [Self; 7] = [
        Self::Mean,
        Self::Median,
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Count,
        Self::Std,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Std => "std",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-column summary statistics keyed by metric.
pub type SummaryStats = BTreeMap<Metric, f64>;

/// Aggregation function for grouped data.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    Median,
    Std,
}

impl AggFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
        }
    }

    pub(crate) fn apply(&self, expr: Expr) -> Expr {
        match self {
            Self::Sum => expr.sum(),
            Self::Mean => expr.mean(),
            Self::Count => expr.count(),
            Self::Min => expr.min(),
            Self::Max => expr.max(),
            Self::Median => expr.median(),
            Self::Std => expr.std(1),
        }
    }
}

/// Before/after record of one cleaning run.
#[derive(Clone, Debug, Serialize)]
pub struct CleaningReport {
    pub original_rows: usize,
    pub cleaned_rows: usize,
    pub rows_removed: usize,
    pub original_columns: usize,
    pub cleaned_columns: usize,
    pub operations: Vec<String>,
}

/// Quality issues found by [`DataCleaner::detect_issues`](super::cleaning::DataCleaner).
#[derive(Debug)]
pub struct CleaningIssues {
    /// Per-column missing-value summary frame.
    pub missing: DataFrame,
    pub duplicate_count: usize,
    /// Column name → dtype, in schema order.
    pub dtypes: Vec<(String, DataType)>,
}

/// First-to-last change over a date-sorted series.
#[derive(Clone, Debug, Serialize)]
pub struct TrendSummary {
    pub start_value: f64,
    pub end_value: f64,
    pub total_change: f64,
    /// Percent change from start; 0 when the start value is 0.
    pub percent_change: f64,
    /// Mean change per step; 0 for a single row.
    pub average_change: f64,
    pub period_count: usize,
}

/// Direction classification with a ±5% growth-rate threshold.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub(crate) fn from_growth_rate(rate: f64) -> Self {
        if rate > 5.0 {
            Self::Increasing
        } else if rate < -5.0 {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }
}

/// Rich trend metrics produced by [`analyze_trends`](super::analysis::analyze_trends).
#[derive(Clone, Debug, Serialize)]
pub struct TrendMetrics {
    pub total: f64,
    pub average: f64,
    pub growth_rate: f64,
    pub direction: TrendDirection,
    pub first_value: f64,
    pub last_value: f64,
}

/// Trend analysis over the whole frame or per group.
#[derive(Debug)]
pub enum TrendAnalysis {
    Overall(TrendMetrics),
    ByGroup(BTreeMap<String, TrendMetrics>),
}

/// Snapshot returned by [`DataAnalyzer::report`](super::analysis::DataAnalyzer::report).
#[derive(Debug)]
pub struct AnalysisReport {
    pub record_count: usize,
    pub column_count: usize,
    pub numeric_columns: Vec<String>,
    pub statistics: BTreeMap<String, SummaryStats>,
    pub operations: Vec<String>,
    /// Rows removed by filters relative to the original frame.
    pub rows_filtered: usize,
}
