pub mod analysis;
pub mod cleaning;
pub mod loader;
pub mod types;

pub use analysis::{
    analyze_trends, column_statistics, filter_by_date_range, filter_by_numeric_range,
    filter_by_predicates, filter_by_value, group_and_aggregate, growth_rate, moving_average,
    summary_stats, trend, DataAnalyzer,
};
pub use cleaning::{
    convert_type, detect_duplicates, detect_missing, detect_outliers, handle_missing,
    remove_duplicates, standardize_text, validate_range, DataCleaner,
};
pub use loader::{load_csv, load_from_api, load_json, persist, read_table, WriteMode};
pub use types::{
    AggFunc, AnalysisReport, CleaningIssues, CleaningReport, ConstantFill, ConvertTarget,
    DuplicateKeep, FilterValue, Metric, MissingStrategy, OnError, OutlierMethod, Scalar,
    SummaryStats, TextCleanOptions, TrendAnalysis, TrendDirection, TrendMetrics, TrendSummary,
};
