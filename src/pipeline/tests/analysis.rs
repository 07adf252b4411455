use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::{Result, VitalsError};
use crate::pipeline::analysis::*;
use crate::pipeline::types::Scalar;
use crate::pipeline::types::*;

fn cases_by_country() -> Result<DataFrame> {
    Ok(df!(
        "country" => ["UK", "USA", "UK"],
        "cases" => [100.0, 200.0, 50.0],
    )?)
}

#[test]
fn test_filter_by_single_value() -> Result<()> {
    let df = cases_by_country()?;
    let out = filter_by_value(&df, "country", &FilterValue::One("UK".into()))?;
    assert_eq!(out.height(), 2);
    Ok(())
}

#[test]
fn test_membership_filter_preserves_row_order() -> Result<()> {
    let df = df!(
        "country" => ["UK", "FR", "USA", "UK"],
        "cases" => [1, 2, 3, 4],
    )?;
    let out = filter_by_value(
        &df,
        "country",
        &FilterValue::Many(vec!["UK".into(), "USA".into()]),
    )?;

    let countries: Vec<Option<&str>> = out.column("country")?.as_materialized_series().str()?.into_iter().collect();
    assert_eq!(countries, vec![Some("UK"), Some("USA"), Some("UK")]);
    Ok(())
}

#[test]
fn test_membership_filter_rejects_mixed_list() {
    let df = cases_by_country().expect("frame");
    let err = filter_by_value(
        &df,
        "country",
        &FilterValue::Many(vec!["UK".into(), Scalar::Int(1)]),
    );
    assert!(matches!(err, Err(VitalsError::InvalidArgument(_))));
}

#[test]
fn test_group_sum_single_func_keeps_column_name() -> Result<()> {
    let df = cases_by_country()?;
    let out = group_and_aggregate(&df, &["country".to_owned()], "cases", &[AggFunc::Sum], None, true)?;

    assert_eq!(out.height(), 2);
    // Default sort is by group key ascending: UK before USA.
    let countries: Vec<Option<&str>> = out.column("country")?.as_materialized_series().str()?.into_iter().collect();
    assert_eq!(countries, vec![Some("UK"), Some("USA")]);
    let cases = out.column("cases")?.as_materialized_series().f64()?;
    assert_eq!(cases.get(0), Some(150.0));
    assert_eq!(cases.get(1), Some(200.0));
    Ok(())
}

#[test]
fn test_group_multiple_funcs_suffix_names() -> Result<()> {
    let df = cases_by_country()?;
    let out = group_and_aggregate(
        &df,
        &["country".to_owned()],
        "cases",
        &[AggFunc::Sum, AggFunc::Mean],
        None,
        true,
    )?;

    assert!(out.column("cases_sum").is_ok());
    assert!(out.column("cases_mean").is_ok());
    Ok(())
}

#[test]
fn test_group_sort_by_aggregate_descending() -> Result<()> {
    let df = cases_by_country()?;
    let out = group_and_aggregate(
        &df,
        &["country".to_owned()],
        "cases",
        &[AggFunc::Sum],
        Some("cases"),
        false,
    )?;
    let countries: Vec<Option<&str>> = out.column("country")?.as_materialized_series().str()?.into_iter().collect();
    assert_eq!(countries, vec![Some("USA"), Some("UK")]);
    Ok(())
}

#[test]
fn test_group_rejects_empty_funcs() {
    let df = cases_by_country().expect("frame");
    let err = group_and_aggregate(&df, &["country".to_owned()], "cases", &[], None, true);
    assert!(matches!(err, Err(VitalsError::InvalidArgument(_))));
}

#[test]
fn test_summary_stats_values() -> Result<()> {
    let df = df!("cases" => [1.0, 2.0, 3.0, 4.0])?;
    let stats = summary_stats(&df, "cases", None)?;

    assert_eq!(stats.get(&Metric::Mean), Some(&2.5));
    assert_eq!(stats.get(&Metric::Median), Some(&2.5));
    assert_eq!(stats.get(&Metric::Min), Some(&1.0));
    assert_eq!(stats.get(&Metric::Max), Some(&4.0));
    assert_eq!(stats.get(&Metric::Sum), Some(&10.0));
    assert_eq!(stats.get(&Metric::Count), Some(&4.0));
    let std = stats.get(&Metric::Std).copied().expect("std");
    assert!((std - 1.2909944).abs() < 1e-5, "sample std, got {std}");
    Ok(())
}

#[test]
fn test_summary_stats_count_excludes_nulls() -> Result<()> {
    let df = df!("cases" => [Some(1.0), None, Some(3.0)])?;
    let stats = summary_stats(&df, "cases", Some(&[Metric::Count, Metric::Mean]))?;
    assert_eq!(stats.get(&Metric::Count), Some(&2.0));
    assert_eq!(stats.get(&Metric::Mean), Some(&2.0));
    assert_eq!(stats.len(), 2, "only requested metrics are returned");
    Ok(())
}

#[test]
fn test_summary_stats_all_null_column_is_nan() -> Result<()> {
    let df = df!("cases" => [None::<f64>, None])?;
    let stats = summary_stats(&df, "cases", None)?;
    assert_eq!(stats.get(&Metric::Count), Some(&0.0));
    assert!(stats.get(&Metric::Mean).expect("mean").is_nan());
    assert!(stats.get(&Metric::Sum).expect("sum").is_nan());
    Ok(())
}

#[test]
fn test_summary_stats_rejects_text_column() {
    let df = df!("country" => ["UK"]).expect("frame");
    let err = summary_stats(&df, "country", None);
    assert!(matches!(err, Err(VitalsError::InvalidArgument(_))));
}

#[test]
fn test_column_statistics_defaults_to_numeric_columns() -> Result<()> {
    let df = df!(
        "country" => ["UK", "USA"],
        "cases" => [1.0, 2.0],
        "deaths" => [0i64, 1],
    )?;
    let stats = column_statistics(&df, None, None)?;
    assert_eq!(stats.len(), 2);
    assert!(stats.contains_key("cases"));
    assert!(stats.contains_key("deaths"));
    Ok(())
}

#[test]
fn test_column_statistics_honours_metric_subset() -> Result<()> {
    let df = df!("cases" => [1.0, 2.0, 3.0])?;
    let stats = column_statistics(&df, None, Some(&[Metric::Mean, Metric::Max]))?;
    let cases = &stats["cases"];
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[&Metric::Mean], 2.0);
    assert_eq!(cases[&Metric::Max], 3.0);
    assert!(!cases.contains_key(&Metric::Sum));
    Ok(())
}

#[test]
fn test_filter_numeric_range_excludes_nulls() -> Result<()> {
    let df = df!("cases" => [Some(5.0), Some(15.0), None, Some(25.0)])?;
    let out = filter_by_numeric_range(&df, "cases", Some(10.0), Some(20.0))?;
    assert_eq!(out.height(), 1);
    assert_eq!(out.column("cases")?.as_materialized_series().f64()?.get(0), Some(15.0));
    Ok(())
}

#[test]
fn test_filter_date_range_on_string_column() -> Result<()> {
    let df = df!(
        "date" => ["2024-01-01", "2024-01-15", "2024-02-01"],
        "cases" => [1, 2, 3],
    )?;
    let out = filter_by_date_range(
        &df,
        "date",
        NaiveDate::from_ymd_opt(2024, 1, 10),
        NaiveDate::from_ymd_opt(2024, 1, 31),
    )?;

    assert_eq!(out.height(), 1);
    // The string column comes back converted to datetime.
    assert!(out.column("date")?.dtype().is_temporal());
    assert_eq!(out.column("cases")?.as_materialized_series().i32()?.get(0), Some(2));
    Ok(())
}

#[test]
fn test_filter_date_range_end_is_inclusive() -> Result<()> {
    let df = df!(
        "date" => ["2024-01-01", "2024-01-31"],
        "cases" => [1, 2],
    )?;
    let out = filter_by_date_range(&df, "date", None, NaiveDate::from_ymd_opt(2024, 1, 31))?;
    assert_eq!(out.height(), 2);
    Ok(())
}

#[test]
fn test_filter_by_predicates_ands_conditions() -> Result<()> {
    let df = df!(
        "country" => ["UK", "UK", "USA"],
        "region" => ["North", "South", "North"],
    )?;
    let out = filter_by_predicates(
        &df,
        &[
            ("country".to_owned(), FilterValue::One("UK".into())),
            ("region".to_owned(), FilterValue::One("North".into())),
        ],
    )?;
    assert_eq!(out.height(), 1);
    Ok(())
}

#[test]
fn test_trend_sorts_by_date_before_measuring() -> Result<()> {
    let df = df!(
        "date" => ["2024-01-03", "2024-01-01", "2024-01-02"],
        "cases" => [30.0, 10.0, 20.0],
    )?;
    let summary = trend(&df, "date", "cases")?;

    assert_eq!(summary.start_value, 10.0);
    assert_eq!(summary.end_value, 30.0);
    assert_eq!(summary.total_change, 20.0);
    assert_eq!(summary.percent_change, 200.0);
    assert_eq!(summary.average_change, 10.0);
    assert_eq!(summary.period_count, 3);
    Ok(())
}

#[test]
fn test_trend_zero_start_has_zero_percent() -> Result<()> {
    let df = df!(
        "date" => ["2024-01-01", "2024-01-02"],
        "cases" => [0.0, 50.0],
    )?;
    let summary = trend(&df, "date", "cases")?;
    assert_eq!(summary.percent_change, 0.0);
    Ok(())
}

#[test]
fn test_trend_on_empty_frame_fails() {
    let df = df!(
        "date" => Vec::<String>::new(),
        "cases" => Vec::<f64>::new(),
    )
    .expect("frame");
    let err = trend(&df, "date", "cases");
    assert!(matches!(err, Err(VitalsError::Validation(_))));
}

#[test]
fn test_analyze_trends_by_group() -> Result<()> {
    let df = df!(
        "country" => ["UK", "UK", "USA", "USA"],
        "date" => ["2024-01-01", "2024-01-02", "2024-01-01", "2024-01-02"],
        "cases" => [100.0, 150.0, 100.0, 100.0],
    )?;

    let TrendAnalysis::ByGroup(groups) = analyze_trends(&df, "date", "cases", Some("country"))?
    else {
        panic!("expected per-group analysis");
    };

    let uk = groups.get("UK").expect("UK group");
    assert_eq!(uk.growth_rate, 50.0);
    assert_eq!(uk.direction, TrendDirection::Increasing);
    assert_eq!(uk.total, 250.0);

    let usa = groups.get("USA").expect("USA group");
    assert_eq!(usa.direction, TrendDirection::Stable);
    Ok(())
}

#[test]
fn test_analyze_trends_overall() -> Result<()> {
    let df = df!(
        "date" => ["2024-01-01", "2024-01-02"],
        "cases" => [100.0, 80.0],
    )?;
    let TrendAnalysis::Overall(metrics) = analyze_trends(&df, "date", "cases", None)? else {
        panic!("expected overall analysis");
    };
    assert_eq!(metrics.first_value, 100.0);
    assert_eq!(metrics.last_value, 80.0);
    assert_eq!(metrics.direction, TrendDirection::Decreasing);
    Ok(())
}

#[test]
fn test_growth_rate_column() -> Result<()> {
    let df = df!("cases" => [100.0, 110.0, 99.0])?;
    let out = growth_rate(&df, "cases", 1)?;

    let rates = out.column("growth_rate")?.as_materialized_series().f64()?;
    assert_eq!(rates.get(0), None, "no baseline for the first row");
    let second = rates.get(1).expect("rate");
    assert!((second - 10.0).abs() < 1e-9);
    let third = rates.get(2).expect("rate");
    assert!((third + 10.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_growth_rate_rejects_zero_periods() {
    let df = df!("cases" => [1.0]).expect("frame");
    let err = growth_rate(&df, "cases", 0);
    assert!(matches!(err, Err(VitalsError::InvalidArgument(_))));
}

#[test]
fn test_moving_average_default_name_and_warmup_nulls() -> Result<()> {
    let df = df!("cases" => [10.0, 20.0, 30.0, 40.0])?;
    let out = moving_average(&df, "cases", 3, None)?;

    let ma = out.column("cases_ma_3")?.as_materialized_series().f64()?;
    assert_eq!(ma.get(0), None);
    assert_eq!(ma.get(1), None);
    assert_eq!(ma.get(2), Some(20.0));
    assert_eq!(ma.get(3), Some(30.0));
    Ok(())
}

#[test]
fn test_moving_average_custom_output_name() -> Result<()> {
    let df = df!("cases" => [1.0, 2.0])?;
    let out = moving_average(&df, "cases", 1, Some("smoothed"))?;
    assert!(out.column("smoothed").is_ok());
    Ok(())
}

#[test]
fn test_moving_average_rejects_zero_window() {
    let df = df!("cases" => [1.0]).expect("frame");
    let err = moving_average(&df, "cases", 0, None);
    assert!(matches!(err, Err(VitalsError::InvalidArgument(_))));
}

#[test]
fn test_aggregate_without_group_by_is_invalid_state() {
    let df = cases_by_country().expect("frame");
    let err = DataAnalyzer::new(df).aggregate("cases", &[AggFunc::Sum]);
    assert!(matches!(err, Err(VitalsError::InvalidState(_))));
}

#[test]
fn test_aggregate_consumes_staged_grouping() -> Result<()> {
    let df = cases_by_country()?;
    let analyzer = DataAnalyzer::new(df)
        .group_by(vec!["country".to_owned()])
        .aggregate("cases", &[AggFunc::Sum])?;

    // A second aggregate needs a fresh group_by.
    let err = analyzer.aggregate("cases", &[AggFunc::Mean]);
    assert!(matches!(err, Err(VitalsError::InvalidState(_))));
    Ok(())
}

#[test]
fn test_analyzer_summary_with_metric_subset() -> Result<()> {
    let df = cases_by_country()?;
    let summary = DataAnalyzer::new(df).summary(None, Some(&[Metric::Sum]))?;

    let cases = &summary["cases"];
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[&Metric::Sum], 350.0);
    Ok(())
}

#[test]
fn test_analyzer_compare_groups() -> Result<()> {
    let df = df!(
        "country" => ["UK", "UK", "USA"],
        "cases" => [100.0, 200.0, 500.0],
    )?;
    let comparison = DataAnalyzer::new(df).compare(
        "country",
        "cases",
        Some(&[Metric::Mean, Metric::Count]),
    )?;

    assert_eq!(comparison.len(), 2);
    assert_eq!(
        comparison.get("UK").and_then(|s| s.get(&Metric::Mean)),
        Some(&150.0)
    );
    assert_eq!(
        comparison.get("USA").and_then(|s| s.get(&Metric::Count)),
        Some(&1.0)
    );
    Ok(())
}
