use std::collections::HashMap;

use polars::prelude::*;

use crate::error::{Result, VitalsError};
use crate::pipeline::cleaning::*;
use crate::pipeline::types::Scalar;
use crate::pipeline::types::*;

#[test]
fn test_detect_missing_counts_and_percentages() -> Result<()> {
    let df = df!(
        "cases" => [Some(1.0), None, Some(3.0)],
        "country" => [Some("UK"), Some("USA"), Some("UK")],
    )?;

    let report = detect_missing(&df)?;
    assert_eq!(report.height(), 2);
    assert_eq!(report.column("missing_count")?.as_materialized_series().u32()?.get(0), Some(1));
    assert_eq!(report.column("missing_count")?.as_materialized_series().u32()?.get(1), Some(0));
    assert_eq!(
        report.column("missing_percentage")?.as_materialized_series().f64()?.get(0),
        Some(33.33),
        "1 of 3 nulls should round to 33.33"
    );
    Ok(())
}

#[test]
fn test_detect_missing_on_empty_frame() -> Result<()> {
    let df = DataFrame::empty();
    let report = detect_missing(&df)?;
    assert_eq!(report.height(), 0);
    assert_eq!(report.width(), 3);
    Ok(())
}

#[test]
fn test_mean_fill_uses_column_mean() -> Result<()> {
    let df = df!("cases" => [Some(100.0), None, Some(300.0), Some(400.0)])?;
    let out = handle_missing(&df, &MissingStrategy::Mean, None)?;

    let filled = out.column("cases")?.as_materialized_series().f64()?.get(1).expect("filled");
    assert!(
        (filled - 266.6667).abs() < 1e-3,
        "mean of 100/300/400 is 266.67, got {filled}"
    );
    assert_eq!(out.column("cases")?.null_count(), 0);
    Ok(())
}

#[test]
fn test_mean_fill_leaves_text_columns_alone() -> Result<()> {
    let df = df!(
        "cases" => [Some(1.0), None],
        "country" => [None::<&str>, Some("UK")],
    )?;
    let out = handle_missing(&df, &MissingStrategy::Mean, None)?;
    assert_eq!(out.column("cases")?.null_count(), 0);
    assert_eq!(out.column("country")?.null_count(), 1);
    Ok(())
}

#[test]
fn test_mode_fill_ties_pick_smallest_value() -> Result<()> {
    let df = df!("cases" => [Some(1i64), Some(1), Some(2), Some(2), None])?;
    let out = handle_missing(&df, &MissingStrategy::Mode, None)?;

    assert_eq!(
        out.column("cases")?.as_materialized_series().i64()?.get(4),
        Some(1),
        "a tie between modes must fill with the smaller one"
    );
    Ok(())
}

#[test]
fn test_drop_respects_column_subset() -> Result<()> {
    let df = df!(
        "cases" => [Some(1.0), None, Some(3.0)],
        "deaths" => [None::<f64>, Some(2.0), Some(3.0)],
    )?;
    let out = handle_missing(&df, &MissingStrategy::Drop, Some(&["cases".to_owned()]))?;
    assert_eq!(out.height(), 2, "only the null-cases row should drop");
    Ok(())
}

#[test]
fn test_constant_fill_per_column() -> Result<()> {
    let mut fills = HashMap::new();
    fills.insert("cases".to_owned(), Scalar::Float(0.0));

    let df = df!(
        "cases" => [Some(1.0), None],
        "deaths" => [None::<f64>, Some(2.0)],
    )?;
    let out = handle_missing(
        &df,
        &MissingStrategy::Constant(ConstantFill::PerColumn(fills)),
        None,
    )?;
    assert_eq!(out.column("cases")?.as_materialized_series().f64()?.get(1), Some(0.0));
    assert_eq!(
        out.column("deaths")?.null_count(),
        1,
        "columns absent from the map stay untouched"
    );
    Ok(())
}

#[test]
fn test_forward_and_backward_fill() -> Result<()> {
    let df = df!("cases" => [None, Some(10.0), None, Some(30.0)])?;

    let ffill = handle_missing(&df, &MissingStrategy::ForwardFill, None)?;
    let col = ffill.column("cases")?.as_materialized_series().f64()?;
    assert_eq!(col.get(0), None, "nothing before the first value");
    assert_eq!(col.get(2), Some(10.0));

    let bfill = handle_missing(&df, &MissingStrategy::BackwardFill, None)?;
    let col = bfill.column("cases")?.as_materialized_series().f64()?;
    assert_eq!(col.get(0), Some(10.0));
    assert_eq!(col.get(2), Some(30.0));
    Ok(())
}

#[test]
fn test_detect_duplicates_returns_later_occurrences_only() -> Result<()> {
    let df = df!(
        "country" => ["UK", "USA", "UK", "UK"],
        "cases" => [1, 2, 1, 1],
    )?;
    let dupes = detect_duplicates(&df, None)?;
    assert_eq!(dupes.height(), 2, "first occurrence is not a duplicate");
    Ok(())
}

#[test]
fn test_detect_duplicates_with_subset() -> Result<()> {
    let df = df!(
        "country" => ["UK", "USA", "UK"],
        "cases" => [1, 2, 99],
    )?;
    let dupes = detect_duplicates(&df, Some(&["country".to_owned()]))?;
    assert_eq!(dupes.height(), 1);
    assert_eq!(dupes.column("cases")?.as_materialized_series().i32()?.get(0), Some(99));
    Ok(())
}

#[test]
fn test_remove_duplicates_keep_first_preserves_order() -> Result<()> {
    let df = df!(
        "country" => ["USA", "UK", "USA", "FR"],
        "cases" => [1, 2, 1, 4],
    )?;
    let out = remove_duplicates(&df, None, DuplicateKeep::First)?;
    let countries: Vec<Option<&str>> = out.column("country")?.as_materialized_series().str()?.into_iter().collect();
    assert_eq!(countries, vec![Some("USA"), Some("UK"), Some("FR")]);

    // Deduplication is idempotent.
    let again = remove_duplicates(&out, None, DuplicateKeep::First)?;
    assert!(again.equals(&out));
    Ok(())
}

#[test]
fn test_remove_duplicates_keep_none_drops_all_copies() -> Result<()> {
    let df = df!(
        "country" => ["UK", "USA", "UK"],
        "cases" => [1, 2, 1],
    )?;
    let out = remove_duplicates(&df, None, DuplicateKeep::None)?;
    assert_eq!(out.height(), 1);
    assert_eq!(out.column("country")?.as_materialized_series().str()?.get(0), Some("USA"));
    Ok(())
}

#[test]
fn test_convert_numeric_coerce_nulls_bad_values() -> Result<()> {
    let df = df!("cases" => ["1.5", "oops", "3"])?;
    let out = convert_type(&df, "cases", &ConvertTarget::Numeric, OnError::Coerce)?;

    let col = out.column("cases")?.as_materialized_series().f64()?;
    assert_eq!(col.get(0), Some(1.5));
    assert_eq!(col.get(1), None, "unparsable value becomes null");
    assert_eq!(col.get(2), Some(3.0));
    Ok(())
}

#[test]
fn test_convert_numeric_raise_fails_fast() {
    let df = df!("cases" => ["1.5", "oops"]).expect("frame");
    let err = convert_type(&df, "cases", &ConvertTarget::Numeric, OnError::Raise);
    assert!(matches!(err, Err(VitalsError::Conversion(_))));
}

#[test]
fn test_convert_numeric_ignore_leaves_column() -> Result<()> {
    let df = df!("cases" => ["1.5", "oops"])?;
    let out = convert_type(&df, "cases", &ConvertTarget::Numeric, OnError::Ignore)?;
    assert_eq!(out.column("cases")?.dtype(), &DataType::String);
    Ok(())
}

#[test]
fn test_convert_datetime_from_strings() -> Result<()> {
    let df = df!("date" => ["2024-01-02", "2024-02-03 10:30:00", "bad"])?;
    let out = convert_type(
        &df,
        "date",
        &ConvertTarget::Datetime { format: None },
        OnError::Coerce,
    )?;

    let col = out.column("date")?;
    assert!(col.dtype().is_temporal());
    assert_eq!(col.null_count(), 1, "only the bad value turns null");
    Ok(())
}

#[test]
fn test_convert_datetime_with_explicit_format() -> Result<()> {
    let df = df!("date" => ["02/01/2024"])?;
    let out = convert_type(
        &df,
        "date",
        &ConvertTarget::Datetime {
            format: Some("%d/%m/%Y".to_owned()),
        },
        OnError::Raise,
    )?;
    assert_eq!(out.column("date")?.null_count(), 0);
    Ok(())
}

#[test]
fn test_validate_range_mask_bounds_and_nulls() -> Result<()> {
    let df = df!("cases" => [Some(5.0), Some(10.0), Some(20.0), None])?;
    let mask = validate_range(&df, "cases", Some(10.0), Some(20.0))?;

    let flags: Vec<Option<bool>> = (&mask).into_iter().collect();
    assert_eq!(
        flags,
        vec![Some(false), Some(true), Some(true), Some(false)],
        "bounds are inclusive and nulls are never valid"
    );
    Ok(())
}

#[test]
fn test_validate_range_open_ended() -> Result<()> {
    let df = df!("cases" => [5.0, 15.0])?;
    let mask = validate_range(&df, "cases", Some(10.0), None)?;
    let flags: Vec<Option<bool>> = (&mask).into_iter().collect();
    assert_eq!(flags, vec![Some(false), Some(true)]);
    Ok(())
}

#[test]
fn test_detect_outliers_iqr_flags_extreme_value() -> Result<()> {
    let df = df!("cases" => [100.0, 105.0, 110.0, 115.0, 120.0, 1000.0])?;
    let mask = detect_outliers(&df, "cases", OutlierMethod::Iqr, 1.5)?;

    let flags: Vec<bool> = (&mask).into_iter().map(|v| v.unwrap_or(false)).collect();
    assert_eq!(
        flags,
        vec![false, false, false, false, false, true],
        "only 1000 lies outside the 1.5*IQR fences"
    );
    Ok(())
}

#[test]
fn test_detect_outliers_zscore_ignores_nulls() -> Result<()> {
    let df = df!("cases" => [Some(10.0), Some(10.0), Some(10.0), Some(10.0), None, Some(100.0)])?;
    let mask = detect_outliers(&df, "cases", OutlierMethod::ZScore, 2.0)?;

    let flags: Vec<bool> = (&mask).into_iter().map(|v| v.unwrap_or(false)).collect();
    assert!(!flags[4], "null rows are never flagged");
    assert!(flags[5], "the extreme value should be flagged");
    Ok(())
}

#[test]
fn test_detect_outliers_constant_column_has_none() -> Result<()> {
    let df = df!("cases" => [7.0, 7.0, 7.0])?;
    let mask = detect_outliers(&df, "cases", OutlierMethod::ZScore, 3.0)?;
    assert_eq!(mask.sum(), Some(0));
    Ok(())
}

#[test]
fn test_standardize_text_strip_lower_special() -> Result<()> {
    let df = df!("region" => ["  North-East!  ", "SOUTH WEST"])?;
    let out = standardize_text(
        &df,
        "region",
        &TextCleanOptions {
            strip: true,
            lowercase: true,
            remove_special: true,
        },
    )?;

    let col = out.column("region")?.as_materialized_series().str()?;
    assert_eq!(col.get(0), Some("northeast"));
    assert_eq!(col.get(1), Some("south west"));
    Ok(())
}

#[test]
fn test_standardize_text_individual_switches() -> Result<()> {
    let df = df!("region" => ["  MiXeD  "])?;
    let out = standardize_text(
        &df,
        "region",
        &TextCleanOptions {
            strip: true,
            ..Default::default()
        },
    )?;
    assert_eq!(out.column("region")?.as_materialized_series().str()?.get(0), Some("MiXeD"));
    Ok(())
}

#[test]
fn test_cleaner_detect_issues() -> Result<()> {
    let df = df!(
        "country" => ["UK", "UK", "USA"],
        "cases" => [Some(1.0), Some(1.0), None],
    )?;

    let issues = DataCleaner::new(df).detect_issues()?;
    assert_eq!(issues.duplicate_count, 1);
    assert_eq!(issues.missing.height(), 2);
    assert_eq!(issues.dtypes.len(), 2);
    assert_eq!(issues.dtypes[1].1, DataType::Float64);
    Ok(())
}

#[test]
fn test_cleaner_remove_outliers_and_filter_range() -> Result<()> {
    let df = df!("cases" => [100.0, 105.0, 110.0, 115.0, 120.0, 1000.0])?;
    let cleaner = DataCleaner::new(df)
        .remove_outliers("cases", OutlierMethod::Iqr, 1.5)?
        .filter_by_range("cases", Some(105.0), None)?;

    let out = cleaner.data();
    assert_eq!(out.height(), 4);
    assert_eq!(cleaner.operations().len(), 2);
    Ok(())
}
