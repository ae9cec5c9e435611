#![forbid(unsafe_code)]

//! End-to-end scenarios across construction, transforms, aggregation, joins
//! and the I/O boundary.

use tb_conformance::{
    OutputFormat, PipelineConfig, PipelineError, fixture_path, gapminder_sample, load,
    regions_sample, render, run_pipeline,
};
use tb_frame::{Dataframe, FrameError, Mutations, Summaries, count, first, max, mean, min, row};
use tb_io::CsvOptions;
use tb_join::{Join, JoinOn};
use tb_types::Scalar;

fn approx(value: &Scalar, expected: f64) -> bool {
    matches!(value, Scalar::Float64(v) if (v - expected).abs() < 1e-9)
}

// ---------------------------------------------------------------------------
// Scenario 1: natural join over the documented left/right pair
// ---------------------------------------------------------------------------

#[test]
fn scenario_natural_join_modes() {
    let left = Dataframe::from_rows(vec![
        row! { "id" => 1, "name" => "a" },
        row! { "id" => 2, "name" => "b" },
    ])
    .expect("left");
    let right = Dataframe::from_rows(vec![
        row! { "id" => 1, "score" => 10 },
        row! { "id" => 1, "score" => 20 },
        row! { "id" => 3, "score" => 30 },
    ])
    .expect("right");

    let joined = left.left_join(&right, JoinOn::Natural).expect("left join");
    let rows = joined.rows().expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["name"], Scalar::from("b"));
    assert!(rows[2]["score"].is_null());

    let inner = left.inner_join(&right, JoinOn::Natural).expect("inner join");
    assert_eq!(inner.rows().expect("rows"), &rows[..2]);

    let full = left.full_join(&right, JoinOn::Natural).expect("full join");
    let full_rows = full.rows().expect("rows");
    assert_eq!(full_rows.len(), 4);
    assert_eq!(&full_rows[..3], rows);
    assert_eq!(full_rows[3], row! { "id" => 3, "name" => Scalar::Null, "score" => 30 });
    eprintln!("[TEST] scenario_natural_join_modes | left=3 inner=2 full=4 | PASS");
}

// ---------------------------------------------------------------------------
// Scenario 2: grouped mean, summarize vs mutate
// ---------------------------------------------------------------------------

#[test]
fn scenario_grouped_mean_summarize_and_broadcast() {
    let frame = Dataframe::from_rows(vec![
        row! { "g" => "x", "v" => 1 },
        row! { "g" => "x", "v" => 3 },
        row! { "g" => "y", "v" => 10 },
    ])
    .expect("frame");
    let grouped = frame.group_by(&["g"]).expect("grouped");

    let summary = grouped
        .summarize(&Summaries::new().with("avg", mean("v")))
        .expect("summarize");
    assert_eq!(
        summary.rows().expect("rows"),
        [row! { "g" => "x", "avg" => 2.0 }, row! { "g" => "y", "avg" => 10.0 }]
    );

    let broadcast = grouped
        .mutate(&Mutations::new().summary("avg", mean("v")))
        .expect("mutate");
    let avg: Vec<Scalar> = broadcast.column("avg").expect("avg").values().to_vec();
    assert_eq!(avg, [2.0, 2.0, 10.0].map(Scalar::from));
    eprintln!("[TEST] scenario_grouped_mean_summarize_and_broadcast | groups=2 | PASS");
}

// ---------------------------------------------------------------------------
// Scenario 3: gapminder pipeline, mirrors the CLI
// ---------------------------------------------------------------------------

#[test]
fn scenario_gapminder_life_expectancy_by_country() {
    let frame = gapminder_sample().expect("fixture");
    let config = PipelineConfig {
        required: vec!["country".into(), "population".into(), "life".into()],
        group_by: vec!["region".into(), "country".into()],
        value: Some("life".into()),
        sort: vec!["-mean_life".into()],
        limit: None,
    };
    let out = run_pipeline(&frame, None, &config).expect("pipeline");
    assert_eq!(
        out.column_names(),
        ["region", "country", "mean_life", "sum_life", "n"]
    );
    // Sorting the summary drops the remaining grouping level.
    assert!(out.group_names().is_empty());

    let rows = out.rows().expect("rows");
    let countries: Vec<&Scalar> = rows.iter().map(|row| &row["country"]).collect();
    assert_eq!(
        countries,
        [
            &Scalar::from("Japan"),
            &Scalar::from("France"),
            &Scalar::from("India"),
            &Scalar::from("Chad")
        ]
    );
    assert!(approx(&rows[0]["mean_life"], 82.0));
    assert!(approx(&rows[1]["mean_life"], 80.4));
    assert_eq!(rows[2]["n"], Scalar::Int64(1));
    eprintln!("[TEST] scenario_gapminder_life_expectancy_by_country | groups=4 | PASS");
}

#[test]
fn scenario_pipeline_with_lookup_and_limit() {
    let frame = gapminder_sample().expect("fixture");
    let regions = regions_sample().expect("regions");
    let config = PipelineConfig {
        required: vec!["life".into()],
        group_by: vec!["continent_name".into()],
        value: Some("income".into()),
        sort: vec!["-n".into()],
        limit: Some(2),
    };
    let out = run_pipeline(&frame, Some(&regions), &config).expect("pipeline");
    let rows = out.rows().expect("rows");
    assert_eq!(rows.len(), 2);
    // asia keeps 4 rows; europe 2; africa's surviving row has no continent.
    assert_eq!(rows[0], row! {
        "continent_name" => "Asia",
        "mean_income" => 17_675.0,
        "sum_income" => 70_700,
        "n" => 4,
    });
    assert_eq!(rows[1]["continent_name"], Scalar::from("Europe"));
}

#[test]
fn scenario_pipeline_rejects_unknown_required_column() {
    let frame = gapminder_sample().expect("fixture");
    let config = PipelineConfig {
        required: vec!["gdp".into()],
        ..PipelineConfig::default()
    };
    let err = run_pipeline(&frame, None, &config).expect_err("unknown column");
    assert!(matches!(
        err,
        PipelineError::Frame(FrameError::MissingColumn(name)) if name == "gdp"
    ));
}

// ---------------------------------------------------------------------------
// Scenario 4: CSV file in, JSON and table out
// ---------------------------------------------------------------------------

#[test]
fn scenario_file_to_json_rows() {
    let frame = load(fixture_path("gapminder_sample.csv"), &CsvOptions::default()).expect("load");
    let extremes = frame
        .group_by(&["region"])
        .and_then(|f| {
            f.summarize(
                &Summaries::new()
                    .with("first_country", first("country"))
                    .with("min_life", min("life"))
                    .with("max_life", max("life"))
                    .with("rows", count()),
            )
        })
        .expect("summarize");

    let json = render(&extremes, OutputFormat::Json).expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    assert_eq!(parsed[0]["region"], "asia");
    assert_eq!(parsed[0]["first_country"], "Japan");
    assert_eq!(parsed[0]["min_life"], 62.5);
    assert_eq!(parsed[2]["region"], "africa");
    assert_eq!(parsed[2]["min_life"], 50.6);
    assert_eq!(parsed[2]["rows"], 2);

    let table = render(&extremes, OutputFormat::Table).expect("table");
    let mut lines = table.lines();
    assert_eq!(
        lines.next(),
        Some("region  first_country  min_life  max_life  rows")
    );
    assert!(lines.next().is_some_and(|rule| rule.starts_with("------  ")));
    assert_eq!(table.lines().count(), 5);
    eprintln!("[TEST] scenario_file_to_json_rows | groups=3 | PASS");
}

// ---------------------------------------------------------------------------
// Scenario 5: a full chain never mutates its inputs
// ---------------------------------------------------------------------------

#[test]
fn scenario_chain_leaves_inputs_untouched() {
    let frame = gapminder_sample().expect("fixture");
    let before: Vec<_> = frame.rows().expect("rows").to_vec();

    let chained = frame
        .filter(|row| !row["population"].is_missing())
        .and_then(|f| {
            f.mutate(&Mutations::new().map("per_capita", |row| {
                row["income"].div(&row["population"])
            }))
        })
        .and_then(|f| f.select(["country", "year", "per_capita"]))
        .and_then(|f| f.sort(&["country", "-year"]))
        .expect("chain");

    assert_eq!(chained.count().expect("count"), 7);
    assert_eq!(chained.rows().expect("rows")[0]["country"], Scalar::from("Chad"));
    assert_eq!(chained.rows().expect("rows")[0]["year"], Scalar::Int64(2010));
    assert_eq!(frame.rows().expect("rows"), before.as_slice());
    assert_eq!(frame.column_names().len(), 6);
}
