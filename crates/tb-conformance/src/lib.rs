#![forbid(unsafe_code)]

//! Fixtures and the grouped-summary pipeline behind the `tb-pipeline` binary.
//!
//! The pipeline is the canonical end-to-end use of the engine: load a table,
//! drop incomplete rows, optionally enrich it through a natural join, group,
//! summarize one value column, sort and truncate.

use std::path::{Path, PathBuf};

use tb_frame::{Dataframe, FrameError, Summaries, count, mean, sum};
use tb_io::{
    CsvOptions, IoError, read_csv_path, read_csv_str, render_table, write_csv_string,
    write_json_string,
};
use tb_join::{JoinError, JoinOn, left_join};
use thiserror::Error;
use tracing::debug;

pub const GAPMINDER_SAMPLE: &str = include_str!("../fixtures/gapminder_sample.csv");
pub const REGIONS_SAMPLE: &str = include_str!("../fixtures/regions.csv");

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Join(#[from] JoinError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "table" => Some(Self::Table),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Rows missing a value in any of these columns are dropped.
    pub required: Vec<String>,
    pub group_by: Vec<String>,
    /// Column summarized as `mean_<value>` and `sum_<value>`; every group
    /// also gets a row count `n`.
    pub value: Option<String>,
    /// Sort keys; `-` prefix for descending.
    pub sort: Vec<String>,
    pub limit: Option<usize>,
}

pub fn gapminder_sample() -> Result<Dataframe, IoError> {
    read_csv_str(GAPMINDER_SAMPLE, &CsvOptions::default())
}

pub fn regions_sample() -> Result<Dataframe, IoError> {
    read_csv_str(REGIONS_SAMPLE, &CsvOptions::default())
}

/// Path of a file under this crate's `fixtures/` directory.
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

pub fn load(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Dataframe, PipelineError> {
    Ok(read_csv_path(path, options)?)
}

pub fn run_pipeline(
    frame: &Dataframe,
    lookup: Option<&Dataframe>,
    config: &PipelineConfig,
) -> Result<Dataframe, PipelineError> {
    if let Some(missing) = config.required.iter().find(|name| !frame.has_column(name)) {
        return Err(FrameError::MissingColumn(missing.clone()).into());
    }
    let complete = frame.filter(|row| {
        config
            .required
            .iter()
            .all(|name| !row.get(name).is_missing())
    })?;

    let enriched = match lookup {
        Some(lookup) => left_join(&complete, lookup, JoinOn::Natural)?,
        None => complete,
    };

    let mut fields = Summaries::new();
    if let Some(value) = &config.value {
        fields = fields
            .with(format!("mean_{value}"), mean(value.as_str()))
            .with(format!("sum_{value}"), sum(value.as_str()));
    }
    fields = fields.with("n", count());

    let summary = enriched.group_by(&config.group_by)?.summarize(&fields)?;
    let sorted = summary.sort(&config.sort)?;
    let out = match config.limit {
        Some(limit) => sorted.head(limit)?,
        None => sorted,
    };

    debug!(
        rows_in = frame.count()?,
        rows_out = out.count()?,
        groups = ?config.group_by,
        "pipeline finished"
    );
    Ok(out)
}

pub fn render(frame: &Dataframe, format: OutputFormat) -> Result<String, IoError> {
    match format {
        OutputFormat::Table => render_table(frame),
        OutputFormat::Json => write_json_string(frame),
        OutputFormat::Csv => write_csv_string(frame, &CsvOptions::default()),
    }
}

#[cfg(test)]
mod tests {
    use tb_frame::Scalar;

    use super::{OutputFormat, PipelineConfig, fixture_path, gapminder_sample, run_pipeline};

    #[test]
    fn gapminder_fixture_loads() {
        let frame = gapminder_sample().expect("fixture");
        assert_eq!(frame.count().expect("count"), 8);
        assert_eq!(
            frame.column_names(),
            ["country", "region", "year", "population", "life", "income"]
        );
    }

    #[test]
    fn fixture_path_points_into_the_crate() {
        assert!(fixture_path("gapminder_sample.csv").is_file());
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn ungrouped_pipeline_counts_every_complete_row() {
        let frame = gapminder_sample().expect("fixture");
        let config = PipelineConfig {
            required: vec!["population".into(), "life".into()],
            ..PipelineConfig::default()
        };
        let out = run_pipeline(&frame, None, &config).expect("pipeline");
        assert_eq!(out.column_names(), ["n"]);
        assert_eq!(out.rows().expect("rows")[0]["n"], Scalar::Int64(6));
    }
}
