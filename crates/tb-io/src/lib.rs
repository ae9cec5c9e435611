#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use serde::Deserialize;
use tb_columnar::Vector;
use tb_frame::{Dataframe, FrameError};
use tb_types::Scalar;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("delimiter {0:?} is not a single ascii byte")]
    InvalidDelimiter(char),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: char,
    pub has_headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_headers: true,
        }
    }
}

impl CsvOptions {
    fn delimiter_byte(&self) -> Result<u8, IoError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(IoError::InvalidDelimiter(self.delimiter))
    }
}

pub fn read_csv_str(input: &str, options: &CsvOptions) -> Result<Dataframe, IoError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter_byte()?)
        .has_headers(options.has_headers)
        .from_reader(input.as_bytes());

    let mut records = Vec::new();
    let names: Vec<String> = if options.has_headers {
        let headers = reader.headers().cloned()?;
        if headers.is_empty() {
            return Err(IoError::MissingHeaders);
        }
        headers.iter().map(str::to_owned).collect()
    } else {
        let mut iter = reader.records();
        match iter.next() {
            Some(first) => {
                let first = first?;
                let names = (0..first.len()).map(|idx| format!("c{idx}")).collect();
                records.push(first);
                names
            }
            None => Vec::new(),
        }
    };
    for record in reader.records() {
        records.push(record?);
    }

    let mut columns: Vec<Vec<Scalar>> = names
        .iter()
        .map(|_| Vec::with_capacity(records.len()))
        .collect();
    for record in &records {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(parse_field(record.get(idx).unwrap_or_default()));
        }
    }

    debug!(rows = records.len(), columns = names.len(), "read csv");
    let vectors = names
        .iter()
        .zip(columns)
        .map(|(name, values)| Vector::new(name.as_str(), values))
        .collect();
    Ok(Dataframe::new(Some(vectors), None, Vec::new(), Some(names))?)
}

pub fn read_csv_path(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Dataframe, IoError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading csv");
    let text = std::fs::read_to_string(path)?;
    read_csv_str(&text, options)
}

pub fn write_csv_string(frame: &Dataframe, options: &CsvOptions) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter_byte()?)
        .from_writer(Vec::new());

    let names = frame.column_names();
    if options.has_headers {
        writer.write_record(names)?;
    }
    for row in frame.rows()? {
        writer.write_record(names.iter().map(|name| csv_field(row.get(name))))?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Rows as a JSON array of objects, fields in column order.
pub fn write_json_string(frame: &Dataframe) -> Result<String, IoError> {
    Ok(serde_json::to_string(frame.rows()?)?)
}

/// Renders rows as a plain console table: a header line, a dashed rule
/// under each column, then one left-aligned line per row.
pub fn render_table(frame: &Dataframe) -> Result<String, IoError> {
    let names = frame.column_names();
    let cells: Vec<Vec<String>> = frame
        .rows()?
        .iter()
        .map(|row| names.iter().map(|name| row.get(name).to_string()).collect())
        .collect();

    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            cells
                .iter()
                .map(|line| line[idx].chars().count())
                .fold(name.chars().count(), usize::max)
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, names.iter().map(String::as_str), &widths);
    let rules: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    push_line(&mut out, rules.iter().map(String::as_str), &widths);
    for line in &cells {
        push_line(&mut out, line.iter().map(String::as_str), &widths);
    }
    Ok(out)
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (idx, (cell, &width)) in cells.zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        // Writing into a String cannot fail.
        let _ = write!(line, "{cell:<width$}");
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Int64, then Float64, then Bool, else text. Blank fields are Null.
fn parse_field(field: &str) -> Scalar {
    let field = field.trim();
    if field.is_empty() {
        return Scalar::Null;
    }
    field
        .parse::<i64>()
        .map(Scalar::Int64)
        .or_else(|_| field.parse::<f64>().map(Scalar::Float64))
        .or_else(|_| field.parse::<bool>().map(Scalar::Bool))
        .unwrap_or_else(|_| Scalar::from(field))
}

/// Missing values (Null and NaN) are written as empty fields.
fn csv_field(scalar: &Scalar) -> String {
    if scalar.is_missing() {
        String::new()
    } else {
        scalar.to_string()
    }
}
