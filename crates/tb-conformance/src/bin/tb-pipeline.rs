#![forbid(unsafe_code)]

use std::path::PathBuf;

use tb_conformance::{OutputFormat, PipelineConfig, load, render, run_pipeline};
use tb_io::CsvOptions;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut csv_path: Option<PathBuf> = None;
    let mut lookup_path: Option<PathBuf> = None;
    let mut config = PipelineConfig::default();
    let mut format = OutputFormat::default();
    let mut options = CsvOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csv" => {
                let value = args.next().ok_or("--csv requires a path")?;
                csv_path = Some(PathBuf::from(value));
            }
            "--lookup" => {
                let value = args.next().ok_or("--lookup requires a path")?;
                lookup_path = Some(PathBuf::from(value));
            }
            "--require" => {
                let value = args.next().ok_or("--require requires column names")?;
                config.required = split_list(&value);
            }
            "--group-by" => {
                let value = args.next().ok_or("--group-by requires column names")?;
                config.group_by = split_list(&value);
            }
            "--value" => {
                let value = args.next().ok_or("--value requires a column name")?;
                config.value = Some(value);
            }
            "--sort" => {
                let value = args.next().ok_or("--sort requires sort keys (e.g. -mean_life)")?;
                config.sort = split_list(&value);
            }
            "--limit" => {
                let value = args.next().ok_or("--limit requires a row count")?;
                config.limit = Some(value.parse()?);
            }
            "--format" => {
                let value = args.next().ok_or("--format requires table, json or csv")?;
                format = OutputFormat::parse(&value)
                    .ok_or_else(|| format!("unsupported output format: {value}"))?;
            }
            "--delimiter" => {
                let value = args.next().ok_or("--delimiter requires a character")?;
                let mut chars = value.chars();
                options.delimiter = match (chars.next(), chars.next()) {
                    (Some(delimiter), None) => delimiter,
                    _ => return Err(format!("delimiter must be one character: {value}").into()),
                };
            }
            "--no-headers" => {
                options.has_headers = false;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let csv_path = csv_path.ok_or("--csv is required")?;
    let frame = load(&csv_path, &options)?;
    let lookup = lookup_path
        .map(|path| load(path, &CsvOptions::default()))
        .transpose()?;

    let out = run_pipeline(&frame, lookup.as_ref(), &config)?;
    print!("{}", render(&out, format)?);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn print_help() {
    println!(
        "tb-pipeline\n\
         Usage:\n\
         \ttb-pipeline --csv data.csv [--require a,b] [--group-by a,b] [--value col] [--sort -col] [--format table|json|csv]\n\
         Options:\n\
         \t--csv <path>         Input table (required)\n\
         \t--lookup <path>      Left-join this table onto the input by shared column names\n\
         \t--require <cols>     Drop rows missing a value in any of these columns\n\
         \t--group-by <cols>    Grouping columns, outermost first\n\
         \t--value <col>        Column summarized as mean_<col> and sum_<col>\n\
         \t--sort <keys>        Sort keys; prefix with - for descending\n\
         \t--limit <n>          Keep the first n result rows\n\
         \t--format <fmt>       table (default), json or csv\n\
         \t--delimiter <c>      Input field delimiter (default ,)\n\
         \t--no-headers         Input has no header row; columns are named c0, c1, ...\n\
         \t-h, --help           Show this help\n\
         Logging is controlled by RUST_LOG (e.g. RUST_LOG=debug)."
    );
}
