//! Processes a tree of consumption exports and prints the rollups.
//!
//! ```text
//! cargo run --example consumption_report -- <export-dir> [--delimiter ';'] [--year 2024] [--italian] [--json out.json]
//! ```
//!
//! Every subdirectory whose name contains `Consumi` is scanned for `.csv`
//! files. Exits with status 1 when reconciliation fails.

use anyhow::{bail, Context};
use consumption_rollup::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

struct Options {
    base: PathBuf,
    delimiter: u8,
    year: Option<i32>,
    italian: bool,
    json: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Options> {
    let mut args = std::env::args().skip(1);
    let mut options = Options {
        base: PathBuf::new(),
        delimiter: b',',
        year: None,
        italian: false,
        json: None,
    };
    let mut base = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--delimiter" => {
                let value = args.next().context("--delimiter needs a value")?;
                match value.as_bytes() {
                    [byte] => options.delimiter = *byte,
                    _ => bail!("delimiter must be a single byte, got '{}'", value),
                }
            }
            "--year" => {
                let value = args.next().context("--year needs a value")?;
                options.year = Some(value.parse().with_context(|| format!("invalid year '{}'", value))?);
            }
            "--italian" => options.italian = true,
            "--json" => options.json = Some(PathBuf::from(args.next().context("--json needs a path")?)),
            other if base.is_none() => base = Some(PathBuf::from(other)),
            other => bail!("unexpected argument '{}'", other),
        }
    }

    options.base = base.context("usage: consumption_report <export-dir> [options]")?;
    Ok(options)
}

fn discover_sources(base: &Path) -> anyhow::Result<Vec<SourceFile>> {
    let mut directories: Vec<PathBuf> = fs::read_dir(base)
        .with_context(|| format!("cannot read {}", base.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains("Consumi"))
        })
        .collect();
    directories.sort();

    let mut sources = Vec::new();
    for directory in directories {
        let mut files: Vec<PathBuf> = fs::read_dir(&directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("csv"))
            .collect();
        files.sort();
        sources.extend(files.iter().map(|path| SourceFile::from_path(path)));
    }
    Ok(sources)
}

fn read_csv(source: &SourceFile, delimiter: u8) -> Result<Vec<RawRow>> {
    let to_error = |e: csv::Error| ConsumptionError::SourceRead {
        source_name: source.name.clone(),
        details: e.to_string(),
    };

    let file = File::open(&source.name)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader.headers().map_err(to_error)?.iter().map(str::to_string).collect();
    let records = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(to_error)?;

    Ok(rows_from_table(&headers, records))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_args()?;
    let mut config = PipelineConfig::default();
    config.default_year = options.year;
    if options.italian {
        config.month_names = MonthNames::Italian;
    }

    let sources = discover_sources(&options.base)?;
    if sources.is_empty() {
        bail!("no *Consumi* directories with CSV files under {}", options.base.display());
    }

    let delimiter = options.delimiter;
    let reader = move |source: &SourceFile| read_csv(source, delimiter);
    let output = ConsumptionPipeline::new(&config).run_from_source(&reader, &sources)?;

    println!("{}\n", output.diagnostics.summary());
    println!("{}", output.aggregates.to_markdown());
    println!("{}", output.summary_report(&config).render_text());
    println!("{}", output.validation.summary());

    if let Some(path) = &options.json {
        fs::write(path, output.records_to_json()?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("Leaf records written to {}", path.display());
    }

    std::process::exit(output.validation.exit_code());
}
