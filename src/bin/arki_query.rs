//! Query datasets and print the matching metadata, data or summary.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use arkimet::config::ConfigFile;
use arkimet::dataset::{Pool, Reader as _};
use arkimet::index::DataQuery;
use arkimet::matcher::Matcher;
use arkimet::metadata::formatter::BasicFormatter;
use arkimet::runtime::Runtime;
use arkimet::summary::Summary;

#[derive(Parser)]
#[command(name = "arki-query", about = "Query datasets with a matcher expression")]
struct Args {
    /// The matcher expression; empty selects everything.
    query: String,

    /// Datasets to query (paths to dataset roots or config files).
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Configuration with the datasets to query.
    #[arg(long, env = "ARKI_CONFIG")]
    config: Option<PathBuf>,

    /// Print a summary of the matched data instead of the data.
    #[arg(long)]
    summary: bool,

    /// Print the raw data bytes instead of metadata records.
    #[arg(long)]
    data: bool,

    /// Inline the data into the metadata stream.
    #[arg(long)]
    inline: bool,

    /// Sort order, e.g. `reftime` or `month:-reftime,origin`.
    #[arg(long)]
    sort: Option<String>,

    /// Print metadata as YAML.
    #[arg(long)]
    yaml: bool,

    /// Annotate YAML output.
    #[arg(long)]
    annotate: bool,
}

/// Every dataset root or config file named on the command line, merged.
fn gather_config(args: &Args) -> anyhow::Result<ConfigFile> {
    let mut merged = ConfigFile::new();
    if let Some(path) = &args.config {
        merged.merge(ConfigFile::read_file(path)?);
    }
    for source in &args.sources {
        let config_path = source.join("config");
        if config_path.is_file() {
            // A dataset directory: adopt its config copy, fixing the path.
            let mut cfg = ConfigFile::read_file(&config_path)?;
            let mut fixed = ConfigFile::new();
            for section in cfg.sections() {
                let mut section = section.clone();
                section.set("path", source.to_string_lossy().into_owned());
                fixed.push(section);
            }
            cfg = fixed;
            merged.merge(cfg);
        } else if source.is_file() {
            // A plain data file: wrap it as a file dataset.
            let mut section =
                arkimet::config::Section::new(source.to_string_lossy().into_owned());
            section.set("type", "file");
            section.set("path", source.to_string_lossy().into_owned());
            let mut cfg = ConfigFile::new();
            cfg.push(section);
            merged.merge(cfg);
        } else {
            anyhow::bail!("{} is neither a dataset nor a file", source.display());
        }
    }
    Ok(merged)
}

fn run(args: &Args) -> anyhow::Result<bool> {
    Runtime::get().load_aliases_from_env()?;
    Runtime::get().install_signal_handlers()?;

    let matcher = Matcher::parse(&args.query).context("parsing query")?;
    let pool = Pool::from_config(gather_config(args)?)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let formatter = BasicFormatter;
    let mut failed = false;

    for ds in pool.datasets().to_vec() {
        let reader = match pool.reader(&ds.name) {
            Ok(reader) => reader,
            Err(e) => {
                eprintln!("arki-query: {}: {e}", ds.name);
                failed = true;
                continue;
            }
        };
        let result = if args.summary {
            let mut summary = Summary::new();
            reader
                .query_summary(&matcher, &mut summary)
                .map(|()| summary.write(&mut out))
                .and_then(|r| r)
        } else {
            let query = DataQuery {
                matcher: matcher.clone(),
                with_data: args.data || args.inline,
                sorter: args.sort.clone(),
            };
            reader.query_data(&query, &mut |md| {
                if args.data {
                    out.write_all(&md.get_data()?)?;
                } else if args.yaml {
                    let annotate = args
                        .annotate
                        .then_some(&formatter as &dyn arkimet::metadata::Formatter);
                    out.write_all(md.to_yaml(annotate).as_bytes())?;
                } else {
                    md.write_bundle(&mut out)?;
                }
                Ok(true)
            })
        };
        if let Err(e) = result {
            eprintln!("arki-query: {}: {e}", ds.name);
            failed = true;
        }
    }
    Ok(!failed)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("arki-query: {e:#}");
            ExitCode::from(3)
        }
    }
}
