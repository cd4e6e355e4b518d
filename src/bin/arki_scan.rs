//! Scan data files and emit their metadata, or dispatch them to datasets.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use arkimet::config::ConfigFile;
use arkimet::dispatcher::{DispatchResult, Dispatcher};
use arkimet::metadata::formatter::BasicFormatter;
use arkimet::runtime::Runtime;
use arkimet::segment;

#[derive(Parser)]
#[command(name = "arki-scan", about = "Scan data files and emit their metadata")]
struct Args {
    /// Files to scan, as `path` or `format:path`.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Dispatch into the datasets described by this configuration.
    #[arg(long, env = "ARKI_CONFIG")]
    dispatch: Option<PathBuf>,

    /// Print metadata as YAML instead of binary bundles.
    #[arg(long)]
    yaml: bool,

    /// Print metadata as JSON.
    #[arg(long)]
    json: bool,

    /// Annotate YAML output with human-readable descriptions.
    #[arg(long)]
    annotate: bool,
}

fn split_input(input: &str) -> anyhow::Result<(String, PathBuf)> {
    if let Some((format, path)) = input.split_once(':') {
        if segment::format_from_ext(format).is_some() {
            return Ok((
                segment::format_from_ext(format).unwrap().to_string(),
                PathBuf::from(path),
            ));
        }
    }
    let path = PathBuf::from(input);
    let format = segment::format_from_path(&path)
        .with_context(|| format!("cannot tell the format of {input}"))?;
    Ok((format.to_string(), path))
}

fn run(args: &Args) -> anyhow::Result<bool> {
    Runtime::get().load_aliases_from_env()?;
    Runtime::get().install_signal_handlers()?;

    let mut dispatcher = match &args.dispatch {
        Some(path) => Some(Dispatcher::from_config(
            &ConfigFile::read_file(path).context("reading dispatch configuration")?,
        )?),
        None => None,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let formatter = BasicFormatter;
    let mut all_ok = true;

    for input in &args.inputs {
        let (format, path) = split_input(input)?;
        let coll = arkimet::scan::scan_file(&path, &format)
            .with_context(|| format!("scanning {}", path.display()))?;
        for md in coll {
            let mut md = md;
            if let Some(dispatcher) = &mut dispatcher {
                match dispatcher.dispatch(&mut md)? {
                    DispatchResult::Acquired(_) => {}
                    DispatchResult::NotImported => all_ok = false,
                    _ => all_ok = false,
                }
            }
            if args.yaml {
                let annotate = args.annotate.then_some(&formatter as &dyn arkimet::metadata::Formatter);
                out.write_all(md.to_yaml(annotate).as_bytes())?;
            } else if args.json {
                serde_json::to_writer(&mut out, &md.to_structured())?;
                out.write_all(b"\n")?;
            } else {
                md.write_bundle(&mut out)?;
            }
        }
    }
    if let Some(dispatcher) = &mut dispatcher {
        dispatcher.flush()?;
        let stats = dispatcher.stats();
        eprintln!(
            "imported: {} in error dataset: {} duplicates: {} not imported: {}",
            stats.successful, stats.in_error_dataset, stats.duplicates, stats.not_imported
        );
    }
    Ok(all_ok)
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
            eprintln!("arki-scan: {e:#}");
            ExitCode::from(3)
        }
    }
}
