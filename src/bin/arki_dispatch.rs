//! Dispatch metadata streams into the configured datasets.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use arkimet::config::ConfigFile;
use arkimet::dispatcher::{DispatchResult, Dispatcher};
use arkimet::metadata::Metadata;
use arkimet::runtime::Runtime;

#[derive(Parser)]
#[command(
    name = "arki-dispatch",
    about = "Dispatch metadata streams into datasets"
)]
struct Args {
    /// Dataset configuration.
    #[arg(long, env = "ARKI_CONFIG", required = true)]
    config: PathBuf,

    /// Metadata bundle files to dispatch; `-` reads standard input.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Echo the dispatched metadata (with ASSIGNEDDATASET) to stdout.
    #[arg(long)]
    emit: bool,
}

fn run(args: &Args) -> anyhow::Result<bool> {
    Runtime::get().load_aliases_from_env()?;
    Runtime::get().install_signal_handlers()?;

    let config = ConfigFile::read_file(&args.config).context("reading configuration")?;
    let mut dispatcher = Dispatcher::from_config(&config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut all_ok = true;

    for input in &args.inputs {
        let mut handle_md = |mut md: Metadata| -> arkimet::Result<bool> {
            match dispatcher.dispatch(&mut md)? {
                DispatchResult::Acquired(_) => {}
                DispatchResult::NotImported => all_ok = false,
                _ => all_ok = false,
            }
            if args.emit {
                md.write_bundle(&mut out)?;
            }
            Ok(true)
        };
        if input.as_os_str() == "-" {
            let stdin = std::io::stdin();
            Metadata::read_stream(&mut stdin.lock(), &mut handle_md)?;
        } else {
            Metadata::read_file(input, &mut handle_md)
                .with_context(|| format!("reading {}", input.display()))?;
        }
    }
    dispatcher.flush()?;

    let stats = dispatcher.stats();
    eprintln!(
        "imported: {} in error dataset: {} duplicates: {} not imported: {}",
        stats.successful, stats.in_error_dataset, stats.duplicates, stats.not_imported
    );
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
            eprintln!("arki-dispatch: {e:#}");
            ExitCode::from(3)
        }
    }
}
