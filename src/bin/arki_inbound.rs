//! Process an inbound directory: list, scan or dispatch the files waiting
//! there.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use arkimet::config::ConfigFile;
use arkimet::dispatcher::{DispatchResult, Dispatcher};
use arkimet::runtime::Runtime;
use arkimet::segment;

#[derive(Parser)]
#[command(name = "arki-inbound", about = "Process files waiting in an inbound directory")]
struct Args {
    /// Inbound directory.
    #[arg(long, env = "ARKI_INBOUND", required = true)]
    inbound: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the scannable files.
    List,
    /// Scan the files and emit their metadata to stdout.
    Scan,
    /// Dispatch the files into the configured datasets, removing the
    /// fully imported ones.
    Dispatch {
        #[arg(long, env = "ARKI_CONFIG", required = true)]
        config: PathBuf,
        /// Keep the inbound files after import.
        #[arg(long)]
        keep: bool,
    },
}

fn scannable_files(inbound: &PathBuf) -> anyhow::Result<Vec<(PathBuf, &'static str)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(inbound)
        .with_context(|| format!("listing {}", inbound.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(format) = segment::format_from_path(&path) {
            files.push((path, format));
        }
    }
    files.sort();
    Ok(files)
}

fn run(args: &Args) -> anyhow::Result<bool> {
    Runtime::get().load_aliases_from_env()?;
    Runtime::get().install_signal_handlers()?;
    let files = scannable_files(&args.inbound)?;
    let mut all_ok = true;

    match &args.command {
        Cmd::List => {
            for (path, format) in files {
                println!("{format}:{}", path.display());
            }
        }
        Cmd::Scan => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for (path, format) in files {
                let coll = arkimet::scan::scan_file(&path, format)
                    .with_context(|| format!("scanning {}", path.display()))?;
                for md in coll.iter() {
                    md.write_bundle(&mut out)?;
                }
            }
        }
        Cmd::Dispatch { config, keep } => {
            let config = ConfigFile::read_file(config).context("reading configuration")?;
            let mut dispatcher = Dispatcher::from_config(&config)?;
            for (path, format) in files {
                Runtime::get().check_shutdown()?;
                let coll = match arkimet::scan::scan_file(&path, format) {
                    Ok(coll) => coll,
                    Err(e) => {
                        eprintln!("arki-inbound: {}: {e}", path.display());
                        all_ok = false;
                        continue;
                    }
                };
                let mut file_ok = true;
                for md in coll {
                    let mut md = md;
                    match dispatcher.dispatch(&mut md)? {
                        DispatchResult::Acquired(_) => {}
                        _ => {
                            file_ok = false;
                            all_ok = false;
                        }
                    }
                }
                dispatcher.flush()?;
                if file_ok && !keep {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("removing {}", path.display()))?;
                }
            }
            let stats = dispatcher.stats();
            eprintln!(
                "imported: {} in error dataset: {} duplicates: {} not imported: {}",
                stats.successful, stats.in_error_dataset, stats.duplicates, stats.not_imported
            );
        }
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
            eprintln!("arki-inbound: {e:#}");
            ExitCode::from(3)
        }
    }
}
