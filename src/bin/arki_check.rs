//! Check dataset consistency and perform maintenance.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use arkimet::config::ConfigFile;
use arkimet::dataset::iseg::IsegChecker;
use arkimet::dataset::maintenance::{
    self, FullMaintenance, FullRepack, MaintenanceAgent, MaintenanceReport, RepackReport,
};
use arkimet::dataset::{DatasetConfig, DatasetKind};
use arkimet::runtime::Runtime;

#[derive(Parser)]
#[command(name = "arki-check", about = "Check datasets and fix inconsistencies")]
struct Args {
    /// Dataset configuration.
    #[arg(long, env = "ARKI_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset roots to check (with their `config` copy inside).
    datasets: Vec<PathBuf>,

    /// Apply the fixes instead of only reporting them.
    #[arg(short, long)]
    fix: bool,

    /// Limit the work to repack-equivalent actions.
    #[arg(short, long)]
    repack: bool,
}

fn gather(args: &Args) -> anyhow::Result<Vec<DatasetConfig>> {
    let mut configs = Vec::new();
    if let Some(path) = &args.config {
        let cfg = ConfigFile::read_file(path)?;
        for section in cfg.sections() {
            configs.push(DatasetConfig::from_section(section)?);
        }
    }
    for root in &args.datasets {
        let cfg = ConfigFile::read_file(&root.join("config"))
            .with_context(|| format!("{} has no dataset config", root.display()))?;
        for section in cfg.sections() {
            let mut ds = DatasetConfig::from_section(section)?;
            ds.path = root.clone();
            configs.push(ds);
        }
    }
    Ok(configs)
}

fn run(args: &Args) -> anyhow::Result<bool> {
    Runtime::get().install_signal_handlers()?;
    let configs = gather(args)?;
    if configs.is_empty() {
        anyhow::bail!("no datasets to check");
    }

    let mut clean = true;
    for ds in configs {
        if !matches!(ds.kind, DatasetKind::Iseg | DatasetKind::Ondisk2) {
            continue;
        }
        let checker = IsegChecker::open(&ds)?;
        let mut agent: Box<dyn MaintenanceAgent> = match (args.fix, args.repack) {
            (true, true) => Box::new(FullRepack::default()),
            (true, false) => Box::new(FullMaintenance::default()),
            (false, true) => Box::new(RepackReport::default()),
            (false, false) => Box::new(MaintenanceReport::default()),
        };
        let failures = maintenance::visit(&checker, agent.as_mut())?;
        let counters = agent.counters();
        println!(
            "{}: {} ok, {} rescanned, {} repacked, {} deindexed, {} archived, {} deleted, {} failed",
            ds.name,
            counters.ok,
            counters.rescanned,
            counters.repacked,
            counters.deindexed,
            counters.archived,
            counters.deleted,
            failures.len()
        );
        for (segment, error) in &failures {
            eprintln!("arki-check: {}:{segment}: {error}", ds.name);
        }
        if !failures.is_empty() {
            clean = false;
        }
    }
    Ok(clean)
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
            eprintln!("arki-check: {e:#}");
            ExitCode::from(3)
        }
    }
}
