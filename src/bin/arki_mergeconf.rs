//! Merge dataset configurations into one multi-section file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use arkimet::config::ConfigFile;
use arkimet::matcher::Matcher;

#[derive(Parser)]
#[command(
    name = "arki-mergeconf",
    about = "Merge dataset configurations into a single file"
)]
struct Args {
    /// Dataset directories or configuration files to merge.
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Keep only datasets whose `restrict` value appears in this list.
    #[arg(long)]
    restrict: Option<String>,
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let mut merged = ConfigFile::new();
    let mut failed = false;

    for source in &args.sources {
        let result: anyhow::Result<ConfigFile> = if source.is_dir() {
            let cfg = ConfigFile::read_file(&source.join("config"))
                .with_context(|| format!("{} has no dataset config", source.display()))?;
            // Rewrite the path to where the dataset actually lives.
            let mut fixed = ConfigFile::new();
            for section in cfg.sections() {
                let mut section = section.clone();
                section.set("path", source.to_string_lossy().into_owned());
                fixed.push(section);
            }
            Ok(fixed)
        } else {
            ConfigFile::read_file(source).map_err(Into::into)
        };
        match result {
            Ok(cfg) => merged.merge(cfg),
            Err(e) => {
                eprintln!("arki-mergeconf: {e:#}");
                failed = true;
            }
        }
    }

    if let Some(restrict) = &args.restrict {
        let allowed: Vec<&str> = restrict.split(',').map(str::trim).collect();
        let mut filtered = ConfigFile::new();
        for section in merged.sections() {
            let keep = match section.get("restrict") {
                Some(value) => value.split(',').map(str::trim).any(|v| allowed.contains(&v)),
                None => false,
            };
            if keep {
                filtered.push(section.clone());
            }
        }
        merged = filtered;
    }

    // Sanity: filters must parse with the loaded aliases.
    arkimet::runtime::Runtime::get().load_aliases_from_env()?;
    for section in merged.sections() {
        if let Some(filter) = section.get("filter") {
            if let Err(e) = Matcher::parse(filter) {
                eprintln!("arki-mergeconf: [{}] filter: {e}", section.name);
                failed = true;
            }
        }
    }

    print!("{merged}");
    Ok(!failed)
}

fn main() -> ExitCode {
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
            eprintln!("arki-mergeconf: {e:#}");
            ExitCode::from(3)
        }
    }
}
