//! Compress data segments, keeping them seekable through a block index.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use arkimet::metadata::Collection;
use arkimet::segment::{self, gz};

#[derive(Parser)]
#[command(
    name = "arki-gzip",
    about = "Compress data segments with a seekable block index"
)]
struct Args {
    /// Segment data files to compress (their `.metadata` sidecar provides
    /// the record boundaries).
    #[arg(required = true)]
    segments: Vec<PathBuf>,

    /// Records per compressed block.
    #[arg(long, default_value_t = gz::DEFAULT_GROUP_SIZE)]
    group: usize,
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let mut failed = false;
    for path in &args.segments {
        let result = (|| -> anyhow::Result<()> {
            let sidecar = segment::metadata_path(path);
            let coll = Collection::read_from_file(&sidecar)
                .with_context(|| format!("{} has no metadata sidecar", path.display()))?;
            gz::compress(path, &coll, args.group)
                .with_context(|| format!("compressing {}", path.display()))?;
            Ok(())
        })();
        if let Err(e) = result {
            eprintln!("arki-gzip: {e:#}");
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
            eprintln!("arki-gzip: {e:#}");
            ExitCode::from(3)
        }
    }
}
