//! Run a command over batches of data extracted from metadata streams.
//!
//! Data from the input metadata is written to a spool file, and the command
//! is invoked with that file as its last argument once the batch limits are
//! reached.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::Context;
use clap::Parser;

use arkimet::metadata::Metadata;

#[derive(Parser)]
#[command(
    name = "arki-xargs",
    about = "Run a command on batches of data from metadata streams"
)]
struct Args {
    /// Command (and fixed arguments) to run per batch.
    #[arg(required = true, num_args = 1.., allow_hyphen_values = true, last = true)]
    command: Vec<String>,

    /// Metadata bundle files; `-` reads standard input.
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// Maximum data bytes per batch.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_bytes: u64,

    /// Maximum records per batch.
    #[arg(long, default_value_t = 128)]
    max_count: usize,
}

struct Batch {
    path: PathBuf,
    file: File,
    bytes: u64,
    count: usize,
}

struct Batcher<'a> {
    args: &'a Args,
    batch: Option<Batch>,
    serial: u64,
    failed: bool,
}

impl<'a> Batcher<'a> {
    fn spool_path(&mut self) -> PathBuf {
        let dir = std::env::var("ARKI_TMPDIR").unwrap_or_else(|_| "/tmp".to_string());
        self.serial += 1;
        PathBuf::from(dir).join(format!(
            "arki-xargs.{}.{}",
            std::process::id(),
            self.serial
        ))
    }

    fn add(&mut self, md: &Metadata) -> anyhow::Result<()> {
        let data = md.get_data().context("reading datum")?;
        if self.batch.is_none() {
            let path = self.spool_path();
            let file =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            self.batch = Some(Batch {
                path,
                file,
                bytes: 0,
                count: 0,
            });
        }
        let batch = self.batch.as_mut().unwrap();
        batch.file.write_all(&data)?;
        batch.bytes += data.len() as u64;
        batch.count += 1;
        if batch.bytes >= self.args.max_bytes || batch.count >= self.args.max_count {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        let batch = match self.batch.take() {
            Some(batch) => batch,
            None => return Ok(()),
        };
        drop(batch.file);
        let result = (|| -> anyhow::Result<()> {
            if batch.count == 0 {
                return Ok(());
            }
            let mut command = Command::new(&self.args.command[0]);
            command.args(&self.args.command[1..]);
            command.arg(&batch.path);
            let status = command
                .status()
                .with_context(|| format!("running {}", self.args.command[0]))?;
            if !status.success() {
                eprintln!("arki-xargs: {} exited with {status}", self.args.command[0]);
                self.failed = true;
            }
            Ok(())
        })();
        let _ = std::fs::remove_file(&batch.path);
        result
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let mut batcher = Batcher {
        args,
        batch: None,
        serial: 0,
        failed: false,
    };

    let mut handle = |md: Metadata| -> arkimet::Result<bool> {
        if let Err(e) = batcher.add(&md) {
            eprintln!("arki-xargs: {e:#}");
            batcher.failed = true;
        }
        Ok(true)
    };

    if args.input.is_empty() {
        let stdin = std::io::stdin();
        Metadata::read_stream(&mut stdin.lock(), &mut handle)?;
    } else {
        for input in &args.input {
            if input.as_os_str() == "-" {
                let stdin = std::io::stdin();
                Metadata::read_stream(&mut stdin.lock(), &mut handle)?;
            } else {
                Metadata::read_file(input, &mut handle)?;
            }
        }
    }
    batcher.flush()?;
    Ok(!batcher.failed)
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
            eprintln!("arki-xargs: {e:#}");
            ExitCode::from(3)
        }
    }
}
