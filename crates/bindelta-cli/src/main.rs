use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info};

use bindelta::{PatchApplier, PatchHeader, ScriptDecoder, create_patch};

#[derive(Parser)]
#[command(
    name = "bindelta",
    about = "Compute and apply compact binary deltas",
    version,
    long_about = "Computes bsdiff-style binary patches between two files and applies them. \
                  Patch application streams in bounded chunks, so arbitrarily large files \
                  can be patched without loading them into memory."
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a patch turning OLD into NEW
    Diff {
        /// Original file
        old: PathBuf,
        /// Target file
        new: PathBuf,
        /// Patch file to write
        patch: PathBuf,
    },
    /// Apply a patch to OLD, writing the result to NEW
    Patch {
        /// Original file
        old: PathBuf,
        /// Output file to create
        new: PathBuf,
        /// Patch file to apply
        patch: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Diff { old, new, patch } => run_diff(&old, &new, &patch),
        Commands::Patch { old, new, patch } => run_patch(&old, &new, &patch),
    }
}

fn run_diff(old_path: &Path, new_path: &Path, patch_path: &Path) -> anyhow::Result<()> {
    let old = std::fs::read(old_path)
        .with_context(|| format!("failed to read {}", old_path.display()))?;
    let new = std::fs::read(new_path)
        .with_context(|| format!("failed to read {}", new_path.display()))?;

    let patch = create_patch(&old, &new)
        .with_context(|| format!("failed to diff {} -> {}", old_path.display(), new_path.display()))?;

    write_atomically(patch_path, &patch)?;
    info!(
        "wrote {} byte patch for {} -> {} bytes",
        patch.len(),
        old.len(),
        new.len()
    );
    Ok(())
}

fn run_patch(old_path: &Path, new_path: &Path, patch_path: &Path) -> anyhow::Result<()> {
    let patch_file = File::open(patch_path)
        .with_context(|| format!("failed to open {}", patch_path.display()))?;
    let patch_len = patch_file.metadata()?.len();
    let mut patch_reader = BufReader::new(patch_file);

    let header = PatchHeader::read(&mut patch_reader)
        .with_context(|| format!("corrupt patch {}", patch_path.display()))?;
    debug!(
        "patch header: old={} new={} payload={}",
        header.old_size, header.new_size, header.payload_size
    );
    if patch_len != bindelta::HEADER_SIZE as u64 + header.payload_size as u64 {
        bail!(
            "corrupt patch {}: payload size field disagrees with file length",
            patch_path.display()
        );
    }

    let mut old_file = File::open(old_path)
        .with_context(|| format!("failed to open {}", old_path.display()))?;
    let old_len = old_file.metadata()?.len();
    if old_len != header.old_size as u64 {
        bail!(
            "{} is {} bytes but the patch was made against {} bytes",
            old_path.display(),
            old_len,
            header.old_size
        );
    }

    let mut decoder = ScriptDecoder::new(patch_reader, header.payload_size as u64)?;

    // Write through a temp file and rename so a failed apply never leaves a
    // partial output in place.
    let dir = new_path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    let mut sink = BufWriter::new(tmp);

    PatchApplier::new()
        .apply(
            &mut old_file,
            old_len,
            &mut decoder,
            &mut sink,
            header.new_size as u64,
        )
        .with_context(|| format!("failed to apply {}", patch_path.display()))?;

    sink.flush()?;
    let tmp = sink
        .into_inner()
        .context("failed to flush output file")?;
    tmp.persist(new_path)
        .with_context(|| format!("failed to write {}", new_path.display()))?;

    info!("reconstructed {} ({} bytes)", new_path.display(), header.new_size);
    Ok(())
}

fn write_atomically(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
