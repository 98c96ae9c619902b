//! treesnap - Point-in-time ownership and metadata snapshots of directory trees.
//!
//! Usage:
//!   treesnap [PATH]                  Snapshot PATH and print JSON to stdout
//!   treesnap [PATH] -o FILE          Write the snapshot to FILE
//!   treesnap --config FILE           Load scan settings from a TOML file
//!   treesnap --help                  Show help

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use treesnap_core::SnapshotReport;
use treesnap_scan::{ScanConfig, ScanError, Snapshot, TreeWalker};

#[derive(Parser)]
#[command(
    name = "treesnap",
    version,
    about = "Point-in-time ownership and metadata snapshots of directory trees",
    long_about = "treesnap walks a directory tree and records every file and directory \
                  with its size, timestamps and owner, including the entries of compressed \
                  files.\n\n\
                  Owners come from embedded document metadata when the format carries an \
                  author, and from the filesystem otherwise."
)]
struct Cli {
    /// Directory to snapshot (defaults to the configured root, or the current directory)
    path: Option<PathBuf>,

    /// Write the JSON snapshot to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load scan settings from a TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directories listed concurrently (0 = auto-detect)
    #[arg(long)]
    dirs: Option<usize>,

    /// Concurrent blocking filesystem operations (0 = auto-detect)
    #[arg(long)]
    io: Option<usize>,

    /// Attempts for owner lookups that fail transiently
    #[arg(long)]
    retries: Option<u32>,

    /// Do not resolve owners of directories
    #[arg(long)]
    no_dir_owners: bool,

    /// Follow symbolic links to directories
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("Failed to start async runtime")?;

    let snapshot = runtime.block_on(run_scan(config))?;

    let report = SnapshotReport::from_snapshot(&snapshot);
    let json = report.to_json_pretty()?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, &json)
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Snapshot written to {}", path.display());
        }
        None => println!("{json}"),
    }

    print_summary(&snapshot);
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => match ScanConfig::default_config_path().filter(|p| p.is_file()) {
            Some(path) => read_config(&path)?,
            None => ScanConfig::new("."),
        },
    };

    if let Some(path) = &cli.path {
        config.root = path.clone();
    }
    if let Some(dirs) = cli.dirs {
        config.max_concurrent_dirs = dirs;
    }
    if let Some(io) = cli.io {
        config.io_concurrency = io;
    }
    if let Some(retries) = cli.retries {
        config.retry.max_attempts = retries;
    }
    if cli.no_dir_owners {
        config.resolve_directory_owners = false;
    }
    if cli.follow_symlinks {
        config.follow_symlinks = true;
    }

    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<ScanConfig> {
    ScanConfig::from_toml_file(path)
        .wrap_err_with(|| format!("Failed to load config from {}", path.display()))
}

async fn run_scan(config: ScanConfig) -> Result<Snapshot> {
    let root = config.root.clone();
    let walker = TreeWalker::new(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping scan...");
            on_signal.cancel();
        }
    });

    eprintln!("Scanning {}...", root.display());
    match walker.scan(&cancel).await {
        Ok(snapshot) => Ok(snapshot),
        Err(ScanError::Interrupted) => bail!("Scan of {} was interrupted", root.display()),
        Err(e) => Err(e).wrap_err_with(|| format!("Failed to scan {}", root.display())),
    }
}

fn print_summary(snapshot: &Snapshot) {
    let stats = &snapshot.stats;

    eprintln!();
    eprintln!("{}", snapshot.root_path.display());
    eprintln!("{}", "─".repeat(60));
    eprintln!("Total size:  {}", format_size(stats.total_size));
    eprintln!(
        "Contents:    {} files, {} directories, {} archive entries",
        stats.total_files, stats.total_dirs, stats.archive_entries
    );
    eprintln!(
        "Owners:      {} resolved, {} unknown, {} transient, {} unretrievable",
        stats.owners_resolved,
        stats.owners_unknown,
        stats.owners_transient,
        stats.owners_unretrievable
    );
    eprintln!("Scan time:   {}", format_duration(snapshot.scan_duration));

    if snapshot.has_warnings() {
        eprintln!("Warnings:    {}", snapshot.warnings.len());
    }

    let transient = snapshot.transient_owner_paths();
    if !transient.is_empty() {
        eprintln!();
        eprintln!("Owner lookups still failing after retries:");
        for path in transient.iter().take(20) {
            eprintln!("  {}", path.display());
        }
        if transient.len() > 20 {
            eprintln!("  ... and {} more", transient.len() - 20);
        }
    }
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else {
        format!("{secs:.2}s")
    }
}
