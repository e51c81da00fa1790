//! Encore CLI - Command-line tool for Rocksmith song packages.
//!
//! This is the main entry point for the Encore command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use encore::prelude::*;
use encore::psarc::cipher::KEY_SIZE;

/// Encore - song package inspection and extraction tool
#[derive(Parser)]
#[command(name = "encore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header and table-of-contents details
    Info {
        #[command(flatten)]
        archive: ArchiveArgs,
    },

    /// List contents of a song package
    List {
        #[command(flatten)]
        archive: ArchiveArgs,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Extract files from a song package
    Extract {
        #[command(flatten)]
        archive: ArchiveArgs,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[derive(Args)]
struct ArchiveArgs {
    /// Path to the PSARC file
    #[arg(short, long, env = "INPUT_PSARC")]
    psarc: PathBuf,

    /// Table-of-contents key as 64 hex digits (defaults to the PC key)
    #[arg(long, env = "PSARC_KEY")]
    key: Option<String>,

    /// Reject entries whose hash does not match their name
    #[arg(long)]
    verify_hashes: bool,
}

impl ArchiveArgs {
    fn open(&self) -> Result<PsarcArchive> {
        let mut options = ArchiveOptions::default().verify_name_hashes(self.verify_hashes);
        if let Some(key) = &self.key {
            options = options.with_key(parse_key(key)?);
        }

        PsarcArchive::open_with(&self.psarc, options)
            .with_context(|| format!("Failed to open {}", self.psarc.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { archive } => {
            cmd_info(&archive)?;
        }
        Commands::List {
            archive,
            filter,
            detailed,
        } => {
            cmd_list(&archive, filter.as_deref(), detailed)?;
        }
        Commands::Extract {
            archive,
            output,
            filter,
        } => {
            cmd_extract(&archive, &output, filter.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_info(args: &ArchiveArgs) -> Result<()> {
    let archive = args.open()?;
    let header = archive.header();
    let flags = archive.flags();

    println!("Archive:        {}", archive.name());
    println!(
        "Version:        {}.{}",
        header.version_major(),
        header.version_minor()
    );
    println!("Compression:    {}", header.compression_method());
    println!("TOC length:     {} bytes", header.toc_length.get());
    println!("TOC entry size: {} bytes", header.toc_entry_size.get());
    println!("Block size:     {} bytes", header.block_size.get());
    println!(
        "Flags:          {:#x} (ignore case: {}, absolute paths: {}, encrypted TOC: {})",
        flags.bits(),
        flags.ignore_case(),
        flags.absolute_paths(),
        flags.encrypted_toc()
    );
    println!("Entries:        {}", archive.entry_count());
    println!("Chunks:         {}", archive.chunk_table().len());

    let total: u64 = archive.iter().map(|e| e.length()).sum();
    println!("Total size:     {} bytes", total);

    let mismatched = archive.iter().filter(|e| !e.name_hash_matches()).count();
    if mismatched > 0 {
        println!("Hash mismatch:  {} entries", mismatched);
    }

    Ok(())
}

fn cmd_list(args: &ArchiveArgs, filter: Option<&str>, detailed: bool) -> Result<()> {
    let archive = args.open()?;
    let pattern = compile_filter(filter)?;

    let mut count = 0;
    for entry in archive.iter() {
        if !filter_matches(pattern.as_ref(), entry.name()) {
            continue;
        }

        if detailed {
            println!(
                "{:>12} {:>6} {:>12} {} {}",
                entry.length(),
                entry.zindex(),
                entry.offset(),
                hex::encode(entry.hash()),
                entry.name()
            );
        } else {
            println!("{}", entry.name());
        }
        count += 1;
    }

    println!("\nTotal: {} entries", count);
    Ok(())
}

fn cmd_extract(args: &ArchiveArgs, output: &Path, filter: Option<&str>) -> Result<()> {
    println!("Opening song package: {}", args.psarc.display());

    let start = Instant::now();
    let archive = args.open()?;
    println!(
        "Loaded {} entries in {:?}",
        archive.entry_count(),
        start.elapsed()
    );

    let pattern = compile_filter(filter)?;
    let indices: Vec<usize> = archive
        .iter()
        .enumerate()
        .filter(|(_, e)| filter_matches(pattern.as_ref(), e.name()))
        .map(|(i, _)| i)
        .collect();

    println!("Extracting {} entries...", indices.len());

    let pb = ProgressBar::new(indices.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let start = Instant::now();
    let mut failures = 0usize;

    archive.extract_parallel(&indices, |_, entry, data| {
        let result = data
            .with_context(|| format!("Failed to decode {}", entry.name()))
            .and_then(|data| write_entry(output, &entry.output_path(), &data));

        match result {
            Ok(()) => debug!(entry = entry.name(), "extracted"),
            Err(e) => {
                warn!("{e:#}");
                pb.println(format!("error: {e:#}"));
                failures += 1;
            }
        }
        pb.inc(1);
    })?;

    pb.finish_with_message("Done");
    println!("Extraction completed in {:?}", start.elapsed());

    if failures > 0 {
        bail!("{} of {} entries failed to extract", failures, indices.len());
    }

    Ok(())
}

fn write_entry(output: &Path, relative: &Path, data: &[u8]) -> Result<()> {
    if relative.as_os_str().is_empty() {
        bail!("Entry name has no usable path component");
    }

    let path = output.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))
}

fn parse_key(key: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes = hex::decode(key.trim()).context("Key is not valid hex")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("Key must be {} bytes, got {}", KEY_SIZE, b.len()))
}

fn compile_filter(filter: Option<&str>) -> Result<Option<Pattern>> {
    filter
        .map(|f| Pattern::new(f).with_context(|| format!("Invalid filter pattern: {f}")))
        .transpose()
}

/// Match a name against a filter. A pattern without wildcards matches as a
/// substring.
fn filter_matches(pattern: Option<&Pattern>, name: &str) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let raw = pattern.as_str();
    if raw.contains(['*', '?', '[']) {
        pattern.matches_with(name, options)
    } else {
        name.to_lowercase().contains(&raw.to_lowercase())
    }
}
