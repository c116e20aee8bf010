mod commands;
mod logging;
mod output;
mod progress;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, OutputFormat};
use dotenv::dotenv;
use hashkeeper_core::config::{load_configuration, load_configuration_from};
use hashkeeper_core::engine::DEFAULT_TIMELINE_LIMIT;
use hashkeeper_core::{AppConfig, Error, HashAlgorithm, ScanEngine, ScanProgress};
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();
    let args = Cli::parse();

    let config = match args.config.as_deref() {
        Some(path) => load_configuration_from(path),
        None => load_configuration(),
    };
    let mut config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(command: Commands, mut config: AppConfig) -> Result<()> {
    match command {
        Commands::Scan {
            root,
            algorithm,
            noise_filter,
            baseline,
        } => {
            let root = canonical_root(&root)?;
            let engine = open_engine(&config, algorithm, noise_filter)?;
            scan_and_wait(&engine, &root)?;
            if let Some(description) = baseline {
                let id = engine.create_snapshot(&description, &root)?;
                info!("Baseline {} saved as snapshot #{}", description.cyan(), id);
            }
        }
        Commands::Compare {
            root,
            algorithm,
            noise_filter,
            format,
        } => {
            let root = canonical_root(&root)?;
            let engine = open_engine(&config, algorithm, noise_filter)?;
            scan_and_wait(&engine, &root)?;
            let comparison = engine.compare_with_summary(&root)?;
            match format {
                OutputFormat::Json => output::write_json(&comparison.entries, io::stdout().lock())?,
                _ => output::print_comparison(&comparison),
            }
        }
        Commands::Watch {
            root,
            interval,
            ticks,
            algorithm,
            noise_filter,
        } => {
            if let Some(secs) = interval {
                config.watchdog_interval_secs = secs;
            }
            let root = canonical_root(&root)?;
            let engine = open_engine(&config, algorithm, noise_filter)?;
            run_watch(&engine, &root, ticks)?;
        }
        Commands::Hash { files, algorithm } => {
            let engine = open_engine(&config, algorithm, false)?;
            let paths: Vec<PathBuf> = files.iter().map(|f| canonical_file(f)).collect();
            let mut failures = 0;
            for result in engine.compute_files(&paths)? {
                match result {
                    Ok(record) => println!("{}  {}", record.hash, record.path.display()),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{} {}", "✗".red(), e);
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} files could not be hashed", failures, paths.len());
            }
        }
        Commands::SaveHash {
            file,
            dest,
            algorithm,
        } => {
            let engine = open_engine(&config, algorithm, false)?;
            let record = engine.save_checksum(&canonical_file(&file), &dest)?;
            println!(
                "{} {} {} -> {}",
                "✓".green(),
                engine.algorithm(),
                record.hash,
                dest.display()
            );
        }
        Commands::Verify {
            file,
            checksum,
            algorithm,
        } => {
            let engine = open_engine(&config, algorithm, false)?;
            let verification = engine.verify_checksum(&canonical_file(&file), &checksum)?;
            if verification.matched {
                println!("{} MATCH ({})", "✓".green(), verification.algorithm);
            } else {
                println!(
                    "{} FAIL ({})\n  expected {}\n  actual   {}",
                    "✗".red().bold(),
                    verification.algorithm,
                    verification.expected,
                    verification.actual
                );
                bail!("{} does not match {}", file.display(), checksum.display());
            }
        }
        Commands::History {
            filter,
            limit,
            format,
            output: destination,
        } => {
            let engine = open_engine(&config, None, false)?;
            let limit = limit.unwrap_or(config.history_limit);
            let events = engine.query_history(filter.as_deref(), limit)?;
            let writer: Box<dyn Write> = match &destination {
                Some(path) => Box::new(
                    fs::File::create(path)
                        .with_context(|| format!("cannot create {}", path.display()))?,
                ),
                None => Box::new(io::stdout().lock()),
            };
            match format {
                OutputFormat::Table if destination.is_none() => {
                    output::print_history_table(&events)
                }
                OutputFormat::Table | OutputFormat::Csv => {
                    output::write_history_csv(&events, writer)?
                }
                OutputFormat::Json => output::write_json(&events, writer)?,
            }
            if let Some(path) = destination {
                info!("Exported {} events to {}", events.len(), path.display());
            }
        }
        Commands::Timeline { path, limit } => {
            let engine = open_engine(&config, None, false)?;
            let limit = limit.unwrap_or(DEFAULT_TIMELINE_LIMIT);
            let events = engine.file_timeline(&canonical_file(&path), limit)?;
            output::print_timeline(&events);
        }
        Commands::Duplicates { format } => {
            let engine = open_engine(&config, None, false)?;
            let groups = engine.list_duplicates()?;
            match format {
                OutputFormat::Json => output::write_json(&groups, io::stdout().lock())?,
                _ => output::print_duplicates(&groups),
            }
        }
        Commands::Stats => {
            let engine = open_engine(&config, None, false)?;
            output::print_stats(&engine.verification_stats()?);
        }
        Commands::Snapshots { root } => {
            let engine = open_engine(&config, None, false)?;
            let root = root.map(|r| canonical_file(&r));
            let mut rows = Vec::new();
            for snapshot in engine.list_snapshots(root.as_deref())? {
                let entries = engine.database().snapshot_entry_count(snapshot.id)?;
                rows.push((snapshot, entries));
            }
            output::print_snapshots(&rows);
        }
        Commands::DeleteSnapshot { id, yes } => {
            if !yes && !prompt_confirm(&format!("Delete snapshot #{id}?"), Some(false))? {
                return Ok(());
            }
            let engine = open_engine(&config, None, false)?;
            if engine.delete_snapshot(id)? {
                println!("Snapshot #{} deleted", id);
            } else {
                bail!("no snapshot with id {}", id);
            }
        }
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
        }
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            fs::write(&path, AppConfig::default().to_toml()?)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn open_engine(
    config: &AppConfig,
    algorithm: Option<HashAlgorithm>,
    noise_filter: bool,
) -> Result<ScanEngine> {
    let engine = ScanEngine::open(config.clone())
        .with_context(|| format!("cannot open database {}", config.db_path.display()))?;
    if let Some(algorithm) = algorithm {
        engine.set_algorithm(algorithm);
    }
    if noise_filter {
        engine.set_noise_filter(true);
    }
    Ok(engine)
}

fn scan_and_wait(engine: &ScanEngine, root: &Path) -> Result<()> {
    let rx = engine.progress();
    let scan_id = engine.start_scan(root)?;
    progress::follow_scan(&rx, scan_id)?;
    Ok(())
}

fn run_watch(engine: &ScanEngine, root: &Path, ticks: Option<u64>) -> Result<()> {
    scan_and_wait(engine, root)?;
    let rx = engine.progress();
    engine.set_watchdog(true)?;
    info!(
        "Watching {} every {}s",
        root.display(),
        engine.config().watchdog_interval().as_secs()
    );

    let mut rescans = 0u64;
    for message in rx.iter() {
        match message {
            ScanProgress::Skipped { path, reason, .. } => {
                warn!("Skipped {}: {}", path.display(), reason)
            }
            ScanProgress::Warning { message, .. } => warn!("{}", message),
            ScanProgress::Complete { summary, .. } => {
                progress::print_summary(&summary);
                match engine.compare_with_summary(root) {
                    Ok(comparison) => output::print_comparison(&comparison),
                    Err(Error::NoBaseline(_)) => {}
                    Err(e) => warn!("Comparison failed: {}", e),
                }
                rescans += 1;
                if ticks.is_some_and(|n| rescans >= n) {
                    break;
                }
            }
            ScanProgress::Started { .. } | ScanProgress::File { .. } => {}
        }
    }
    engine.set_watchdog(false)?;
    Ok(())
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    let root = fs::canonicalize(root).with_context(|| format!("cannot open {}", root.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(root)
}

/// Stored paths are absolute; fall back to the given path so the engine can
/// report the file as unreadable.
fn canonical_file(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
