use anyhow::Result;
use colored::*;
use hashkeeper_core::analysis::DiffSummary;
use hashkeeper_core::{
    Comparison, DiffStatus, DuplicateGroup, ResultLabel, ScanEvent, Snapshot, VerificationStats,
};
use serde::Serialize;
use std::io::Write;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn colored_label(label: ResultLabel) -> ColoredString {
    match label {
        ResultLabel::VerifiedMatch => label.as_str().green(),
        ResultLabel::VerifiedFail => label.as_str().red().bold(),
        ResultLabel::SavedHash => label.as_str().cyan(),
        ResultLabel::Computed | ResultLabel::AutoScan => label.as_str().normal(),
    }
}

// ── History ──────────────────────────────────────────────────────

pub fn print_history_table(events: &[ScanEvent]) {
    if events.is_empty() {
        println!("No history recorded.");
        return;
    }
    println!(
        "{:<6} {:<19} {:<16} {:<8} {:<18} {}",
        "ID".bold(),
        "TIME".bold(),
        "RESULT".bold(),
        "ALGO".bold(),
        "HASH".bold(),
        "PATH".bold()
    );
    for event in events {
        println!(
            "{:<6} {:<19} {:<16} {:<8} {:<18} {}",
            event.id.unwrap_or_default(),
            event.timestamp.format(TIME_FORMAT),
            colored_label(event.label),
            event.algorithm,
            abbreviate(&event.hash),
            event.path.display()
        );
    }
}

/// Flat row for CSV output; csv cannot serialize nested enums.
#[derive(Serialize)]
struct HistoryRow<'a> {
    id: Option<i64>,
    timestamp: String,
    path: String,
    hash: &'a str,
    result: &'static str,
    algorithm: &'static str,
}

pub fn write_history_csv<W: Write>(events: &[ScanEvent], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for event in events {
        wtr.serialize(HistoryRow {
            id: event.id,
            timestamp: event.timestamp.to_rfc3339(),
            path: event.path.display().to_string(),
            hash: &event.hash,
            result: event.label.as_str(),
            algorithm: event.algorithm.name(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(value: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}

pub fn print_timeline(events: &[ScanEvent]) {
    if events.is_empty() {
        println!("No events recorded for this path.");
        return;
    }
    let mut previous: Option<&str> = None;
    for event in events {
        let changed = previous.is_some_and(|p| p != event.hash);
        let marker = if changed { "*".yellow() } else { " ".normal() };
        println!(
            "{} {}  {:<16} {}",
            marker,
            event.timestamp.format(TIME_FORMAT),
            colored_label(event.label),
            event.hash
        );
        previous = Some(event.hash.as_str());
    }
}

// ── Baselines ────────────────────────────────────────────────────

pub fn print_comparison(comparison: &Comparison) {
    let snapshot = &comparison.snapshot;
    println!(
        "Baseline #{} '{}' ({})",
        snapshot.id,
        snapshot.description,
        snapshot.created_at.format(TIME_FORMAT)
    );
    for entry in &comparison.entries {
        let tag = match entry.status {
            DiffStatus::Added => "+ added   ".green(),
            DiffStatus::Modified => "~ modified".yellow(),
            DiffStatus::Removed => "- removed ".red(),
        };
        println!("  {} {}", tag, entry.path.display());
    }
    print_diff_summary(&comparison.summary);
}

pub fn print_diff_summary(summary: &DiffSummary) {
    if summary.is_clean() {
        println!("{} no drift ({} files unchanged)", "✓".green(), summary.unchanged);
    } else {
        println!(
            "{} {} added, {} modified, {} removed, {} unchanged",
            "!".yellow(),
            summary.added,
            summary.modified,
            summary.removed,
            summary.unchanged
        );
    }
}

pub fn print_snapshots(snapshots: &[(Snapshot, u64)]) {
    if snapshots.is_empty() {
        println!("No baselines saved.");
        return;
    }
    for (snapshot, entries) in snapshots {
        println!(
            "#{:<5} {}  {:<7} {:>7} files  {}  {}",
            snapshot.id,
            snapshot.created_at.format(TIME_FORMAT),
            snapshot.algorithm,
            entries,
            snapshot.root_dir.display(),
            snapshot.description.dimmed()
        );
    }
}

// ── Aggregates ───────────────────────────────────────────────────

pub fn print_duplicates(groups: &[DuplicateGroup]) {
    if groups.is_empty() {
        println!("No duplicates found.");
        return;
    }
    for group in groups {
        println!("{} ({} paths)", group.hash.cyan(), group.count);
        for path in &group.sample_paths {
            println!("    {}", path.display());
        }
        if group.has_more {
            println!("    {}", "...".dimmed());
        }
    }
}

pub fn print_stats(stats: &VerificationStats) {
    let total = stats.total();
    for label in ResultLabel::ALL {
        let count = stats.get(label);
        let share = if total > 0 {
            count as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        println!("{:<16} {:>8} {:>6.1}%", colored_label(label), count, share);
    }
    println!("{:<16} {:>8}", "Total".bold(), total);
    if let Some(rate) = stats.match_rate() {
        println!("Verification match rate: {:.1}%", rate * 100.0);
    }
}

fn abbreviate(hash: &str) -> String {
    if hash.len() > 16 {
        format!("{}…", &hash[..16])
    } else {
        hash.to_string()
    }
}
