use anyhow::{bail, Result};
use colored::*;
use crossbeam_channel::Receiver;
use hashkeeper_core::{ScanProgress, ScanSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::warn;

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Render notifications of `scan_id` until its `Complete` arrives.
pub fn follow_scan(rx: &Receiver<ScanProgress>, scan_id: u64) -> Result<ScanSummary> {
    let pb = spinner();
    pb.set_message("Scanning...");

    for message in rx.iter() {
        if message.scan_id() != scan_id {
            continue;
        }
        match message {
            ScanProgress::Started { root, .. } => {
                pb.set_message(format!("Scanning {}...", root.display()));
            }
            ScanProgress::File { metrics, .. } => {
                pb.set_message(format!(
                    "Hashing... {} files, {:.0} files/s, {:.1} MB/s",
                    metrics.files_scanned, metrics.files_per_sec, metrics.mb_per_sec
                ));
            }
            ScanProgress::Skipped { path, reason, .. } => {
                pb.suspend(|| warn!("Skipped {}: {}", path.display(), reason));
            }
            ScanProgress::Warning { message, .. } => {
                pb.suspend(|| warn!("{}", message));
            }
            ScanProgress::Complete { summary, .. } => {
                pb.finish_and_clear();
                print_summary(&summary);
                return Ok(summary);
            }
        }
    }
    pb.finish_and_clear();
    bail!("progress channel closed before scan {} completed", scan_id)
}

pub fn print_summary(summary: &ScanSummary) {
    eprintln!(
        "  {} Scan complete: {} files, {} bytes in {:.2}s",
        "✓".green(),
        summary.total_files,
        summary.total_bytes,
        summary.elapsed.as_secs_f64()
    );
    if summary.skipped > 0 {
        eprintln!("  {} {} entries skipped", "!".yellow(), summary.skipped);
    }
    if summary.persistence_failures > 0 {
        eprintln!(
            "  {} history is incomplete: {} events were not saved",
            "!".red(),
            summary.persistence_failures
        );
    }
}
