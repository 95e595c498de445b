//! Progress reporting for the archiving pipeline
//!
//! Provides real-time progress display using indicatif progress bars.
//! Everything here writes to stderr, because stdout may be carrying the
//! archive itself.

use crate::pipeline::ArchiveProgress;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays archiving status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ArchiveProgress) {
        let bytes_str = format_size(progress.bytes, BINARY);
        let rate = progress.entries_per_second();

        let msg = format!(
            "Entries: {} | Size: {} | Rate: {:.0}/s | Queue: {} | Workers: {}",
            format_number(progress.entries),
            bytes_str,
            rate,
            progress.queue_len,
            progress.total_workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the archiving results
pub fn print_summary(
    entries: u64,
    bytes: u64,
    retries: u64,
    duration: Duration,
    output: &str,
) {
    let bytes_str = format_size(bytes, BINARY);
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        entries as f64 / duration_secs
    } else {
        0.0
    };

    eprintln!();
    eprintln!("{}", style("Archive Complete").green().bold());
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Entries:").bold(), format_number(entries));
    eprintln!("  {} {}", style("Total Size:").bold(), bytes_str);
    eprintln!(
        "  {} {:.1}s ({:.0} entries/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if retries > 0 {
        eprintln!(
            "  {} {}",
            style("Retries:").yellow().bold(),
            format_number(retries)
        );
    }
    eprintln!("  {} {}", style("Output:").bold(), output);
    eprintln!();
}

/// Print a header at the start of the run
pub fn print_header(bucket: &str, workers: usize, output: &str) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("bucket-tar").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Bucket:").bold(), bucket);
    eprintln!("  {} {}", style("Workers:").bold(), workers);
    eprintln!("  {} {}", style("Output:").bold(), output);
    eprintln!();
}
