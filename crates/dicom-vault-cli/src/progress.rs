use colored::*;
use dicom_vault_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Walk phase: spinner (file total unknown upfront)
/// - Group phase: bar over the discovered files
/// - Commit phase: spinner
/// - Export phase: bar over the resolved series
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn spinner(&self, message: &'static str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICKS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn bar(&self, label: &str, unit: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        let template = format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {} ({{eta}} remaining)",
            label, unit
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICKS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn update_bar(&self, done: usize, total: usize) {
        self.with_bar(|pb| {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        });
    }
}

fn done(message: String) {
    eprintln!("  {} {}", "✓".green(), message);
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        self.spinner("Scanning files...");
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &str) {
        self.with_bar(|pb| pb.set_message(format!("Scanning... {} files found", files_found)));
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Scan complete: {} DICOM files in {:.2}s",
            total_files, duration_secs
        ));
    }

    fn on_group_start(&self, total_files: usize) {
        self.bar("Reading", "files", total_files);
    }

    fn on_group_progress(&self, files_read: usize, total_files: usize) {
        self.update_bar(files_read, total_files);
    }

    fn on_group_complete(&self, series_found: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Grouping complete: {} series in {:.2}s",
            series_found, duration_secs
        ));
    }

    fn on_commit_start(&self) {
        self.spinner("Writing to database...");
    }

    fn on_commit_complete(&self, new_series: usize, duplicated: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Database write complete: {} new, {} duplicate series in {:.2}s",
            new_series, duplicated, duration_secs
        ));
    }

    fn on_export_start(&self, total_series: usize) {
        self.bar("Exporting", "series", total_series);
    }

    fn on_export_progress(&self, series_done: usize, total_series: usize) {
        self.update_bar(series_done, total_series);
    }

    fn on_export_complete(&self, exported: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Export complete: {} exported, {} failed in {:.2}s",
            exported, failed, duration_secs
        ));
    }
}
