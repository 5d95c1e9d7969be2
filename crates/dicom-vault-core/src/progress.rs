/// Trait for reporting scan and export progress.
///
/// The CLI implements it with indicatif bars. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_group_start(&self, _total_files: usize) {}
    fn on_group_progress(&self, _files_read: usize, _total_files: usize) {}
    fn on_group_complete(&self, _series_found: usize, _duration_secs: f64) {}
    fn on_commit_start(&self) {}
    fn on_commit_complete(&self, _new_series: usize, _duplicated: usize, _duration_secs: f64) {}
    fn on_export_start(&self, _total_series: usize) {}
    fn on_export_progress(&self, _series_done: usize, _total_series: usize) {}
    fn on_export_complete(&self, _exported: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
