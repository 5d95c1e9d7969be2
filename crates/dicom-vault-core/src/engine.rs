use crate::config::AppConfig;
use crate::dedup::{self, IngestPlan};
use crate::error::Error;
use crate::export::{self, ExportResult};
use crate::filter::FilterPolicy;
use crate::identity;
use crate::progress::ProgressReporter;
use crate::scanner::{self, DirectoryScanner};
use rayon::ThreadPool;
use crate::storage::models::{ScanCounts, ScanRun, ScheduleKind};
use crate::storage::Database;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Runs scans and exports against one record store.
pub struct ScanEngine {
    config: AppConfig,
    db_path: String,
    cancel: Arc<AtomicBool>,
}

impl ScanEngine {
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.database_path.clone();
        Self {
            config,
            db_path,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_db_path(mut self, path: &str) -> Self {
        self.db_path = path.to_string();
        self
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Setting the returned flag stops the scan or export in progress.
    /// Each new operation clears it on start.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Scan the directory of a stored configuration.
    ///
    /// An unknown configuration fails with [`Error::NotFound`] before any run
    /// is recorded. Everything after that point ends in a finalized
    /// [`ScanRun`], completed or failed.
    pub fn run_scan(
        &self,
        config_id: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanRun, Error> {
        let db = Database::open(&self.db_path)?;
        let scan_config = db
            .get_scan_config(config_id)?
            .ok_or_else(|| Error::not_found("scan config", config_id))?;

        let run = self.scan_with(
            &db,
            &scan_config.scan_path,
            scan_config.schedule_type,
            scan_config.recursive,
            reporter,
        )?;
        if run.status.is_completed() {
            db.touch_scan_config(config_id)?;
        }
        Ok(run)
    }

    /// Scan an arbitrary directory without a stored configuration.
    pub fn scan_path(
        &self,
        path: &str,
        trigger: ScheduleKind,
        recursive: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanRun, Error> {
        let db = Database::open(&self.db_path)?;
        self.scan_with(&db, path, trigger, recursive, reporter)
    }

    pub fn export(
        &self,
        series_ids: &[String],
        target_dir: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExportResult, Error> {
        self.cancel.store(false, Ordering::Relaxed);
        let db = Database::open(&self.db_path)?;
        export::export_series(
            &db,
            series_ids,
            Path::new(target_dir),
            &self.cancel,
            reporter,
        )
    }

    fn scan_with(
        &self,
        db: &Database,
        scan_path: &str,
        trigger: ScheduleKind,
        recursive: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanRun, Error> {
        self.cancel.store(false, Ordering::Relaxed);

        let scan_id = identity::new_scan_id();
        db.create_scan_run(&scan_id, scan_path, trigger)?;
        info!("Scan {} started on {}", scan_id, scan_path);

        let mut counts = ScanCounts::default();
        match self.ingest(db, scan_path, recursive, &scan_id, &mut counts, reporter) {
            Ok(()) => match db.finish_scan_run(&scan_id, &counts) {
                Ok(()) => info!(
                    "Scan {} completed: {} new, {} duplicated, {} rejected, {} failed",
                    scan_id,
                    counts.series_new,
                    counts.series_duplicated,
                    counts.series_rejected,
                    counts.series_failed
                ),
                // The ingest is committed; the run must still not stay running.
                Err(e) => {
                    error!("Scan {} could not be marked completed: {}", scan_id, e);
                    db.fail_scan_run(&scan_id, &counts, &e.to_string())?;
                }
            },
            Err(e) => {
                error!("Scan {} failed: {}", scan_id, e);
                db.fail_scan_run(&scan_id, &counts, &e.to_string())?;
            }
        }

        db.get_scan_run(&scan_id)?
            .ok_or_else(|| Error::not_found("scan run", scan_id))
    }

    /// Walk, group, plan and commit. Nothing reaches the store unless the
    /// whole plan commits.
    fn ingest(
        &self,
        db: &Database,
        scan_path: &str,
        recursive: bool,
        scan_id: &str,
        counts: &mut ScanCounts,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), Error> {
        let root = fs::canonicalize(scan_path)?;
        let pool = self.worker_pool()?;

        // Phase 1: Walk
        let files = self.discover(&root, recursive, pool.as_ref(), reporter)?;
        counts.files_found = files.len() as i64;

        // Phase 2: Group
        let group_start = Instant::now();
        let grouping = run_on(pool.as_ref(), || {
            scanner::group_by_series(&files, &self.cancel, reporter)
        })?;
        counts.series_found = grouping.groups.len() as i64;
        reporter.on_group_complete(grouping.groups.len(), group_start.elapsed().as_secs_f64());
        debug!(
            "Grouped {} files into {} series ({} skipped) in {:.2}s",
            files.len(),
            grouping.groups.len(),
            grouping.files_skipped,
            group_start.elapsed().as_secs_f64()
        );

        // Phase 3: Plan against the store and the active rules
        let policy = FilterPolicy::new(
            db.active_filter_rules()?,
            self.config.enforce_min_image_count,
        );
        let plan = dedup::plan_ingest(db, &grouping.groups, &policy, scan_id, &self.cancel)?;

        // Phase 4: Commit
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        reporter.on_commit_start();
        let commit_start = Instant::now();
        db.commit_ingest(&plan.new_records(), &plan.appended_paths())?;
        reporter.on_commit_complete(
            plan.new_count(),
            plan.duplicate_count(),
            commit_start.elapsed().as_secs_f64(),
        );
        apply_plan_counts(&plan, counts);
        Ok(())
    }

    fn discover(
        &self,
        root: &Path,
        recursive: bool,
        pool: Option<&ThreadPool>,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<PathBuf>, Error> {
        reporter.on_scan_start();
        let start = Instant::now();
        let walker = DirectoryScanner::new(recursive)
            .follow_symlinks(self.config.follow_symlinks)
            .with_ignore_patterns(&self.config.ignore_patterns);

        let mut candidates = Vec::new();
        for path in walker.candidates(root) {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            reporter.on_scan_progress(candidates.len() + 1, &path.to_string_lossy());
            candidates.push(path);
        }

        let examined = candidates.len();
        let files = run_on(pool, move || scanner::filter_dicom(candidates));
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        debug!("{} of {} files are DICOM", files.len(), examined);

        reporter.on_scan_complete(files.len(), start.elapsed().as_secs_f64());
        Ok(files)
    }

    /// A dedicated pool when `worker_threads` is set. `None` means rayon's
    /// global pool.
    fn worker_pool(&self) -> Result<Option<ThreadPool>, Error> {
        if self.config.worker_threads == 0 {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .build()
            .map(Some)
            .map_err(|e| Error::Other(format!("Failed to build worker pool: {}", e)))
    }
}

/// Sniffing and parsing run inside `pool` when there is one.
fn run_on<R, F>(pool: Option<&ThreadPool>, op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

fn apply_plan_counts(plan: &IngestPlan, counts: &mut ScanCounts) {
    counts.series_new = plan.new_count() as i64;
    counts.series_duplicated = plan.duplicate_count() as i64;
    counts.series_rejected = plan.rejected_count() as i64;
    counts.series_failed = plan.collision_count() as i64;
}
