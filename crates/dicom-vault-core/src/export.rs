use crate::dicom::{CtParams, DxParams, MrParams};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::models::SeriesRecord;
use crate::storage::Database;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const SIDECAR_FILE_NAME: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    /// True when every requested identifier resolved to a record.
    pub success: bool,
    pub exported_count: usize,
    pub failed_count: usize,
    pub failed_ids: Vec<String>,
    pub target_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome {
    Copied(PathBuf),
    Missing,
    Failed(String),
}

/// Contents of `meta.json`.
#[derive(Debug, Serialize)]
struct SidecarDocument<'a> {
    id: &'a str,
    patient_id: &'a str,
    patient_name: &'a str,
    patient_sex: Option<&'a str>,
    patient_birth_date: Option<&'a str>,
    study_instance_uid: &'a str,
    study_date: Option<&'a str>,
    series_instance_uid: &'a str,
    series_number: Option<i32>,
    series_description: Option<&'a str>,
    modality: &'a str,
    protocol_name: Option<&'a str>,
    manufacturer: Option<&'a str>,
    manufacturer_model: Option<&'a str>,
    ct_params: Option<&'a CtParams>,
    mr_params: Option<&'a MrParams>,
    dx_params: Option<&'a DxParams>,
    file_count: i64,
    file_size_total: i64,
    file_modified_date: Option<&'a str>,
    scan_id: Option<&'a str>,
    created_at: &'a str,
    original_paths: &'a [String],
}

impl<'a> SidecarDocument<'a> {
    fn new(record: &'a SeriesRecord, original_paths: &'a [String]) -> Self {
        Self {
            id: &record.id,
            patient_id: &record.patient_id,
            patient_name: &record.patient_name,
            patient_sex: record.patient_sex.as_deref(),
            patient_birth_date: record.patient_birth_date.as_deref(),
            study_instance_uid: &record.study_instance_uid,
            study_date: record.study_date.as_deref(),
            series_instance_uid: &record.series_instance_uid,
            series_number: record.series_number,
            series_description: record.series_description.as_deref(),
            modality: &record.modality,
            protocol_name: record.protocol_name.as_deref(),
            manufacturer: record.manufacturer.as_deref(),
            manufacturer_model: record.manufacturer_model.as_deref(),
            ct_params: record.ct_params.as_ref(),
            mr_params: record.mr_params.as_ref(),
            dx_params: record.dx_params.as_ref(),
            file_count: record.file_count,
            file_size_total: record.file_size_total,
            file_modified_date: record.file_modified_date.as_deref(),
            scan_id: record.scan_id.as_deref(),
            created_at: &record.created_at,
            original_paths,
        }
    }
}

/// A record plus every source path it owns: primary first, then fan-out.
struct ResolvedSeries {
    record: SeriesRecord,
    paths: Vec<String>,
}

/// Copy each series into `<target>/<series_id>/` and write its sidecar.
///
/// Records are resolved up front on the calling thread; the copies then run
/// on the current rayon pool, one series per task. Unknown identifiers are
/// reported in `failed_ids`; repeated identifiers are exported once. A
/// resolved series whose files are all gone, or whose directory or sidecar
/// cannot be written, is counted as failed but leaves `success` untouched.
/// Only cancellation and store errors abort the whole export.
pub fn export_series(
    db: &Database,
    series_ids: &[String],
    target_dir: &Path,
    cancel: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<ExportResult, Error> {
    let start = Instant::now();
    let mut failed_ids = Vec::new();
    let mut resolved = Vec::new();

    let mut seen = HashSet::new();
    for id in series_ids.iter().filter(|id| seen.insert(id.as_str())) {
        match resolve(db, id)? {
            Some(series) => resolved.push(series),
            None => {
                warn!("Series {} not found, skipping export", id);
                failed_ids.push(id.clone());
            }
        }
    }

    fs::create_dir_all(target_dir)?;
    reporter.on_export_start(resolved.len());

    let done = AtomicUsize::new(0);
    let total = resolved.len();
    let outcomes: Vec<(String, Option<usize>)> = resolved
        .par_iter()
        .map(|series| {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let copied = match export_one(series, target_dir) {
                Ok(copied) => Some(copied),
                Err(e) => {
                    error!("Failed to export series {}: {}", series.record.id, e);
                    None
                }
            };
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_export_progress(finished, total);
            Ok((series.record.id.clone(), copied))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let unresolved = failed_ids.len();
    let mut exported_count = 0;
    let mut incomplete_count = 0;
    for (id, copied) in outcomes {
        match copied {
            Some(0) => {
                warn!("Series {} had no files left to copy", id);
                incomplete_count += 1;
            }
            Some(_) => exported_count += 1,
            None => incomplete_count += 1,
        }
    }

    let failed_count = unresolved + incomplete_count;
    reporter.on_export_complete(exported_count, failed_count, start.elapsed().as_secs_f64());
    info!(
        "Exported {} series to {} ({} failed)",
        exported_count,
        target_dir.display(),
        failed_count
    );

    Ok(ExportResult {
        success: unresolved == 0,
        exported_count,
        failed_count,
        failed_ids,
        target_dir: target_dir.to_string_lossy().into_owned(),
    })
}

fn resolve(db: &Database, id: &str) -> Result<Option<ResolvedSeries>, Error> {
    let Some(record) = db.get_series(id)? else {
        return Ok(None);
    };
    let mut paths = vec![record.file_path.clone()];
    paths.extend(db.series_paths(id)?.into_iter().map(|p| p.file_path));
    Ok(Some(ResolvedSeries { record, paths }))
}

/// Returns the number of files copied. The sidecar is written after every
/// copy for the series has finished.
fn export_one(series: &ResolvedSeries, target_dir: &Path) -> Result<usize, Error> {
    let series_dir = target_dir.join(&series.record.id);
    fs::create_dir_all(&series_dir)?;

    let mut copied = 0;
    for source in &series.paths {
        match copy_into(Path::new(source), &series_dir) {
            CopyOutcome::Copied(_) => copied += 1,
            CopyOutcome::Missing => debug!("Source file gone: {}", source),
            CopyOutcome::Failed(e) => error!("Failed to copy {}: {}", source, e),
        }
    }

    let sidecar = SidecarDocument::new(&series.record, &series.paths);
    let file = File::create(series_dir.join(SIDECAR_FILE_NAME))?;
    serde_json::to_writer_pretty(file, &sidecar)?;

    Ok(copied)
}

/// Copy one file into `dest_dir`, keeping its file name and (best effort)
/// its modification time.
pub fn copy_into(source: &Path, dest_dir: &Path) -> CopyOutcome {
    if !source.is_file() {
        return CopyOutcome::Missing;
    }
    let Some(name) = source.file_name() else {
        return CopyOutcome::Failed("path has no file name".to_string());
    };
    let dest = dest_dir.join(name);

    if let Err(e) = fs::copy(source, &dest) {
        return CopyOutcome::Failed(e.to_string());
    }
    if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
        if let Err(e) = File::options()
            .write(true)
            .open(&dest)
            .and_then(|f| f.set_modified(modified))
        {
            debug!("Could not preserve mtime on {}: {}", dest.display(), e);
        }
    }
    CopyOutcome::Copied(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_into_keeps_name_and_contents() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let file = src.path().join("IM0001");
        fs::write(&file, b"pixels").unwrap();

        let outcome = copy_into(&file, dst.path());
        let copied = dst.path().join("IM0001");
        assert_eq!(outcome, CopyOutcome::Copied(copied.clone()));
        assert_eq!(fs::read(&copied).unwrap(), b"pixels");

        let src_mtime = fs::metadata(&file).unwrap().modified().unwrap();
        let dst_mtime = fs::metadata(&copied).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn test_copy_into_missing_source() {
        let dst = tempdir().unwrap();
        let outcome = copy_into(&dst.path().join("nope.dcm"), dst.path());
        assert_eq!(outcome, CopyOutcome::Missing);
    }

    #[test]
    fn test_copy_into_unwritable_destination() {
        let src = tempdir().unwrap();
        let file = src.path().join("a.dcm");
        fs::write(&file, b"x").unwrap();

        let outcome = copy_into(&file, &src.path().join("no/such/dir"));
        assert!(matches!(outcome, CopyOutcome::Failed(_)));
    }
}
