mod common;

use common::{create_test_tree, write_series, Instance, CT_SERIES, MR_SERIES};
use dicom_vault_core::export::SIDECAR_FILE_NAME;
use dicom_vault_core::identity::series_record_id;
use dicom_vault_core::storage::models::ScheduleKind;
use dicom_vault_core::{AppConfig, Error, ProgressReporter, ScanEngine, SilentReporter};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// A scanned store plus an empty export target.
struct Fixture {
    dir: TempDir,
    root: PathBuf,
    target: PathBuf,
    engine: ScanEngine,
}

impl Fixture {
    fn scanned() -> Self {
        let dir = tempdir().unwrap();
        let root = dir.path().join("incoming");
        create_test_tree(&root);
        let db_path = dir.path().join("vault.db");
        let engine =
            ScanEngine::new(AppConfig::default()).with_db_path(db_path.to_str().unwrap());
        engine
            .scan_path(root.to_str().unwrap(), ScheduleKind::Manual, true, &SilentReporter)
            .unwrap();
        let target = dir.path().join("export");
        Self {
            dir,
            root,
            target,
            engine,
        }
    }

    fn target_str(&self) -> &str {
        self.target.to_str().unwrap()
    }
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn read_sidecar(dir: &Path) -> serde_json::Value {
    let text = fs::read_to_string(dir.join(SIDECAR_FILE_NAME)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_export_writes_files_and_sidecar() {
    let fx = Fixture::scanned();
    let id = series_record_id(CT_SERIES);

    let result = fx
        .engine
        .export(&[id.clone()], fx.target_str(), &SilentReporter)
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exported_count, 1);
    assert_eq!(result.failed_count, 0);
    assert!(result.failed_ids.is_empty());
    assert_eq!(result.target_dir, fx.target_str());

    let series_dir = fx.target.join(&id);
    assert_eq!(
        file_names(&series_dir),
        names(&["IM0001", "IM0002", "IM0003", SIDECAR_FILE_NAME])
    );

    let meta = read_sidecar(&series_dir);
    assert_eq!(meta["id"], id.as_str());
    assert_eq!(meta["series_instance_uid"], CT_SERIES);
    assert_eq!(meta["modality"], "CT");
    assert_eq!(meta["patient_id"], "PAT001");
    assert_eq!(meta["file_count"], 3);
    assert_eq!(meta["ct_params"]["slice_thickness"], 1.25);
    assert!(meta["mr_params"].is_null());
    assert!(meta["dx_params"].is_null());
    let originals: BTreeSet<String> = meta["original_paths"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap().to_string())
        .collect();
    let ct_dir = fs::canonicalize(fx.root.join("ct_a")).unwrap();
    let expected: BTreeSet<String> = ["IM0001", "IM0002", "IM0003"]
        .iter()
        .map(|name| ct_dir.join(name).to_string_lossy().into_owned())
        .collect();
    assert_eq!(originals, expected);
}

#[test]
fn test_export_includes_fan_out_paths() {
    let fx = Fixture::scanned();
    let elsewhere = fx.dir.path().join("elsewhere");
    write_series(&elsewhere, &Instance::ct(CT_SERIES), 5);
    fs::remove_file(elsewhere.join("IM0001")).unwrap();
    fx.engine
        .scan_path(
            elsewhere.to_str().unwrap(),
            ScheduleKind::Manual,
            true,
            &SilentReporter,
        )
        .unwrap();

    let id = series_record_id(CT_SERIES);
    fx.engine
        .export(&[id.clone()], fx.target_str(), &SilentReporter)
        .unwrap();

    let series_dir = fx.target.join(&id);
    assert_eq!(
        file_names(&series_dir),
        names(&["IM0001", "IM0002", "IM0003", "IM0004", "IM0005", SIDECAR_FILE_NAME])
    );
    let meta = read_sidecar(&series_dir);
    // The three members of the first scan plus the four found elsewhere.
    assert_eq!(meta["original_paths"].as_array().unwrap().len(), 3 + 4);
    assert_eq!(meta["file_count"], 3);
}

#[test]
fn test_unknown_id_alongside_known_ones() {
    let fx = Fixture::scanned();
    let ids = vec![
        series_record_id(CT_SERIES),
        "SERDOESNOTEXIST".to_string(),
        series_record_id(MR_SERIES),
    ];

    let result = fx
        .engine
        .export(&ids, fx.target_str(), &SilentReporter)
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.exported_count, 2);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.failed_ids, vec!["SERDOESNOTEXIST".to_string()]);
    assert!(!fx.target.join("SERDOESNOTEXIST").exists());
    assert!(fx.target.join(&ids[2]).join(SIDECAR_FILE_NAME).is_file());
}

#[test]
fn test_vanished_sources_are_skipped() {
    let fx = Fixture::scanned();
    let id = series_record_id(MR_SERIES);
    let mr_dir = fx.root.join("mr_b");
    fs::remove_file(mr_dir.join("IM0002")).unwrap();

    let result = fx
        .engine
        .export(&[id.clone()], fx.target_str(), &SilentReporter)
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exported_count, 1);

    assert_eq!(
        file_names(&fx.target.join(&id)),
        names(&["IM0001", SIDECAR_FILE_NAME])
    );
}

#[test]
fn test_series_with_no_files_left_counts_as_failed() {
    let fx = Fixture::scanned();
    let id = series_record_id(MR_SERIES);
    fs::remove_dir_all(fx.root.join("mr_b")).unwrap();

    let result = fx
        .engine
        .export(&[id.clone()], fx.target_str(), &SilentReporter)
        .unwrap();
    // The record resolved, so the request as a whole did not fail.
    assert!(result.success);
    assert_eq!(result.exported_count, 0);
    assert_eq!(result.failed_count, 1);
    assert!(result.failed_ids.is_empty());
    assert_eq!(
        file_names(&fx.target.join(&id)),
        names(&[SIDECAR_FILE_NAME])
    );
}

#[test]
fn test_export_nothing() {
    let fx = Fixture::scanned();
    let result = fx.engine.export(&[], fx.target_str(), &SilentReporter).unwrap();
    assert!(result.success);
    assert_eq!(result.exported_count, 0);
    assert_eq!(result.failed_count, 0);
}

#[test]
fn test_repeated_ids_are_exported_once() {
    let fx = Fixture::scanned();
    let id = series_record_id(CT_SERIES);

    let result = fx
        .engine
        .export(&[id.clone(), id.clone()], fx.target_str(), &SilentReporter)
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exported_count, 1);
    assert_eq!(result.failed_count, 0);

    let missing = "SERDOESNOTEXIST".to_string();
    let result = fx
        .engine
        .export(&[missing.clone(), missing.clone()], fx.target_str(), &SilentReporter)
        .unwrap();
    assert_eq!(result.failed_ids, vec![missing]);
    assert_eq!(result.failed_count, 1);
}

#[test]
fn test_unwritable_series_directory_does_not_abort_others() {
    let fx = Fixture::scanned();
    let ct = series_record_id(CT_SERIES);
    let mr = series_record_id(MR_SERIES);
    // A plain file where the MR series directory would go.
    fs::create_dir_all(&fx.target).unwrap();
    fs::write(fx.target.join(&mr), b"in the way").unwrap();

    let result = fx
        .engine
        .export(&[ct.clone(), mr.clone()], fx.target_str(), &SilentReporter)
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exported_count, 1);
    assert_eq!(result.failed_count, 1);
    assert!(result.failed_ids.is_empty());
    assert!(fx.target.join(&ct).join(SIDECAR_FILE_NAME).is_file());
    assert!(fx.target.join(&mr).is_file());
}

/// Raises the cancel flag once the export has resolved its series.
struct CancelOnExport(Arc<AtomicBool>);

impl ProgressReporter for CancelOnExport {
    fn on_export_start(&self, _total_series: usize) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[test]
fn test_cancelled_export_writes_no_series() {
    let fx = Fixture::scanned();
    let reporter = CancelOnExport(fx.engine.cancel_token());
    let ids = vec![series_record_id(CT_SERIES), series_record_id(MR_SERIES)];

    let result = fx.engine.export(&ids, fx.target_str(), &reporter);
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(file_names(&fx.target).is_empty());

    // The next export starts with the flag cleared.
    let result = fx
        .engine
        .export(&ids, fx.target_str(), &SilentReporter)
        .unwrap();
    assert_eq!(result.exported_count, 2);
}
