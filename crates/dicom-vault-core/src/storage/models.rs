use crate::dicom::{CtParams, DxParams, MrParams};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How a scan configuration is meant to be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Manual,
    Weekly,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Manual => "manual",
            ScheduleKind::Weekly => "weekly",
        }
    }
}

impl FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ScheduleKind::Manual),
            "weekly" => Ok(ScheduleKind::Weekly),
            other => Err(format!("unknown schedule kind '{}'", other)),
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ScanStatus::Completed)
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(format!("unknown scan status '{}'", other)),
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum_sql!(ScheduleKind);
text_enum_sql!(ScanStatus);

/// A configured scan source. Owned by the store; the engine only reads it
/// and stamps `last_scan_at`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanConfig {
    pub id: i64,
    pub scan_path: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub schedule_type: ScheduleKind,
    pub recursive: bool,
    pub last_scan_at: Option<String>,
    pub created_at: String,
}

/// One invocation of the scan pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRun {
    pub id: String,
    pub scan_path: String,
    pub trigger: ScheduleKind,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub files_found: i64,
    pub series_found: i64,
    pub series_new: i64,
    pub series_duplicated: i64,
    pub series_rejected: i64,
    /// Series refused because their derived identifier collided.
    pub series_failed: i64,
    pub status: ScanStatus,
    pub error: Option<String>,
}

/// Counters written when a scan run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub files_found: i64,
    pub series_found: i64,
    pub series_new: i64,
    pub series_duplicated: i64,
    pub series_rejected: i64,
    pub series_failed: i64,
}

/// Acceptance rule for new series of one modality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterRule {
    pub id: i64,
    pub modality: String,
    /// Series whose sampled slice thickness exceeds this are rejected.
    pub max_slice_thickness: Option<f64>,
    pub min_image_count: Option<i64>,
    pub is_active: bool,
    pub created_at: String,
}

/// One persisted series, sampled from a representative file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub id: String,

    pub patient_id: String,
    pub patient_name: String,
    pub patient_sex: Option<String>,
    pub patient_birth_date: Option<String>,

    pub study_instance_uid: String,
    pub study_date: Option<String>,

    pub series_instance_uid: String,
    pub series_number: Option<i32>,
    pub series_description: Option<String>,
    pub modality: String,
    pub protocol_name: Option<String>,

    pub manufacturer: Option<String>,
    pub manufacturer_model: Option<String>,

    pub ct_params: Option<CtParams>,
    pub mr_params: Option<MrParams>,
    pub dx_params: Option<DxParams>,

    /// Primary path: the first file of the group that created the record.
    pub file_path: String,
    pub file_count: i64,
    pub file_size_total: i64,
    pub file_modified_date: Option<String>,

    pub scan_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

/// Another location where files of an already known series were found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPathRecord {
    pub id: i64,
    pub series_id: String,
    pub file_path: String,
    pub added_at: String,
}

/// Series listing filters. Text filters are substring matches except
/// `modality`, which is exact. Study dates are inclusive bounds.
#[derive(Debug, Clone, Default)]
pub struct SeriesQuery {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub modality: Option<String>,
    pub protocol_name: Option<String>,
    pub study_date_from: Option<String>,
    pub study_date_to: Option<String>,
    pub include_inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalityCount {
    pub modality: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCount {
    pub date: String,
    pub count: i64,
}
