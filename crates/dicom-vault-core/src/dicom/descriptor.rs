use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CT acquisition parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CtParams {
    pub slice_thickness: Option<f64>,
    pub kvp: Option<f64>,
    pub rotation_time: Option<f64>,
}

/// MR acquisition parameters (times in ms, angle in degrees).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MrParams {
    pub tr: Option<f64>,
    pub te: Option<f64>,
    pub ti: Option<f64>,
    pub flip_angle: Option<f64>,
}

/// Projection radiography (DX, DR, CR) parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DxParams {
    pub exposure: Option<f64>,
    pub kvp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalityParams {
    Ct(CtParams),
    Mr(MrParams),
    Dx(DxParams),
}

/// Descriptive header fields of a single DICOM file. Transient: built per
/// file during a scan and never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDescriptor {
    pub file_path: PathBuf,

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

    pub params: Option<ModalityParams>,

    pub file_size: u64,
    /// RFC 3339 timestamp of the file's last modification.
    pub file_modified: Option<String>,
}

impl RawDescriptor {
    /// A descriptor only takes part in series grouping when it carries both
    /// a series UID and a modality.
    pub fn is_groupable(&self) -> bool {
        !self.series_instance_uid.is_empty() && !self.modality.is_empty()
    }

    pub fn ct_params(&self) -> Option<&CtParams> {
        match &self.params {
            Some(ModalityParams::Ct(p)) => Some(p),
            _ => None,
        }
    }

    pub fn mr_params(&self) -> Option<&MrParams> {
        match &self.params {
            Some(ModalityParams::Mr(p)) => Some(p),
            _ => None,
        }
    }

    pub fn dx_params(&self) -> Option<&DxParams> {
        match &self.params {
            Some(ModalityParams::Dx(p)) => Some(p),
            _ => None,
        }
    }

    /// Slice thickness, only ever present for CT.
    pub fn slice_thickness(&self) -> Option<f64> {
        self.ct_params().and_then(|p| p.slice_thickness)
    }
}
