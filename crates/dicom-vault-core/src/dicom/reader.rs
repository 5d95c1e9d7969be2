use super::descriptor::{CtParams, DxParams, ModalityParams, MrParams, RawDescriptor};
use super::sniff;
use chrono::{DateTime, Utc};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Result of reading one file's header.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Parsed(RawDescriptor),
    /// No Part-10 magic: structurally not a DICOM file. Not worth a log line.
    NotDicom,
    /// Looked like DICOM but could not be read or parsed.
    Unreadable(String),
}

impl ReadOutcome {
    pub fn into_descriptor(self) -> Option<RawDescriptor> {
        match self {
            ReadOutcome::Parsed(descriptor) => Some(descriptor),
            ReadOutcome::NotDicom | ReadOutcome::Unreadable(_) => None,
        }
    }
}

/// Parse the header of a DICOM file into a [`RawDescriptor`], stopping before
/// the pixel data. Missing tags become empty/absent fields.
pub fn read_descriptor(path: &Path) -> ReadOutcome {
    if !sniff::is_dicom_file(path) {
        return ReadOutcome::NotDicom;
    }

    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to stat DICOM file {}: {}", path.display(), e);
            return ReadOutcome::Unreadable(e.to_string());
        }
    };

    let obj = match OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
    {
        Ok(obj) => obj,
        Err(e) => {
            warn!("Failed to read DICOM header {}: {}", path.display(), e);
            return ReadOutcome::Unreadable(e.to_string());
        }
    };

    let file_modified = metadata
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

    let modality = string_tag(&obj, tags::MODALITY).unwrap_or_default();
    let params = modality_params(&obj, &modality);

    ReadOutcome::Parsed(RawDescriptor {
        file_path: path.to_path_buf(),
        patient_id: string_tag(&obj, tags::PATIENT_ID).unwrap_or_default(),
        patient_name: string_tag(&obj, tags::PATIENT_NAME).unwrap_or_default(),
        patient_sex: string_tag(&obj, tags::PATIENT_SEX),
        patient_birth_date: string_tag(&obj, tags::PATIENT_BIRTH_DATE),
        study_instance_uid: string_tag(&obj, tags::STUDY_INSTANCE_UID).unwrap_or_default(),
        study_date: string_tag(&obj, tags::STUDY_DATE),
        series_instance_uid: string_tag(&obj, tags::SERIES_INSTANCE_UID).unwrap_or_default(),
        series_number: int_tag(&obj, tags::SERIES_NUMBER),
        series_description: string_tag(&obj, tags::SERIES_DESCRIPTION),
        modality,
        protocol_name: string_tag(&obj, tags::PROTOCOL_NAME),
        manufacturer: string_tag(&obj, tags::MANUFACTURER),
        manufacturer_model: string_tag(&obj, tags::MANUFACTURER_MODEL_NAME),
        params,
        file_size: metadata.len(),
        file_modified,
    })
}

/// Exact match on the modality code. Unknown modalities carry no parameters.
fn modality_params(obj: &DefaultDicomObject, modality: &str) -> Option<ModalityParams> {
    match modality {
        "CT" => Some(ModalityParams::Ct(CtParams {
            slice_thickness: float_tag(obj, tags::SLICE_THICKNESS),
            kvp: float_tag(obj, tags::KVP),
            rotation_time: float_tag(obj, tags::REVOLUTION_TIME),
        })),
        "MR" => Some(ModalityParams::Mr(MrParams {
            tr: float_tag(obj, tags::REPETITION_TIME),
            te: float_tag(obj, tags::ECHO_TIME),
            ti: float_tag(obj, tags::INVERSION_TIME),
            flip_angle: float_tag(obj, tags::FLIP_ANGLE),
        })),
        "DR" | "DX" | "CR" => Some(ModalityParams::Dx(DxParams {
            exposure: float_tag(obj, tags::EXPOSURE),
            kvp: float_tag(obj, tags::KVP),
        })),
        _ => None,
    }
}

/// Trimmed string value; empty values count as absent.
fn string_tag(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| {
            s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string()
        })
        .filter(|s| !s.is_empty())
}

fn int_tag(obj: &DefaultDicomObject, tag: Tag) -> Option<i32> {
    obj.element(tag).ok().and_then(|elem| elem.to_int::<i32>().ok())
}

fn float_tag(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok().and_then(|elem| elem.to_float64().ok())
}
