#![allow(dead_code)]

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::mem::InMemElement;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use std::fs;
use std::path::Path;

/// One image of a synthetic series.
#[derive(Debug, Clone)]
pub struct Instance<'a> {
    pub series_uid: &'a str,
    pub modality: &'a str,
    pub patient_id: &'a str,
    pub patient_name: &'a str,
    pub study_date: &'a str,
    pub protocol_name: &'a str,
    pub slice_thickness: Option<&'a str>,
}

impl<'a> Instance<'a> {
    pub fn ct(series_uid: &'a str) -> Self {
        Self {
            series_uid,
            modality: "CT",
            patient_id: "PAT001",
            patient_name: "Doe^Jane",
            study_date: "20240315",
            protocol_name: "Chest Routine",
            slice_thickness: Some("1.25"),
        }
    }

    pub fn mr(series_uid: &'a str) -> Self {
        Self {
            modality: "MR",
            patient_id: "PAT002",
            patient_name: "Roe^Rich",
            study_date: "20240420",
            protocol_name: "Brain T1",
            slice_thickness: None,
            ..Self::ct(series_uid)
        }
    }

    pub fn thickness(mut self, value: &'a str) -> Self {
        self.slice_thickness = Some(value);
        self
    }
}

fn el(tag: dicom_core::Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

/// Write `instance` as a Part 10 file at `path`, creating parent folders.
/// `number` makes the SOP instance UID unique within the series.
pub fn write_instance(path: &Path, instance: &Instance, number: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let sop_uid = format!("{}.{}", instance.series_uid, number);
    let sop_class = match instance.modality {
        "MR" => uids::MR_IMAGE_STORAGE,
        _ => uids::CT_IMAGE_STORAGE,
    };

    let mut elements = vec![
        el(tags::SOP_CLASS_UID, VR::UI, sop_class),
        el(tags::SOP_INSTANCE_UID, VR::UI, &sop_uid),
        el(tags::STUDY_DATE, VR::DA, instance.study_date),
        el(tags::MODALITY, VR::CS, instance.modality),
        el(tags::MANUFACTURER, VR::LO, "ACME Imaging"),
        el(tags::PATIENT_NAME, VR::PN, instance.patient_name),
        el(tags::PATIENT_ID, VR::LO, instance.patient_id),
        el(tags::PROTOCOL_NAME, VR::LO, instance.protocol_name),
        el(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.826.0.1.3680043.2.1"),
        el(tags::SERIES_INSTANCE_UID, VR::UI, instance.series_uid),
        el(tags::SERIES_NUMBER, VR::IS, "1"),
        el(tags::INSTANCE_NUMBER, VR::IS, &number.to_string()),
    ];
    if let Some(thickness) = instance.slice_thickness {
        elements.push(el(tags::SLICE_THICKNESS, VR::DS, thickness));
    }
    if instance.modality == "MR" {
        elements.push(el(tags::REPETITION_TIME, VR::DS, "500"));
        elements.push(el(tags::ECHO_TIME, VR::DS, "15"));
    }

    InMemDicomObject::from_element_iter(elements)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(sop_class)
                .media_storage_sop_instance_uid(sop_uid.as_str()),
        )
        .unwrap()
        .write_to_file(path)
        .unwrap();
}

/// Write `count` images of one series into `dir` as IM0001, IM0002, ...
pub fn write_series(dir: &Path, instance: &Instance, count: u32) {
    for n in 1..=count {
        write_instance(&dir.join(format!("IM{:04}", n)), instance, n);
    }
}

/// Layout used by the pipeline tests:
///
///   root/
///     ct_a/        3 CT images of series 1.2.840.99.1 (thickness 1.25)
///     mr_b/        2 MR images of series 1.2.840.99.2
///     thick_c/     2 CT images of series 1.2.840.99.3 (thickness 5.0)
///     notes.txt    not DICOM
pub fn create_test_tree(root: &Path) {
    write_series(&root.join("ct_a"), &Instance::ct(CT_SERIES), 3);
    write_series(&root.join("mr_b"), &Instance::mr(MR_SERIES), 2);
    write_series(
        &root.join("thick_c"),
        &Instance::ct(THICK_SERIES).thickness("5.0"),
        2,
    );
    fs::write(root.join("notes.txt"), "not an image").unwrap();
}

pub const CT_SERIES: &str = "1.2.840.99.1";
pub const MR_SERIES: &str = "1.2.840.99.2";
pub const THICK_SERIES: &str = "1.2.840.99.3";
