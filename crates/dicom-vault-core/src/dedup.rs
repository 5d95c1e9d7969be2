use crate::error::Error;
use crate::filter::{FilterDecision, FilterPolicy, RejectReason};
use crate::identity;
use crate::scanner::SeriesGroup;
use crate::storage::models::SeriesRecord;
use crate::storage::Database;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// What a scan decided for one series group.
#[derive(Debug, Clone)]
pub enum SeriesDecision {
    New {
        record: Box<SeriesRecord>,
        /// Group members other than the primary path, recorded alongside
        /// the record so the whole group stays resolvable.
        member_paths: Vec<String>,
    },
    Duplicate {
        series_id: String,
        new_paths: Vec<String>,
    },
    Rejected {
        series_uid: String,
        reason: RejectReason,
    },
    Collision {
        series_uid: String,
        id: String,
        existing_uid: String,
    },
}

/// Decisions for a whole scan, committed in one transaction.
#[derive(Debug, Default)]
pub struct IngestPlan {
    pub decisions: Vec<SeriesDecision>,
}

impl IngestPlan {
    pub fn new_records(&self) -> Vec<SeriesRecord> {
        self.decisions
            .iter()
            .filter_map(|d| match d {
                SeriesDecision::New { record, .. } => Some(record.as_ref().clone()),
                _ => None,
            })
            .collect()
    }

    /// (series_id, file_path) pairs to append to the path fan-out: the
    /// non-primary members of new series and the unseen paths of duplicates.
    pub fn appended_paths(&self) -> Vec<(String, String)> {
        self.decisions
            .iter()
            .filter_map(|d| match d {
                SeriesDecision::New {
                    record,
                    member_paths,
                } => Some((&record.id, member_paths)),
                SeriesDecision::Duplicate {
                    series_id,
                    new_paths,
                } => Some((series_id, new_paths)),
                _ => None,
            })
            .flat_map(|(id, paths)| paths.iter().map(move |p| (id.clone(), p.clone())))
            .collect()
    }

    pub fn new_count(&self) -> usize {
        self.count(|d| matches!(d, SeriesDecision::New { .. }))
    }

    pub fn duplicate_count(&self) -> usize {
        self.count(|d| matches!(d, SeriesDecision::Duplicate { .. }))
    }

    pub fn rejected_count(&self) -> usize {
        self.count(|d| matches!(d, SeriesDecision::Rejected { .. }))
    }

    pub fn collision_count(&self) -> usize {
        self.count(|d| matches!(d, SeriesDecision::Collision { .. }))
    }

    fn count(&self, pred: impl Fn(&SeriesDecision) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(d)).count()
    }
}

/// Decide new / duplicate / rejected for every group against the store.
/// Nothing is written here.
pub fn plan_ingest(
    db: &Database,
    groups: &[SeriesGroup],
    policy: &FilterPolicy,
    scan_id: &str,
    cancel: &AtomicBool,
) -> Result<IngestPlan, Error> {
    let mut plan = IngestPlan::default();
    // Identifiers claimed by new series earlier in this same scan.
    let mut claimed: HashMap<String, String> = HashMap::new();

    for group in groups {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        let decision = decide(db, group, policy, scan_id, &claimed)?;
        match &decision {
            SeriesDecision::New { record, .. } => {
                claimed.insert(record.id.clone(), record.series_instance_uid.clone());
            }
            SeriesDecision::Rejected { series_uid, reason } => {
                info!("Series {} rejected: {}", series_uid, reason);
            }
            SeriesDecision::Collision {
                series_uid,
                id,
                existing_uid,
            } => {
                let err = Error::IdentifierCollision {
                    id: id.clone(),
                    existing_uid: existing_uid.clone(),
                    incoming_uid: series_uid.clone(),
                };
                error!("{}", err);
            }
            SeriesDecision::Duplicate { .. } => {}
        }
        plan.decisions.push(decision);
    }

    Ok(plan)
}

fn decide(
    db: &Database,
    group: &SeriesGroup,
    policy: &FilterPolicy,
    scan_id: &str,
    claimed: &HashMap<String, String>,
) -> Result<SeriesDecision, Error> {
    if let Some(existing) = db.get_series_by_uid(&group.series_uid)? {
        // Locations already on record (primary included) are not appended again.
        let mut known: HashSet<String> = db
            .series_paths(&existing.id)?
            .into_iter()
            .map(|p| p.file_path)
            .collect();
        known.insert(existing.file_path.clone());
        let new_paths = group
            .paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| known.insert(p.clone()))
            .collect();
        return Ok(SeriesDecision::Duplicate {
            series_id: existing.id,
            new_paths,
        });
    }

    if let FilterDecision::Reject(reason) = policy.evaluate(&group.representative, group.len()) {
        return Ok(SeriesDecision::Rejected {
            series_uid: group.series_uid.clone(),
            reason,
        });
    }

    let id = identity::series_record_id(&group.series_uid);
    let existing_uid = match claimed.get(&id) {
        Some(uid) => Some(uid.clone()),
        None => db.get_series(&id)?.map(|r| r.series_instance_uid),
    };
    if let Some(existing_uid) = existing_uid {
        return Ok(SeriesDecision::Collision {
            series_uid: group.series_uid.clone(),
            id,
            existing_uid,
        });
    }

    let record = build_record(id, group, scan_id);
    let member_paths = group.paths[1..]
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| *p != record.file_path)
        .collect();
    Ok(SeriesDecision::New {
        record: Box::new(record),
        member_paths,
    })
}

fn build_record(id: String, group: &SeriesGroup, scan_id: &str) -> SeriesRecord {
    let sample = &group.representative;
    let (file_size_total, latest_modified) = aggregate_file_stats(group);

    SeriesRecord {
        id,
        patient_id: sample.patient_id.clone(),
        patient_name: sample.patient_name.clone(),
        patient_sex: sample.patient_sex.clone(),
        patient_birth_date: sample.patient_birth_date.clone(),
        study_instance_uid: sample.study_instance_uid.clone(),
        study_date: sample.study_date.clone(),
        series_instance_uid: group.series_uid.clone(),
        series_number: sample.series_number,
        series_description: sample.series_description.clone(),
        modality: sample.modality.clone(),
        protocol_name: sample.protocol_name.clone(),
        manufacturer: sample.manufacturer.clone(),
        manufacturer_model: sample.manufacturer_model.clone(),
        ct_params: sample.ct_params().cloned(),
        mr_params: sample.mr_params().cloned(),
        dx_params: sample.dx_params().cloned(),
        file_path: group.paths[0].to_string_lossy().into_owned(),
        file_count: group.len() as i64,
        file_size_total,
        file_modified_date: latest_modified.or_else(|| sample.file_modified.clone()),
        scan_id: Some(scan_id.to_string()),
        is_active: true,
        created_at: Utc::now().to_rfc3339(),
    }
}

/// Total size and newest modification time of the files still on disk.
/// Files that vanished since discovery are skipped.
fn aggregate_file_stats(group: &SeriesGroup) -> (i64, Option<String>) {
    let mut total: u64 = 0;
    let mut latest = None;
    for path in &group.paths {
        match fs::metadata(path) {
            Ok(metadata) => {
                total += metadata.len();
                if let Ok(modified) = metadata.modified() {
                    latest = latest.max(Some(modified));
                }
            }
            Err(e) => debug!("Skipping {} in size total: {}", path.display(), e),
        }
    }
    (
        total as i64,
        latest.map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
    )
}
