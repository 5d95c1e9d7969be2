use crate::dicom::{read_descriptor, RawDescriptor, ReadOutcome};
use crate::error::Error;
use crate::progress::ProgressReporter;
use dashmap::DashMap;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// All files sharing one series UID.
#[derive(Debug, Clone)]
pub struct SeriesGroup {
    pub series_uid: String,
    /// Member paths in first-seen order.
    pub paths: Vec<PathBuf>,
    /// Descriptor of the first member, used as the series sample.
    pub representative: RawDescriptor,
}

impl SeriesGroup {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Grouping {
    /// Ordered by each group's first-seen file.
    pub groups: Vec<SeriesGroup>,
    /// Files that produced no usable descriptor.
    pub files_skipped: usize,
}

/// Read every candidate on the current rayon pool and group the paths by
/// series UID.
///
/// Members are tagged with their index in `paths` and merged into a shared
/// map, so the result depends only on the input order, never on which worker
/// finishes first. Files without a descriptor, series UID or modality are
/// dropped.
pub fn group_by_series(
    paths: &[PathBuf],
    cancel: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<Grouping, Error> {
    let members: DashMap<String, Vec<(usize, RawDescriptor)>> = DashMap::new();
    let files_read = AtomicUsize::new(0);
    let files_skipped = AtomicUsize::new(0);
    let total = paths.len();

    reporter.on_group_start(total);

    paths.par_iter().enumerate().try_for_each(|(index, path)| {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        match read_descriptor(path) {
            ReadOutcome::Parsed(descriptor) if descriptor.is_groupable() => {
                members
                    .entry(descriptor.series_instance_uid.clone())
                    .or_default()
                    .push((index, descriptor));
            }
            _ => {
                files_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let done = files_read.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.on_group_progress(done, total);
        Ok(())
    })?;

    let mut ordered: Vec<(usize, SeriesGroup)> = members
        .into_iter()
        .filter_map(|(series_uid, mut entries)| {
            entries.sort_by_key(|(index, _)| *index);
            let first_index = entries.first()?.0;
            let paths = entries
                .iter()
                .map(|(_, d)| d.file_path.clone())
                .collect::<Vec<_>>();
            let (_, representative) = entries.into_iter().next()?;
            Some((
                first_index,
                SeriesGroup {
                    series_uid,
                    paths,
                    representative,
                },
            ))
        })
        .collect();
    ordered.sort_by_key(|(first_index, _)| *first_index);

    Ok(Grouping {
        groups: ordered.into_iter().map(|(_, group)| group).collect(),
        files_skipped: files_skipped.into_inner(),
    })
}
