use crate::dicom::sniff;
use glob::Pattern;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use walkdir::{DirEntry, WalkDir};

/// Finds DICOM files under a root directory.
///
/// Each call to [`DirectoryScanner::scan`] or [`DirectoryScanner::candidates`]
/// starts a fresh, lazy walk. Entries
/// that cannot be read (permissions, symlink loops, files vanishing mid-walk)
/// are skipped one at a time and never abort the walk. Traversal order is
/// whatever the filesystem yields.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScanner {
    recursive: bool,
    follow_symlinks: bool,
    ignore_patterns: Vec<Pattern>,
}

impl DirectoryScanner {
    pub fn new(recursive: bool) -> Self {
        Self {
            recursive,
            ..Default::default()
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Invalid globs are logged and dropped.
    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    /// DICOM files under `root`, sniffed one at a time as the walk proceeds.
    pub fn scan<'a>(&'a self, root: &Path) -> impl Iterator<Item = PathBuf> + 'a {
        self.candidates(root).filter(|path| sniff::is_dicom_file(path))
    }

    /// Every regular file the walk reaches, before any content check. Pair
    /// with [`filter_dicom`] to sniff them in parallel.
    pub fn candidates<'a>(&'a self, root: &Path) -> impl Iterator<Item = PathBuf> + 'a {
        let mut walker = WalkDir::new(root).follow_links(self.follow_symlinks);
        if !self.recursive {
            walker = walker.min_depth(1).max_depth(1);
        }

        walker
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !self.is_ignored(entry.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(is_regular_file)
            .map(DirEntry::into_path)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
}

/// Keep the DICOM files among `paths`, preserving their order. Sniffing runs
/// on the current rayon pool.
pub fn filter_dicom(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths
        .into_par_iter()
        .filter(|path| sniff::is_dicom_file(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    fn write_fake_dicom(path: &Path) {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICM");
        bytes.extend_from_slice(&[0u8; 32]);
        fs::write(path, bytes).unwrap();
    }

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::create_dir_all(root.join("skipme")).unwrap();
        write_fake_dicom(&root.join("top.dcm"));
        write_fake_dicom(&root.join("nested/inner.dcm"));
        write_fake_dicom(&root.join("nested/deeper/deep"));
        write_fake_dicom(&root.join("skipme/ignored.dcm"));
        fs::write(root.join("readme.txt"), "not dicom").unwrap();
        fs::write(root.join("nested/empty.dcm"), "").unwrap();
    }

    fn names(paths: impl Iterator<Item = PathBuf>) -> HashSet<String> {
        paths
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_recursive_scan_finds_only_dicom() {
        let tmp = tempdir().unwrap();
        build_tree(tmp.path());

        let scanner = DirectoryScanner::new(true);
        let found = names(scanner.scan(tmp.path()));
        let expected: HashSet<String> = ["top.dcm", "inner.dcm", "deep", "ignored.dcm"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_non_recursive_scan_only_direct_children() {
        let tmp = tempdir().unwrap();
        build_tree(tmp.path());

        let scanner = DirectoryScanner::new(false);
        let found = names(scanner.scan(tmp.path()));
        assert_eq!(found.len(), 1);
        assert!(found.contains("top.dcm"));
    }

    #[test]
    fn test_ignore_patterns_prune_directories() {
        let tmp = tempdir().unwrap();
        build_tree(tmp.path());

        let scanner =
            DirectoryScanner::new(true).with_ignore_patterns(&["**/skipme".to_string()]);
        let found = names(scanner.scan(tmp.path()));
        assert!(!found.contains("ignored.dcm"));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_scan_is_restartable() {
        let tmp = tempdir().unwrap();
        build_tree(tmp.path());

        let scanner = DirectoryScanner::new(true);
        assert_eq!(scanner.scan(tmp.path()).count(), 4);
        assert_eq!(scanner.scan(tmp.path()).count(), 4);
    }

    #[test]
    fn test_candidates_include_non_dicom_files() {
        let tmp = tempdir().unwrap();
        build_tree(tmp.path());

        let scanner = DirectoryScanner::new(true);
        let found = names(scanner.candidates(tmp.path()));
        assert_eq!(found.len(), 6);
        assert!(found.contains("readme.txt"));
        assert!(found.contains("empty.dcm"));
    }

    #[test]
    fn test_filter_dicom_matches_scan_and_keeps_order() {
        let tmp = tempdir().unwrap();
        build_tree(tmp.path());

        let scanner = DirectoryScanner::new(true);
        let candidates: Vec<PathBuf> = scanner.candidates(tmp.path()).collect();
        let expected: Vec<PathBuf> = candidates
            .iter()
            .filter(|p| sniff::is_dicom_file(p))
            .cloned()
            .collect();

        let filtered = filter_dicom(candidates);
        assert_eq!(filtered, expected);
        assert_eq!(names(filtered.into_iter()), names(scanner.scan(tmp.path())));
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let tmp = tempdir().unwrap();
        let scanner = DirectoryScanner::new(true);
        assert_eq!(scanner.scan(&tmp.path().join("nope")).count(), 0);
    }
}
