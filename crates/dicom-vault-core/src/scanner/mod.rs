pub mod group;
pub mod walk;

pub use group::{group_by_series, Grouping, SeriesGroup};
pub use walk::{filter_dicom, DirectoryScanner};
