pub mod config;
pub mod dedup;
pub mod dicom;
pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod identity;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use engine::ScanEngine;
pub use error::Error;
pub use export::ExportResult;
pub use filter::{FilterDecision, FilterPolicy};
pub use progress::{ProgressReporter, SilentReporter};
