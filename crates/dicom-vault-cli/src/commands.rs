use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dicom-vault")]
#[command(about = "Ingest, deduplicate and export DICOM series", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage stored scan configurations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Scan the directory of a stored configuration
    Scan {
        config_id: i64,
    },
    /// Scan a directory without a stored configuration
    ScanPath {
        path: String,
        /// Only look at direct children of the directory
        #[arg(long)]
        no_recursive: bool,
    },
    /// List past scan runs, newest first
    Scans {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
    },
    /// List stored series
    Series(SeriesArgs),
    /// Show one series and its file paths
    Show {
        series_id: String,
    },
    /// Mark a series inactive
    Remove {
        series_id: String,
    },
    /// Manage per-modality filter rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Copy series files and a meta.json sidecar into a target directory
    Export {
        target_dir: String,
        #[arg(required = true)]
        series_ids: Vec<String>,
    },
    /// Series counts by modality and study date
    Stats,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Register a directory to scan
    Add {
        path: String,
        #[arg(long)]
        description: Option<String>,
        /// manual or weekly
        #[arg(long, default_value = "manual")]
        schedule: String,
        #[arg(long)]
        no_recursive: bool,
    },
    /// List scan configurations
    List,
    /// Delete a scan configuration
    Remove { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum RuleAction {
    /// Create or replace the rule for a modality
    Set {
        modality: String,
        #[arg(long)]
        max_slice_thickness: Option<f64>,
        #[arg(long)]
        min_image_count: Option<i64>,
    },
    /// List filter rules
    List,
    /// Enable or disable a rule
    Toggle {
        id: i64,
        #[arg(long)]
        off: bool,
    },
    /// Delete a rule
    Remove { id: i64 },
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    #[arg(long)]
    pub patient_id: Option<String>,
    #[arg(long)]
    pub patient_name: Option<String>,
    #[arg(long)]
    pub modality: Option<String>,
    #[arg(long)]
    pub protocol: Option<String>,
    /// Inclusive, YYYYMMDD
    #[arg(long)]
    pub date_from: Option<String>,
    /// Inclusive, YYYYMMDD
    #[arg(long)]
    pub date_to: Option<String>,
    #[arg(long)]
    pub include_inactive: bool,
    #[arg(long, default_value_t = 1)]
    pub page: i64,
    #[arg(long, default_value_t = 20)]
    pub page_size: i64,
}
