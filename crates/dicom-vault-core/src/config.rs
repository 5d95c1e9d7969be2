use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    /// Size of the parse pool. 0 lets rayon pick the host parallelism.
    pub worker_threads: usize,
    pub ignore_patterns: Vec<String>,
    pub follow_symlinks: bool,
    pub enforce_min_image_count: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "dicom_vault.db".to_string(),
            worker_threads: 0,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            enforce_min_image_count: true,
        }
    }
}

/// Load `Config.*` from the working directory (if present), then let
/// `DICOM_VAULT_*` environment variables override individual keys.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("DICOM_VAULT").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_no_sources() {
        let config = Config::builder()
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>()
            .unwrap();
        assert_eq!(config.database_path, "dicom_vault.db");
        assert_eq!(config.worker_threads, 0);
        assert!(config.ignore_patterns.is_empty());
        assert!(!config.follow_symlinks);
        assert!(config.enforce_min_image_count);
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let config = Config::builder()
            .set_override("database_path", "/tmp/other.db")
            .unwrap()
            .set_override("worker_threads", 4)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>()
            .unwrap();
        assert_eq!(config.database_path, "/tmp/other.db");
        assert_eq!(config.worker_threads, 4);
        assert!(config.enforce_min_image_count);
    }
}
