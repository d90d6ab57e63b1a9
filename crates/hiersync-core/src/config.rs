//! Configuration module for HierSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::EntityType;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for HierSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub naming: NamingConfig,
    pub logging: LoggingConfig,
}

/// Tracking system (ftrack) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Server base URL, e.g. `https://studio.ftrackapp.com`.
    pub server_url: String,
    /// API user name sent with every request.
    pub api_user: String,
    /// API key; `FTRACK_API_KEY` in the environment takes precedence.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Asset database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite document store.
    pub path: PathBuf,
}

/// Which entity survives when sibling names collide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateTieBreak {
    /// First entity in the order the tracking system returned them.
    #[default]
    InputOrder,
    /// Entity with the lexicographically smallest tracking id.
    SmallestId,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Custom attribute holding the asset database id.
    pub id_attribute: String,
    /// Custom attribute holding the "ignore sync" flag.
    pub ignore_attribute: String,
    /// Custom attributes mirrored into `data.attributes`.
    pub tracked_attributes: Vec<String>,
    /// Tracked attributes converted to a frame rate number.
    pub fps_attributes: Vec<String>,
    /// Entity types dropped at load time together with their subtrees.
    pub excluded_entity_types: Vec<String>,
    pub duplicate_tie_break: DuplicateTieBreak,
}

/// Naming conventions enforced on synchronized entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Pattern for asset (non-project) names.
    pub asset_pattern: String,
    /// Pattern for task names.
    pub task_pattern: String,
    /// Pattern for the project name and code.
    pub project_code_pattern: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum log level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format: text or json.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/hiersync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("hiersync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_user: String::new(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("hiersync")
                .join("assets.db"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id_attribute: "avalon_mongo_id".to_string(),
            ignore_attribute: "avalon_ignore_sync".to_string(),
            tracked_attributes: [
                "fps",
                "frameStart",
                "frameEnd",
                "handleStart",
                "handleEnd",
                "resolutionWidth",
                "resolutionHeight",
                "pixelAspect",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            fps_attributes: vec!["fps".to_string()],
            excluded_entity_types: Vec::new(),
            duplicate_tie_break: DuplicateTieBreak::InputOrder,
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            asset_pattern: "^[a-zA-Z0-9_.]*$".to_string(),
            task_pattern: "^[a-zA-Z0-9_.]*$".to_string(),
            project_code_pattern: "^[a-zA-Z0-9_]+$".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"naming.asset_pattern"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- tracking ---
        let url = self.tracking.server_url.trim();
        if url.is_empty() {
            push("tracking.server_url", "is required".into());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            push(
                "tracking.server_url",
                format!("must start with http:// or https://, got '{}'", url),
            );
        }
        if self.tracking.timeout_secs == 0 {
            push("tracking.timeout_secs", "must be greater than 0".into());
        }

        // --- sync ---
        if self.sync.id_attribute.trim().is_empty() {
            push("sync.id_attribute", "must not be empty".into());
        }
        if self.sync.ignore_attribute.trim().is_empty() {
            push("sync.ignore_attribute", "must not be empty".into());
        }
        if self.sync.id_attribute == self.sync.ignore_attribute {
            push(
                "sync.ignore_attribute",
                "must differ from sync.id_attribute".into(),
            );
        }
        for key in &self.sync.fps_attributes {
            if !self.sync.tracked_attributes.contains(key) {
                push(
                    "sync.fps_attributes",
                    format!("'{}' is not listed in sync.tracked_attributes", key),
                );
            }
        }
        for name in &self.sync.excluded_entity_types {
            match EntityType::from_name(name) {
                Ok(t) if t.is_project() => push(
                    "sync.excluded_entity_types",
                    "the project itself cannot be excluded".into(),
                ),
                Ok(_) => {}
                Err(e) => push("sync.excluded_entity_types", e.to_string()),
            }
        }

        // --- naming ---
        for (field, pattern) in [
            ("naming.asset_pattern", &self.naming.asset_pattern),
            ("naming.task_pattern", &self.naming.task_pattern),
            ("naming.project_code_pattern", &self.naming.project_code_pattern),
        ] {
            if let Err(e) = regex::Regex::new(pattern) {
                push(field, format!("invalid regular expression: {}", e));
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "must be one of {:?}, got '{}'",
                    VALID_LOG_LEVELS, self.logging.level
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "must be one of {:?}, got '{}'",
                    VALID_LOG_FORMATS, self.logging.format
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use hiersync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .tracking_server_url("https://studio.ftrackapp.com")
///     .tracking_api_user("pipeline")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder pre-filled with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- tracking ---

    pub fn tracking_server_url(mut self, url: impl Into<String>) -> Self {
        self.config.tracking.server_url = url.into();
        self
    }

    pub fn tracking_api_user(mut self, user: impl Into<String>) -> Self {
        self.config.tracking.api_user = user.into();
        self
    }

    pub fn tracking_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.tracking.api_key = Some(key.into());
        self
    }

    pub fn tracking_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.tracking.timeout_secs = seconds;
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- sync ---

    pub fn sync_id_attribute(mut self, key: impl Into<String>) -> Self {
        self.config.sync.id_attribute = key.into();
        self
    }

    pub fn sync_ignore_attribute(mut self, key: impl Into<String>) -> Self {
        self.config.sync.ignore_attribute = key.into();
        self
    }

    pub fn sync_tracked_attributes(mut self, keys: Vec<String>) -> Self {
        self.config.sync.tracked_attributes = keys;
        self
    }

    pub fn sync_fps_attributes(mut self, keys: Vec<String>) -> Self {
        self.config.sync.fps_attributes = keys;
        self
    }

    pub fn sync_excluded_entity_types(mut self, types: Vec<String>) -> Self {
        self.config.sync.excluded_entity_types = types;
        self
    }

    pub fn sync_duplicate_tie_break(mut self, tie_break: DuplicateTieBreak) -> Self {
        self.config.sync.duplicate_tie_break = tie_break;
        self
    }

    // --- naming ---

    pub fn naming_asset_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.naming.asset_pattern = pattern.into();
        self
    }

    pub fn naming_task_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.naming.task_pattern = pattern.into();
        self
    }

    pub fn naming_project_code_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.naming.project_code_pattern = pattern.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid() -> ConfigBuilder {
        ConfigBuilder::new()
            .tracking_server_url("https://studio.ftrackapp.com")
            .tracking_api_user("pipeline")
    }

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.tracking.timeout_secs, 60);
        assert!(cfg.tracking.api_key.is_none());
        assert!(cfg.database.path.ends_with("hiersync/assets.db"));
        assert_eq!(cfg.sync.id_attribute, "avalon_mongo_id");
        assert_eq!(cfg.sync.ignore_attribute, "avalon_ignore_sync");
        assert!(cfg.sync.tracked_attributes.contains(&"fps".to_string()));
        assert_eq!(cfg.sync.fps_attributes, vec!["fps".to_string()]);
        assert!(cfg.sync.excluded_entity_types.is_empty());
        assert_eq!(cfg.sync.duplicate_tie_break, DuplicateTieBreak::InputOrder);
        assert_eq!(cfg.naming.asset_pattern, "^[a-zA-Z0-9_.]*$");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "text");
    }

    #[test]
    fn default_config_only_lacks_server_url() {
        let errors = Config::default().validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tracking.server_url");
    }

    #[test]
    fn builder_config_passes_validation() {
        assert!(valid().build_validated().is_ok());
    }

    // -- Loading --

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
tracking:
  server_url: "https://studio.ftrackapp.com"
  api_user: "pipeline"
sync:
  excluded_entity_types: ["Milestone"]
  duplicate_tie_break: smallest_id
naming:
  asset_pattern: "^[A-Z0-9_]+$"
"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.tracking.server_url, "https://studio.ftrackapp.com");
        assert_eq!(cfg.tracking.timeout_secs, 60);
        assert_eq!(cfg.sync.excluded_entity_types, vec!["Milestone".to_string()]);
        assert_eq!(cfg.sync.duplicate_tie_break, DuplicateTieBreak::SmallestId);
        assert_eq!(cfg.sync.id_attribute, "avalon_mongo_id");
        assert_eq!(cfg.naming.asset_pattern, "^[A-Z0-9_]+$");
        assert_eq!(cfg.naming.task_pattern, "^[a-zA-Z0-9_.]*$");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/hiersync/config.yaml"));
        assert_eq!(cfg.sync.id_attribute, "avalon_mongo_id");
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracking: [unclosed").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("hiersync/config.yaml"));
    }

    // -- Validation --

    #[test]
    fn validate_rejects_bad_url_scheme() {
        let cfg = valid().tracking_server_url("ftp://host").build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tracking.server_url");
    }

    #[test]
    fn validate_rejects_invalid_regex() {
        let cfg = valid().naming_asset_pattern("^[a-z").build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "naming.asset_pattern");
        assert!(errors[0].message.contains("invalid regular expression"));
    }

    #[test]
    fn validate_rejects_unknown_and_project_exclusions() {
        let cfg = valid()
            .sync_excluded_entity_types(vec!["Planet".into(), "Project".into()])
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| e.field == "sync.excluded_entity_types"));
    }

    #[test]
    fn validate_rejects_untracked_fps_attribute() {
        let cfg = valid()
            .sync_tracked_attributes(vec!["frameStart".into()])
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sync.fps_attributes");
    }

    #[test]
    fn validate_rejects_same_attribute_keys() {
        let cfg = valid().sync_ignore_attribute("avalon_mongo_id").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "sync.ignore_attribute"));
    }

    #[test]
    fn validate_collects_all_errors() {
        let cfg = ConfigBuilder::new()
            .tracking_timeout_secs(0)
            .logging_level("loud")
            .logging_format("xml")
            .build();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "tracking.server_url",
                "tracking.timeout_secs",
                "logging.level",
                "logging.format"
            ]
        );
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError {
            field: "logging.level".into(),
            message: "bad".into(),
        };
        assert_eq!(e.to_string(), "logging.level: bad");
    }

    #[test]
    fn config_roundtrips_through_yaml() {
        let cfg = valid().sync_duplicate_tie_break(DuplicateTieBreak::SmallestId).build();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("smallest_id"));
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.tracking.server_url, cfg.tracking.server_url);
        assert_eq!(back.sync.duplicate_tie_break, DuplicateTieBreak::SmallestId);
    }
}
