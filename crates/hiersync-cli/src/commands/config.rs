//! Config command - View and manage HierSync configuration
//!
//! Provides the `hiersync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use hiersync_core::config::{Config, DuplicateTieBreak};

use crate::output::{get_formatter, OutputFormat};

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("tracking.server_url", "ftrack server URL"),
    ("tracking.api_user", "ftrack API user"),
    ("tracking.api_key", "ftrack API key (\"none\" clears it)"),
    ("tracking.timeout_secs", "Per-request timeout in seconds"),
    ("database.path", "SQLite asset database file"),
    ("sync.id_attribute", "Custom attribute holding the database id"),
    ("sync.ignore_attribute", "Custom attribute holding the ignore flag"),
    ("sync.tracked_attributes", "Comma-separated attribute keys"),
    ("sync.fps_attributes", "Comma-separated frame rate keys"),
    ("sync.excluded_entity_types", "Comma-separated entity types"),
    ("sync.duplicate_tie_break", "input_order|smallest_id"),
    ("naming.asset_pattern", "Regex for asset names"),
    ("naming.task_pattern", "Regex for task names"),
    ("naming.project_code_pattern", "Regex for the project name and code"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.format", "text|json"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.id_attribute")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, config_path),
            ConfigCommand::Set { key, value } => self.execute_set(key, value, format, config_path),
            ConfigCommand::Validate => self.execute_validate(format, config_path),
        }
    }

    fn execute_show(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let mut config = Config::load_or_default(config_path);
        if config.tracking.api_key.is_some() {
            config.tracking.api_key = Some("********".to_string());
        }

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(
        &self,
        key: &str,
        value: &str,
        format: OutputFormat,
        config_path: &Path,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let mut config = Config::load_or_default(config_path);

        info!(key = %key, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, description) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {:<30} - {}", name, description));
                }
            }
            return Ok(());
        }

        // Only errors on the edited key block the save; the file may still be incomplete
        let errors: Vec<String> = config
            .validate()
            .iter()
            .filter(|e| e.field == key)
            .map(|e| e.message.clone())
            .collect();
        if !errors.is_empty() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
            }
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {}", key));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                let message = if config_path.exists() {
                    format!("Failed to parse configuration: {}", e)
                } else {
                    "Configuration file not found".to_string()
                };
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [message],
                    }));
                } else {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                anyhow::bail!("Invalid configuration");
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("Invalid configuration");
        }
        Ok(())
    }
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- tracking ---
        "tracking.server_url" => config.tracking.server_url = value.to_string(),
        "tracking.api_user" => config.tracking.api_user = value.to_string(),
        "tracking.api_key" => {
            config.tracking.api_key = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "tracking.timeout_secs" => {
            config.tracking.timeout_secs = value
                .parse::<u64>()
                .context("Expected a positive integer for tracking.timeout_secs")?;
        }

        // --- database ---
        "database.path" => config.database.path = PathBuf::from(value),

        // --- sync ---
        "sync.id_attribute" => config.sync.id_attribute = value.to_string(),
        "sync.ignore_attribute" => config.sync.ignore_attribute = value.to_string(),
        "sync.tracked_attributes" => config.sync.tracked_attributes = list(value),
        "sync.fps_attributes" => config.sync.fps_attributes = list(value),
        "sync.excluded_entity_types" => config.sync.excluded_entity_types = list(value),
        "sync.duplicate_tie_break" => {
            config.sync.duplicate_tie_break = match value {
                "input_order" => DuplicateTieBreak::InputOrder,
                "smallest_id" => DuplicateTieBreak::SmallestId,
                other => anyhow::bail!("Expected input_order or smallest_id, got '{}'", other),
            };
        }

        // --- naming ---
        "naming.asset_pattern" => config.naming.asset_pattern = value.to_string(),
        "naming.task_pattern" => config.naming.task_pattern = value.to_string(),
        "naming.project_code_pattern" => config.naming.project_code_pattern = value.to_string(),

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }

    Ok(())
}
