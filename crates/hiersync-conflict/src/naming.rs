//! Naming rules for synchronized entities
//!
//! Names must be non-empty and match the configured pattern for their kind
//! (asset, task, project). Sibling collisions are detected on the
//! normalized form produced by [`normalize_name`].

use std::fmt::{self, Display, Formatter};

use hiersync_core::config::NamingConfig;
use regex::Regex;

use crate::error::ConflictError;

/// Why a name was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameViolation {
    Empty,
    DisallowedCharacters { name: String, pattern: String },
    InvalidProjectCode { code: String, pattern: String },
}

impl Display for NameViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NameViolation::Empty => write!(f, "Name is empty"),
            NameViolation::DisallowedCharacters { name, pattern } => write!(
                f,
                "Name \"{}\" contains characters not allowed by {}",
                name, pattern
            ),
            NameViolation::InvalidProjectCode { code, pattern } => write!(
                f,
                "Project code \"{}\" does not match {}",
                code, pattern
            ),
        }
    }
}

/// Compiled naming patterns
#[derive(Debug, Clone)]
pub struct NamingRules {
    asset: Regex,
    task: Regex,
    project_code: Regex,
}

impl NamingRules {
    /// Compile the patterns of a [`NamingConfig`]
    pub fn from_config(config: &NamingConfig) -> Result<Self, ConflictError> {
        Ok(Self {
            asset: compile("naming.asset_pattern", &config.asset_pattern)?,
            task: compile("naming.task_pattern", &config.task_pattern)?,
            project_code: compile("naming.project_code_pattern", &config.project_code_pattern)?,
        })
    }

    pub fn check_asset(&self, name: &str) -> Result<(), NameViolation> {
        check(&self.asset, name)
    }

    pub fn check_task(&self, name: &str) -> Result<(), NameViolation> {
        check(&self.task, name)
    }

    /// The project name and its short code must both match the code pattern
    pub fn check_project(&self, name: &str, code: Option<&str>) -> Result<(), NameViolation> {
        check(&self.project_code, name)?;
        if let Some(code) = code {
            if code.is_empty() || !self.project_code.is_match(code) {
                return Err(NameViolation::InvalidProjectCode {
                    code: code.to_string(),
                    pattern: self.project_code.as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex, ConflictError> {
    Regex::new(pattern).map_err(|e| ConflictError::InvalidPattern {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn check(pattern: &Regex, name: &str) -> Result<(), NameViolation> {
    if name.is_empty() {
        return Err(NameViolation::Empty);
    }
    if !pattern.is_match(name) {
        return Err(NameViolation::DisallowedCharacters {
            name: name.to_string(),
            pattern: pattern.as_str().to_string(),
        });
    }
    Ok(())
}

/// Case- and whitespace-insensitive form used for duplicate detection
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> NamingRules {
        NamingRules::from_config(&NamingConfig::default()).unwrap()
    }

    #[test]
    fn test_valid_asset_names() {
        let rules = rules();
        assert!(rules.check_asset("SH010").is_ok());
        assert!(rules.check_asset("char_hero.v2").is_ok());
    }

    #[test]
    fn test_empty_name_is_invalid() {
        assert_eq!(rules().check_asset(""), Err(NameViolation::Empty));
    }

    #[test]
    fn test_disallowed_characters() {
        let err = rules().check_asset("SEQ 01").unwrap_err();
        assert!(matches!(err, NameViolation::DisallowedCharacters { .. }));
        assert_eq!(
            err.to_string(),
            "Name \"SEQ 01\" contains characters not allowed by ^[a-zA-Z0-9_.]*$"
        );
        assert!(rules().check_task("comp/final").is_err());
    }

    #[test]
    fn test_project_code_checked() {
        let rules = rules();
        assert!(rules.check_project("demo_project", Some("demo")).is_ok());
        assert!(rules.check_project("demo_project", None).is_ok());
        assert!(matches!(
            rules.check_project("demo_project", Some("de-mo")),
            Err(NameViolation::InvalidProjectCode { .. })
        ));
        // Dots are fine for assets but not for projects
        assert!(rules.check_project("demo.project", None).is_err());
    }

    #[test]
    fn test_invalid_pattern_reports_field() {
        let config = NamingConfig {
            task_pattern: "^[a-z".to_string(),
            ..NamingConfig::default()
        };
        let err = NamingRules::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ConflictError::InvalidPattern { ref field, .. } if field == "naming.task_pattern"
        ));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("SH020"), "sh020");
        assert_eq!(normalize_name(" sh 020\t"), "sh020");
        assert_eq!(normalize_name("Sh020"), normalize_name("sH 020"));
    }
}
