//! Registry configuration loaded from YAML.
//!
//! ```yaml
//! base_path: ./plugins
//! decorators:
//!   upper:
//!     locate: builtin.upper
//!   stamp:
//!     locate: builtin.timestamp
//!     config:
//!       format: "%Y-%m-%d"
//! rules:
//!   console:
//!     - decoratorName: stamp
//!     - decoratorName: upper
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::loader::{LoadError, PluginSpec};
use crate::rules::RuleError;

/// Error type for file-driven configuration
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml(serde_yaml::Error),
    Load(LoadError),
    Rules(RuleError),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

impl From<LoadError> for ConfigError {
    fn from(err: LoadError) -> Self {
        ConfigError::Load(err)
    }
}

impl From<RuleError> for ConfigError {
    fn from(err: RuleError) -> Self {
        ConfigError::Rules(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Yaml(e) => write!(f, "Failed to parse YAML: {}", e),
            ConfigError::Load(e) => write!(f, "{}", e),
            ConfigError::Rules(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml(e) => Some(e),
            ConfigError::Load(e) => Some(e),
            ConfigError::Rules(e) => Some(e),
        }
    }
}

/// Declarative registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory relative plugin locators resolve against
    #[serde(default)]
    pub base_path: Option<PathBuf>,

    /// Plugin specs: name -> { locate, config? }
    #[serde(default)]
    pub decorators: IndexMap<String, PluginSpec>,

    /// Rule specs: identifier -> [{ decoratorName, config? }]
    ///
    /// Kept raw so that a non-list value is reported by the rule compiler.
    #[serde(default)]
    pub rules: IndexMap<String, JsonValue>,

    /// Directory of the file this config was read from
    #[serde(skip)]
    source_dir: Option<PathBuf>,
}

impl RegistryConfig {
    /// Load configuration from a YAML file.
    ///
    /// A relative `base_path` is taken relative to the file's directory, and
    /// a missing one defaults to that directory.
    ///
    /// # Example
    /// ```ignore
    /// use plumage::RegistryConfig;
    ///
    /// let config = RegistryConfig::load_from_file("config/plumage.yaml")?;
    /// println!("Identifiers: {:?}", config.rules.keys().collect::<Vec<_>>());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&contents)?;
        config.source_dir = Some(
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        );

        tracing::debug!(
            "Loaded config {}: {} decorators, {} rule sets",
            path.display(),
            config.decorators.len(),
            config.rules.len()
        );

        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document yields an empty config.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Effective base path for relative locators.
    pub fn base_path(&self) -> PathBuf {
        let source_dir = self.source_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        match &self.base_path {
            Some(base) if base.is_absolute() => base.clone(),
            Some(base) => source_dir.join(base),
            None => source_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    const YAML: &str = r#"
decorators:
  upper:
    locate: builtin.upper
  stamp:
    locate: builtin.timestamp
    config:
      format: "%Y"
rules:
  console:
    - decoratorName: stamp
    - decoratorName: upper
      config:
        field: message
"#;

    #[test]
    fn test_parse_yaml() {
        let config = RegistryConfig::from_yaml_str(YAML).unwrap();

        assert_eq!(config.decorators.keys().collect::<Vec<_>>(), vec!["upper", "stamp"]);
        assert_eq!(config.decorators["upper"], PluginSpec::new("builtin.upper"));
        assert_eq!(config.decorators["stamp"].config, Some(json!({"format": "%Y"})));
        assert_eq!(
            config.rules["console"],
            json!([
                {"decoratorName": "stamp"},
                {"decoratorName": "upper", "config": {"field": "message"}}
            ])
        );
    }

    #[test]
    fn test_empty_document() {
        let config = RegistryConfig::from_yaml_str("\n").unwrap();
        assert!(config.decorators.is_empty());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_missing_locate_is_left_to_loader() {
        let config = RegistryConfig::from_yaml_str("decorators:\n  upper:\n    config: {}\n").unwrap();
        assert_eq!(config.decorators["upper"].locate, None);
    }

    #[test]
    fn test_base_path_defaults_to_file_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plumage.yaml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"base_path: plugins\n").unwrap();

        let config = RegistryConfig::load_from_file(&path).unwrap();
        assert_eq!(config.base_path(), temp_dir.path().join("plugins"));

        let config = RegistryConfig::from_yaml_str("rules: {}\n").unwrap();
        assert_eq!(config.base_path(), PathBuf::from("."));
    }

    #[test]
    fn test_missing_file() {
        let result = RegistryConfig::load_from_file("/nonexistent/plumage.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
