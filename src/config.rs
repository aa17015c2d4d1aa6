//! Configuration Management
//!
//! Loads the provider configuration file: a YAML sequence of flat
//! string-to-string maps, one per configured account or profile.

use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key selecting which backend a block configures
pub const PROVIDER_KEY: &str = "provider";
/// User-assigned label distinguishing blocks of the same provider
pub const ID_KEY: &str = "id";
/// Alternative label some backends prefer over `id`
pub const PROFILE_KEY: &str = "profile";
/// Comma-separated subset of sub-resource categories to fetch
pub const SERVICES_KEY: &str = "services";

/// Errors raised while reading configuration or validating a block
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{provider}: missing required key '{key}'")]
    MissingKey { provider: String, key: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("could not read provider config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse provider config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Settings for one provider instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigBlock {
    values: HashMap<String, String>,
}

impl ConfigBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Get a value that the backend cannot work without
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            provider: self.provider().unwrap_or("unknown").to_string(),
            key: key.to_string(),
        })
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Backend name selected by this block
    pub fn provider(&self) -> Option<&str> {
        self.get(PROVIDER_KEY)
    }

    /// Label for this block: `id`, else `profile`, else empty
    pub fn label(&self) -> &str {
        self.get(ID_KEY)
            .or_else(|| self.get(PROFILE_KEY))
            .unwrap_or_default()
    }

    /// Requested service categories, trimmed, empty entries dropped
    pub fn services(&self) -> Vec<String> {
        self.get(SERVICES_KEY)
            .map(split_csv)
            .unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigBlock {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split a comma-separated list, trimming whitespace and dropping empty items
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default location of the provider configuration file
pub fn default_provider_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudlist").join("provider-config.yaml");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudlist").join("provider-config.yaml");
    }
    PathBuf::from("provider-config.yaml")
}

/// Load all configuration blocks from a YAML file
pub fn load_provider_config(path: &Path) -> Result<Vec<ConfigBlock>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_provider_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse configuration blocks from YAML text.
///
/// Scalar values of any type are stringified; nested values are ignored.
pub fn parse_provider_config(content: &str) -> Result<Vec<ConfigBlock>, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<HashMap<String, Value>> = serde_yaml::from_str(content)?;

    Ok(raw
        .into_iter()
        .map(|entry| {
            entry
                .into_iter()
                .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
                .collect::<ConfigBlock>()
        })
        .collect())
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- provider: gcp
  id: production
  project_id: my-project
  services: "compute, dns"
- provider: digitalocean
  profile: staging
  digitalocean_token: abc
- id: orphan
- provider: terraform
  id: 42
  tf_state_file: /tmp/state.json
"#;

    #[test]
    fn test_parse_blocks_in_file_order() {
        let blocks = parse_provider_config(SAMPLE).unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].provider(), Some("gcp"));
        assert_eq!(blocks[1].provider(), Some("digitalocean"));
        assert_eq!(blocks[2].provider(), None);
        assert_eq!(blocks[3].label(), "42");
    }

    #[test]
    fn test_label_prefers_id_over_profile() {
        let blocks = parse_provider_config(SAMPLE).unwrap();
        assert_eq!(blocks[0].label(), "production");
        assert_eq!(blocks[1].label(), "staging");

        let both: ConfigBlock = [("id", "a"), ("profile", "b")].into_iter().collect();
        assert_eq!(both.label(), "a");
    }

    #[test]
    fn test_services_are_trimmed() {
        let blocks = parse_provider_config(SAMPLE).unwrap();
        assert_eq!(blocks[0].services(), vec!["compute", "dns"]);
        assert!(blocks[1].services().is_empty());
    }

    #[test]
    fn test_require_reports_missing_key() {
        let block: ConfigBlock = [("provider", "gcp")].into_iter().collect();
        let err = block.require("project_id").unwrap_err();
        assert_eq!(err.to_string(), "gcp: missing required key 'project_id'");
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let block: ConfigBlock = [("provider", "gcp"), ("project_id", "")].into_iter().collect();
        assert!(block.require("project_id").is_err());
    }

    #[test]
    fn test_empty_file_has_no_blocks() {
        assert!(parse_provider_config("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider-config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let blocks = load_provider_config(&path).unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].get("project_id"), Some("my-project"));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider-config.yaml");
        std::fs::write(&path, "provider: gcp\n").unwrap();

        let err = load_provider_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unreadable_file_is_read_error() {
        let err = load_provider_config(Path::new("/nonexistent/cloudlist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
