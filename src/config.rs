//! Configuration surface (C10, §6): `virtualFolders`, `writeTarget`,
//! `mountPoint`, `flags`, `serviceName`. Realized with `serde` + `toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attrs::ServiceFlags;

/// The §6 configuration surface, deserializable from a TOML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Ordered list of absolute paths, ascending priority.
    pub virtual_folders: Vec<PathBuf>,
    /// Single absolute path; created on mount if absent.
    pub write_target: PathBuf,
    /// Drive letter or empty directory path.
    pub mount_point: String,
    #[serde(default)]
    pub flags: ServiceFlags,
    /// Opaque string passed through to the bridge.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "vdtfs".to_string()
}

/// Failure modes specific to assembling a configuration (distinct from
/// [`crate::error::NtStatus`], which is the *handler* status space —
/// configuration is parsed before any handler runs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    EmptyVirtualFolders,
    WriteTargetNestedInLayer { layer: PathBuf },
    DuplicateVirtualFolder { path: PathBuf },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "invalid configuration: {msg}"),
            ConfigError::EmptyVirtualFolders => write!(f, "virtualFolders must not be empty"),
            ConfigError::WriteTargetNestedInLayer { layer } => {
                write!(f, "writeTarget must not be nested inside layer {}", layer.display())
            }
            ConfigError::DuplicateVirtualFolder { path } => {
                write!(f, "duplicate virtualFolders entry: {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl OverlayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: OverlayConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virtual_folders.is_empty() {
            return Err(ConfigError::EmptyVirtualFolders);
        }
        let mut seen = std::collections::HashSet::new();
        for layer in &self.virtual_folders {
            if !seen.insert(layer.clone()) {
                return Err(ConfigError::DuplicateVirtualFolder { path: layer.clone() });
            }
            if self.write_target.starts_with(layer) {
                return Err(ConfigError::WriteTargetNestedInLayer { layer: layer.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            virtual_folders = ["/layers/a", "/layers/b"]
            write_target = "/layers/w"
            mount_point = "M:"
        "#;
        let config = OverlayConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.virtual_folders.len(), 2);
        assert_eq!(config.service_name, "vdtfs");
        assert!(config.flags.is_empty());
    }

    #[test]
    fn rejects_empty_virtual_folders() {
        let toml = r#"
            virtual_folders = []
            write_target = "/layers/w"
            mount_point = "M:"
        "#;
        assert_eq!(OverlayConfig::from_toml_str(toml).unwrap_err(), ConfigError::EmptyVirtualFolders);
    }

    #[test]
    fn rejects_write_target_nested_in_layer() {
        let toml = r#"
            virtual_folders = ["/layers/a"]
            write_target = "/layers/a/w"
            mount_point = "M:"
        "#;
        let err = OverlayConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::WriteTargetNestedInLayer { .. }));
    }
}
