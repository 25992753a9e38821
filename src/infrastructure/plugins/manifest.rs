//! Plugin manifest definition

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::errors::PluginError;

/// File name looked up inside a plugin directory
pub const MANIFEST_FILE: &str = "plugin.yaml";

/// Plugin metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginManifest {
    /// Plugin name (required)
    pub name: String,

    /// Plugin version (required)
    pub version: String,

    /// Plugin description
    pub description: Option<String>,

    /// Plugin author
    pub author: Option<String>,

    /// Path to the shared library, relative to the plugin directory
    pub library: Option<PathBuf>,

    /// Exported entry symbol
    pub entry: Option<String>,
}

impl PluginManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::Load(format!("Failed to read manifest {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PluginError> {
        serde_yaml::from_str(content)
            .map_err(|e| PluginError::Load(format!("Failed to parse manifest: {}", e)))
    }

    /// Library file inside `dir`; defaults to the platform name for `name`
    pub fn library_path(&self, dir: &Path) -> PathBuf {
        match &self.library {
            Some(lib) => dir.join(lib),
            None => dir.join(format!(
                "{}{}.{}",
                std::env::consts::DLL_PREFIX,
                self.name.replace('-', "_"),
                std::env::consts::DLL_EXTENSION
            )),
        }
    }
}
