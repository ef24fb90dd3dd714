//! Loading datasource configuration from TOML

use std::path::{Path, PathBuf};

use dynds_core::{DsError, Result};

use crate::DynamicDataSourceProperties;

/// File name looked up inside [`config_dir`]
pub const CONFIG_FILE_NAME: &str = "datasources.toml";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("dynds"))
        .ok_or_else(|| DsError::Configuration("Could not determine config directory".into()))
}

pub fn default_config_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

impl DynamicDataSourceProperties {
    /// Parse a TOML document and fill in defaults
    ///
    /// Datasources without a pool name take their key as name. A datasource
    /// without a URL is a configuration error.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut properties: Self = toml::from_str(source)?;

        for (key, property) in properties.datasource.iter_mut() {
            if property.url.trim().is_empty() {
                return Err(DsError::Configuration(format!(
                    "datasource '{}' has no url",
                    key
                )));
            }
            if property.pool_name.is_none() {
                property.pool_name = Some(key.clone());
            }
        }

        tracing::debug!(
            datasources = properties.datasource.len(),
            primary = %properties.primary,
            "datasource configuration parsed"
        );
        Ok(properties)
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading datasource configuration");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Read the file at [`default_config_path`]
    pub fn load_default() -> Result<Self> {
        Self::load(&default_config_path()?)
    }
}
