use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

use crate::QuibError;

/// When a quib keeps its computed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    On,
    Off,
    /// Cache results that took at least `auto_cache_min_micros` to compute.
    #[default]
    Auto,
}

/// When a graphics quib is re-evaluated after its inputs change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsUpdateType {
    /// On every change, throttled while dragging.
    #[default]
    Drag,
    /// When the drag gesture ends.
    Drop,
    /// Only on an explicit refresh.
    Central,
    Never,
}

/// Settings of a quib graph. Passed to [`Project::new`](crate::project::Project::new) and read
/// from there by every quib of the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Stale overrides fail instead of being skipped with a warning.
    pub debug: bool,
    pub assignment_restrictions: bool,
    /// When unset, function quibs are evaluated as soon as they are created.
    pub lazy: bool,
    pub cache_mode: CacheMode,
    pub auto_cache_min_micros: u64,
    pub graphics_update: GraphicsUpdateType,
    pub drag_redraw_interval_ms: u64,
    pub iquib_allow_overriding: bool,
    pub function_quib_allow_overriding: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            debug: false,
            assignment_restrictions: true,
            lazy: true,
            cache_mode: CacheMode::Auto,
            auto_cache_min_micros: 0,
            graphics_update: GraphicsUpdateType::Drag,
            drag_redraw_interval_ms: 0,
            iquib_allow_overriding: true,
            function_quib_allow_overriding: false,
        }
    }
}

impl GraphConfig {
    pub fn from_toml_str(content: &str) -> Result<GraphConfig, QuibError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<GraphConfig, QuibError> {
        let content = read_to_string(path)?;
        GraphConfig::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, QuibError> {
        Ok(toml::to_string(self)?)
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_graph_config(&self) -> Result<GraphConfig, QuibError>;
    fn set_graph_config(&self, config: &GraphConfig) -> Result<(), QuibError>;
}

/// Keeps the configuration in the `[graph]` table of a TOML file. Other tables of the file are
/// preserved on write.
#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    fn read_tables(&self) -> Result<BTreeMap<String, toml::Value>, QuibError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_graph_config(&self) -> Result<GraphConfig, QuibError> {
        tracing::debug!("Attempting to read graph config from: {:?}", &self.path);
        let tables = self.read_tables()?;
        match tables.get("graph") {
            Some(table) => table
                .clone()
                .try_into()
                .map_err(|err| QuibError::Config(format!("invalid [graph] table: {err}"))),
            None => {
                tracing::debug!("No [graph] table found, using the default configuration.");
                Ok(GraphConfig::default())
            }
        }
    }

    fn set_graph_config(&self, config: &GraphConfig) -> Result<(), QuibError> {
        tracing::debug!("Attempting to write graph config to: {:?}", &self.path);
        let mut tables = self.read_tables()?;
        tables.insert("graph".to_string(), toml::Value::try_from(config)?);
        write(&self.path, toml::to_string(&tables)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GraphConfig::from_toml_str("cache_mode = \"off\"\ngraphics_update = \"central\"").unwrap();
        assert_eq!(config.cache_mode, CacheMode::Off);
        assert_eq!(config.graphics_update, GraphicsUpdateType::Central);
        assert!(config.assignment_restrictions);
        assert!(config.lazy);
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        assert!(matches!(
            GraphConfig::from_toml_str("cache_mode = \"sometimes\""),
            Err(QuibError::Serialization(_))
        ));
    }
}
