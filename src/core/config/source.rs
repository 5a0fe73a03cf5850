//! Pluggable configuration sources.
//!
//! The resolver only asks a source for raw string values by [`ConfigKey`];
//! where those values live (process environment, a `.env` file, a JSON config
//! store) is decided here.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use super::keys::ConfigKey;
use crate::error::{Error, Result};
use crate::utils::parser;

/// A user-defined macro declared by a configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSpec {
    pub name: String,
    pub tasks: Vec<String>,
}

pub trait ConfigSource {
    /// Raw value for `key`. `None` means absent; `Some("")` is an explicit empty value.
    fn get(&self, key: ConfigKey) -> Option<String>;

    /// Extra macros this source declares.
    fn macros(&self) -> Vec<MacroSpec> {
        Vec::new()
    }

    /// Short label for diagnostics.
    fn describe(&self) -> String;
}

// ============================================================================
// Process environment
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: ConfigKey) -> Option<String> {
        std::env::var(key.env_name()).ok()
    }

    fn describe(&self) -> String {
        "environment".to_string()
    }
}

// ============================================================================
// .env file
// ============================================================================

#[derive(Debug, Clone)]
pub struct DotenvSource {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl DotenvSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })?;
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: &Path, content: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            values: parser::parse_env_lines(content).into_iter().collect(),
        }
    }
}

impl ConfigSource for DotenvSource {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.env_name()).cloned()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// JSON config store
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    deploy: HashMap<String, Value>,
    #[serde(default)]
    macros: BTreeMap<String, Vec<String>>,
}

/// A JSON file shaped `{"deploy": {"dir_base": "/srv/app", ...}, "macros": {...}}`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    values: HashMap<String, String>,
    macros: Vec<MacroSpec>,
}

impl JsonFileSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let store: StoreFile = serde_json::from_str(content)
            .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;

        let mut values = HashMap::new();
        for (key, value) in store.deploy {
            let rendered = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(Error::config_invalid_value(
                        format!("deploy.{}", key),
                        Some(other.to_string()),
                        "expected a string or number",
                    ))
                }
            };
            values.insert(key, rendered);
        }

        let macros = store
            .macros
            .into_iter()
            .map(|(name, tasks)| MacroSpec { name, tasks })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            values,
            macros,
        })
    }
}

impl ConfigSource for JsonFileSource {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.store_name()).cloned()
    }

    fn macros(&self) -> Vec<MacroSpec> {
        self.macros.clone()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// In-memory and layered
// ============================================================================

/// Values keyed by environment name; used for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MapSource {
    values: HashMap<String, String>,
    macros: Vec<MacroSpec>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.values.insert(key.env_name().to_string(), value.into());
        self
    }

    pub fn with_macro(mut self, name: impl Into<String>, tasks: &[&str]) -> Self {
        self.macros.push(MacroSpec {
            name: name.into(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        });
        self
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.env_name()).cloned()
    }

    fn macros(&self) -> Vec<MacroSpec> {
        self.macros.clone()
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

/// Consults sources in order; the first one that has a key wins.
/// Macros from every layer are collected, earlier layers first.
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    fn macros(&self) -> Vec<MacroSpec> {
        self.layers.iter().flat_map(|layer| layer.macros()).collect()
    }

    fn describe(&self) -> String {
        self.layers
            .iter()
            .map(|layer| layer.describe())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}
