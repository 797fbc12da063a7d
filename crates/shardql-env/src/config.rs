//! Environment configuration, read from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Database bound to the `db` optarg when the query does not name one.
    pub default_database: String,
    pub js: JsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsConfig {
    /// Per-evaluation timeout handed to the extproc pool.
    pub timeout_ms: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            default_database: "test".to_string(),
            js: JsConfig::default(),
        }
    }
}

impl Default for JsConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl EnvConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EnvConfig = toml::from_str(content)?;
        if config.default_database.is_empty() {
            anyhow::bail!("default_database must not be empty");
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
