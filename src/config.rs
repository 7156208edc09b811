//! Configuration Module
//!
//! Hardware capability tables loaded from TOML, on top of or instead of the
//! built-in presets.

use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::capabilities::{CapabilityTable, HardwareCaps};

/// Layout engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Register the built-in tahiti/bonaire/polaris10 tables
    #[serde(default = "default_include_builtin_presets")]
    pub include_builtin_presets: bool,

    /// Additional hardware; entries replace presets with the same
    /// generation and family
    #[serde(default)]
    pub hardware: Vec<HardwareCaps>,
}

fn default_include_builtin_presets() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include_builtin_presets: default_include_builtin_presets(),
            hardware: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every configured hardware table.
    pub fn validate(&self) -> Result<()> {
        for caps in &self.hardware {
            if let Err(reason) = caps.validate() {
                bail!("Invalid hardware entry '{}': {}", caps.name, reason);
            }
        }
        Ok(())
    }

    /// Build the capability table described by this configuration.
    pub fn capability_table(&self) -> Result<CapabilityTable> {
        self.validate()?;

        let mut table = if self.include_builtin_presets {
            CapabilityTable::with_presets()
        } else {
            CapabilityTable::new()
        };
        for caps in &self.hardware {
            table.insert(caps.clone());
        }

        info!(
            "Capability table ready: {} hardware entries ({} from configuration)",
            table.len(),
            self.hardware.len()
        );
        Ok(table)
    }
}
