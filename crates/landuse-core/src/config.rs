//! Run configuration. Every field has a default, so a config file only needs
//! the keys it overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::loader::{LoadStrategy, MAX_BATCH_SIZE, MAX_RECORDS};
use crate::scenario::ScenarioCatalogue;
use crate::validate::MAX_INPUT_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Combined scenarios to build, in `dim_scenario` key order.
    pub catalogue: ScenarioCatalogue,
    pub load_strategy: LoadStrategy,
    /// Rows per fact batch, 1..=1,000,000.
    pub batch_size: usize,
    /// Fact rows allowed per run. May only be lowered.
    pub max_records: u64,
    /// Input size ceiling in bytes. May only be lowered.
    pub max_input_bytes: u64,
    /// Parent of the per-run staging directory. System temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<PathBuf>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            catalogue: ScenarioCatalogue::default(),
            load_strategy: LoadStrategy::BulkCopy,
            batch_size: MAX_BATCH_SIZE,
            max_records: MAX_RECORDS,
            max_input_bytes: MAX_INPUT_BYTES,
            staging_root: None,
        }
    }
}

impl ConverterConfig {
    pub fn validate(&self) -> Result<()> {
        self.catalogue.validate()?;
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConvertError::config(format!(
                "batch_size must be in 1..={MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.max_records == 0 || self.max_records > MAX_RECORDS {
            return Err(ConvertError::config(format!(
                "max_records must be in 1..={MAX_RECORDS}, got {}",
                self.max_records
            )));
        }
        if self.max_input_bytes == 0 || self.max_input_bytes > MAX_INPUT_BYTES {
            return Err(ConvertError::config(format!(
                "max_input_bytes must be in 1..={MAX_INPUT_BYTES}, got {}",
                self.max_input_bytes
            )));
        }
        if let Some(root) = &self.staging_root {
            if !root.is_dir() {
                return Err(ConvertError::config(format!(
                    "staging_root {} is not a directory",
                    root.display()
                )));
            }
        }
        Ok(())
    }

    /// Read and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConvertError::config(format!("cannot read {}: {e}", path.display())))?;
        let config: ConverterConfig = serde_json::from_str(&text)
            .map_err(|e| ConvertError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
