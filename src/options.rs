use serde::Deserialize;

use crate::error::{QueueError, Result};

/// Tuning knobs for a single queue directory.
///
/// Mirrors the shape of a host application's own config struct: construct it
/// directly, derive it from `Default`, or load a fragment of it from TOML.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QueueOptions {
    /// Segments are rotated once the current head exceeds this size, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Hard ceiling on the number of segment files a queue directory may hold.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_file_size() -> u64 {
    16 * 1024 * 1024
}

fn default_max_files() -> usize {
    1024
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
        }
    }
}

impl QueueOptions {
    /// Parses a `QueueOptions` fragment out of a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: Self =
            toml::from_str(s).map_err(|e| QueueError::invalid(format!("invalid options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(QueueError::invalid("max_file_size must be greater than 0"));
        }
        if self.max_files == 0 {
            return Err(QueueError::invalid("max_files must be greater than 0"));
        }
        Ok(())
    }
}
