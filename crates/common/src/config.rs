//! Dataset configuration for tokenfeed.
//!
//! Serialised as JSON. Every field has a default so a minimal `{}` JSON
//! yields a working setup (GPT-2 style: 50k-character text combining,
//! 1024-token samples, fair boundary sampling).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How samples are drawn from a chunk store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Uniform window over the virtual concatenation, never crossing chunks.
    #[default]
    Fair,
    /// Start of a random chunk, topped up from the following chunks.
    WholeChunk,
}

impl SamplerKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "whole_chunk" | "whole-chunk" | "whole" => Self::WholeChunk,
            _ => Self::Fair,
        }
    }
}

/// Loading and sampling knobs.
///
/// Missing fields fall back to their `#[serde(default)]` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Plain-text files are buffered until this many characters accumulate,
    /// then encoded together as one chunk.
    #[serde(default = "default_combine")]
    pub combine: usize,
    /// Tokens per sample. The QnA loader also truncates questions to fit it.
    #[serde(default = "default_length")]
    pub length: usize,
    /// Sampler seed; `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub sampler: SamplerKind,
    /// Treat text inputs as blank-line separated question/answer pairs.
    #[serde(default)]
    pub qna: bool,
    /// Show a progress bar over input files while loading.
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_combine() -> usize {
    50_000
}
fn default_length() -> usize {
    1024
}
fn default_true() -> bool {
    true
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            combine: default_combine(),
            length: default_length(),
            seed: None,
            sampler: SamplerKind::Fair,
            qna: false,
            progress: true,
        }
    }
}

impl DatasetConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| crate::DataError::io(path, e))?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| crate::DataError::io(path, e))?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}
