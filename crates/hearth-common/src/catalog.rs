use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One requested model from the provisioning catalog.
///
/// Immutable once parsed. The quantization tag selects which downloadable
/// artifacts belong to this variant (e.g. "Q8_0" matches
/// `*-Q8_0-00001-of-00002.gguf`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelEntry {
    /// Hub repository id (e.g. "lmstudio-community/Llama-3.3-70B-Instruct-GGUF").
    pub repo_id: String,

    /// Quantization tag used to filter repository files.
    pub quantization: String,

    /// Optional VRAM-budget override in MB. When present the planner uses it
    /// instead of the on-disk artifact size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_hint_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalog {
    pub entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    /// Parse a comma-separated catalog spec.
    ///
    /// Each entry is `repo[:suffix][:suffix]` where a numeric colon suffix is
    /// a VRAM-budget override in MB and a non-numeric one is a quantization
    /// tag. Entries without a quantization suffix use `default_quantization`.
    pub fn parse(spec: &str, default_quantization: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();

        for raw in spec.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let mut parts = raw.split(':');
            let repo_id = parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::InvalidCatalogEntry(raw.to_string()))?
                .to_string();

            let mut quantization: Option<String> = None;
            let mut size_hint_mb: Option<u64> = None;

            for part in parts {
                let part = part.trim();
                if part.is_empty() {
                    return Err(ConfigError::InvalidCatalogEntry(raw.to_string()));
                }
                if let Ok(mb) = part.parse::<u64>() {
                    if size_hint_mb.replace(mb).is_some() {
                        return Err(ConfigError::InvalidCatalogEntry(raw.to_string()));
                    }
                } else if quantization.replace(part.to_string()).is_some() {
                    return Err(ConfigError::InvalidCatalogEntry(raw.to_string()));
                }
            }

            entries.push(ModelEntry {
                repo_id,
                quantization: quantization.unwrap_or_else(|| default_quantization.to_string()),
                size_hint_mb,
            });
        }

        if entries.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        Ok(Self { entries })
    }
}
