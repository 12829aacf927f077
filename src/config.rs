use crate::constants::{
    CACHE_PRUNE_TO, CACHE_SOFT_CAP, EXPORT_MERGE_GAP, FETCH_BATCH, INDEX_CHUNK_SIZE,
    OVERLAY_DEBOUNCE_MS, PREFETCH_ABOVE, PREFETCH_BELOW, PROGRESS_EVERY_LINES, READ_ERROR_MARKER,
    WIDTH_SAMPLE,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub view: ViewConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.view.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunk_size: usize,
    pub progress_every_lines: usize,
    /// Byte ranges closer than this are fetched with one read on export.
    pub merge_gap: u64,
    pub read_error_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: INDEX_CHUNK_SIZE,
            progress_every_lines: PROGRESS_EVERY_LINES,
            merge_gap: EXPORT_MERGE_GAP,
            read_error_marker: READ_ERROR_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub cache_soft_cap: usize,
    pub cache_prune_to: usize,
    pub prefetch_above: usize,
    pub prefetch_below: usize,
    pub fetch_batch: usize,
    pub overlay_debounce_ms: u64,
    pub width_sample: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            cache_soft_cap: CACHE_SOFT_CAP,
            cache_prune_to: CACHE_PRUNE_TO,
            prefetch_above: PREFETCH_ABOVE,
            prefetch_below: PREFETCH_BELOW,
            fetch_batch: FETCH_BATCH,
            overlay_debounce_ms: OVERLAY_DEBOUNCE_MS,
            width_sample: WIDTH_SAMPLE,
        }
    }
}

impl ViewConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.cache_prune_to <= self.cache_soft_cap,
            "cache_prune_to ({}) must not exceed cache_soft_cap ({})",
            self.cache_prune_to,
            self.cache_soft_cap
        );
        anyhow::ensure!(self.fetch_batch > 0, "fetch_batch must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "engine": {{ "merge_gap": 4096 }} }}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.engine.merge_gap, 4096);
        assert_eq!(config.engine.chunk_size, INDEX_CHUNK_SIZE);
        assert_eq!(config.view.cache_soft_cap, CACHE_SOFT_CAP);
    }

    #[test]
    fn inconsistent_cache_limits_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "view": {{ "cache_soft_cap": 10, "cache_prune_to": 20 }} }}"#
        )
        .unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(&dir.path().join("none.json")).is_err());
    }
}
