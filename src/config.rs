use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Tuning for derived classifications. Polarity is deliberately absent:
/// rising fail counts are always bad.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Percent changes with magnitude at or below this are `stable`.
    pub stable_band_percent: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stable_band_percent: 0.0,
        }
    }
}

impl PipelineConfig {
    pub fn new(stable_band_percent: f64) -> anyhow::Result<Self> {
        if !stable_band_percent.is_finite() || stable_band_percent < 0.0 {
            bail!("stable band must be a non-negative percentage, got {stable_band_percent}");
        }
        Ok(Self {
            stable_band_percent,
        })
    }
}
