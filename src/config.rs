use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let config: Config = serde_yaml::from_str(&contents).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.counting.line.length() < 1.0 {
            bail!("counting.line is degenerate: start and end coincide");
        }
        if self.counting.straddle_tolerance_px < 0.0 {
            bail!("counting.straddle_tolerance_px must be non-negative");
        }
        if self.counting.track_expiry_seconds <= 0.0 {
            bail!("counting.track_expiry_seconds must be positive");
        }
        if self.alert.margin == 0 {
            bail!("alert.margin must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            bail!("detection.confidence_threshold must be within [0, 1]");
        }
        if self.detection.inference_interval == 0 {
            bail!("detection.inference_interval must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.tracker.min_iou) {
            bail!("tracker.min_iou must be within [0, 1]");
        }
        if self.tracker.min_hits_to_confirm == 0 {
            bail!("tracker.min_hits_to_confirm must be at least 1");
        }
        Ok(())
    }
}
