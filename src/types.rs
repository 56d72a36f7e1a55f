use serde::{Deserialize, Serialize};

use crate::counting::CountingLine;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub detection: DetectionConfig,
    pub tracker: TrackerConfig,
    pub counting: CountingConfig,
    pub alert: AlertConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub camera_index: Option<i32>,
    pub save_annotated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    /// Run the detector every N frames; the tracker coasts in between.
    pub inference_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Minimum IoU to match a detection to an existing track
    pub min_iou: f32,
    /// Frames a track survives without a detection before deletion
    pub max_coast_frames: u32,
    /// Consecutive hits required to promote Tentative → Confirmed
    pub min_hits_to_confirm: u32,
    /// Minimum detection confidence to accept
    pub min_confidence: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.2,
            max_coast_frames: 30,
            min_hits_to_confirm: 3,
            min_confidence: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountingConfig {
    pub line: CountingLine,
    pub straddle_tolerance_px: f32,
    pub track_expiry_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub low_threshold: u64,
    pub margin: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}
