// src/video.rs
//
// OpenCV capture and output. Sources are either video files discovered
// under the configured input directory or a live camera index. Frames are
// handed on as RGB with a monotonically increasing timestamp: frame
// index / fps for files, wall clock for cameras.

use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use walkdir::WalkDir;

use crate::types::{Config, Frame};

pub struct VideoProcessor {
    config: Config,
}

impl VideoProcessor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn find_video_files(&self) -> Result<Vec<PathBuf>> {
        let mut videos = Vec::new();
        let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

        for entry in WalkDir::new(&self.config.video.input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if let Some(ext) = path.extension() {
                if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                    videos.push(path.to_path_buf());
                }
            }
        }

        videos.sort();
        info!("Found {} video files", videos.len());
        Ok(videos)
    }

    pub fn open_video(&self, path: &Path) -> Result<VideoReader> {
        info!("Opening video: {}", path.display());

        let path_str = path.to_str().context("non-utf8 video path")?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(VideoReader {
            cap,
            fps,
            total_frames,
            current_frame: 0,
            width,
            height,
            started: None,
        })
    }

    pub fn open_camera(&self, index: i32) -> Result<VideoReader> {
        info!("🎥 Opening camera at index {}", index);

        let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("Failed to open camera {}", index);
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!("✅ Camera stream: {}x{} @ {:.1} FPS", width, height, fps);

        Ok(VideoReader {
            cap,
            fps,
            total_frames: 0,
            current_frame: 0,
            width,
            height,
            started: Some(Instant::now()),
        })
    }

    pub fn create_writer(
        &self,
        label: &str,
        width: i32,
        height: i32,
        fps: f64,
    ) -> Result<Option<VideoWriter>> {
        if !self.config.video.save_annotated {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.config.video.output_dir)?;

        let output_path = PathBuf::from(&self.config.video.output_dir)
            .join(format!("{}_annotated.mp4", label));
        info!("Output video: {}", output_path.display());

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            output_path.to_str().context("non-utf8 output path")?,
            fourcc,
            if fps > 0.0 { fps } else { 30.0 },
            core::Size::new(width, height),
            true,
        )?;

        Ok(Some(writer))
    }
}

pub struct VideoReader {
    pub cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub current_frame: i32,
    pub width: i32,
    pub height: i32,
    /// Set for live cameras; timestamps then come from the wall clock.
    started: Option<Instant>,
}

impl VideoReader {
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        let timestamp_ms = match self.started {
            Some(started) => started.elapsed().as_secs_f64() * 1000.0,
            None => (self.current_frame as f64 / self.fps.max(1.0)) * 1000.0,
        };

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;
        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame {
            data,
            width: self.width as usize,
            height: self.height as usize,
            timestamp_ms,
        }))
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}
