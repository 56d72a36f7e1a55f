// src/main.rs

mod config;
mod counting;
mod detection;
mod events;
mod metrics;
mod overlay;
mod tracker;
mod types;
mod video;

use anyhow::Result;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use counting::{level_for, AlertLevel, CountingEngine, Direction, EngineConfig, TrackedBox};
use detection::PersonDetector;
use events::{save_event, EventBus, MonitorEvent};
use metrics::MonitorMetrics;
use tracker::PersonTracker;
use types::Config;
use video::{VideoProcessor, VideoReader};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("hallway_monitor={},ort=warn", config.logging.level))
        .init();

    info!("👥 Hallway Monitor Starting");
    info!("✓ Configuration loaded");
    info!(
        "Counting line: ({:.0},{:.0}) → ({:.0},{:.0}) | straddle ±{:.1}px | expiry {:.1}s",
        config.counting.line.start[0],
        config.counting.line.start[1],
        config.counting.line.end[0],
        config.counting.line.end[1],
        config.counting.straddle_tolerance_px,
        config.counting.track_expiry_seconds
    );
    info!(
        "Alert thresholds: WARNING ≥ {}, CRITICAL ≥ {}",
        config.alert.low_threshold,
        config.alert.low_threshold + config.alert.margin
    );

    let mut detector = PersonDetector::new(&config.detection.model_path)?;
    info!("✓ Person detector ready");

    let video_processor = VideoProcessor::new(config.clone());
    let metrics = MonitorMetrics::new();

    if let Some(index) = config.video.camera_index {
        let reader = video_processor.open_camera(index)?;
        match process_stream(
            "camera",
            reader,
            &mut detector,
            &video_processor,
            &config,
            &metrics,
        )
        .await
        {
            Ok(stats) => report_stats("camera", &stats),
            Err(e) => error!("Camera stream failed: {}", e),
        }
    } else {
        let video_files = video_processor.find_video_files()?;
        if video_files.is_empty() {
            error!("No video files found in {}", config.video.input_dir);
            return Ok(());
        }
        info!("Found {} video file(s) to process", video_files.len());

        for (idx, video_path) in video_files.iter().enumerate() {
            info!("========================================");
            info!(
                "Processing video {}/{}: {}",
                idx + 1,
                video_files.len(),
                video_path.display()
            );
            info!("========================================");

            let label = video_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("video")
                .to_string();
            let reader = match video_processor.open_video(video_path) {
                Ok(reader) => reader,
                Err(e) => {
                    error!("Failed to open {}: {}", video_path.display(), e);
                    continue;
                }
            };
            match process_stream(
                &label,
                reader,
                &mut detector,
                &video_processor,
                &config,
                &metrics,
            )
            .await
            {
                Ok(stats) => report_stats(&label, &stats),
                Err(e) => error!("Failed to process video: {}", e),
            }
        }
    }

    info!(
        "📊 Pipeline metrics: {}",
        serde_json::to_string(&metrics.summary())?
    );
    Ok(())
}

struct ProcessingStats {
    total_frames: u64,
    entries: u64,
    exits: u64,
    final_occupancy: u64,
    final_level: AlertLevel,
    anomalies: u64,
    expired_tracks: u64,
    alerts_raised: u64,
    avg_fps: f64,
}

fn report_stats(label: &str, stats: &ProcessingStats) {
    info!("📊 Monitoring session complete: {}", label);
    info!("  Total frames: {}", stats.total_frames);
    info!("  📥 Entered: {}", stats.entries);
    info!("  📤 Exited: {}", stats.exits);
    info!("  👥 Final occupancy: {}", stats.final_occupancy);
    info!("  Status: {}", stats.final_level.as_str());
    if stats.alerts_raised > 0 {
        warn!("  🚨 Alerts raised: {}", stats.alerts_raised);
    }
    if stats.anomalies > 0 {
        warn!("  ⚠️  Rejected detections: {}", stats.anomalies);
    } else {
        info!("  ⚠️  Rejected detections: 0");
    }
    info!("  🗑️  Tracks expired: {}", stats.expired_tracks);
    info!("  Processing speed: {:.1} FPS", stats.avg_fps);
}

async fn process_stream(
    label: &str,
    mut reader: VideoReader,
    detector: &mut PersonDetector,
    video_processor: &VideoProcessor,
    config: &Config,
    metrics: &MonitorMetrics,
) -> Result<ProcessingStats> {
    let start_time = Instant::now();

    let mut engine = CountingEngine::new(EngineConfig {
        line: config.counting.line,
        straddle_tolerance_px: config.counting.straddle_tolerance_px,
        track_expiry_seconds: config.counting.track_expiry_seconds,
        low_threshold: config.alert.low_threshold,
        margin: config.alert.margin,
    });
    let mut person_tracker = PersonTracker::new(config.tracker.clone());
    let mut bus = EventBus::new(64);

    let mut writer =
        video_processor.create_writer(label, reader.width, reader.height, reader.fps)?;

    std::fs::create_dir_all(&config.video.output_dir)?;
    let events_path = Path::new(&config.video.output_dir).join(format!("{}_events.jsonl", label));
    let mut events_file = File::create(&events_path)?;
    info!("💾 Crossing events: {}", events_path.display());

    // Concurrent snapshot reader — the status surface of this process.
    let status_task = {
        let ledger = engine.ledger();
        let status_metrics = metrics.clone();
        let (low, margin) = (config.alert.low_threshold, config.alert.margin);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snap = ledger.snapshot();
                let level = level_for(snap.occupancy, low, margin);
                info!(
                    "📊 Status: IN {} | OUT {} | NOW {} | {} | {:.1} FPS",
                    snap.entered,
                    snap.exited,
                    snap.occupancy,
                    level.as_str(),
                    status_metrics.fps()
                );
            }
        })
    };

    let mut frame_count: u64 = 0;
    let mut entries: u64 = 0;
    let mut exits: u64 = 0;
    let mut anomalies: u64 = 0;
    let mut expired_tracks: u64 = 0;
    let mut alerts_raised: u64 = 0;
    let mut last_level = AlertLevel::Normal;
    let mut last_snapshot = engine.ledger().snapshot();

    while let Some(frame) = reader.read_frame()? {
        frame_count += 1;
        metrics.inc(&metrics.total_frames);

        // ── Detection (every Nth frame, tracker coasts in between) ───────
        if frame_count % config.detection.inference_interval == 0 {
            let detect_start = Instant::now();
            match detector.detect(
                &frame.data,
                frame.width,
                frame.height,
                config.detection.confidence_threshold,
            ) {
                Ok(detections) => {
                    metrics.set_timing(
                        &metrics.detection_time_us,
                        detect_start.elapsed().as_micros() as u64,
                    );
                    if !detections.is_empty() {
                        metrics.inc(&metrics.frames_with_people);
                        metrics.add(&metrics.people_detected, detections.len() as u64);
                    }
                    person_tracker.update(&detections);
                }
                Err(e) => {
                    debug!("Detection failed on frame {}: {}", frame_count, e);
                    person_tracker.update(&[]);
                }
            }
        } else {
            person_tracker.update(&[]);
        }

        // ── Counting ─────────────────────────────────────────────────────
        let boxes: Vec<TrackedBox> = person_tracker
            .confirmed()
            .map(|t| TrackedBox {
                track_id: t.id,
                bbox: t.bbox,
            })
            .collect();

        let report = engine.process_frame(&boxes, frame.timestamp_ms);

        for event in &report.crossings {
            match event.direction {
                Direction::In => {
                    entries += 1;
                    metrics.inc(&metrics.entries_counted);
                }
                Direction::Out => {
                    exits += 1;
                    metrics.inc(&metrics.exits_counted);
                }
            }
            info!(
                "🚶 {} crossing: track {} at {:.2}s",
                event.direction.as_str(),
                event.track_id,
                event.timestamp_ms / 1000.0
            );
            bus.publish(MonitorEvent::Crossing(event.clone()));
        }
        if let Some(transition) = report.alert_transition {
            if transition.to != AlertLevel::Normal {
                alerts_raised += 1;
            }
            bus.publish(MonitorEvent::AlertChanged(transition));
        }
        anomalies += report.anomalies as u64;
        expired_tracks += report.expired_tracks as u64;
        metrics.add(&metrics.anomalies_rejected, report.anomalies as u64);
        metrics.add(&metrics.tracks_expired, report.expired_tracks as u64);

        for event in bus.drain() {
            save_event(&event, &mut events_file)?;
        }

        // ── Annotated output ─────────────────────────────────────────────
        if let Some(ref mut w) = writer {
            let confirmed: Vec<&tracker::Track> = person_tracker.confirmed().collect();
            match overlay::draw_overlay(
                &frame.data,
                reader.width,
                reader.height,
                engine.line(),
                &confirmed,
                &report.snapshot,
                report.alert,
                metrics.fps(),
            ) {
                Ok(annotated) => {
                    use opencv::videoio::VideoWriterTrait;
                    w.write(&annotated)?;
                }
                Err(e) => debug!("Overlay failed on frame {}: {}", frame_count, e),
            }
        }

        // ── Progress logging ─────────────────────────────────────────────
        if frame_count % 50 == 0 {
            info!(
                "Progress: {:.1}% ({}/{}) | IN: {} OUT: {} NOW: {} | Status: {} | Tracks: {}",
                reader.progress(),
                reader.current_frame,
                reader.total_frames,
                report.snapshot.entered,
                report.snapshot.exited,
                report.snapshot.occupancy,
                report.alert.as_str(),
                report.live_tracks
            );
        }

        last_level = report.alert;
        last_snapshot = report.snapshot;
    }

    status_task.abort();

    let duration = start_time.elapsed();
    let avg_fps = frame_count as f64 / duration.as_secs_f64().max(0.001);

    Ok(ProcessingStats {
        total_frames: frame_count,
        entries,
        exits,
        final_occupancy: last_snapshot.occupancy,
        final_level: last_level,
        anomalies,
        expired_tracks,
        alerts_raised,
        avg_fps,
    })
}
