// src/detection.rs
//
// YOLO person detector. The model sees a 640x640 letterboxed copy of the
// frame; boxes are mapped back to original image coordinates before NMS.
// CPU execution only — the deployment target is a Raspberry Pi.

use anyhow::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

const YOLO_INPUT_SIZE: usize = 640;
const NUM_PREDICTIONS: usize = 8400;
/// COCO class 0 = person
const PERSON_CLASS: usize = 0;
const NMS_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
}

pub struct PersonDetector {
    session: Session,
}

impl PersonDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        info!("Loading YOLO model: {}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;

        info!("✓ Person detector initialized");
        Ok(Self { session })
    }

    pub fn detect(
        &mut self,
        frame: &[u8],
        width: usize,
        height: usize,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let (input, scale, pad_x, pad_y) = letterbox(frame, width, height);
        let output = self.infer(&input)?;
        let detections = parse_predictions(&output, scale, pad_x, pad_y, confidence_threshold);
        let detections = nms(detections, NMS_IOU_THRESHOLD);
        debug!("Detected {} person(s)", detections.len());
        Ok(detections)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

/// Resize into a 640x640 gray canvas preserving aspect ratio, normalize to
/// [0, 1] and reorder HWC → CHW. Returns (input, scale, pad_x, pad_y).
fn letterbox(src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
    let target = YOLO_INPUT_SIZE;

    let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;

    let pad_x = (target - scaled_w) as f32 / 2.0;
    let pad_y = (target - scaled_h) as f32 / 2.0;

    let resized = bilinear_resize(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target * target * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_x = x + pad_x as usize;
            let dst_y = y + pad_y as usize;
            let dst_idx = (dst_y * target + dst_x) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    let mut input = vec![0.0f32; 3 * target * target];
    for c in 0..3 {
        for h in 0..target {
            for w in 0..target {
                let hwc_idx = (h * target + w) * 3 + c;
                let chw_idx = c * target * target + h * target + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

fn bilinear_resize(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

/// YOLO output layout: [1, 84, 8400], channels = [cx, cy, w, h, 80 class
/// scores]. Only the person channel is read.
fn parse_predictions(
    output: &[f32],
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    confidence_threshold: f32,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for i in 0..NUM_PREDICTIONS {
        let confidence = output[NUM_PREDICTIONS * (4 + PERSON_CLASS) + i];
        if confidence < confidence_threshold {
            continue;
        }

        let cx = output[i];
        let cy = output[NUM_PREDICTIONS + i];
        let w = output[NUM_PREDICTIONS * 2 + i];
        let h = output[NUM_PREDICTIONS * 3 + i];

        // Center format → corner format, then reverse the letterbox.
        let x1 = (cx - w / 2.0 - pad_x) / scale;
        let y1 = (cy - h / 2.0 - pad_y) / scale;
        let x2 = (cx + w / 2.0 - pad_x) / scale;
        let y2 = (cy + h / 2.0 - pad_y) / scale;

        detections.push(Detection {
            bbox: [x1, y1, x2, y2],
            confidence,
        });
    }

    detections
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|d| box_iou(&current.bbox, &d.bbox) < iou_threshold);
        keep.push(current);
    }

    keep
}

fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
        Detection {
            bbox: [x1, y1, x2, y2],
            confidence,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_boxes() {
        let detections = vec![
            det(100.0, 100.0, 200.0, 300.0, 0.9),
            det(105.0, 102.0, 205.0, 302.0, 0.7),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nms_keeps_distinct_boxes() {
        let detections = vec![
            det(100.0, 100.0, 200.0, 300.0, 0.9),
            det(400.0, 100.0, 500.0, 300.0, 0.8),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_box_iou_identity() {
        let b = [10.0, 10.0, 50.0, 90.0];
        assert!((box_iou(&b, &b) - 1.0).abs() < 1e-5);
    }
}
