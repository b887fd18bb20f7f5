// src/vision/yolo.rs
//
// YOLOv8 ONNX detector. Output is the raw [1, 84, N] tensor: four box
// coordinates (center format, letterboxed 640x640 space) followed by 80
// class scores per prediction.

use crate::detection::Detection;
use crate::interface::Detector;
use crate::render::resize_bilinear;
use crate::types::Frame;
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_CLASSES: usize = 80;
const NMS_IOU_THRESHOLD: f32 = 0.45;
/// Floor applied before NMS; the controller filters again with its own threshold
const MIN_SCORE: f32 = 0.1;
const LETTERBOX_FILL: u8 = 114;

/// COCO names in darknet spelling, indexed by class id.
const COCO_NAMES: [&str; YOLO_CLASSES] = [
    "person", "bicycle", "car", "motorbike", "aeroplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "sofa",
    "pottedplant", "bed", "diningtable", "toilet", "tvmonitor", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub struct YoloDetector {
    session: Session,
}

impl YoloDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        info!("Loading YOLO model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model {}", model_path))?;

        info!("✓ YOLO detector initialized");
        Ok(Self { session })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let letterbox = Letterbox::fit(frame.width, frame.height);
        let input = letterbox.tensor(&frame.data, frame.width, frame.height);
        let output = self.infer(input)?;
        let detections = nms(decode(&output, &letterbox, MIN_SCORE), NMS_IOU_THRESHOLD);

        debug!("YOLO: {} detections", detections.len());
        Ok(detections)
    }
}

/// Aspect-preserving fit into the square model input, centered on gray.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    scaled_w: usize,
    scaled_h: usize,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(src_w: usize, src_h: usize) -> Self {
        let target = YOLO_INPUT_SIZE as f32;
        let scale = (target / src_w as f32).min(target / src_h as f32);
        let scaled_w = ((src_w as f32 * scale) as usize).clamp(1, YOLO_INPUT_SIZE);
        let scaled_h = ((src_h as f32 * scale) as usize).clamp(1, YOLO_INPUT_SIZE);
        Self {
            scale,
            scaled_w,
            scaled_h,
            pad_x: (YOLO_INPUT_SIZE - scaled_w) as f32 / 2.0,
            pad_y: (YOLO_INPUT_SIZE - scaled_h) as f32 / 2.0,
        }
    }

    /// Normalized CHW tensor data.
    fn tensor(&self, src: &[u8], src_w: usize, src_h: usize) -> Vec<f32> {
        let size = YOLO_INPUT_SIZE;
        let resized = resize_bilinear(src, src_w, src_h, self.scaled_w, self.scaled_h);

        let mut canvas = vec![LETTERBOX_FILL; size * size * 3];
        let (off_x, off_y) = (self.pad_x as usize, self.pad_y as usize);
        for y in 0..self.scaled_h {
            let src_row = &resized[y * self.scaled_w * 3..(y + 1) * self.scaled_w * 3];
            let dst_start = ((y + off_y) * size + off_x) * 3;
            canvas[dst_start..dst_start + src_row.len()].copy_from_slice(src_row);
        }

        let plane = size * size;
        let mut input = vec![0.0f32; 3 * plane];
        for (i, px) in canvas.chunks_exact(3).enumerate() {
            for c in 0..3 {
                input[c * plane + i] = px[c] as f32 / 255.0;
            }
        }
        input
    }

    /// Model-space point back to frame pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Best class per prediction, kept when its score reaches `min_score`.
fn decode(output: &[f32], letterbox: &Letterbox, min_score: f32) -> Vec<Detection> {
    let predictions = output.len() / (4 + YOLO_CLASSES);
    let at = |row: usize, i: usize| output[row * predictions + i];
    let mut detections = Vec::new();

    for i in 0..predictions {
        let (best_class, score) = (0..YOLO_CLASSES)
            .map(|c| (c, at(4 + c, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < min_score {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        detections.push(Detection::new(COCO_NAMES[best_class], score, [x1, y1, x2, y2]));
    }
    detections
}

/// Greedy per-label suppression, highest confidence first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.label == det.label && iou(&k.bbox, &det.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
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
