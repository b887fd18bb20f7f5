// src/vision/mod.rs
//
// Real collaborators: video files through OpenCV and a YOLO model through
// ONNX Runtime. Only built with the `vision` feature.

mod video;
mod yolo;

pub use video::VideoLaneSource;
pub use yolo::YoloDetector;

use crate::collector::LaneWorker;
use crate::types::Config;
use anyhow::{Context, Result};

/// One worker per configured source, each with its own model session.
pub fn video_workers(config: &Config) -> Result<Vec<LaneWorker>> {
    config
        .lanes
        .sources
        .iter()
        .enumerate()
        .map(|(lane_id, path)| {
            let source = VideoLaneSource::open(lane_id, path)
                .with_context(|| format!("Failed to open source for lane {}", lane_id))?;
            let detector = YoloDetector::new(&config.detection.model_path)
                .with_context(|| format!("Failed to load detector for lane {}", lane_id))?;
            Ok(LaneWorker::new(lane_id, Box::new(source), Box::new(detector)))
        })
        .collect()
}
