// src/vision/video.rs

use crate::interface::LaneSource;
use crate::types::{Frame, LaneId};
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCaptureTraitConst},
};
use tracing::info;

/// A video file played in a loop as a lane camera.
pub struct VideoLaneSource {
    lane_id: LaneId,
    path: String,
    cap: videoio::VideoCapture,
    fps: f64,
    frame_index: u64,
}

impl VideoLaneSource {
    pub fn open(lane_id: LaneId, path: &str) -> Result<Self> {
        info!("Opening lane {} video: {}", lane_id, path);

        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path);
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)?;
        info!(
            "✓ Lane {}: {}x{} @ {:.1} FPS",
            lane_id, width, height, fps
        );

        Ok(Self {
            lane_id,
            path: path.to_string(),
            cap,
            // Some containers report 0; assume 30
            fps: if fps > 0.0 { fps } else { 30.0 },
            frame_index: 0,
        })
    }
}

impl LaneSource for VideoLaneSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        self.frame_index += 1;

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&mat, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        Ok(Some(Frame {
            data: rgb.data_bytes()?.to_vec(),
            width: rgb.cols() as usize,
            height: rgb.rows() as usize,
            timestamp_ms: self.frame_index as f64 / self.fps * 1000.0,
        }))
    }

    fn restart(&mut self) -> Result<()> {
        if !self.cap.set(videoio::CAP_PROP_POS_FRAMES, 0.0)? {
            anyhow::bail!("{} does not support seeking", self.path);
        }
        self.frame_index = 0;
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            tracing::warn!("Lane {}: failed to release {}: {}", self.lane_id, self.path, e);
        }
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
