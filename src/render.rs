// src/render.rs
//
// Frame preparation shared by every lane: downscaling before detection,
// drawing detection boxes, and JPEG encoding for transport.

use crate::detection::{ClassifiedDetection, ObjectCategory};
use crate::interface::FrameRenderer;
use crate::types::Frame;
use anyhow::{Context, Result};
use image::{ImageBuffer, RgbImage};

const BOX_THICKNESS: usize = 2;

/// Downscale so the frame is at most `max_width` wide, keeping aspect ratio.
/// Narrower frames are returned untouched.
pub fn fit_to_width(frame: Frame, max_width: usize) -> Frame {
    if max_width == 0 || frame.width <= max_width || frame.is_empty() {
        return frame;
    }

    let new_height = ((frame.height as f64 * max_width as f64 / frame.width as f64) as usize).max(1);
    let data = resize_bilinear(&frame.data, frame.width, frame.height, max_width, new_height);

    Frame {
        data,
        width: max_width,
        height: new_height,
        timestamp_ms: frame.timestamp_ms,
    }
}

pub(crate) fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sy0 = (sy.floor() as usize).min(src_h - 1);
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

                dst[(dy * dst_w + dx) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    dst
}

/// RGB box color per category
fn category_color(category: ObjectCategory) -> [u8; 3] {
    match category {
        ObjectCategory::Emergency => [255, 0, 255], // magenta
        ObjectCategory::Vehicle => [255, 0, 0],     // red
        ObjectCategory::Person => [0, 255, 0],      // green
    }
}

/// Draws box outlines in place and encodes to JPEG.
pub struct JpegRenderer {
    quality: u8,
}

impl JpegRenderer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegRenderer {
    fn default() -> Self {
        // Good balance of size/quality for per-tick transfer
        Self::new(80)
    }
}

impl FrameRenderer for JpegRenderer {
    fn annotate(&self, frame: &mut Frame, detections: &[ClassifiedDetection]) -> Result<()> {
        if frame.data.len() != frame.width * frame.height * 3 {
            anyhow::bail!(
                "frame buffer is {} bytes, expected {}x{}x3",
                frame.data.len(),
                frame.width,
                frame.height
            );
        }
        for det in detections {
            draw_box(frame, det.detection.bbox, category_color(det.category));
        }
        Ok(())
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let img: RgbImage =
            ImageBuffer::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
                .context("frame buffer does not match its dimensions")?;

        let mut buf = std::io::Cursor::new(Vec::new());
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, self.quality);
        img.write_with_encoder(encoder)
            .context("JPEG encoding failed")?;

        Ok(buf.into_inner())
    }
}

/// Outline `bbox` (clipped to the frame) with a `BOX_THICKNESS` pixel border.
fn draw_box(frame: &mut Frame, bbox: [f32; 4], color: [u8; 3]) {
    if frame.is_empty() {
        return;
    }
    let max_x = (frame.width - 1) as f32;
    let max_y = (frame.height - 1) as f32;
    let x1 = bbox[0].clamp(0.0, max_x) as usize;
    let y1 = bbox[1].clamp(0.0, max_y) as usize;
    let x2 = bbox[2].clamp(0.0, max_x) as usize;
    let y2 = bbox[3].clamp(0.0, max_y) as usize;
    if x2 < x1 || y2 < y1 {
        return;
    }

    let width = frame.width;
    let mut put = |x: usize, y: usize| {
        let idx = (y * width + x) * 3;
        frame.data[idx..idx + 3].copy_from_slice(&color);
    };

    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            put(x, (y1 + t).min(y2));
            put(x, y2.saturating_sub(t).max(y1));
        }
        for y in y1..=y2 {
            put((x1 + t).min(x2), y);
            put(x2.saturating_sub(t).max(x1), y);
        }
    }
}
