// src/interface.rs
//
// Seams to the collaborators the controller does not implement itself:
// where frames come from, how objects are found in them, how frames are
// prepared for clients, and where snapshots go.

use crate::detection::{ClassifiedDetection, Detection};
use crate::pipeline::TickSnapshot;
use crate::types::Frame;
use anyhow::Result;
use thiserror::Error;

/// Per-lane frame supplier (camera, video file, synthetic generator).
pub trait LaneSource: Send {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Rewind to the beginning of the stream.
    fn restart(&mut self) -> Result<()>;

    /// Release the underlying device or file. Called exactly once.
    fn release(&mut self);

    fn describe(&self) -> String {
        "lane source".to_string()
    }
}

/// Object detector. Each lane owns its own instance, so calls on one
/// instance are never concurrent.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Draws detections and encodes frames for transport. Shared by all lanes.
pub trait FrameRenderer: Send + Sync {
    fn annotate(&self, frame: &mut Frame, detections: &[ClassifiedDetection]) -> Result<()>;

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>>;
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("client disconnected")]
    Disconnected,

    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outbound snapshot sink. Fire-and-forget: no acknowledgement, no retry.
/// Any error ends the session.
pub trait Broadcaster: Send {
    fn emit(&mut self, snapshot: TickSnapshot) -> Result<(), BroadcastError>;
}
