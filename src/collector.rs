// src/collector.rs
//
// Per-tick fan-out over lanes. Every lane is a LaneWorker that owns its
// source and its own detector; each tick runs one blocking task per lane and
// joins them all, in lane order, before the tick moves on.
//
// A lane never fails the tick: whatever goes wrong (unreadable source,
// detector error, encode error, even a panic) comes back as a zero
// observation plus a LaneFault for the caller to log.

use crate::detection::{tally, ObjectCategory};
use crate::interface::{Detector, FrameRenderer, LaneSource};
use crate::render::fit_to_width;
use crate::types::{Frame, LaneId, LaneObservation};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LaneFault {
    #[error("lane {lane}: failed to read frame: {reason}")]
    SourceUnreadable { lane: LaneId, reason: String },

    #[error("lane {lane}: no frame available after restarting the stream")]
    SourceExhausted { lane: LaneId },

    #[error("lane {lane}: detection failed: {reason}")]
    Detector { lane: LaneId, reason: String },

    #[error("lane {lane}: rendering failed: {reason}")]
    Render { lane: LaneId, reason: String },

    #[error("lane {lane}: worker crashed: {reason}")]
    WorkerLost { lane: LaneId, reason: String },

    #[error("lane {lane}: offline since an earlier crash")]
    Offline { lane: LaneId },
}

impl LaneFault {
    pub fn lane(&self) -> LaneId {
        match self {
            Self::SourceUnreadable { lane, .. }
            | Self::SourceExhausted { lane }
            | Self::Detector { lane, .. }
            | Self::Render { lane, .. }
            | Self::WorkerLost { lane, .. }
            | Self::Offline { lane } => *lane,
        }
    }
}

/// Per-tick knobs, copied out of the live session parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneSettings {
    pub confidence_threshold: f32,
    /// Detect on every n-th frame
    pub frame_skip: u32,
    pub frame_width: usize,
}

/// What one lane produced this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneOutcome {
    pub observation: LaneObservation,
    pub fault: Option<LaneFault>,
}

impl LaneOutcome {
    pub fn ok(observation: LaneObservation) -> Self {
        Self {
            observation,
            fault: None,
        }
    }

    pub fn failed(fault: LaneFault) -> Self {
        Self {
            observation: LaneObservation::empty(fault.lane()),
            fault: Some(fault),
        }
    }
}

// ============================================================================
// LANE HANDLE
// ============================================================================

/// Scoped ownership of a lane source. The source is released exactly once:
/// explicitly via `release`, or when the handle is dropped (including while
/// unwinding from a panicking lane).
pub struct LaneHandle {
    lane_id: LaneId,
    source: Option<Box<dyn LaneSource>>,
}

impl LaneHandle {
    pub fn new(lane_id: LaneId, source: Box<dyn LaneSource>) -> Self {
        Self {
            lane_id,
            source: Some(source),
        }
    }

    fn source_mut(&mut self) -> Option<&mut (dyn LaneSource + 'static)> {
        self.source.as_deref_mut()
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            let name = source.describe();
            source.release();
            info!("Released lane {} source ({})", self.lane_id, name);
        }
    }
}

impl Drop for LaneHandle {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// LANE WORKER
// ============================================================================

pub struct LaneWorker {
    lane_id: LaneId,
    handle: LaneHandle,
    detector: Box<dyn Detector>,
    /// Frames pulled so far; drives the frame-skip stride
    frames_seen: u64,
    /// Last encoded frame, shown on ticks that skip detection
    last_encoded: Vec<u8>,
}

impl LaneWorker {
    pub fn new(lane_id: LaneId, source: Box<dyn LaneSource>, detector: Box<dyn Detector>) -> Self {
        Self {
            lane_id,
            handle: LaneHandle::new(lane_id, source),
            detector,
            frames_seen: 0,
            last_encoded: Vec::new(),
        }
    }

    pub fn lane_id(&self) -> LaneId {
        self.lane_id
    }

    pub fn release(&mut self) {
        self.handle.release();
    }

    pub fn observe(&mut self, settings: LaneSettings, renderer: &dyn FrameRenderer) -> LaneOutcome {
        match self.try_observe(settings, renderer) {
            Ok(observation) => LaneOutcome::ok(observation),
            Err(fault) => LaneOutcome::failed(fault),
        }
    }

    fn try_observe(
        &mut self,
        settings: LaneSettings,
        renderer: &dyn FrameRenderer,
    ) -> Result<LaneObservation, LaneFault> {
        self.frames_seen += 1;
        let frame = self.read_frame()?;

        // Skipped ticks report zero counts; the timing calculation sees an empty lane
        if self.frames_seen % settings.frame_skip.max(1) as u64 != 0 {
            return Ok(LaneObservation {
                lane_id: self.lane_id,
                rendered_frame: self.last_encoded.clone(),
                ..LaneObservation::default()
            });
        }

        let mut frame = fit_to_width(frame, settings.frame_width);

        let detections = self
            .detector
            .detect(&frame)
            .map_err(|e| LaneFault::Detector {
                lane: self.lane_id,
                reason: format!("{:#}", e),
            })?;
        let counts = tally(detections, settings.confidence_threshold);

        for det in counts
            .kept
            .iter()
            .filter(|d| d.category == ObjectCategory::Emergency)
        {
            warn!(
                "🚨 Emergency vehicle detected in lane {}: {} ({:.2})",
                self.lane_id, det.detection.label, det.detection.confidence
            );
        }

        let render_fault = |e: anyhow::Error| LaneFault::Render {
            lane: self.lane_id,
            reason: format!("{:#}", e),
        };
        renderer
            .annotate(&mut frame, &counts.kept)
            .map_err(render_fault)?;
        let encoded = renderer.encode(&frame).map_err(render_fault)?;
        self.last_encoded = encoded.clone();

        debug!(
            "Lane {}: {} vehicles, {} people, emergency={}",
            self.lane_id,
            counts.vehicles,
            counts.persons,
            counts.emergency_detected()
        );

        Ok(LaneObservation {
            lane_id: self.lane_id,
            vehicle_count: counts.vehicles,
            person_count: counts.persons,
            emergency_detected: counts.emergency_detected(),
            rendered_frame: encoded,
            detection_ran: true,
        })
    }

    /// One frame; on end of stream, rewind and try exactly once more.
    fn read_frame(&mut self) -> Result<Frame, LaneFault> {
        let lane = self.lane_id;
        let unreadable = |e: anyhow::Error| LaneFault::SourceUnreadable {
            lane,
            reason: format!("{:#}", e),
        };
        let source = self.handle.source_mut().ok_or(LaneFault::SourceUnreadable {
            lane,
            reason: "source already released".to_string(),
        })?;

        if let Some(frame) = source.next_frame().map_err(unreadable)? {
            return Ok(frame);
        }

        debug!("Lane {}: end of stream, restarting", lane);
        source.restart().map_err(unreadable)?;
        source
            .next_frame()
            .map_err(unreadable)?
            .ok_or(LaneFault::SourceExhausted { lane })
    }
}

// ============================================================================
// COLLECTOR
// ============================================================================

type LaneTask = JoinHandle<(LaneWorker, LaneOutcome)>;

pub struct LaneObservationCollector {
    /// Indexed by lane id; `None` while the lane is in flight or once its worker has been lost
    workers: Vec<Option<LaneWorker>>,
    /// Lane tasks not joined yet. Only survives a tick when `collect` was cancelled.
    in_flight: Vec<Option<LaneTask>>,
    renderer: Arc<dyn FrameRenderer>,
}

impl LaneObservationCollector {
    /// Workers are ordered by lane id; ids must be exactly `0..workers.len()`.
    pub fn new(mut workers: Vec<LaneWorker>, renderer: Arc<dyn FrameRenderer>) -> Self {
        workers.sort_by_key(|w| w.lane_id);
        debug_assert!(workers.iter().enumerate().all(|(i, w)| w.lane_id == i));

        let in_flight = workers.iter().map(|_| None).collect();
        Self {
            workers: workers.into_iter().map(Some).collect(),
            in_flight,
            renderer,
        }
    }

    pub fn lane_count(&self) -> usize {
        self.workers.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.iter().filter(|t| t.is_some()).count()
    }

    /// One observation per lane, in lane order, regardless of which lane
    /// finished first.
    ///
    /// Dropping the returned future mid-tick leaves unfinished lanes in
    /// flight; they are joined by the next `collect` or by `release_all`.
    pub async fn collect(&mut self, tick: u64, settings: LaneSettings) -> Vec<LaneOutcome> {
        self.settle().await;

        for (slot, task) in self.workers.iter_mut().zip(self.in_flight.iter_mut()) {
            if let Some(mut worker) = slot.take() {
                let renderer = Arc::clone(&self.renderer);
                *task = Some(tokio::task::spawn_blocking(move || {
                    let outcome = worker.observe(settings, renderer.as_ref());
                    (worker, outcome)
                }));
            }
        }

        let outcomes = join_all(
            self.workers
                .iter_mut()
                .zip(self.in_flight.iter_mut())
                .enumerate()
                .map(|(lane, (slot, task))| join_lane(lane, slot, task)),
        )
        .await;

        debug!("Tick {}: collected {} lanes", tick, outcomes.len());
        outcomes
    }

    /// Join lanes left in flight by a cancelled `collect` and put their
    /// workers back. Their observations are discarded.
    async fn settle(&mut self) {
        if self.in_flight_count() == 0 {
            return;
        }
        join_all(
            self.workers
                .iter_mut()
                .zip(self.in_flight.iter_mut())
                .enumerate()
                .filter(|(_, (_, task))| task.is_some())
                .map(|(lane, (slot, task))| join_lane(lane, slot, task)),
        )
        .await;
    }

    /// Wait for lanes still in flight, then release every source. Safe to
    /// call more than once.
    pub async fn release_all(&mut self) {
        let pending = self.in_flight_count();
        if pending > 0 {
            info!("Waiting for {} in-flight lanes before releasing sources", pending);
            self.settle().await;
        }
        for worker in self.workers.iter_mut().flatten() {
            worker.release();
        }
    }
}

/// Wait for one lane task and put its worker back. The worker is restored
/// in the same poll that sees the task finish, so cancelling the caller
/// never loses a finished lane.
async fn join_lane(
    lane: LaneId,
    slot: &mut Option<LaneWorker>,
    task: &mut Option<LaneTask>,
) -> LaneOutcome {
    let Some(handle) = task.as_mut() else {
        return LaneOutcome::failed(LaneFault::Offline { lane });
    };
    let joined = handle.await;
    *task = None;

    match joined {
        Ok((worker, outcome)) => {
            *slot = Some(worker);
            outcome
        }
        // The worker (and its source handle) was dropped during unwinding
        Err(e) => LaneOutcome::failed(LaneFault::WorkerLost {
            lane,
            reason: e.to_string(),
        }),
    }
}
