// src/pipeline/broadcast.rs
//
// Snapshot sinks. Both are fire-and-forget: a write either goes through or
// the session ends.

use super::snapshot::TickSnapshot;
use crate::interface::{BroadcastError, Broadcaster};
use std::io::Write;
use tokio::sync::mpsc;
use tracing::debug;

/// One JSON object per line, flushed per snapshot.
pub struct JsonLinesBroadcaster<W: Write + Send> {
    out: W,
    /// Drop frame payloads to keep the output readable
    include_frames: bool,
}

impl<W: Write + Send> JsonLinesBroadcaster<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            include_frames: true,
        }
    }

    pub fn without_frames(mut self) -> Self {
        self.include_frames = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Broadcaster for JsonLinesBroadcaster<W> {
    fn emit(&mut self, mut snapshot: TickSnapshot) -> Result<(), BroadcastError> {
        if !self.include_frames {
            for lane in &mut snapshot.lanes {
                lane.frame.clear();
            }
        }
        let json_line = serde_json::to_string(&snapshot)?;
        writeln!(self.out, "{}", json_line)?;
        self.out.flush()?;
        debug!("Snapshot {} written ({} bytes)", snapshot.tick, json_line.len());
        Ok(())
    }
}

/// Hands snapshots to an in-process consumer (e.g. a websocket task).
/// Dropping the receiver counts as a client disconnect.
pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<TickSnapshot>,
}

impl ChannelBroadcaster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TickSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn emit(&mut self, snapshot: TickSnapshot) -> Result<(), BroadcastError> {
        self.tx
            .send(snapshot)
            .map_err(|_| BroadcastError::Disconnected)
    }
}
