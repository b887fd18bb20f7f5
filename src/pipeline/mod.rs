// src/pipeline/mod.rs

pub mod broadcast;
pub mod control_loop;
pub mod metrics;
pub mod snapshot;

pub use broadcast::{ChannelBroadcaster, JsonLinesBroadcaster};
pub use control_loop::{
    shutdown_channel, ControlLoop, SessionEnd, SessionError, SessionReport,
};
pub use metrics::{RollingStats, StatsAccumulator};
pub use snapshot::{LaneSnapshot, TickSnapshot};
