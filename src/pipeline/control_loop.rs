// src/pipeline/control_loop.rs
//
// The tick driver. One session owns one ControlLoop; every tick:
//
//   collect lanes -> record stats -> desired timings -> advance signal
//   -> emit snapshot -> sleep
//
// Collection and the pacing sleep both race the shutdown signal. Lane
// sources are released on every way out of `run`, once any lane still in
// flight from an interrupted tick has finished.

use super::metrics::{RollingStats, StatsAccumulator};
use super::snapshot::TickSnapshot;
use crate::collector::{LaneFault, LaneObservationCollector, LaneOutcome};
use crate::config::{ConfigError, SessionParams};
use crate::interface::{BroadcastError, Broadcaster};
use crate::signal::{LanePairs, PhaseDurations, SignalStateMachine};
use crate::timing::compute_green_seconds;
use crate::types::LaneObservation;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub ticks: u64,
    pub end: SessionEnd,
    pub stats: RollingStats,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport closed after {ticks} ticks: {source}")]
    TransportClosed {
        ticks: u64,
        #[source]
        source: BroadcastError,
    },
}

/// Shutdown signal for a session. Send `true` to stop; dropping the sender
/// without sending leaves the session running.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct ControlLoop<B: Broadcaster> {
    collector: LaneObservationCollector,
    machine: SignalStateMachine,
    broadcaster: B,
    params: watch::Receiver<SessionParams>,
    shutdown: watch::Receiver<bool>,
    stats: StatsAccumulator,
    stats_tx: watch::Sender<RollingStats>,
    tick: u64,
}

impl<B: Broadcaster> ControlLoop<B> {
    pub fn new(
        collector: LaneObservationCollector,
        pairs: LanePairs,
        broadcaster: B,
        params: watch::Receiver<SessionParams>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, ConfigError> {
        if collector.lane_count() != pairs.lane_count() {
            return Err(ConfigError::LaneCountMismatch {
                workers: collector.lane_count(),
                lanes: pairs.lane_count(),
            });
        }

        let base_green = params.borrow().timing.base_green;
        let (stats_tx, _) = watch::channel(RollingStats::default());

        Ok(Self {
            collector,
            machine: SignalStateMachine::new(pairs, base_green),
            broadcaster,
            params,
            shutdown,
            stats: StatsAccumulator::new(),
            stats_tx,
            tick: 0,
        })
    }

    /// Live statistics, updated once per tick.
    pub fn stats(&self) -> watch::Receiver<RollingStats> {
        self.stats_tx.subscribe()
    }

    pub fn machine(&self) -> &SignalStateMachine {
        &self.machine
    }

    /// Run ticks until shutdown or until the transport goes away.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        info!(
            "🚦 Session started: {} lanes in {} pairs",
            self.collector.lane_count(),
            self.machine.pairs().len()
        );

        let result = self.drive().await;
        self.collector.release_all().await;

        match &result {
            Ok(report) => info!(
                "✓ Session closed after {} ticks ({} vehicles, {} emergencies seen)",
                report.ticks,
                report.stats.total_vehicles_detected,
                report.stats.emergency_vehicles_detected
            ),
            Err(e) => warn!("Session closed: {}", e),
        }
        result
    }

    async fn drive(&mut self) -> Result<SessionReport, SessionError> {
        let mut last_step = Instant::now();

        loop {
            let params = self.params.borrow_and_update().clone();
            let collect_started = Instant::now();

            let outcomes = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    return Ok(self.report(SessionEnd::Cancelled));
                }
                outcomes = self.collector.collect(self.tick + 1, params.lane_settings()) => outcomes,
            };

            let processing_secs = collect_started.elapsed().as_secs_f64();
            let now = Instant::now();
            let elapsed_secs = now.duration_since(last_step).as_secs_f64();
            last_step = now;

            let snapshot = self.step(outcomes, &params, elapsed_secs, processing_secs);
            if let Err(source) = self.broadcaster.emit(snapshot) {
                return Err(SessionError::TransportClosed {
                    ticks: self.tick,
                    source,
                });
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    return Ok(self.report(SessionEnd::Cancelled));
                }
                _ = tokio::time::sleep(params.tick_delay) => {}
            }
        }
    }

    /// Everything a tick does after collection. Synchronous, so a tick can be
    /// driven with hand-made outcomes and an explicit elapsed time.
    pub fn step(
        &mut self,
        outcomes: Vec<LaneOutcome>,
        params: &SessionParams,
        elapsed_secs: f64,
        processing_secs: f64,
    ) -> TickSnapshot {
        self.tick += 1;

        let observations: Vec<LaneObservation> = outcomes
            .into_iter()
            .map(|outcome| {
                match &outcome.fault {
                    Some(fault @ LaneFault::Offline { .. }) => debug!("{}", fault),
                    Some(fault) => warn!("⚠️  {}", fault),
                    None => {}
                }
                outcome.observation
            })
            .collect();

        self.stats.record(processing_secs, &observations);
        self.stats_tx.send_replace(self.stats.snapshot());

        let timings: Vec<u32> = observations
            .iter()
            .map(|obs| {
                compute_green_seconds(
                    obs.vehicle_count,
                    obs.person_count,
                    obs.emergency_detected,
                    &params.timing,
                )
            })
            .collect();
        let emergencies: Vec<bool> = observations.iter().map(|o| o.emergency_detected).collect();

        self.machine.advance(
            elapsed_secs,
            &timings,
            &emergencies,
            PhaseDurations {
                yellow: params.yellow_duration,
                emergency_priority: params.timing.emergency_priority,
            },
        );

        debug!(
            "Tick {}: timings {:?}, processing {:.3}s",
            self.tick, timings, processing_secs
        );

        let lights = self.machine.lights();
        TickSnapshot::assemble(
            self.tick,
            self.machine.state().phase,
            self.machine.phase_remaining_secs(),
            self.machine.active_pair(),
            observations,
            &timings,
            &lights,
        )
    }

    fn report(&self, end: SessionEnd) -> SessionReport {
        SessionReport {
            ticks: self.tick,
            end,
            stats: self.stats.snapshot(),
        }
    }
}
