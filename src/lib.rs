// src/lib.rs
//
// Adaptive traffic-light controller: per-lane observations in, signal
// phases and per-tick snapshots out.

pub mod collector;
pub mod config;
pub mod detection;
pub mod interface;
pub mod pipeline;
pub mod render;
pub mod signal;
pub mod sim;
pub mod timing;
pub mod types;

#[cfg(feature = "vision")]
pub mod vision;
