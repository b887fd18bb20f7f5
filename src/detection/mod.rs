// src/detection/mod.rs

mod taxonomy;
mod types;

// Re-export public APIs
pub use taxonomy::{classify, tally, FrameTally};
pub use types::*;
