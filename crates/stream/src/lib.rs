//! Streaming: chunk registry, background generation, the viewer-centred scan
//! and the per-frame driver that ties them to the mesh pool.
//!
//! # Invariants
//! - A coordinate is generated at most once while it is known to the registry.
//! - The pool's block count equals the blocks of resident chunks.
//! - The frame loop never waits on generation; a full job queue defers.
//!
//! Generation runs on a fixed set of worker threads fed by a bounded queue.
//! With zero workers it runs inline, which keeps tests and tools deterministic.

mod config;
mod error;
mod registry;
mod scan;
mod streamer;
mod timer;
mod workers;

pub use config::StreamConfig;
pub use error::StreamError;
pub use registry::{ChunkRegistry, LoadOutcome, RegistryStats};
pub use scan::{MAX_SCAN_RADIUS, ScanProgress, ScanTarget, StreamingScan, footprint};
pub use streamer::{StreamStats, TerrainStreamer};
pub use timer::FrameTimer;

pub fn crate_info() -> &'static str {
    "voxstream-stream v0.1.0"
}
