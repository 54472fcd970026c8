//! wgpu mesh backend for the terrain pool.
//!
//! Turns bucket geometry into GPU vertex/index buffers and records one indexed
//! draw per bucket. Pipelines, shaders and cameras belong to the renderer that
//! embeds this crate.
//!
//! # Invariants
//! - Uploads never run while a bucket lock is held.
//! - Buffers are immutable once created; a rebuild allocates fresh ones.

mod device;
mod upload;

pub use device::{GpuInitError, HeadlessGpu, request_headless_device};
pub use upload::{GpuMesh, WgpuMeshBackend, record_draws, vertex_buffer_layout};

pub fn crate_info() -> &'static str {
    "voxstream-render-wgpu v0.1.0"
}
