//! Terrain meshing: mesh buckets and the pool that balances and rebuilds them.
//!
//! # Invariants
//! - A chunk's blocks live in exactly one bucket; never split, never shared.
//! - A bucket's block count always equals the blocks it actually holds.
//! - At most one bucket is rebuilt per frame; uploads run outside bucket locks.
//!
//! The pool is handed to the renderer through the [`Drawable`] trait, never as
//! a scene node, so the renderer can swap backends without touching the pool.

mod backend;
mod bucket;
mod geometry;
mod pool;

pub use backend::{CpuMesh, CpuMeshBackend, MeshBackend, UploadedMesh};
pub use bucket::{BuildOutcome, MeshBucket, PurgeChunks};
pub use geometry::{MeshData, MeshVertex};
pub use pool::{BuildReport, DEFAULT_BUCKET_COUNT, Drawable, MeshPool};

pub fn crate_info() -> &'static str {
    "voxstream-mesh v0.1.0"
}
