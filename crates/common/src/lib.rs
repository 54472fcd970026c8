//! Shared voxel types for the streaming workspace.
//!
//! # Invariants
//! - A chunk coordinate is the sole identity of a chunk.
//! - Chunks are immutable once constructed; blocks are shared, never copied.

mod block;
mod coord;

pub use block::{Block, BlockKind, Chunk};
pub use coord::{CHUNK_SIZE, ChunkCoord, world_to_chunk_space};

pub fn crate_info() -> &'static str {
    "voxstream-common v0.1.0"
}
