//! World generation: produces the block data of a chunk from its coordinate.
//!
//! # Invariants
//! - Generation is pure with respect to (seed, coordinate); the same inputs
//!   always produce the same chunk.
//! - Generators are shared across worker threads and must be `Send + Sync`.

mod generator;
mod heightmap;

pub use generator::{ChunkGenerator, FlatGenerator, GenerationError};
pub use heightmap::{HeightmapGenerator, TerrainParams};

pub fn crate_info() -> &'static str {
    "voxstream-world v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("world"));
    }
}
