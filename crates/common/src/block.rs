use glam::IVec3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::coord::{CHUNK_SIZE, ChunkCoord};

/// Material of a solid block. Air is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockKind {
    Stone,
    Dirt,
    Grass,
    Sand,
    Snow,
    Water,
}

impl BlockKind {
    /// Base RGBA colour used by the mesher.
    pub fn color(self) -> [f32; 4] {
        match self {
            BlockKind::Stone => [0.50, 0.50, 0.52, 1.0],
            BlockKind::Dirt => [0.45, 0.32, 0.20, 1.0],
            BlockKind::Grass => [0.30, 0.62, 0.24, 1.0],
            BlockKind::Sand => [0.86, 0.80, 0.56, 1.0],
            BlockKind::Snow => [0.95, 0.96, 0.98, 1.0],
            BlockKind::Water => [0.18, 0.38, 0.78, 0.8],
        }
    }
}

/// A solid block at a position local to its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Local position, each axis in `0..CHUNK_SIZE`.
    pub local: [u8; 3],
    pub kind: BlockKind,
}

impl Block {
    pub fn new(local: [u8; 3], kind: BlockKind) -> Self {
        debug_assert!(
            local.iter().all(|&c| (c as i32) < CHUNK_SIZE),
            "block local position {local:?} outside chunk"
        );
        Self { local, kind }
    }

    pub fn local_ivec(&self) -> IVec3 {
        IVec3::new(
            self.local[0] as i32,
            self.local[1] as i32,
            self.local[2] as i32,
        )
    }

    /// World-space position of this block inside the given chunk.
    pub fn world_position(&self, chunk: ChunkCoord) -> IVec3 {
        chunk.world_origin() + self.local_ivec()
    }
}

/// The solid blocks of one chunk.
///
/// Built once by a generator and never mutated afterwards. The block slice is
/// reference counted so handing it to a mesh bucket does not copy it.
#[derive(Debug, Clone)]
pub struct Chunk {
    coord: ChunkCoord,
    blocks: Arc<[Block]>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, blocks: Vec<Block>) -> Self {
        Self {
            coord,
            blocks: blocks.into(),
        }
    }

    /// A chunk with no solid blocks (open air).
    pub fn empty(coord: ChunkCoord) -> Self {
        Self::new(coord, Vec::new())
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Shared handle to the block data.
    pub fn shared_blocks(&self) -> Arc<[Block]> {
        Arc::clone(&self.blocks)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn into_parts(self) -> (ChunkCoord, Arc<[Block]>) {
        (self.coord, self.blocks)
    }
}
