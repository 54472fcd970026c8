use voxstream_common::{Block, BlockKind, CHUNK_SIZE, Chunk, ChunkCoord};

/// Errors a generator may report for a single chunk.
///
/// The streaming layer absorbs these: the coordinate simply does not become
/// resident and may be requested again later.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("chunk {0} is outside the generator's vertical range")]
    OutOfRange(ChunkCoord),
    #[error("generation of chunk {coord} failed: {reason}")]
    Failed { coord: ChunkCoord, reason: String },
}

/// Produces the block data of a chunk, keyed by coordinate.
///
/// Called from background worker threads; implementations must not assume
/// they run on the frame thread.
pub trait ChunkGenerator: Send + Sync {
    fn generate(&self, coord: ChunkCoord) -> Result<Chunk, GenerationError>;
}

impl<F> ChunkGenerator for F
where
    F: Fn(ChunkCoord) -> Result<Chunk, GenerationError> + Send + Sync,
{
    fn generate(&self, coord: ChunkCoord) -> Result<Chunk, GenerationError> {
        self(coord)
    }
}

/// Fills every column up to a fixed world height with one block kind.
#[derive(Debug, Clone, Copy)]
pub struct FlatGenerator {
    /// Number of solid layers, starting at world y = 0.
    pub height: i32,
    pub kind: BlockKind,
}

impl FlatGenerator {
    pub fn new(height: i32, kind: BlockKind) -> Self {
        Self { height, kind }
    }

    /// Blocks produced for any chunk at chunk y = 0.
    pub fn blocks_per_chunk(&self) -> usize {
        let layers = self.height.clamp(0, CHUNK_SIZE) as usize;
        layers * (CHUNK_SIZE * CHUNK_SIZE) as usize
    }
}

impl ChunkGenerator for FlatGenerator {
    fn generate(&self, coord: ChunkCoord) -> Result<Chunk, GenerationError> {
        let base_y = coord.world_origin().y;
        let mut blocks = Vec::new();
        for ly in 0..CHUNK_SIZE {
            let wy = base_y + ly;
            if wy < 0 || wy >= self.height {
                continue;
            }
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    blocks.push(Block::new([lx as u8, ly as u8, lz as u8], self.kind));
                }
            }
        }
        Ok(Chunk::new(coord, blocks))
    }
}
