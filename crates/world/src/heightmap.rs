use serde::{Deserialize, Serialize};
use voxstream_common::{Block, BlockKind, CHUNK_SIZE, Chunk, ChunkCoord};

use crate::generator::{ChunkGenerator, GenerationError};

/// Shape parameters for [`HeightmapGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u64,
    /// Average surface height, in world blocks.
    pub base_height: i32,
    /// Maximum deviation above the base height, in world blocks.
    pub amplitude: f64,
    /// Distance between noise lattice points, in world blocks.
    pub feature_scale: f64,
    /// Columns below this height are flooded.
    pub water_level: i32,
    /// Surfaces above this height are snow.
    pub snow_line: i32,
    /// Lowest and highest chunk y this generator will produce.
    pub min_chunk_y: i32,
    pub max_chunk_y: i32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            base_height: 3,
            amplitude: 11.0,
            feature_scale: 24.0,
            water_level: 5,
            snow_line: 12,
            min_chunk_y: -4,
            max_chunk_y: 4,
        }
    }
}

/// Seeded two-octave value-noise heightmap terrain.
#[derive(Debug, Clone)]
pub struct HeightmapGenerator {
    params: TerrainParams,
}

impl HeightmapGenerator {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(TerrainParams {
            seed,
            ..TerrainParams::default()
        })
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Surface height of the column at world `(wx, wz)`.
    pub fn surface_height(&self, wx: i32, wz: i32) -> i32 {
        let p = &self.params;
        let x = wx as f64 / p.feature_scale;
        let z = wz as f64 / p.feature_scale;
        let n = 0.7 * value_noise(p.seed, x, z)
            + 0.3 * value_noise(p.seed ^ 0x5bd1_e995, x * 2.0, z * 2.0);
        p.base_height + (n * p.amplitude).floor() as i32
    }

    fn kind_at(&self, wy: i32, surface: i32) -> Option<BlockKind> {
        let p = &self.params;
        if wy > surface {
            return (wy <= p.water_level).then_some(BlockKind::Water);
        }
        let kind = if wy == surface {
            if surface <= p.water_level + 1 {
                BlockKind::Sand
            } else if surface >= p.snow_line {
                BlockKind::Snow
            } else {
                BlockKind::Grass
            }
        } else if wy >= surface - 3 {
            BlockKind::Dirt
        } else {
            BlockKind::Stone
        };
        Some(kind)
    }
}

impl ChunkGenerator for HeightmapGenerator {
    fn generate(&self, coord: ChunkCoord) -> Result<Chunk, GenerationError> {
        if coord.y < self.params.min_chunk_y || coord.y > self.params.max_chunk_y {
            return Err(GenerationError::OutOfRange(coord));
        }
        let origin = coord.world_origin();
        let mut blocks = Vec::new();
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let surface = self.surface_height(origin.x + lx, origin.z + lz);
                for ly in 0..CHUNK_SIZE {
                    if let Some(kind) = self.kind_at(origin.y + ly, surface) {
                        blocks.push(Block::new([lx as u8, ly as u8, lz as u8], kind));
                    }
                }
            }
        }
        tracing::trace!(%coord, blocks = blocks.len(), "generated chunk");
        Ok(Chunk::new(coord, blocks))
    }
}

/// Smoothly interpolated lattice noise in `[0, 1)`.
fn value_noise(seed: u64, x: f64, z: f64) -> f64 {
    let x0 = x.floor();
    let z0 = z.floor();
    let tx = smoothstep(x - x0);
    let tz = smoothstep(z - z0);
    let (ix, iz) = (x0 as i64, z0 as i64);

    let a = lattice(seed, ix, iz);
    let b = lattice(seed, ix + 1, iz);
    let c = lattice(seed, ix, iz + 1);
    let d = lattice(seed, ix + 1, iz + 1);

    let top = a + (b - a) * tx;
    let bottom = c + (d - c) * tx;
    top + (bottom - top) * tz
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn lattice(seed: u64, ix: i64, iz: i64) -> f64 {
    let h = splitmix64(
        seed ^ (ix as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ (iz as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f),
    );
    // Top 53 bits give a uniformly distributed f64 in [0, 1).
    (h >> 11) as f64 / (1u64 << 53) as f64
}

/// Splitmix64 finaliser, platform independent.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_chunk() {
        let a = HeightmapGenerator::with_seed(42);
        let b = HeightmapGenerator::with_seed(42);
        let coord = ChunkCoord::new(3, 0, -2);
        assert_eq!(
            a.generate(coord).unwrap().blocks(),
            b.generate(coord).unwrap().blocks()
        );
    }

    #[test]
    fn different_seeds_diverge() {
        let a = HeightmapGenerator::with_seed(1);
        let b = HeightmapGenerator::with_seed(2);
        let heights_a: Vec<i32> = (0..64).map(|x| a.surface_height(x, 0)).collect();
        let heights_b: Vec<i32> = (0..64).map(|x| b.surface_height(x, 0)).collect();
        assert_ne!(heights_a, heights_b);
    }

    #[test]
    fn surface_stays_within_amplitude() {
        let generator = HeightmapGenerator::with_seed(7);
        let p = *generator.params();
        for x in -50..50 {
            for z in -50..50 {
                let h = generator.surface_height(x, z);
                assert!(h >= p.base_height);
                assert!(h <= p.base_height + p.amplitude as i32);
            }
        }
    }

    #[test]
    fn ground_chunk_has_blocks_and_sky_chunk_is_empty() {
        let generator = HeightmapGenerator::with_seed(9);
        assert!(!generator.generate(ChunkCoord::ORIGIN).unwrap().is_empty());
        assert!(generator.generate(ChunkCoord::new(0, 2, 0)).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_layer_is_an_error() {
        let generator = HeightmapGenerator::with_seed(0);
        let coord = ChunkCoord::new(0, 99, 0);
        assert_eq!(
            generator.generate(coord).unwrap_err(),
            GenerationError::OutOfRange(coord)
        );
    }

    #[test]
    fn columns_are_topped_correctly() {
        let generator = HeightmapGenerator::with_seed(5);
        let chunk = generator.generate(ChunkCoord::ORIGIN).unwrap();
        let p = *generator.params();
        for block in chunk.blocks() {
            let surface = generator.surface_height(block.local[0] as i32, block.local[2] as i32);
            let wy = block.local[1] as i32;
            if wy == surface {
                assert_ne!(block.kind, BlockKind::Stone);
                assert_ne!(block.kind, BlockKind::Water);
            }
            if block.kind == BlockKind::Water {
                assert!(wy > surface && wy <= p.water_level);
            }
        }
    }
}
