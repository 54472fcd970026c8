use glam::{DVec3, IVec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge length of a chunk, in blocks, along every axis.
pub const CHUNK_SIZE: i32 = 16;

/// Integer coordinate of a chunk, in chunk units.
///
/// Chunk `(1, 0, -1)` covers world blocks `16..32` on X, `0..16` on Y and
/// `-16..0` on Z.
///
/// # Limits
/// Components are `i32`. Conversions from continuous positions saturate:
/// values beyond the `i32` range clamp to `i32::MIN`/`i32::MAX` and NaN maps
/// to `0`. [`world_origin`](Self::world_origin) multiplies by [`CHUNK_SIZE`]
/// and is only valid within `±i32::MAX / CHUNK_SIZE` (about ±134 million
/// chunks); beyond that it overflows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Floor a continuous chunk-space position to the chunk containing it.
    pub fn from_chunk_space(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.floor() as i32,
            y: y.floor() as i32,
            z: z.floor() as i32,
        }
    }

    /// The chunk containing a world-space position.
    pub fn containing(world: DVec3) -> Self {
        let p = world_to_chunk_space(world);
        Self::from_chunk_space(p.x, p.y, p.z)
    }

    pub fn as_dvec3(self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// World-space position of the chunk's minimum corner block.
    pub fn world_origin(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * CHUNK_SIZE
    }

    /// Euclidean distance to a chunk-space position.
    pub fn distance_to(self, position: DVec3) -> f64 {
        self.as_dvec3().distance(position)
    }

    /// True when this chunk lies strictly farther than `radius` chunks from `position`.
    pub fn is_outside(self, position: DVec3, radius: u32) -> bool {
        let r = radius as f64;
        self.as_dvec3().distance_squared(position) > r * r
    }
}

impl From<IVec3> for ChunkCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Convert a world-space position to continuous chunk space.
pub fn world_to_chunk_space(world: DVec3) -> DVec3 {
    world / CHUNK_SIZE as f64
}
