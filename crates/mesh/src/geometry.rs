use bytemuck::{Pod, Zeroable};
use glam::IVec3;
use voxstream_common::{Block, CHUNK_SIZE, ChunkCoord};

/// Vertex layout shared by every mesh backend.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

struct Face {
    offset: IVec3,
    normal: [f32; 3],
    corners: [[f32; 3]; 4],
    shade: f32,
}

// Corners wind counter-clockwise seen from outside the block.
#[rustfmt::skip]
const FACES: [Face; 6] = [
    Face { offset: IVec3::new(0, 0, 1), normal: [0.0, 0.0, 1.0], shade: 0.9,
        corners: [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]] },
    Face { offset: IVec3::new(0, 0, -1), normal: [0.0, 0.0, -1.0], shade: 0.9,
        corners: [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]] },
    Face { offset: IVec3::new(1, 0, 0), normal: [1.0, 0.0, 0.0], shade: 0.8,
        corners: [[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0]] },
    Face { offset: IVec3::new(-1, 0, 0), normal: [-1.0, 0.0, 0.0], shade: 0.8,
        corners: [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]] },
    Face { offset: IVec3::new(0, 1, 0), normal: [0.0, 1.0, 0.0], shade: 1.0,
        corners: [[0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] },
    Face { offset: IVec3::new(0, -1, 0), normal: [0.0, -1.0, 0.0], shade: 0.5,
        corners: [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]] },
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// CPU-side triangle geometry, ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesh the visible faces of one chunk's blocks.
    ///
    /// A face is emitted unless the neighbouring cell inside the same chunk is
    /// occupied. Faces on the chunk border are always emitted.
    pub fn from_chunk(coord: ChunkCoord, blocks: &[Block]) -> Self {
        let occupancy = Occupancy::from_blocks(blocks);
        let origin = coord.world_origin();
        let mut mesh = Self::new();

        for block in blocks {
            let local = block.local_ivec();
            let base = (origin + local).as_vec3();
            let color = block.kind.color();
            for face in &FACES {
                if occupancy.contains(local + face.offset) {
                    continue;
                }
                let first = mesh.vertices.len() as u32;
                let shaded = [
                    color[0] * face.shade,
                    color[1] * face.shade,
                    color[2] * face.shade,
                    color[3],
                ];
                for corner in &face.corners {
                    mesh.vertices.push(MeshVertex {
                        position: [base.x + corner[0], base.y + corner[1], base.z + corner[2]],
                        normal: face.normal,
                        color: shaded,
                    });
                }
                mesh.indices.extend(QUAD_INDICES.iter().map(|i| first + i));
            }
        }
        mesh
    }

    /// Concatenate several meshes into one buffer, rebasing indices.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a MeshData> + Clone) -> Self {
        let (vertex_total, index_total) = parts
            .clone()
            .into_iter()
            .fold((0, 0), |(v, i), m| (v + m.vertices.len(), i + m.indices.len()));
        let mut merged = Self {
            vertices: Vec::with_capacity(vertex_total),
            indices: Vec::with_capacity(index_total),
        };
        for part in parts {
            merged.append(part);
        }
        merged
    }

    pub fn append(&mut self, other: &MeshData) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| base + i));
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn face_count(&self) -> usize {
        self.indices.len() / QUAD_INDICES.len()
    }

    /// Size in bytes of the vertex and index data.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice())
            + std::mem::size_of_val(self.indices.as_slice())
    }
}

/// Dense solid/empty grid for one chunk.
struct Occupancy {
    cells: Vec<bool>,
}

impl Occupancy {
    fn from_blocks(blocks: &[Block]) -> Self {
        let mut cells = vec![false; (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize];
        for block in blocks {
            if let Some(i) = Self::index(block.local_ivec()) {
                cells[i] = true;
            }
        }
        Self { cells }
    }

    fn index(p: IVec3) -> Option<usize> {
        let inside = |c: i32| (0..CHUNK_SIZE).contains(&c);
        (inside(p.x) && inside(p.y) && inside(p.z))
            .then(|| (p.x + p.z * CHUNK_SIZE + p.y * CHUNK_SIZE * CHUNK_SIZE) as usize)
    }

    fn contains(&self, p: IVec3) -> bool {
        Self::index(p).is_some_and(|i| self.cells[i])
    }
}
