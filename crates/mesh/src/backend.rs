use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::geometry::MeshData;

/// Destination for bucket geometry: turns CPU mesh data into a drawable buffer.
///
/// The pool calls this outside of any bucket lock. A GPU implementation
/// allocates and fills vertex/index buffers; [`CpuMeshBackend`] only records
/// what it was given.
pub trait MeshBackend: Send + Sync {
    /// Handle to uploaded geometry.
    type Buffer: Send + Sync;

    /// Upload one bucket's complete geometry. Never called with an empty mesh.
    fn upload(&self, label: &str, mesh: &MeshData) -> Self::Buffer;
}

/// Geometry a bucket last uploaded, as seen by the renderer.
#[derive(Debug)]
pub struct UploadedMesh<B> {
    pub buffer: B,
    pub vertex_count: u32,
    pub index_count: u32,
    pub chunk_count: usize,
    pub block_count: usize,
    /// Bucket build generation that produced this upload.
    pub generation: u64,
}

/// Backend that keeps geometry on the CPU. Used headless and in tests.
#[derive(Debug, Default)]
pub struct CpuMeshBackend {
    uploads: AtomicUsize,
    bytes: AtomicU64,
}

/// Upload record produced by [`CpuMeshBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuMesh {
    pub label: String,
    pub vertex_count: u32,
    pub index_count: u32,
    pub byte_size: usize,
}

impl CpuMeshBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads performed so far.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Total bytes uploaded so far.
    pub fn uploaded_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl MeshBackend for CpuMeshBackend {
    type Buffer = CpuMesh;

    fn upload(&self, label: &str, mesh: &MeshData) -> CpuMesh {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(mesh.byte_size() as u64, Ordering::Relaxed);
        CpuMesh {
            label: label.to_owned(),
            vertex_count: mesh.vertex_count(),
            index_count: mesh.index_count(),
            byte_size: mesh.byte_size(),
        }
    }
}
