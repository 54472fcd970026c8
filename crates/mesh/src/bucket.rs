use glam::DVec3;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voxstream_common::{Block, ChunkCoord};

use crate::backend::{MeshBackend, UploadedMesh};
use crate::geometry::MeshData;

/// What a call to [`MeshBucket::build`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Nothing changed since the previous build; no upload happened.
    Unchanged,
    /// The bucket's geometry was uploaded.
    Uploaded {
        chunks: usize,
        /// Chunks added since the previous build.
        new_chunks: usize,
        vertices: u32,
        indices: u32,
    },
    /// The bucket became empty; its buffer was released.
    Cleared,
}

/// One GPU-facing aggregate owning the blocks of a subset of chunks.
///
/// All structural mutation happens under a single lock, so adding, purging
/// and the capture phase of a build never interleave. The upload itself runs
/// after the lock is released.
pub struct MeshBucket<B> {
    index: usize,
    label: String,
    state: Mutex<BucketState>,
    /// Mirror of `BucketState::block_count`, readable without the lock.
    block_count: AtomicUsize,
    uploaded: Mutex<UploadSlot<B>>,
}

#[derive(Default)]
struct BucketState {
    chunks: HashMap<ChunkCoord, ChunkEntry>,
    /// Chunks added since the last build.
    pending: Vec<ChunkCoord>,
    block_count: usize,
    dirty: bool,
    generation: u64,
}

struct ChunkEntry {
    blocks: Arc<[Block]>,
    mesh: Arc<MeshData>,
}

struct UploadSlot<B> {
    generation: u64,
    mesh: Option<Arc<UploadedMesh<B>>>,
}

impl BucketState {
    fn is_consistent(&self) -> bool {
        self.block_count == self.chunks.values().map(|e| e.blocks.len()).sum::<usize>()
    }
}

impl<B> MeshBucket<B> {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            label: format!("terrain_bucket_{index}"),
            state: Mutex::new(BucketState::default()),
            block_count: AtomicUsize::new(0),
            uploaded: Mutex::new(UploadSlot {
                generation: 0,
                mesh: None,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Blocks currently owned. Read without locking; used for load balancing.
    pub fn block_count(&self) -> usize {
        self.block_count.load(Ordering::Acquire)
    }

    pub fn chunk_count(&self) -> usize {
        self.lock_state().chunks.len()
    }

    /// Chunks added since the last build.
    pub fn pending_chunks(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn owns(&self, coord: ChunkCoord) -> bool {
        self.lock_state().chunks.contains_key(&coord)
    }

    /// Owned chunk coordinates, sorted.
    pub fn chunk_coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self.lock_state().chunks.keys().copied().collect();
        coords.sort_unstable();
        coords
    }

    /// Block total recomputed from the owned chunks, ignoring the tracked counter.
    pub fn recount_blocks(&self) -> usize {
        self.lock_state()
            .chunks
            .values()
            .map(|e| e.blocks.len())
            .sum()
    }

    /// Number of completed builds.
    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    /// Geometry from the most recent upload, if the bucket is non-empty.
    pub fn mesh(&self) -> Option<Arc<UploadedMesh<B>>> {
        self.lock_upload().mesh.clone()
    }

    /// Take ownership of a chunk's blocks.
    ///
    /// # Panics
    /// If this bucket already owns `coord`: a chunk's blocks must live in
    /// exactly one place.
    pub fn add_blocks(&self, coord: ChunkCoord, blocks: impl Into<Arc<[Block]>>) {
        let blocks: Arc<[Block]> = blocks.into();
        let mesh = Arc::new(MeshData::from_chunk(coord, &blocks));
        self.add_meshed(coord, blocks, mesh);
    }

    /// Take ownership of a chunk whose geometry was already built by
    /// [`MeshData::from_chunk`]. Only map updates happen under the lock.
    ///
    /// # Panics
    /// If this bucket already owns `coord`.
    pub fn add_meshed(&self, coord: ChunkCoord, blocks: Arc<[Block]>, mesh: Arc<MeshData>) {
        let added = blocks.len();

        let mut state = self.lock_state();
        let previous = state.chunks.insert(coord, ChunkEntry { blocks, mesh });
        assert!(
            previous.is_none(),
            "chunk {coord} added twice to {}",
            self.label
        );
        state.pending.push(coord);
        state.block_count += added;
        state.dirty = true;
        self.block_count.store(state.block_count, Ordering::Release);
        debug_assert!(state.is_consistent(), "{} block count drifted", self.label);
    }

    /// Remove one chunk. Returns the number of blocks removed, or `None` if
    /// the chunk is not owned here.
    pub fn remove_chunk(&self, coord: ChunkCoord) -> Option<usize> {
        let mut state = self.lock_state();
        let entry = state.chunks.remove(&coord)?;
        let removed = entry.blocks.len();
        state.pending.retain(|c| *c != coord);
        state.block_count = state
            .block_count
            .checked_sub(removed)
            .unwrap_or_else(|| panic!("{} block count underflow removing {coord}", self.label));
        state.dirty = true;
        self.block_count.store(state.block_count, Ordering::Release);
        debug_assert!(state.is_consistent(), "{} block count drifted", self.label);
        Some(removed)
    }

    /// Lazily remove every owned chunk farther than `radius` chunks from `position`.
    ///
    /// Each coordinate is removed at the moment the iterator yields it;
    /// dropping the iterator early leaves the remaining chunks in place.
    pub fn try_purge_chunks(&self, position: DVec3, radius: u32) -> PurgeChunks<'_, B> {
        PurgeChunks {
            bucket: self,
            position,
            radius,
            candidates: None,
        }
    }

    /// Upload the geometry of every owned chunk, replacing the previous buffer.
    pub fn build<K>(&self, backend: &K) -> BuildOutcome
    where
        K: MeshBackend<Buffer = B>,
    {
        let _span = tracing::debug_span!("bucket_build", bucket = self.index).entered();

        let (meshes, chunk_count, block_count, new_chunks, generation) = {
            let mut state = self.lock_state();
            if !state.dirty {
                return BuildOutcome::Unchanged;
            }
            state.dirty = false;
            state.generation += 1;
            let new_chunks = state.pending.len();
            state.pending.clear();
            let meshes: Vec<Arc<MeshData>> =
                state.chunks.values().map(|e| Arc::clone(&e.mesh)).collect();
            (
                meshes,
                state.chunks.len(),
                state.block_count,
                new_chunks,
                state.generation,
            )
        };

        let merged = MeshData::concat(meshes.iter().map(|m| m.as_ref()));
        let uploaded = (!merged.is_empty()).then(|| {
            Arc::new(UploadedMesh {
                buffer: backend.upload(&self.label, &merged),
                vertex_count: merged.vertex_count(),
                index_count: merged.index_count(),
                chunk_count,
                block_count,
                generation,
            })
        });

        let mut slot = self.lock_upload();
        if slot.generation < generation {
            slot.generation = generation;
            slot.mesh = uploaded;
        }
        drop(slot);

        tracing::trace!(
            bucket = self.index,
            generation,
            chunks = chunk_count,
            new_chunks,
            vertices = merged.vertex_count(),
            "bucket rebuilt"
        );

        if merged.is_empty() {
            BuildOutcome::Cleared
        } else {
            BuildOutcome::Uploaded {
                chunks: chunk_count,
                new_chunks,
                vertices: merged.vertex_count(),
                indices: merged.index_count(),
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_upload(&self) -> MutexGuard<'_, UploadSlot<B>> {
        self.uploaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B> std::fmt::Debug for MeshBucket<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshBucket")
            .field("index", &self.index)
            .field("block_count", &self.block_count())
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`MeshBucket::try_purge_chunks`].
///
/// Candidates are captured on the first call to `next`; every yielded
/// coordinate has already been removed from the bucket. Not restartable.
pub struct PurgeChunks<'a, B> {
    bucket: &'a MeshBucket<B>,
    position: DVec3,
    radius: u32,
    candidates: Option<std::vec::IntoIter<ChunkCoord>>,
}

impl<B> Iterator for PurgeChunks<'_, B> {
    type Item = ChunkCoord;

    fn next(&mut self) -> Option<ChunkCoord> {
        let bucket = self.bucket;
        let (position, radius) = (self.position, self.radius);
        let candidates = self.candidates.get_or_insert_with(|| {
            let mut outside: Vec<ChunkCoord> = bucket
                .lock_state()
                .chunks
                .keys()
                .filter(|c| c.is_outside(position, radius))
                .copied()
                .collect();
            outside.sort_unstable();
            outside.into_iter()
        });

        // A candidate may have been removed by someone else since capture.
        candidates.find(|&coord| {
            bucket.remove_chunk(coord).is_some_and(|removed| {
                tracing::debug!(%coord, bucket = bucket.index, blocks = removed, "chunk purged");
                true
            })
        })
    }
}
