use glam::DVec3;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voxstream_common::{Block, ChunkCoord};

use crate::backend::{MeshBackend, UploadedMesh};
use crate::bucket::{BuildOutcome, MeshBucket};
use crate::geometry::MeshData;

/// Bucket count used when none is configured.
pub const DEFAULT_BUCKET_COUNT: usize = 16;

/// Capability the renderer depends on: a list of meshes to draw this frame.
///
/// The renderer draws whatever was last uploaded, including on frames where
/// no bucket was rebuilt.
pub trait Drawable {
    type Buffer;

    fn draw_list(&self) -> Vec<Arc<UploadedMesh<Self::Buffer>>>;
}

/// Result of one [`MeshPool::build`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub bucket: usize,
    pub outcome: BuildOutcome,
}

/// A fixed set of mesh buckets presented as one drawable terrain.
///
/// Chunks go to the lightest bucket; one bucket is rebuilt per frame in
/// round-robin order so upload cost per frame stays at roughly
/// `1 / bucket_count` of the whole terrain.
pub struct MeshPool<B: MeshBackend> {
    backend: B,
    buckets: Vec<MeshBucket<B::Buffer>>,
    owners: Mutex<HashMap<ChunkCoord, usize>>,
    cursor: AtomicUsize,
}

impl<B: MeshBackend> MeshPool<B> {
    /// Create a pool with `bucket_count` empty buckets.
    ///
    /// # Panics
    /// If `bucket_count` is zero.
    pub fn new(backend: B, bucket_count: usize) -> Self {
        assert!(bucket_count > 0, "mesh pool needs at least one bucket");
        Self {
            backend,
            buckets: (0..bucket_count).map(MeshBucket::new).collect(),
            owners: Mutex::new(HashMap::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn buckets(&self) -> &[MeshBucket<B::Buffer>] {
        &self.buckets
    }

    pub fn bucket(&self, index: usize) -> Option<&MeshBucket<B::Buffer>> {
        self.buckets.get(index)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Index of the bucket the next [`build`](Self::build) will rebuild.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Total blocks across all buckets.
    pub fn block_count(&self) -> usize {
        self.buckets.iter().map(MeshBucket::block_count).sum()
    }

    /// Number of chunks currently owned by some bucket.
    pub fn chunk_count(&self) -> usize {
        self.lock_owners().len()
    }

    /// Bucket currently holding `coord`.
    pub fn owner_of(&self, coord: ChunkCoord) -> Option<usize> {
        self.lock_owners().get(&coord).copied()
    }

    /// Hand a chunk's blocks to the bucket with the fewest blocks.
    ///
    /// Ties go to the lowest index. Returns the chosen bucket.
    ///
    /// # Panics
    /// If another bucket already owns `coord`.
    pub fn add_blocks(&self, coord: ChunkCoord, blocks: impl Into<Arc<[Block]>>) -> usize {
        let blocks: Arc<[Block]> = blocks.into();
        let mesh = Arc::new(MeshData::from_chunk(coord, &blocks));
        self.add_meshed(coord, blocks, mesh)
    }

    /// Like [`add_blocks`](Self::add_blocks), with geometry meshed by the caller.
    ///
    /// Lets a worker mesh a chunk before taking any lock it shares with the
    /// frame thread.
    ///
    /// # Panics
    /// If another bucket already owns `coord`.
    pub fn add_meshed(
        &self,
        coord: ChunkCoord,
        blocks: Arc<[Block]>,
        mesh: Arc<MeshData>,
    ) -> usize {
        let index = self.lightest_bucket();
        {
            let mut owners = self.lock_owners();
            if let Some(existing) = owners.get(&coord) {
                panic!("chunk {coord} already owned by bucket {existing}");
            }
            owners.insert(coord, index);
        }
        tracing::debug!(%coord, bucket = index, blocks = blocks.len(), "chunk assigned");
        self.buckets[index].add_meshed(coord, blocks, mesh);
        index
    }

    /// Remove every chunk farther than `radius` from `position`, across all buckets.
    ///
    /// Lazy like [`MeshBucket::try_purge_chunks`]: chunks are removed as the
    /// iterator yields them.
    pub fn purge_chunks(
        &self,
        position: DVec3,
        radius: u32,
    ) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.buckets
            .iter()
            .flat_map(move |bucket| bucket.try_purge_chunks(position, radius))
            .inspect(move |coord| {
                self.lock_owners().remove(coord);
            })
    }

    /// Remove one chunk from whichever bucket holds it. Returns the block count removed.
    ///
    /// `None` if no bucket holds it, including when a concurrent purge got there first.
    pub fn remove_chunk(&self, coord: ChunkCoord) -> Option<usize> {
        let index = self.lock_owners().remove(&coord)?;
        self.buckets[index].remove_chunk(coord)
    }

    /// Rebuild exactly one bucket, the one at the cursor, then advance it.
    pub fn build(&self) -> BuildReport {
        let n = self.buckets.len();
        let index = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % n))
            .unwrap_or_else(|current| current);
        let outcome = self.buckets[index].build(&self.backend);
        BuildReport {
            bucket: index,
            outcome,
        }
    }

    /// Rebuild every bucket now. Intended for initial load, not per frame.
    pub fn build_all(&self) -> Vec<BuildReport> {
        (0..self.buckets.len()).map(|_| self.build()).collect()
    }

    fn lightest_bucket(&self) -> usize {
        self.buckets
            .iter()
            .enumerate()
            .min_by_key(|(_, bucket)| bucket.block_count())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn lock_owners(&self) -> MutexGuard<'_, HashMap<ChunkCoord, usize>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: MeshBackend> Drawable for MeshPool<B> {
    type Buffer = B::Buffer;

    fn draw_list(&self) -> Vec<Arc<UploadedMesh<B::Buffer>>> {
        self.buckets.iter().filter_map(MeshBucket::mesh).collect()
    }
}

impl<B: MeshBackend> std::fmt::Debug for MeshPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshPool")
            .field("buckets", &self.buckets)
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuMeshBackend;
    use voxstream_common::BlockKind;

    fn blocks(n: usize) -> Vec<Block> {
        (0..n)
            .map(|i| Block::new([(i % 16) as u8, 0, (i / 16) as u8], BlockKind::Grass))
            .collect()
    }

    fn pool(buckets: usize) -> MeshPool<CpuMeshBackend> {
        MeshPool::new(CpuMeshBackend::new(), buckets)
    }

    #[test]
    fn insertion_picks_lightest_bucket_first_on_ties() {
        let pool = pool(3);
        assert_eq!(pool.add_blocks(ChunkCoord::new(0, 0, 0), blocks(10)), 0);
        assert_eq!(pool.add_blocks(ChunkCoord::new(1, 0, 0), blocks(5)), 1);
        assert_eq!(pool.add_blocks(ChunkCoord::new(2, 0, 0), blocks(7)), 2);
        // Bucket 1 is now the lightest.
        assert_eq!(pool.add_blocks(ChunkCoord::new(3, 0, 0), blocks(1)), 1);
        assert_eq!(pool.owner_of(ChunkCoord::new(3, 0, 0)), Some(1));
    }

    #[test]
    fn equal_insertions_stay_balanced() {
        let pool = pool(4);
        for i in 0..37 {
            pool.add_blocks(ChunkCoord::new(i, 0, 0), blocks(8));
            let counts: Vec<usize> = pool.buckets().iter().map(MeshBucket::block_count).collect();
            let max = counts.iter().max().unwrap();
            let min = counts.iter().min().unwrap();
            assert!(max - min <= 8, "unbalanced after {i}: {counts:?}");
        }
    }

    #[test]
    fn counts_are_conserved() {
        let pool = pool(5);
        let mut expected = 0;
        for i in 0..20 {
            let n = (i as usize % 7) + 1;
            expected += n;
            pool.add_blocks(ChunkCoord::new(i, 0, i), blocks(n));
        }
        assert_eq!(pool.block_count(), expected);
        assert_eq!(pool.chunk_count(), 20);

        let removed: usize = pool
            .purge_chunks(DVec3::ZERO, 10)
            .map(|c| (c.x as usize % 7) + 1)
            .sum();
        assert_eq!(pool.block_count(), expected - removed);
        let recounted: usize = pool.buckets().iter().map(MeshBucket::recount_blocks).sum();
        assert_eq!(recounted, pool.block_count());
    }

    #[test]
    fn premeshed_chunks_keep_the_supplied_geometry() {
        let pool = pool(2);
        let chunk_blocks: Arc<[Block]> = blocks(3).into();
        let mesh = Arc::new(MeshData::from_chunk(ChunkCoord::ORIGIN, &chunk_blocks));
        let expected = mesh.vertex_count();

        assert_eq!(pool.add_meshed(ChunkCoord::ORIGIN, chunk_blocks, mesh), 0);
        assert_eq!(pool.block_count(), 3);
        assert_eq!(pool.owner_of(ChunkCoord::ORIGIN), Some(0));

        // Geometry is taken as given, never rebuilt from the blocks.
        pool.add_meshed(
            ChunkCoord::new(1, 0, 0),
            blocks(3).into(),
            Arc::new(MeshData::new()),
        );
        let reports = pool.build_all();
        assert!(matches!(
            reports[0].outcome,
            BuildOutcome::Uploaded { vertices, .. } if vertices == expected
        ));
        assert_eq!(reports[1].outcome, BuildOutcome::Cleared);
        assert_eq!(pool.block_count(), 6);
    }

    #[test]
    #[should_panic(expected = "already owned")]
    fn same_chunk_in_two_buckets_is_fatal() {
        let pool = pool(2);
        pool.add_blocks(ChunkCoord::ORIGIN, blocks(1));
        pool.add_blocks(ChunkCoord::ORIGIN, blocks(1));
    }

    #[test]
    fn build_is_round_robin() {
        let pool = pool(4);
        let start = pool.cursor();
        let rebuilt: Vec<usize> = (0..4).map(|_| pool.build().bucket).collect();
        assert_eq!(rebuilt, vec![0, 1, 2, 3]);
        assert_eq!(pool.cursor(), start);
        assert_eq!(pool.build().bucket, 0);
    }

    #[test]
    fn new_chunks_become_visible_within_one_rotation() {
        let pool = pool(4);
        for i in 0..4 {
            pool.add_blocks(ChunkCoord::new(i, 0, 0), blocks(2));
        }
        assert!(pool.draw_list().is_empty());

        pool.build();
        assert_eq!(pool.draw_list().len(), 1);

        let reports = pool.build_all();
        assert_eq!(reports.len(), 4);
        assert_eq!(pool.draw_list().len(), 4);
        let drawn_blocks: usize = pool.draw_list().iter().map(|m| m.block_count).sum();
        assert_eq!(drawn_blocks, 8);
    }

    #[test]
    fn purge_flattens_all_buckets_and_updates_owners() {
        let pool = pool(3);
        for i in 0..9 {
            pool.add_blocks(ChunkCoord::new(i, 0, 0), blocks(1));
        }
        let mut purged: Vec<ChunkCoord> = pool.purge_chunks(DVec3::ZERO, 4).collect();
        purged.sort();
        assert_eq!(
            purged,
            (5..9).map(|x| ChunkCoord::new(x, 0, 0)).collect::<Vec<_>>()
        );
        assert_eq!(pool.chunk_count(), 5);
        assert_eq!(pool.owner_of(ChunkCoord::new(6, 0, 0)), None);
        assert_eq!(pool.purge_chunks(DVec3::ZERO, 4).count(), 0);
    }

    #[test]
    fn remove_chunk_routes_to_owner() {
        let pool = pool(3);
        pool.add_blocks(ChunkCoord::new(0, 0, 0), blocks(4));
        pool.add_blocks(ChunkCoord::new(1, 0, 0), blocks(6));

        assert_eq!(pool.remove_chunk(ChunkCoord::new(1, 0, 0)), Some(6));
        assert_eq!(pool.remove_chunk(ChunkCoord::new(1, 0, 0)), None);
        assert_eq!(pool.block_count(), 4);
    }

    #[test]
    fn concurrent_insertion_keeps_single_ownership() {
        let pool = Arc::new(pool(16));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..64 {
                        pool.add_blocks(ChunkCoord::new(i, t, 0), blocks(4));
                    }
                })
            })
            .collect();
        for _ in 0..32 {
            pool.build();
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.chunk_count(), 256);
        assert_eq!(pool.block_count(), 256 * 4);
        let owned: usize = pool.buckets().iter().map(MeshBucket::chunk_count).sum();
        assert_eq!(owned, 256);
    }
}
