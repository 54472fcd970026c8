use voxstream_common::ChunkCoord;
use voxstream_mesh::{Drawable, MeshBackend, MeshBucket, MeshPool};
use voxstream_stream::{ChunkRegistry, RegistryStats};

/// Read-only queries over a streaming terrain for debugging and tooling.
pub struct TerrainInspector;

impl TerrainInspector {
    /// Produce a summary of the registry and its mesh pool.
    pub fn summary<B: MeshBackend + 'static>(registry: &ChunkRegistry<B>) -> TerrainSummary {
        let pool = registry.terrain();
        TerrainSummary {
            resident_chunks: registry.resident_count(),
            in_flight_chunks: registry.in_flight_count(),
            resident_blocks: registry.resident_blocks(),
            pool_blocks: pool.block_count(),
            bucket_count: pool.bucket_count(),
            drawn_meshes: pool.draw_list().len(),
            imbalance: Self::imbalance(pool),
            stats: registry.stats(),
        }
    }

    /// One row per bucket, in bucket order.
    pub fn bucket_report<B: MeshBackend>(pool: &MeshPool<B>) -> Vec<BucketInfo> {
        pool.buckets()
            .iter()
            .map(|bucket| BucketInfo {
                index: bucket.index(),
                label: bucket.label().to_owned(),
                chunks: bucket.chunk_count(),
                blocks: bucket.block_count(),
                pending_chunks: bucket.pending_chunks(),
                generation: bucket.generation(),
                uploaded_vertices: bucket.mesh().map(|m| m.vertex_count as usize),
            })
            .collect()
    }

    /// Block count spread between the heaviest and lightest bucket.
    pub fn imbalance<B: MeshBackend>(pool: &MeshPool<B>) -> usize {
        let counts = pool.buckets().iter().map(MeshBucket::block_count);
        let max = counts.clone().max().unwrap_or(0);
        let min = counts.min().unwrap_or(0);
        max - min
    }

    /// Check that registry and pool agree on every chunk and block.
    ///
    /// Only meaningful while nothing is in flight; call after
    /// [`ChunkRegistry::wait_idle`].
    pub fn verify<B: MeshBackend + 'static>(
        registry: &ChunkRegistry<B>,
    ) -> Result<(), ConservationError> {
        let pool = registry.terrain();

        for bucket in pool.buckets() {
            let actual = bucket.recount_blocks();
            if actual != bucket.block_count() {
                return Err(ConservationError::BucketDrift {
                    bucket: bucket.index(),
                    tracked: bucket.block_count(),
                    actual,
                });
            }
        }

        let resident = registry.resident_coords();
        for coord in &resident {
            let owner = pool.owner_of(*coord);
            let held = owner
                .and_then(|i| pool.bucket(i))
                .is_some_and(|bucket| bucket.owns(*coord));
            if !held {
                return Err(ConservationError::NotInPool {
                    coord: *coord,
                    owner,
                });
            }
        }

        let pool_chunks = pool.chunk_count();
        if pool_chunks != resident.len() {
            return Err(ConservationError::ChunkCount {
                pool: pool_chunks,
                resident: resident.len(),
            });
        }

        let pool_blocks = pool.block_count();
        let resident_blocks = registry.resident_blocks();
        if pool_blocks != resident_blocks {
            return Err(ConservationError::BlockCount {
                pool: pool_blocks,
                resident: resident_blocks,
            });
        }

        tracing::debug!(
            chunks = pool_chunks,
            blocks = pool_blocks,
            "terrain conservation verified"
        );
        Ok(())
    }
}

/// Disagreement between the registry and the mesh pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConservationError {
    #[error("bucket {bucket} tracks {tracked} blocks but holds {actual}")]
    BucketDrift {
        bucket: usize,
        tracked: usize,
        actual: usize,
    },
    #[error("resident chunk {coord} is not held by its owner bucket ({owner:?})")]
    NotInPool {
        coord: ChunkCoord,
        owner: Option<usize>,
    },
    #[error("pool holds {pool} chunks, registry has {resident} resident")]
    ChunkCount { pool: usize, resident: usize },
    #[error("pool holds {pool} blocks, resident chunks total {resident}")]
    BlockCount { pool: usize, resident: usize },
}

/// Summary of streaming state for the inspector.
#[derive(Debug, Clone)]
pub struct TerrainSummary {
    pub resident_chunks: usize,
    pub in_flight_chunks: usize,
    pub resident_blocks: usize,
    pub pool_blocks: usize,
    pub bucket_count: usize,
    pub drawn_meshes: usize,
    pub imbalance: usize,
    pub stats: RegistryStats,
}

impl std::fmt::Display for TerrainSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Terrain: resident={} in_flight={} blocks={} buckets={} drawn={} imbalance={} \
             dispatched={} failed={} deferred={} evicted={}",
            self.resident_chunks,
            self.in_flight_chunks,
            self.pool_blocks,
            self.bucket_count,
            self.drawn_meshes,
            self.imbalance,
            self.stats.dispatched,
            self.stats.failed,
            self.stats.deferred,
            self.stats.evicted,
        )
    }
}

/// Per-bucket row of [`TerrainInspector::bucket_report`].
#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub index: usize,
    pub label: String,
    pub chunks: usize,
    pub blocks: usize,
    pub pending_chunks: usize,
    pub generation: u64,
    pub uploaded_vertices: Option<usize>,
}

impl std::fmt::Display for BucketInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<18} chunks={:<4} blocks={:<7} pending={:<3} gen={}",
            self.label, self.chunks, self.blocks, self.pending_chunks, self.generation
        )?;
        match self.uploaded_vertices {
            Some(v) => write!(f, " vertices={v}"),
            None => write!(f, " (no mesh)"),
        }
    }
}
