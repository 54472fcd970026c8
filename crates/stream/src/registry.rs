use glam::DVec3;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use voxstream_common::{Block, ChunkCoord};
use voxstream_mesh::{MeshBackend, MeshData, MeshPool};
use voxstream_world::{ChunkGenerator, GenerationError};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::scan::ScanTarget;
use crate::workers::GenerationWorkers;

/// What [`ChunkRegistry::check_load`] did with a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Generation was started.
    Dispatched,
    /// The chunk is already resident or being generated.
    AlreadyKnown,
    /// The job queue was full; nothing was recorded, try again later.
    Deferred,
}

/// Lifetime counters for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub deferred: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residency {
    InFlight,
    Resident { blocks: usize },
}

#[derive(Debug, Default)]
struct Ledger {
    chunks: HashMap<ChunkCoord, Residency>,
    in_flight: usize,
    resident_blocks: usize,
    stats: RegistryStats,
}

/// A generated chunk with its geometry, ready to hand to the pool.
struct MeshedChunk {
    blocks: Arc<[Block]>,
    mesh: Arc<MeshData>,
}

struct Shared<B: MeshBackend> {
    generator: Arc<dyn ChunkGenerator>,
    terrain: Arc<MeshPool<B>>,
    ledger: Mutex<Ledger>,
    idle: Condvar,
}

impl<B: MeshBackend> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generate_and_complete(&self, coord: ChunkCoord) {
        let prepared = self.prepare(coord);
        self.complete(coord, prepared);
    }

    /// Generate and mesh a chunk. Takes no lock shared with the frame thread.
    fn prepare(&self, coord: ChunkCoord) -> Result<MeshedChunk, GenerationError> {
        let chunk = self.generator.generate(coord)?;
        if chunk.coord() != coord {
            tracing::warn!(%coord, produced = %chunk.coord(), "generator returned a mismatched chunk");
        }
        let (_, blocks) = chunk.into_parts();
        let mesh = Arc::new(MeshData::from_chunk(coord, &blocks));
        Ok(MeshedChunk { blocks, mesh })
    }

    /// Deliver a prepared chunk.
    ///
    /// Insertion into the pool and the switch to resident happen in one
    /// critical section, so a concurrent purge sees either neither or both.
    /// Only map updates run inside it.
    fn complete(&self, coord: ChunkCoord, prepared: Result<MeshedChunk, GenerationError>) {
        let mut ledger = self.lock();
        debug_assert_eq!(ledger.chunks.get(&coord), Some(&Residency::InFlight));

        match prepared {
            Ok(MeshedChunk { blocks, mesh }) => {
                let count = blocks.len();
                let bucket = self.terrain.add_meshed(coord, blocks, mesh);
                ledger
                    .chunks
                    .insert(coord, Residency::Resident { blocks: count });
                ledger.resident_blocks += count;
                ledger.stats.completed += 1;
                tracing::debug!(%coord, blocks = count, bucket, "chunk resident");
            }
            Err(error) => {
                ledger.chunks.remove(&coord);
                ledger.stats.failed += 1;
                tracing::warn!(%coord, %error, "chunk generation failed");
            }
        }

        ledger.in_flight -= 1;
        if ledger.in_flight == 0 {
            self.idle.notify_all();
        }
    }

    /// Drop a purged coordinate from the ledger.
    fn forget(&self, coord: ChunkCoord) {
        let mut ledger = self.lock();
        match ledger.chunks.remove(&coord) {
            Some(Residency::Resident { blocks }) => {
                ledger.resident_blocks -= blocks;
                ledger.stats.evicted += 1;
                tracing::debug!(%coord, blocks, "chunk evicted");
            }
            Some(Residency::InFlight) => {
                unreachable!("chunk {coord} was purged from the pool while still in flight")
            }
            None => {}
        }
    }
}

/// Single authority over which chunks exist and where their blocks live.
///
/// Every coordinate is generated at most once while it is known; finished
/// chunks go straight into the mesh pool. With zero worker threads generation
/// runs inline on the caller, which makes behaviour fully deterministic.
pub struct ChunkRegistry<B: MeshBackend + 'static> {
    shared: Arc<Shared<B>>,
    workers: Option<GenerationWorkers>,
}

impl<B: MeshBackend + 'static> ChunkRegistry<B> {
    pub fn new(
        generator: Arc<dyn ChunkGenerator>,
        terrain: Arc<MeshPool<B>>,
        worker_threads: usize,
        queue_capacity: usize,
    ) -> Result<Self, StreamError> {
        let shared = Arc::new(Shared {
            generator,
            terrain,
            ledger: Mutex::new(Ledger::default()),
            idle: Condvar::new(),
        });
        let workers = if worker_threads == 0 {
            None
        } else {
            let handler_shared = Arc::clone(&shared);
            Some(GenerationWorkers::spawn(
                worker_threads,
                queue_capacity,
                Arc::new(move |coord| handler_shared.generate_and_complete(coord)),
            )?)
        };
        Ok(Self { shared, workers })
    }

    /// Registry that generates on the calling thread.
    pub fn inline(generator: Arc<dyn ChunkGenerator>, terrain: Arc<MeshPool<B>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                generator,
                terrain,
                ledger: Mutex::new(Ledger::default()),
                idle: Condvar::new(),
            }),
            workers: None,
        }
    }

    pub fn from_config(
        generator: Arc<dyn ChunkGenerator>,
        terrain: Arc<MeshPool<B>>,
        config: &StreamConfig,
    ) -> Result<Self, StreamError> {
        Self::new(
            generator,
            terrain,
            config.worker_threads,
            config.queue_capacity,
        )
    }

    pub fn terrain(&self) -> &Arc<MeshPool<B>> {
        &self.shared.terrain
    }

    /// Ensure the chunk containing chunk-space `(x, y, z)` is resident or on its way.
    pub fn check_load(&self, x: f64, y: f64, z: f64) -> LoadOutcome {
        self.check_load_coord(ChunkCoord::from_chunk_space(x, y, z))
    }

    pub fn check_load_coord(&self, coord: ChunkCoord) -> LoadOutcome {
        {
            let mut ledger = self.shared.lock();
            if ledger.chunks.contains_key(&coord) {
                return LoadOutcome::AlreadyKnown;
            }
            ledger.chunks.insert(coord, Residency::InFlight);
            ledger.in_flight += 1;
            ledger.stats.dispatched += 1;
        }

        let Some(workers) = &self.workers else {
            self.shared.generate_and_complete(coord);
            return LoadOutcome::Dispatched;
        };

        match workers.submit(coord) {
            Ok(()) => {
                tracing::debug!(%coord, "chunk dispatched");
                LoadOutcome::Dispatched
            }
            Err(coord) => {
                let mut ledger = self.shared.lock();
                ledger.chunks.remove(&coord);
                ledger.in_flight -= 1;
                ledger.stats.dispatched -= 1;
                ledger.stats.deferred += 1;
                if ledger.in_flight == 0 {
                    self.shared.idle.notify_all();
                }
                tracing::debug!(%coord, "generation queue full, load deferred");
                LoadOutcome::Deferred
            }
        }
    }

    /// Evict every resident chunk farther than `radius` chunks from `(origin_x, 0, origin_z)`.
    ///
    /// Returns the evicted coordinates. Chunks still being generated are left
    /// alone; they are picked up by a later purge once resident.
    pub fn purge_distanced_chunks(
        &self,
        origin_x: f64,
        origin_z: f64,
        radius: u32,
    ) -> Vec<ChunkCoord> {
        let _span = tracing::debug_span!("purge_distanced_chunks", radius).entered();
        let origin = DVec3::new(origin_x, 0.0, origin_z);
        let evicted: Vec<ChunkCoord> = self
            .shared
            .terrain
            .purge_chunks(origin, radius)
            .inspect(|coord| self.shared.forget(*coord))
            .collect();
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "purged distant chunks");
        }
        evicted
    }

    /// Evict one resident chunk. Returns false if it was not resident.
    pub fn evict(&self, coord: ChunkCoord) -> bool {
        let mut ledger = self.shared.lock();
        let Some(Residency::Resident { blocks }) = ledger.chunks.get(&coord).copied() else {
            return false;
        };
        self.shared.terrain.remove_chunk(coord);
        ledger.chunks.remove(&coord);
        ledger.resident_blocks -= blocks;
        ledger.stats.evicted += 1;
        tracing::debug!(%coord, blocks, "chunk evicted");
        true
    }

    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        matches!(
            self.shared.lock().chunks.get(&coord),
            Some(Residency::Resident { .. })
        )
    }

    pub fn is_in_flight(&self, coord: ChunkCoord) -> bool {
        self.shared.lock().chunks.get(&coord) == Some(&Residency::InFlight)
    }

    pub fn resident_count(&self) -> usize {
        let ledger = self.shared.lock();
        ledger.chunks.len() - ledger.in_flight
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Sum of block counts over resident chunks.
    pub fn resident_blocks(&self) -> usize {
        self.shared.lock().resident_blocks
    }

    /// Resident coordinates, sorted.
    pub fn resident_coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self
            .shared
            .lock()
            .chunks
            .iter()
            .filter(|(_, r)| matches!(r, Residency::Resident { .. }))
            .map(|(c, _)| *c)
            .collect();
        coords.sort_unstable();
        coords
    }

    pub fn stats(&self) -> RegistryStats {
        self.shared.lock().stats
    }

    /// Block until no generation is in flight or `timeout` elapses.
    /// Returns true if the registry went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let ledger = self.shared.lock();
        let (ledger, _) = self
            .shared
            .idle
            .wait_timeout_while(ledger, timeout, |l| l.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);
        ledger.in_flight == 0
    }
}

impl<B: MeshBackend + 'static> ScanTarget for ChunkRegistry<B> {
    fn check_load(&self, x: f64, y: f64, z: f64) -> LoadOutcome {
        ChunkRegistry::check_load(self, x, y, z)
    }

    fn purge_distanced_chunks(&self, origin_x: f64, origin_z: f64, radius: u32) -> usize {
        ChunkRegistry::purge_distanced_chunks(self, origin_x, origin_z, radius).len()
    }
}

impl<B: MeshBackend + 'static> std::fmt::Debug for ChunkRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.shared.lock();
        f.debug_struct("ChunkRegistry")
            .field("known", &ledger.chunks.len())
            .field("in_flight", &ledger.in_flight)
            .field("stats", &ledger.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voxstream_common::{BlockKind, Chunk};
    use voxstream_mesh::CpuMeshBackend;
    use voxstream_world::FlatGenerator;

    fn pool() -> Arc<MeshPool<CpuMeshBackend>> {
        Arc::new(MeshPool::new(CpuMeshBackend::new(), 4))
    }

    fn flat() -> Arc<dyn ChunkGenerator> {
        Arc::new(FlatGenerator::new(1, BlockKind::Grass))
    }

    /// Wraps a generator and counts how often it runs.
    struct Counting {
        inner: FlatGenerator,
        calls: AtomicUsize,
    }

    impl ChunkGenerator for Counting {
        fn generate(&self, coord: ChunkCoord) -> Result<Chunk, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.generate(coord)
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            inner: FlatGenerator::new(1, BlockKind::Stone),
            calls: AtomicUsize::new(0),
        })
    }

    fn assert_conserved(registry: &ChunkRegistry<CpuMeshBackend>) {
        assert_eq!(registry.terrain().block_count(), registry.resident_blocks());
        assert_eq!(registry.terrain().chunk_count(), registry.resident_count());
    }

    #[test]
    fn check_load_floors_continuous_coordinates() {
        let registry = ChunkRegistry::inline(flat(), pool());
        assert_eq!(registry.check_load(1.7, 0.2, -0.3), LoadOutcome::Dispatched);
        assert!(registry.is_resident(ChunkCoord::new(1, 0, -1)));
    }

    #[test]
    fn duplicate_loads_generate_once() {
        let generator = counting();
        let registry = ChunkRegistry::inline(generator.clone(), pool());

        assert_eq!(registry.check_load(0.0, 0.0, 0.0), LoadOutcome::Dispatched);
        assert_eq!(registry.check_load(0.4, 0.0, 0.9), LoadOutcome::AlreadyKnown);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.resident_count(), 1);
        assert_eq!(registry.stats().dispatched, 1);
    }

    #[test]
    fn duplicate_loads_generate_once_with_workers() {
        let generator = counting();
        let registry = ChunkRegistry::new(generator.clone(), pool(), 2, 32).unwrap();

        for _ in 0..5 {
            registry.check_load(3.0, 0.0, 3.0);
        }
        assert!(registry.wait_idle(Duration::from_secs(10)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_resident(ChunkCoord::new(3, 0, 3)));
    }

    #[test]
    fn resident_blocks_land_in_the_pool() {
        let registry = ChunkRegistry::inline(flat(), pool());
        for x in 0..6 {
            registry.check_load(x as f64, 0.0, 0.0);
        }
        assert_eq!(registry.resident_blocks(), 6 * 256);
        assert_conserved(&registry);
        assert!(registry.terrain().owner_of(ChunkCoord::new(5, 0, 0)).is_some());
    }

    #[test]
    fn failed_generation_can_be_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let flaky = move |coord: ChunkCoord| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GenerationError::Failed {
                    coord,
                    reason: "transient".into(),
                })
            } else {
                Ok(Chunk::empty(coord))
            }
        };
        let registry = ChunkRegistry::inline(Arc::new(flaky), pool());

        assert_eq!(registry.check_load(0.0, 0.0, 0.0), LoadOutcome::Dispatched);
        assert!(!registry.is_resident(ChunkCoord::ORIGIN));
        assert!(!registry.is_in_flight(ChunkCoord::ORIGIN));
        assert_eq!(registry.stats().failed, 1);

        assert_eq!(registry.check_load(0.0, 0.0, 0.0), LoadOutcome::Dispatched);
        assert!(registry.is_resident(ChunkCoord::ORIGIN));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn purge_evicts_only_distant_chunks() {
        let registry = ChunkRegistry::inline(flat(), pool());
        for x in -5..=5 {
            registry.check_load(x as f64, 0.0, 0.0);
        }
        let mut evicted = registry.purge_distanced_chunks(0.0, 0.0, 3);
        evicted.sort();

        let expected: Vec<ChunkCoord> = [-5, -4, 4, 5]
            .into_iter()
            .map(|x| ChunkCoord::new(x, 0, 0))
            .collect();
        assert_eq!(evicted, expected);
        assert_eq!(registry.resident_count(), 7);
        assert_eq!(registry.stats().evicted, 4);
        assert_conserved(&registry);
    }

    #[test]
    fn purge_is_idempotent_and_evicted_chunks_reload() {
        let generator = counting();
        let registry = ChunkRegistry::inline(generator.clone(), pool());
        registry.check_load(10.0, 0.0, 0.0);

        assert_eq!(registry.purge_distanced_chunks(0.0, 0.0, 2).len(), 1);
        assert!(registry.purge_distanced_chunks(0.0, 0.0, 2).is_empty());

        assert_eq!(registry.check_load(10.0, 0.0, 0.0), LoadOutcome::Dispatched);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn evict_single_chunk() {
        let registry = ChunkRegistry::inline(flat(), pool());
        registry.check_load(2.0, 0.0, 2.0);

        assert!(registry.evict(ChunkCoord::new(2, 0, 2)));
        assert!(!registry.evict(ChunkCoord::new(2, 0, 2)));
        assert_eq!(registry.terrain().block_count(), 0);
        assert_conserved(&registry);
    }

    #[test]
    fn full_queue_defers_without_marking_in_flight() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let gated = move |coord: ChunkCoord| -> Result<Chunk, GenerationError> {
            let _ = release_rx.recv();
            Ok(Chunk::empty(coord))
        };
        let registry = ChunkRegistry::new(Arc::new(gated), pool(), 1, 1).unwrap();

        let outcomes: Vec<LoadOutcome> = (0..4)
            .map(|x| registry.check_load(x as f64, 0.0, 0.0))
            .collect();
        let deferred = outcomes
            .iter()
            .filter(|o| **o == LoadOutcome::Deferred)
            .count();
        assert!(deferred >= 1, "{outcomes:?}");
        assert_eq!(registry.stats().deferred as usize, deferred);
        assert_eq!(registry.in_flight_count(), 4 - deferred);
        for (x, outcome) in outcomes.iter().enumerate() {
            if *outcome == LoadOutcome::Deferred {
                assert!(!registry.is_in_flight(ChunkCoord::new(x as i32, 0, 0)));
            }
        }

        for _ in 0..4 {
            release_tx.send(()).unwrap();
        }
        assert!(registry.wait_idle(Duration::from_secs(10)));
        assert_eq!(registry.resident_count(), 4 - deferred);
    }

    #[test]
    fn workers_match_inline_results() {
        let inline = ChunkRegistry::inline(flat(), pool());
        let threaded = ChunkRegistry::new(flat(), pool(), 3, 256).unwrap();
        for x in -4..4 {
            for z in -4..4 {
                inline.check_load(x as f64, 0.0, z as f64);
                threaded.check_load(x as f64, 0.0, z as f64);
            }
        }
        assert!(threaded.wait_idle(Duration::from_secs(10)));

        assert_eq!(inline.resident_coords(), threaded.resident_coords());
        assert_eq!(inline.resident_blocks(), threaded.resident_blocks());
        assert_conserved(&threaded);
    }

    #[test]
    fn generation_and_meshing_run_outside_the_ledger_lock() {
        let solid = Arc::new(FlatGenerator::new(16, BlockKind::Stone));
        let registry = ChunkRegistry::inline(solid, pool());
        let shared = Arc::clone(&registry.shared);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        // Stands in for the frame thread sitting in check_load or stats().
        let ledger = registry.shared.lock();
        let worker = std::thread::spawn(move || {
            let prepared = shared.prepare(ChunkCoord::ORIGIN);
            let _ = done_tx.send(prepared.map(|chunk| chunk.mesh.vertex_count()));
        });
        let vertices = done_rx.recv_timeout(Duration::from_secs(10));
        drop(ledger);
        worker.join().unwrap();

        // A solid chunk only shows its outer shell.
        assert_eq!(vertices, Ok(Ok(6 * 16 * 16 * 4)));
    }

    #[test]
    fn frame_thread_queries_proceed_while_a_worker_is_busy() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let gated = move |coord: ChunkCoord| -> Result<Chunk, GenerationError> {
            let _ = release_rx.recv();
            FlatGenerator::new(16, BlockKind::Stone).generate(coord)
        };
        let registry = ChunkRegistry::new(Arc::new(gated), pool(), 1, 8).unwrap();

        assert_eq!(registry.check_load(0.0, 0.0, 0.0), LoadOutcome::Dispatched);
        assert_eq!(registry.check_load(-5.0, 0.0, 0.0), LoadOutcome::Dispatched);
        assert!(registry.is_in_flight(ChunkCoord::new(-5, 0, 0)));
        assert_eq!(registry.stats().dispatched, 2);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert!(registry.wait_idle(Duration::from_secs(10)));
        assert_eq!(registry.resident_blocks(), 2 * 16 * 16 * 16);
        assert_conserved(&registry);
    }

    #[test]
    fn purge_while_workers_complete_keeps_ledger_consistent() {
        let registry = ChunkRegistry::new(flat(), pool(), 4, 512).unwrap();
        for round in 0..5 {
            for x in -8..8 {
                registry.check_load((x + round) as f64, 0.0, 0.0);
            }
            registry.purge_distanced_chunks(round as f64, 0.0, 3);
        }
        assert!(registry.wait_idle(Duration::from_secs(10)));
        assert_conserved(&registry);

        registry.check_load(0.0, 0.0, 0.0);
        assert!(registry.wait_idle(Duration::from_secs(10)));
        registry.purge_distanced_chunks(0.0, 0.0, 0);
        assert_eq!(registry.resident_count(), 1);
        assert_conserved(&registry);
    }
}
