use glam::DVec3;
use std::sync::Arc;
use std::time::{Duration, Instant};
use voxstream_mesh::{BuildOutcome, Drawable, MeshBackend, MeshPool, UploadedMesh};
use voxstream_world::ChunkGenerator;

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::registry::ChunkRegistry;
use crate::scan::{ScanProgress, StreamingScan};
use crate::timer::FrameTimer;

/// Per-frame snapshot of streaming state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub frames: u64,
    pub last_built_bucket: Option<usize>,
    pub last_build: Option<BuildOutcome>,
    pub resident_chunks: usize,
    pub in_flight_chunks: usize,
    pub pool_blocks: usize,
    pub scan_passes: u64,
    pub last_evicted: usize,
    /// Average CPU time spent in [`TerrainStreamer::frame`].
    pub frame_time: Duration,
}

/// Drives streaming once per rendered frame: advance the scan, rebuild one
/// bucket, record the cost.
pub struct TerrainStreamer<B: MeshBackend + 'static> {
    registry: ChunkRegistry<B>,
    scan: StreamingScan,
    timer: FrameTimer,
    stats: StreamStats,
}

impl<B: MeshBackend + 'static> TerrainStreamer<B> {
    pub fn new(
        generator: Arc<dyn ChunkGenerator>,
        backend: B,
        config: &StreamConfig,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let terrain = Arc::new(MeshPool::new(backend, config.bucket_count));
        let registry = ChunkRegistry::from_config(generator, terrain, config)?;
        tracing::info!(
            radius = config.radius,
            buckets = config.bucket_count,
            workers = config.worker_threads,
            evict = config.evict,
            "terrain streamer ready"
        );
        Ok(Self {
            registry,
            scan: StreamingScan::from_config(config),
            timer: FrameTimer::new(config.timer_window),
            stats: StreamStats::default(),
        })
    }

    /// Run one frame. `viewpoint` is the viewer position in world units;
    /// `dt` is the time since the previous frame.
    pub fn frame(&mut self, viewpoint: DVec3, dt: Duration) -> &StreamStats {
        let _span = tracing::info_span!("stream_frame", frame = self.stats.frames).entered();
        let started = Instant::now();

        if let ScanProgress::PassComplete { evicted } = self.scan.tick(viewpoint, dt, &self.registry)
        {
            self.stats.last_evicted = evicted;
        }
        let report = self.registry.terrain().build();

        self.timer.record(started.elapsed());

        let stats = &mut self.stats;
        stats.frames += 1;
        stats.last_built_bucket = Some(report.bucket);
        stats.last_build = Some(report.outcome);
        stats.resident_chunks = self.registry.resident_count();
        stats.in_flight_chunks = self.registry.in_flight_count();
        stats.pool_blocks = self.registry.terrain().block_count();
        stats.scan_passes = self.scan.passes();
        stats.frame_time = self.timer.average();

        tracing::trace!(
            bucket = report.bucket,
            resident = stats.resident_chunks,
            in_flight = stats.in_flight_chunks,
            blocks = stats.pool_blocks,
            "frame streamed"
        );
        &self.stats
    }

    pub fn registry(&self) -> &ChunkRegistry<B> {
        &self.registry
    }

    pub fn terrain(&self) -> &Arc<MeshPool<B>> {
        self.registry.terrain()
    }

    pub fn scan(&self) -> &StreamingScan {
        &self.scan
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Meshes to draw this frame.
    pub fn draw_list(&self) -> Vec<Arc<UploadedMesh<B::Buffer>>> {
        self.terrain().draw_list()
    }
}

impl<B: MeshBackend + 'static> std::fmt::Debug for TerrainStreamer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainStreamer")
            .field("registry", &self.registry)
            .field("scan", &self.scan)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
