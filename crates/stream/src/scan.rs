use glam::{DVec2, DVec3};
use std::time::Duration;
use voxstream_common::CHUNK_SIZE;

use crate::config::StreamConfig;
use crate::registry::LoadOutcome;

/// Largest radius a scan accepts; keeps the disc arithmetic well inside `i32`.
pub const MAX_SCAN_RADIUS: u32 = 1024;

/// What the scan drives: anything that can be asked to load a chunk or purge
/// distant ones.
pub trait ScanTarget {
    /// Load the chunk containing chunk-space `(x, y, z)` if it is unknown.
    fn check_load(&self, x: f64, y: f64, z: f64) -> LoadOutcome;

    /// Evict chunks farther than `radius` from `(origin_x, 0, origin_z)`.
    /// Returns how many were evicted.
    fn purge_distanced_chunks(&self, origin_x: f64, origin_z: f64, radius: u32) -> usize;
}

/// Result of one [`StreamingScan::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProgress {
    /// Waiting out the pause between batches, or just started one.
    Paused,
    /// The last offset was issued; the next tick starts a new pass.
    PassComplete { evicted: usize },
}

/// Resumable scan of the chunk disc around the viewer.
///
/// A pass walks `i in 0..radius²` with `x = i % radius`, `z = i / radius`,
/// skipping offsets outside the disc and loading each remaining offset's
/// quadrant reflections. Every `radius` offsets the scan pauses; the pause is
/// paid down by the frame times passed to [`tick`](Self::tick).
#[derive(Debug, Clone)]
pub struct StreamingScan {
    radius: u32,
    pause: Duration,
    evict: bool,
    cursor: u32,
    pass_origin: Option<DVec2>,
    pause_remaining: Duration,
    passes: u64,
    issued: u64,
}

impl StreamingScan {
    /// # Panics
    /// If `radius` is zero or above [`MAX_SCAN_RADIUS`].
    pub fn new(radius: u32, pause: Duration, evict: bool) -> Self {
        assert!(
            (1..=MAX_SCAN_RADIUS).contains(&radius),
            "scan radius {radius} outside 1..={MAX_SCAN_RADIUS}"
        );
        Self {
            radius,
            pause,
            evict,
            cursor: 0,
            pass_origin: None,
            pause_remaining: Duration::ZERO,
            passes: 0,
            issued: 0,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.radius, config.scan_pause(), config.evict)
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Completed passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Total `check_load` calls issued.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn is_paused(&self) -> bool {
        !self.pause_remaining.is_zero()
    }

    /// Advance the scan by one frame.
    ///
    /// `viewpoint` is in world units; it is read only when a pass starts.
    pub fn tick<T>(&mut self, viewpoint: DVec3, dt: Duration, target: &T) -> ScanProgress
    where
        T: ScanTarget + ?Sized,
    {
        let _span = tracing::info_span!("scan_tick", pass = self.passes).entered();

        if self.is_paused() {
            self.pause_remaining = self.pause_remaining.saturating_sub(dt);
            if self.is_paused() {
                return ScanProgress::Paused;
            }
        }

        let origin = *self
            .pass_origin
            .get_or_insert_with(|| DVec2::new(viewpoint.x, viewpoint.z) / CHUNK_SIZE as f64);

        let r = self.radius;
        while self.cursor < r * r {
            let i = self.cursor;
            self.cursor += 1;

            let (x, z) = ((i % r) as i32, (i / r) as i32);
            if x * x + z * z > (r * r) as i32 {
                continue;
            }
            for (dx, dz) in reflections(x, z) {
                target.check_load(origin.x + dx as f64, 0.0, origin.y + dz as f64);
                self.issued += 1;
            }

            if i % r == 0 && !self.pause.is_zero() {
                self.pause_remaining = self.pause;
                return ScanProgress::Paused;
            }
        }

        let evicted = if self.evict {
            target.purge_distanced_chunks(origin.x, origin.y, r + 1)
        } else {
            0
        };
        self.cursor = 0;
        self.pass_origin = None;
        self.passes += 1;
        tracing::trace!(passes = self.passes, evicted, "scan pass complete");
        ScanProgress::PassComplete { evicted }
    }
}

/// Offsets one pass issues, in issue order.
///
/// # Panics
/// If `radius` is above [`MAX_SCAN_RADIUS`].
pub fn footprint(radius: u32) -> Vec<(i32, i32)> {
    assert!(
        radius <= MAX_SCAN_RADIUS,
        "scan radius {radius} exceeds {MAX_SCAN_RADIUS}"
    );
    let r = radius as i32;
    (0..r * r)
        .map(|i| (i % r, i / r))
        .filter(|(x, z)| x * x + z * z <= r * r)
        .flat_map(|(x, z)| reflections(x, z))
        .collect()
}

/// Quadrant reflections of `(x, z)`, without repeats on the axes.
fn reflections(x: i32, z: i32) -> Vec<(i32, i32)> {
    let mut out = Vec::with_capacity(4);
    for offset in [(x, z), (-x, z), (x, -z), (-x, -z)] {
        if !out.contains(&offset) {
            out.push(offset);
        }
    }
    out
}
