use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::StreamError;
use crate::scan::MAX_SCAN_RADIUS;

/// Streaming configuration: scan radius and pacing, eviction policy, pool and
/// worker sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Radius (in chunks) around the viewer that the scan keeps loaded.
    pub radius: u32,
    /// Pause inserted by the scan every `radius` offsets, in milliseconds.
    pub scan_pause_ms: u64,
    /// Evict chunks beyond `radius + 1` at the end of every scan pass.
    pub evict: bool,
    /// Number of mesh buckets in the pool.
    pub bucket_count: usize,
    /// Background generation threads. Zero generates inline on the caller.
    pub worker_threads: usize,
    /// Maximum queued generation jobs before `check_load` defers.
    pub queue_capacity: usize,
    /// Number of frames the frame timer averages over.
    pub timer_window: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            scan_pause_ms: 100,
            evict: true,
            bucket_count: 16,
            worker_threads: 2,
            queue_capacity: 64,
            timer_window: 120,
        }
    }
}

impl StreamConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, StreamError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "stream config loaded");
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, StreamError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        let invalid = |msg: &str| Err(StreamError::InvalidConfig(msg.to_owned()));
        if self.radius == 0 {
            return invalid("radius must be at least 1");
        }
        if self.radius > MAX_SCAN_RADIUS {
            return Err(StreamError::InvalidConfig(format!(
                "radius {} exceeds the maximum of {MAX_SCAN_RADIUS}",
                self.radius
            )));
        }
        if self.bucket_count == 0 {
            return invalid("bucket_count must be at least 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        if self.timer_window == 0 {
            return invalid("timer_window must be at least 1");
        }
        Ok(())
    }

    pub fn scan_pause(&self) -> Duration {
        Duration::from_millis(self.scan_pause_ms)
    }

    /// Radius beyond which resident chunks are evicted: one ring of slack.
    pub fn retention_radius(&self) -> u32 {
        self.radius + 1
    }
}
