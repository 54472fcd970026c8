//! Developer tooling: terrain inspector and consistency checks.
//!
//! # Invariants
//! - Tools only read; nothing here mutates the registry or the pool.

mod inspector;

pub use inspector::{BucketInfo, ConservationError, TerrainInspector, TerrainSummary};

pub fn crate_info() -> &'static str {
    "voxstream-tools v0.1.0"
}
