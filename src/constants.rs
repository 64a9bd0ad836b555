//! Scheduler and pipeline constants
//!
//! Centralized limits and tile-geometry defaults shared by the scheduler,
//! the task runners, and the configuration layer.

/// Maximum number of concurrently running jobs
pub const MAX_WORKERS: usize = 4;

/// Maximum number of distinct users with running jobs
pub const ACTIVE_USERS_LIMIT: usize = 3;

/// Delay between scheduling cycles (milliseconds)
pub const SCHEDULER_TICK_MS: u64 = 100;

/// Tile edge length in pixels
pub const TILE_SIZE: u32 = 512;

/// Overlap between adjacent tiles in pixels
pub const TILE_OVERLAP: u32 = 64;

/// Per-pixel brightness below which a pixel counts as tissue
pub const TISSUE_INTENSITY_THRESHOLD: f32 = 240.0;

/// Minimum tissue fraction for a tile to be worth segmenting
pub const MIN_TISSUE_RATIO: f32 = 0.05;

/// Maximum in-flight inference calls per cell-segmentation job
pub const MAX_CONCURRENT_INFERENCE: usize = 4;

/// Directory where result artifacts are written
pub const RESULTS_DIR: &str = "results";
