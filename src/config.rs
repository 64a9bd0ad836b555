//! Runtime configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    ACTIVE_USERS_LIMIT, MAX_CONCURRENT_INFERENCE, MAX_WORKERS, RESULTS_DIR, SCHEDULER_TICK_MS,
    TILE_OVERLAP, TILE_SIZE,
};

/// Tunable limits for the scheduler and the task runners.
///
/// Defaults come from [`crate::constants`]; tests typically shrink the tick
/// and redirect the results directory.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Global cap on concurrently running jobs
    pub max_workers: usize,
    /// Cap on distinct users with running jobs
    pub active_users_limit: usize,
    /// Delay between scheduling cycles
    pub tick: Duration,
    /// In-flight inference cap per cell-segmentation job
    pub max_concurrent_inference: usize,
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Overlap between adjacent tiles in pixels
    pub tile_overlap: u32,
    /// Directory for result artifacts
    pub results_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: MAX_WORKERS,
            active_users_limit: ACTIVE_USERS_LIMIT,
            tick: Duration::from_millis(SCHEDULER_TICK_MS),
            max_concurrent_inference: MAX_CONCURRENT_INFERENCE,
            tile_size: TILE_SIZE,
            tile_overlap: TILE_OVERLAP,
            results_dir: PathBuf::from(RESULTS_DIR),
        }
    }
}
