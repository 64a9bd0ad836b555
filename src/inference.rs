//! Segmentation inference collaborator
//!
//! The inference engine is opaque to the core: it maps an RGB tile to labeled
//! regions. `infer` is CPU-bound and is always invoked from a blocking-capable
//! context by the cell-segmentation runner.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SchedulerResult;
use crate::slide::RgbTile;

/// A labeled region detected in one tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Integer instance label
    pub label: i64,
    /// Axis-aligned bounding box `(y0, x0, y1, x1)` in tile-local pixels
    pub bbox: (u32, u32, u32, u32),
    /// Region area in pixels
    pub area: f64,
}

/// Segmentation engine over single tiles
pub trait InferenceEngine: Send + Sync {
    /// Segment one RGB tile into labeled regions
    fn infer(&self, tile: &RgbTile) -> SchedulerResult<Vec<Region>>;
}

/// Fallback engine used when no real model is available.
///
/// Returns no regions for every tile; pipelines still complete successfully.
#[derive(Debug, Default, Clone)]
pub struct NullInference;

impl InferenceEngine for NullInference {
    fn infer(&self, _tile: &RgbTile) -> SchedulerResult<Vec<Region>> {
        Ok(Vec::new())
    }
}

/// Resolve an engine, downgrading to [`NullInference`] when construction failed
pub fn engine_or_null<E: std::fmt::Display>(
    candidate: Result<Arc<dyn InferenceEngine>, E>,
) -> Arc<dyn InferenceEngine> {
    match candidate {
        Ok(engine) => engine,
        Err(err) => {
            warn!(error = %err, "inference engine unavailable; every tile will yield no regions");
            Arc::new(NullInference)
        }
    }
}
