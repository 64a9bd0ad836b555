//! Result artifacts written on successful job completion
//!
//! One JSON document per job under the results directory:
//! `<job_id>_cells.json` for cell segmentation, `<job_id>_tissue_mask.json`
//! for tissue masks.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SchedulerResult;
use crate::job::JobId;

/// Origin of the tile a polygon came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOrigin {
    /// Tile left edge in slide coordinates
    pub x: u32,
    /// Tile top edge in slide coordinates
    pub y: u32,
}

/// One polygon in slide-global coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    /// Clockwise ring of `[x, y]` vertices
    pub points: Vec<[i64; 2]>,
    /// Instance label from the inference engine
    pub label: i64,
    /// Region area in pixels
    pub area: f64,
    /// Origin of the source tile
    pub tile_origin: TileOrigin,
}

/// Document written by the cell-segmentation routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDocument {
    /// Owning job
    pub job_id: JobId,
    /// Accumulated polygons across all tiles
    pub polygons: Vec<Polygon>,
}

impl CellDocument {
    /// Artifact file name for a job
    pub fn file_name(job_id: &JobId) -> String {
        format!("{job_id}_cells.json")
    }
}

/// Per-tile record produced by the tissue-mask routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskTile {
    /// Tile left edge
    pub x: u32,
    /// Tile top edge
    pub y: u32,
    /// Tile width
    pub w: u32,
    /// Tile height
    pub h: u32,
    /// Fraction of tissue pixels in the tile, in [0, 1]
    pub mask_mean: f64,
}

/// Document written by the tissue-mask routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskDocument {
    /// Owning job
    pub job_id: JobId,
    /// One record per tile in grid order
    pub tiles: Vec<MaskTile>,
}

impl MaskDocument {
    /// Artifact file name for a job
    pub fn file_name(job_id: &JobId) -> String {
        format!("{job_id}_tissue_mask.json")
    }
}

/// Write a document under `dir`, creating the directory if absent.
///
/// Serializes to a temporary sibling first and renames into place so readers
/// never observe a partial file.
pub fn write_document<T: Serialize>(
    dir: &Path,
    file_name: &str,
    document: &T,
) -> SchedulerResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let tmp = dir.join(format!("{file_name}.tmp"));
    let bytes = serde_json::to_vec(document)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(path)
}
