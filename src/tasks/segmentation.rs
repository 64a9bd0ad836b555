//! Cell-segmentation pipeline
//!
//! Streams the tile grid over the slide, gates tiles on a tissue heuristic,
//! bounds concurrent inference, translates region boxes into slide-global
//! polygons, and writes the cell artifact. Tile-local failures skip the tile;
//! only slide-level failures are fatal to the job.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::artifact::{self, CellDocument, Polygon, TileOrigin};
use crate::constants::{MIN_TISSUE_RATIO, TISSUE_INTENSITY_THRESHOLD};
use crate::error::SchedulerResult;
use crate::inference::Region;
use crate::job::SharedJob;
use crate::slide::RgbTile;
use crate::tiles::{generate_tiles, Tile};

use super::RunnerContext;

/// Whether a tile holds enough tissue to be worth segmenting
pub fn contains_tissue(tile: &RgbTile) -> bool {
    tile.fraction_below(TISSUE_INTENSITY_THRESHOLD) >= MIN_TISSUE_RATIO
}

/// Result of one offloaded inference call
type InferenceOutcome = (Tile, SchedulerResult<Vec<Region>>);

/// Drive the cell-segmentation routine for one job
pub(super) async fn process_slide(
    ctx: &RunnerContext,
    job: &SharedJob,
    slide_path: &str,
) -> SchedulerResult<()> {
    let slide = ctx.opener.open(slide_path)?;
    let (width, height) = slide.dimensions();

    let tiles = generate_tiles(width, height, ctx.config.tile_size, ctx.config.tile_overlap);
    let total_tiles = tiles.len();
    let job_id = job.read().id;

    if total_tiles == 0 {
        job.write().advance_progress(100.0);
        let document = CellDocument {
            job_id,
            polygons: Vec::new(),
        };
        artifact::write_document(
            &ctx.config.results_dir,
            &CellDocument::file_name(&job_id),
            &document,
        )?;
        return Ok(());
    }

    info!(job_id = %job_id, tiles = total_tiles, width, height, "segmenting slide");

    let mut polygons: Vec<Polygon> = Vec::new();
    let mut tiles_processed = 0usize;
    let mut pending: FuturesUnordered<JoinHandle<InferenceOutcome>> = FuturesUnordered::new();

    for tile in tiles {
        // Keep the scheduler and sibling runners responsive between tiles
        tokio::task::yield_now().await;

        let raster = match slide.read_region(tile.x, tile.y, tile.w, tile.h) {
            Ok(raster) => raster,
            Err(err) => {
                warn!(job_id = %job_id, x = tile.x, y = tile.y, error = %err, "tile read failed; skipping");
                advance(job, &mut tiles_processed, total_tiles);
                continue;
            }
        };

        if !contains_tissue(&raster) {
            advance(job, &mut tiles_processed, total_tiles);
            continue;
        }

        let engine = ctx.inference.clone();
        pending.push(tokio::task::spawn_blocking(move || {
            (tile, engine.infer(&raster))
        }));

        // At the cap: wait for at least one inference to finish before
        // submitting the next tile
        if pending.len() >= ctx.config.max_concurrent_inference {
            drain_one(&mut pending, &mut polygons, job, &mut tiles_processed, total_tiles).await;
        }
    }

    // Last tile submitted: wait for everything still in flight
    while !pending.is_empty() {
        drain_one(&mut pending, &mut polygons, job, &mut tiles_processed, total_tiles).await;
    }

    info!(
        job_id = %job_id,
        polygons = polygons.len(),
        tiles = tiles_processed,
        "segmentation complete"
    );

    let document = CellDocument { job_id, polygons };
    artifact::write_document(
        &ctx.config.results_dir,
        &CellDocument::file_name(&job_id),
        &document,
    )?;
    Ok(())
}

/// Await one completed inference and fold its regions into the accumulator.
/// Failed inferences skip the tile; progress advances either way.
async fn drain_one(
    pending: &mut FuturesUnordered<JoinHandle<InferenceOutcome>>,
    polygons: &mut Vec<Polygon>,
    job: &SharedJob,
    tiles_processed: &mut usize,
    total_tiles: usize,
) {
    let Some(joined) = pending.next().await else {
        return;
    };
    match joined {
        Ok((tile, Ok(regions))) => {
            for region in regions {
                polygons.push(polygon_from_region(&region, &tile));
            }
        }
        Ok((tile, Err(err))) => {
            warn!(x = tile.x, y = tile.y, error = %err, "tile inference failed; skipping");
        }
        Err(err) => {
            warn!(error = %err, "inference task aborted; skipping tile");
        }
    }
    advance(job, tiles_processed, total_tiles);
}

/// Convert a labeled region bbox into a slide-global bounding polygon
fn polygon_from_region(region: &Region, tile: &Tile) -> Polygon {
    let (y0, x0, y1, x1) = region.bbox;
    let ox = i64::from(tile.x);
    let oy = i64::from(tile.y);
    let (x0, y0) = (i64::from(x0) + ox, i64::from(y0) + oy);
    let (x1, y1) = (i64::from(x1) + ox, i64::from(y1) + oy);
    Polygon {
        points: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
        label: region.label,
        area: region.area,
        tile_origin: TileOrigin {
            x: tile.x,
            y: tile.y,
        },
    }
}

fn advance(job: &SharedJob, tiles_processed: &mut usize, total_tiles: usize) {
    *tiles_processed += 1;
    let progress = *tiles_processed as f64 / total_tiles as f64 * 100.0;
    job.write().advance_progress(progress);
}
