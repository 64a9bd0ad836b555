//! Tissue-mask pipeline
//!
//! Reads every tile, records the fraction of tissue pixels, and writes the
//! mask artifact. Strictly single-threaded per job; yields at every tile
//! boundary.

use tracing::{info, warn};

use crate::artifact::{self, MaskDocument, MaskTile};
use crate::constants::TISSUE_INTENSITY_THRESHOLD;
use crate::error::SchedulerResult;
use crate::job::SharedJob;
use crate::tiles::generate_tiles;

use super::RunnerContext;

/// Drive the tissue-mask routine for one job
pub(super) async fn generate_mask(
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
        let document = MaskDocument {
            job_id,
            tiles: Vec::new(),
        };
        artifact::write_document(
            &ctx.config.results_dir,
            &MaskDocument::file_name(&job_id),
            &document,
        )?;
        return Ok(());
    }

    info!(job_id = %job_id, tiles = total_tiles, width, height, "computing tissue mask");

    let mut mask_tiles = Vec::with_capacity(total_tiles);
    for (index, tile) in tiles.iter().enumerate() {
        match slide.read_region(tile.x, tile.y, tile.w, tile.h) {
            Ok(raster) => {
                mask_tiles.push(MaskTile {
                    x: tile.x,
                    y: tile.y,
                    w: tile.w,
                    h: tile.h,
                    mask_mean: f64::from(raster.fraction_below(TISSUE_INTENSITY_THRESHOLD)),
                });
            }
            Err(err) => {
                warn!(job_id = %job_id, x = tile.x, y = tile.y, error = %err, "tile read failed; skipping");
            }
        }
        let progress = (index + 1) as f64 / total_tiles as f64 * 100.0;
        job.write().advance_progress(progress);
        tokio::task::yield_now().await;
    }

    let document = MaskDocument {
        job_id,
        tiles: mask_tiles,
    };
    artifact::write_document(
        &ctx.config.results_dir,
        &MaskDocument::file_name(&job_id),
        &document,
    )?;
    Ok(())
}
