//! Slide access traits and rasters
//!
//! The image decoder is an external collaborator; the core sees it only
//! through the traits below. Readers are synchronous; the task runners drive
//! them from contexts that tolerate short blocking reads. A handle is closed
//! when its last reference drops.

use std::sync::Arc;

use crate::error::{SchedulerError, SchedulerResult};

/// An RGB raster for a single tile, 8 bits per channel, row-major
#[derive(Debug, Clone)]
pub struct RgbTile {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Interleaved RGB bytes, `width * height * 3` long
    pub pixels: Vec<u8>,
}

impl RgbTile {
    /// Create a raster, validating the buffer length
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> SchedulerResult<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(SchedulerError::Internal(format!(
                "raster buffer length {} does not match {}x{} RGB",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Solid-color raster
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 3);
        for _ in 0..count {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Fraction of pixels whose mean channel brightness is below `threshold`
    pub fn fraction_below(&self, threshold: f32) -> f32 {
        let count = self.pixel_count();
        if count == 0 {
            return 0.0;
        }
        let mut dark = 0usize;
        for px in self.pixels.chunks_exact(3) {
            let brightness = (f32::from(px[0]) + f32::from(px[1]) + f32::from(px[2])) / 3.0;
            if brightness < threshold {
                dark += 1;
            }
        }
        dark as f32 / count as f32
    }
}

/// Read access to one open slide. The core reads at pyramid level 0 only, so
/// the trait exposes just the full-resolution plane.
pub trait SlideRegionReader: Send + Sync {
    /// Full-resolution dimensions as `(width, height)`
    fn dimensions(&self) -> (u32, u32);

    /// Read a full-resolution region as an RGB raster
    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> SchedulerResult<RgbTile>;
}

/// Opens slides by path. Failure to open is fatal to the requesting job.
pub trait SlideOpener: Send + Sync {
    /// Open a slide for reading
    fn open(&self, path: &str) -> SchedulerResult<Arc<dyn SlideRegionReader>>;
}

/// Deterministic in-memory slide: a bright background with dark tissue
/// rectangles. Ships with the crate so demos and tests can exercise the full
/// pipeline without a real decoder.
#[derive(Debug, Clone)]
pub struct SyntheticSlide {
    width: u32,
    height: u32,
    /// Dark rectangles `(x, y, w, h)` on the otherwise bright background
    tissue: Vec<(u32, u32, u32, u32)>,
}

/// Pixel value inside tissue rectangles
const TISSUE_VALUE: u8 = 100;

/// Pixel value of the background, above the tissue threshold
const BACKGROUND_VALUE: u8 = 250;

impl SyntheticSlide {
    /// Slide with no tissue at all
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tissue: Vec::new(),
        }
    }

    /// Slide entirely covered by tissue
    pub fn tissue_filled(width: u32, height: u32) -> Self {
        Self::new(width, height).with_tissue_rect(0, 0, width, height)
    }

    /// Add a dark tissue rectangle
    pub fn with_tissue_rect(mut self, x: u32, y: u32, w: u32, h: u32) -> Self {
        self.tissue.push((x, y, w, h));
        self
    }

    fn value_at(&self, x: u32, y: u32) -> u8 {
        let in_tissue = self
            .tissue
            .iter()
            .any(|&(tx, ty, tw, th)| x >= tx && x < tx + tw && y >= ty && y < ty + th);
        if in_tissue {
            TISSUE_VALUE
        } else {
            BACKGROUND_VALUE
        }
    }
}

impl SlideRegionReader for SyntheticSlide {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> SchedulerResult<RgbTile> {
        if x + width > self.width || y + height > self.height {
            return Err(SchedulerError::RegionRead {
                x,
                y,
                reason: format!(
                    "region {}x{} exceeds slide bounds {}x{}",
                    width, height, self.width, self.height
                ),
            });
        }
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for row in 0..height {
            for col in 0..width {
                let value = self.value_at(x + col, y + row);
                pixels.extend_from_slice(&[value, value, value]);
            }
        }
        RgbTile::new(width, height, pixels)
    }
}

/// Opener that hands out the same synthetic slide regardless of path
#[derive(Debug, Clone)]
pub struct SyntheticSlideOpener {
    slide: SyntheticSlide,
}

impl SyntheticSlideOpener {
    /// Wrap a synthetic slide
    pub fn new(slide: SyntheticSlide) -> Self {
        Self { slide }
    }
}

impl SlideOpener for SyntheticSlideOpener {
    fn open(&self, _path: &str) -> SchedulerResult<Arc<dyn SlideRegionReader>> {
        Ok(Arc::new(self.slide.clone()))
    }
}
