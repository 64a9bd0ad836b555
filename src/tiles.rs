//! Overlapping tile grid over a slide

use serde::{Deserialize, Serialize};

/// A rectangular sub-region of the source image, processed as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Left edge in slide coordinates
    pub x: u32,
    /// Top edge in slide coordinates
    pub y: u32,
    /// Width in pixels
    pub w: u32,
    /// Height in pixels
    pub h: u32,
}

/// Generate tile coordinates covering `width x height` with overlap.
///
/// Origins advance by `tile_size - overlap`; trailing tiles are clipped to the
/// image bounds, never padded. An empty image yields no tiles.
pub fn generate_tiles(width: u32, height: u32, tile_size: u32, overlap: u32) -> Vec<Tile> {
    let mut tiles = Vec::new();
    if width == 0 || height == 0 {
        return tiles;
    }
    let step = tile_size.saturating_sub(overlap).max(1);
    let mut y = 0;
    while y < height {
        let h = tile_size.min(height - y);
        let mut x = 0;
        while x < width {
            let w = tile_size.min(width - x);
            tiles.push(Tile { x, y, w, h });
            x += step;
        }
        y += step;
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(1024, 1024 => 9 ; "nine tile square")]
    #[test_case(448, 448 => 1 ; "single tile, exactly one step")]
    #[test_case(512, 512 => 4 ; "overlap forces a second row and column")]
    #[test_case(2000, 800 => 10 ; "five by two grid")]
    #[test_case(1, 1 => 1 ; "degenerate single pixel")]
    fn tile_count(width: u32, height: u32) -> usize {
        generate_tiles(width, height, 512, 64).len()
    }

    #[test]
    fn empty_image_yields_no_tiles() {
        assert!(generate_tiles(0, 1024, 512, 64).is_empty());
        assert!(generate_tiles(1024, 0, 512, 64).is_empty());
    }

    #[test]
    fn trailing_tiles_are_clipped() {
        let tiles = generate_tiles(1000, 500, 512, 64);
        let last = tiles.last().unwrap();
        assert_eq!(last.x + last.w, 1000);
        assert_eq!(last.y + last.h, 500);
    }

    proptest! {
        #[test]
        fn grid_matches_ceiling_formula_and_stays_in_bounds(
            width in 1u32..3000,
            height in 1u32..3000,
        ) {
            let tiles = generate_tiles(width, height, 512, 64);
            let step = 512 - 64;
            let expected = (width.div_ceil(step) * height.div_ceil(step)) as usize;
            prop_assert_eq!(tiles.len(), expected);
            for tile in tiles {
                prop_assert!(tile.w >= 1 && tile.w <= 512);
                prop_assert!(tile.h >= 1 && tile.h <= 512);
                prop_assert!(tile.x + tile.w <= width);
                prop_assert!(tile.y + tile.h <= height);
            }
        }
    }
}
