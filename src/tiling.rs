//! Splitting pages into model-sized tiles and stitching predictions back
//!
//! Tiles are emitted in row-major order. Predictions are stitched into one
//! plane and cropped back to the page the tiles were cut from.

use crate::error::OcrError;
use crate::preprocessing::{fit_page, pad_to_multiple};
use image::{GrayImage, Rgb, RgbImage};
use ndarray::{s, Array2, ArrayView2};

/// Grid geometry of a tiled page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub tile_size: u32,
    pub columns: u32,
    pub rows: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    /// Size of the page after clamping, before padding
    pub width: u32,
    pub height: u32,
}

/// A page cut into tiles, plus what is needed to undo the cut
#[derive(Debug, Clone)]
pub struct TiledPage {
    pub grid: TileGrid,
    pub tiles: Vec<RgbImage>,
}

impl TileGrid {
    pub fn tile_count(&self) -> usize {
        (self.columns * self.rows) as usize
    }

    /// Reassemble per-tile planes into one plane without the padding
    ///
    /// `tiles` must hold `tile_count()` planes of `tile_size` x `tile_size`
    /// in row-major order.
    pub fn stitch(&self, tiles: &[ArrayView2<'_, f32>]) -> Result<Array2<f32>, OcrError> {
        if tiles.len() != self.tile_count() {
            return Err(OcrError::segmentation(format!(
                "expected {} tile predictions, got {}",
                self.tile_count(),
                tiles.len()
            )));
        }

        let t = self.tile_size as usize;
        let mut plane = Array2::<f32>::zeros((self.rows as usize * t, self.columns as usize * t));

        for (idx, tile) in tiles.iter().enumerate() {
            if tile.dim() != (t, t) {
                return Err(OcrError::segmentation(format!(
                    "tile {} has shape {:?}, expected ({}, {})",
                    idx,
                    tile.dim(),
                    t,
                    t
                )));
            }
            let row = idx / self.columns as usize;
            let col = idx % self.columns as usize;
            plane
                .slice_mut(s![row * t..(row + 1) * t, col * t..(col + 1) * t])
                .assign(tile);
        }

        Ok(plane
            .slice(s![..self.height as usize, ..self.width as usize])
            .to_owned())
    }
}

/// Clamp, pad with white and cut a page into `tile_size` tiles
pub fn tile_page(image: &RgbImage, tile_size: u32) -> Result<TiledPage, OcrError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(OcrError::InvalidInput("image has zero area".to_string()));
    }
    if tile_size == 0 {
        return Err(OcrError::InvalidInput("tile size must be positive".to_string()));
    }

    let fitted = fit_page(image, tile_size);
    let (padded, pad_x, pad_y) = pad_to_multiple(&fitted, tile_size, Rgb([255, 255, 255]));

    let grid = TileGrid {
        tile_size,
        columns: padded.width() / tile_size,
        rows: padded.height() / tile_size,
        pad_x,
        pad_y,
        width: fitted.width(),
        height: fitted.height(),
    };

    let tiles = split(&padded, &grid);

    tracing::debug!(
        "Tiled {}x{} page into {}x{} grid of {} px tiles",
        image.width(),
        image.height(),
        grid.columns,
        grid.rows,
        tile_size
    );

    Ok(TiledPage { grid, tiles })
}

fn split(padded: &RgbImage, grid: &TileGrid) -> Vec<RgbImage> {
    let t = grid.tile_size;
    let mut tiles = Vec::with_capacity(grid.tile_count());
    for row in 0..grid.rows {
        for col in 0..grid.columns {
            tiles.push(image::imageops::crop_imm(padded, col * t, row * t, t, t).to_image());
        }
    }
    tiles
}

/// Convert a binary probability plane to a 0/255 mask
pub fn plane_to_mask(plane: &Array2<f32>, threshold: f32) -> GrayImage {
    let (height, width) = plane.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if plane[[y as usize, x as usize]] > threshold {
            image::Luma([255u8])
        } else {
            image::Luma([0u8])
        }
    })
}
