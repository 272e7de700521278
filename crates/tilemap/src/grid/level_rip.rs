use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::tile::{TileRef, TileSheets};

use super::{TileGrid, TileGridError};

const REPORTED_POSITIONS: usize = 8;

#[derive(Debug, Error)]
pub enum LevelRipError {
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("sheet {sheet} has no image file to match against")]
    MissingSheetImage { sheet: u32 },
    #[error(
        "image {path} is {width}x{height} pixels, not a multiple of the {tile_width}x{tile_height} tile size"
    )]
    NotTileAligned {
        path: PathBuf,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    },
    #[error(transparent)]
    Grid(#[from] TileGridError),
}

/// Outcome of a level rip besides the grid itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelRipReport {
    pub matched: usize,
    pub empty: usize,
    pub unmatched: usize,
    /// First unmatched cells as `(col,row)` grid positions.
    pub first_unmatched: Vec<(u32, u32)>,
}

impl TileGrid {
    /// Rebuilds a grid from a flat level image by matching each tile-sized block
    /// against the sheet images. Unmatched blocks are left empty and reported.
    pub fn from_level_rip(
        level_image: &Path,
        sheets: TileSheets,
    ) -> Result<(TileGrid, LevelRipReport), LevelRipError> {
        let tile_width = sheets.tile_width();
        let tile_height = sheets.tile_height();
        let known = index_sheet_blocks(&sheets)?;
        let level = open_rgba(level_image)?;
        if level.width() % tile_width != 0 || level.height() % tile_height != 0 {
            return Err(LevelRipError::NotTileAligned {
                path: level_image.to_path_buf(),
                width: level.width(),
                height: level.height(),
                tile_width,
                tile_height,
            });
        }

        let width = level.width() / tile_width;
        let height = level.height() / tile_height;
        let mut grid = TileGrid::create(width, height, sheets)?;
        let mut report = LevelRipReport::default();
        for block_y in 0..height {
            for block_x in 0..width {
                // Image rows go down, grid rows go up.
                let row = height - 1 - block_y;
                let block = block_pixels(&level, block_x, block_y, tile_width, tile_height);
                if is_transparent(&block) {
                    report.empty += 1;
                    continue;
                }
                match known.get(&digest(&block)) {
                    Some(tile) => {
                        grid.set_tile(block_x, row, Some(*tile))?;
                        report.matched += 1;
                    }
                    None => {
                        report.unmatched += 1;
                        if report.first_unmatched.len() < REPORTED_POSITIONS {
                            report.first_unmatched.push((block_x, row));
                        }
                    }
                }
            }
        }

        if report.unmatched > 0 {
            warn!(
                path = %level_image.display(),
                unmatched = report.unmatched,
                first = ?report.first_unmatched.first(),
                "level_rip_unmatched_blocks"
            );
        }
        info!(
            path = %level_image.display(),
            width,
            height,
            matched = report.matched,
            empty = report.empty,
            "level_ripped"
        );
        Ok((grid, report))
    }
}

fn index_sheet_blocks(sheets: &TileSheets) -> Result<HashMap<[u8; 32], TileRef>, LevelRipError> {
    let tile_width = sheets.tile_width();
    let tile_height = sheets.tile_height();
    let mut known = HashMap::new();
    for sheet in 0..sheets.sheets_number() as u32 {
        let path = sheets
            .sheet_image_path(sheet)
            .ok_or(LevelRipError::MissingSheetImage { sheet })?;
        let image = open_rgba(&path)?;
        let columns = image.width() / tile_width;
        let rows = image.height() / tile_height;
        for block_y in 0..rows {
            for block_x in 0..columns {
                let block = block_pixels(&image, block_x, block_y, tile_width, tile_height);
                let number = block_y * columns + block_x;
                // Duplicate images keep the lowest tile number.
                known
                    .entry(digest(&block))
                    .or_insert(TileRef::new(sheet, number));
            }
        }
    }
    Ok(known)
}

fn open_rgba(path: &Path) -> Result<RgbaImage, LevelRipError> {
    image::open(path)
        .map(|image| image.to_rgba8())
        .map_err(|source| LevelRipError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// RGBA pixels of one tile-sized block, row by row.
pub(crate) fn block_pixels(
    image: &RgbaImage,
    block_x: u32,
    block_y: u32,
    tile_width: u32,
    tile_height: u32,
) -> Vec<[u8; 4]> {
    let mut pixels = Vec::with_capacity((tile_width * tile_height) as usize);
    for y in 0..tile_height {
        for x in 0..tile_width {
            pixels.push(
                image
                    .get_pixel(block_x * tile_width + x, block_y * tile_height + y)
                    .0,
            );
        }
    }
    pixels
}

fn is_transparent(block: &[[u8; 4]]) -> bool {
    block.iter().all(|pixel| pixel[3] == 0)
}

fn digest(block: &[[u8; 4]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for pixel in block {
        hasher.update(pixel);
    }
    hasher.finalize().into()
}
