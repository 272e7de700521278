mod level_file;
mod level_rip;

use thiserror::Error;
use tracing::{debug, warn};

use crate::tile::{Tile, TileRef, TileSheets};

pub use level_file::{
    decode_level, encode_level, load_level, read_level, save_level, LevelData, LevelFileError,
    BLOC_SIZE,
};
pub(crate) use level_rip::block_pixels;
pub use level_rip::{LevelRipError, LevelRipReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TileGridError {
    #[error("grid size {width}x{height} must be strictly positive")]
    InvalidSize { width: u32, height: u32 },
    #[error("column {col} is outside the grid width {width}")]
    ColumnOutOfBounds { col: u32, width: u32 },
    #[error("row {row} is outside the grid height {height}")]
    RowOutOfBounds { row: u32, height: u32 },
    #[error("tile {tile} is not part of the loaded sheets")]
    UnknownTile { tile: TileRef },
}

/// Pixel rectangle of a placed tile, `y` measured upward from the bottom row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Canonical tile storage.
///
/// Cells are stored column-major. Tile `(0,0)` is the bottom-left cell and rows
/// grow upward, so pixel `(x,y)` lies in column `x / tile_width` and row
/// `y / tile_height`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    sheets: TileSheets,
    cells: Vec<Option<TileRef>>,
}

impl TileGrid {
    pub fn create(width: u32, height: u32, sheets: TileSheets) -> Result<Self, TileGridError> {
        if width == 0 || height == 0 {
            return Err(TileGridError::InvalidSize { width, height });
        }
        Ok(Self {
            width,
            height,
            sheets,
            cells: vec![None; width as usize * height as usize],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_width(&self) -> u32 {
        self.sheets.tile_width()
    }

    pub fn tile_height(&self) -> u32 {
        self.sheets.tile_height()
    }

    pub fn sheets(&self) -> &TileSheets {
        &self.sheets
    }

    /// Diagonal of the grid in tiles, rounded up.
    pub fn radius_in_tile(&self) -> u32 {
        let w = self.width as f64;
        let h = self.height as f64;
        (w * w + h * h).sqrt().ceil() as u32
    }

    pub fn set_tile(
        &mut self,
        col: u32,
        row: u32,
        tile: Option<TileRef>,
    ) -> Result<(), TileGridError> {
        let index = self.checked_index(col, row)?;
        if let Some(tile) = tile {
            if !self.sheets.contains(tile) {
                return Err(TileGridError::UnknownTile { tile });
            }
        }
        self.cells[index] = tile;
        Ok(())
    }

    /// `Ok(None)` is an empty cell, not a failure.
    pub fn get_tile(&self, col: u32, row: u32) -> Result<Option<Tile>, TileGridError> {
        let index = self.checked_index(col, row)?;
        Ok(self.cells[index].map(|tile_ref| Tile { tile_ref, col, row }))
    }

    /// Lenient lookup for signed neighbour coordinates; `None` outside the grid.
    pub fn tile(&self, col: i64, row: i64) -> Option<Tile> {
        let index = self.index_of(col, row)?;
        let (col, row) = (col as u32, row as u32);
        self.cells[index].map(|tile_ref| Tile { tile_ref, col, row })
    }

    pub fn get_tile_at(&self, x: f64, y: f64) -> Option<Tile> {
        self.tile(self.in_tile_x(x), self.in_tile_y(y))
    }

    pub fn in_tile_x(&self, x: f64) -> i64 {
        (x / self.tile_width() as f64).floor() as i64
    }

    pub fn in_tile_y(&self, y: f64) -> i64 {
        (y / self.tile_height() as f64).floor() as i64
    }

    pub fn tile_bounds(&self, tile: &Tile) -> TileBounds {
        TileBounds {
            x: tile.col * self.tile_width(),
            y: tile.row * self.tile_height(),
            width: self.tile_width(),
            height: self.tile_height(),
        }
    }

    /// Tiles crossed by the segment from `(ox,oy)` to `(x,y)`, in travel order.
    ///
    /// The segment is clipped to the grid rectangle first, then the cells are
    /// walked with a grid DDA, so a fast mover never skips a cell it passes
    /// through and a far one costs no more than a grid crossing. Empty cells
    /// are left out; non-finite input hits nothing.
    pub fn get_tiles_hit(&self, ox: f64, oy: f64, x: f64, y: f64) -> Vec<Tile> {
        let tw = self.tile_width() as f64;
        let th = self.tile_height() as f64;
        let (dx, dy) = (x - ox, y - oy);
        if ![ox, oy, dx, dy].iter().all(|value| value.is_finite()) {
            return Vec::new();
        }
        let extent = (self.width as f64 * tw, self.height as f64 * th);
        let Some((t_enter, t_exit)) = clip_segment((ox, oy), (dx, dy), extent) else {
            return Vec::new();
        };
        let (sx, sy) = (ox + t_enter * dx, oy + t_enter * dy);
        if t_enter >= t_exit {
            // Touches the rectangle in a single point.
            return self.tile(self.in_tile_x(sx), self.in_tile_y(sy)).into_iter().collect();
        }
        let (ex, ey) = (ox + t_exit * dx, oy + t_exit * dy);

        let last_col = self.width as i64 - 1;
        let last_row = self.height as i64 - 1;
        let mut col = self.in_tile_x(sx).clamp(0, last_col);
        let mut row = self.in_tile_y(sy).clamp(0, last_row);
        let end_col = self.in_tile_x(ex).clamp(0, last_col);
        let end_row = self.in_tile_y(ey).clamp(0, last_row);

        let (dx, dy) = (ex - sx, ey - sy);
        let step_col = if dx > 0.0 { 1 } else { -1 };
        let step_row = if dy > 0.0 { 1 } else { -1 };
        let mut t_max_x = axis_boundary(sx, dx, col, tw);
        let mut t_max_y = axis_boundary(sy, dy, row, th);
        let t_delta_x = if dx != 0.0 { tw / dx.abs() } else { f64::INFINITY };
        let t_delta_y = if dy != 0.0 { th / dy.abs() } else { f64::INFINITY };

        let mut found = Vec::new();
        loop {
            if let Some(tile) = self.tile(col, row) {
                found.push(tile);
            }
            if col == end_col && row == end_row {
                break;
            }
            let step_horizontal = if col == end_col {
                false
            } else if row == end_row {
                true
            } else {
                t_max_x < t_max_y
            };
            if step_horizontal {
                col += step_col;
                t_max_x += t_delta_x;
            } else {
                row += step_row;
                t_max_y += t_delta_y;
            }
        }
        found
    }

    /// Copies the other grid's tiles with a tile offset. Anything landing
    /// outside this grid is clipped.
    pub fn append(&mut self, other: &TileGrid, offset_col: i64, offset_row: i64) {
        let mut copied = 0usize;
        let mut skipped = 0usize;
        for tile in other.tiles() {
            let col = tile.col as i64 + offset_col;
            let row = tile.row as i64 + offset_row;
            let Some(index) = self.index_of(col, row) else {
                continue;
            };
            if !self.sheets.contains(tile.tile_ref) {
                skipped += 1;
                continue;
            }
            self.cells[index] = Some(tile.tile_ref);
            copied += 1;
        }
        if skipped > 0 {
            warn!(skipped, "append_skipped_tiles_outside_sheets");
        }
        debug!(copied, offset_col, offset_row, "grid_appended");
    }

    /// Removes every tile; size and sheets are kept.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = None);
    }

    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        let height = self.height;
        self.cells.iter().enumerate().filter_map(move |(index, cell)| {
            cell.map(|tile_ref| Tile {
                tile_ref,
                col: index as u32 / height,
                row: index as u32 % height,
            })
        })
    }

    pub fn tiles_number(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    fn checked_index(&self, col: u32, row: u32) -> Result<usize, TileGridError> {
        if col >= self.width {
            return Err(TileGridError::ColumnOutOfBounds {
                col,
                width: self.width,
            });
        }
        if row >= self.height {
            return Err(TileGridError::RowOutOfBounds {
                row,
                height: self.height,
            });
        }
        Ok(col as usize * self.height as usize + row as usize)
    }

    fn index_of(&self, col: i64, row: i64) -> Option<usize> {
        if col < 0 || row < 0 || col >= self.width as i64 || row >= self.height as i64 {
            return None;
        }
        Some(col as usize * self.height as usize + row as usize)
    }
}

/// Liang-Barsky clip of `origin + t * delta`, `t` in `[0,1]`, against the
/// rectangle `[0,extent.0) x [0,extent.1)`. Returns the `t` range inside.
fn clip_segment(origin: (f64, f64), delta: (f64, f64), extent: (f64, f64)) -> Option<(f64, f64)> {
    let mut t_enter = 0.0f64;
    let mut t_exit = 1.0f64;
    let edges = [
        (-delta.0, origin.0, false),
        (delta.0, extent.0 - origin.0, true),
        (-delta.1, origin.1, false),
        (delta.1, extent.1 - origin.1, true),
    ];
    for (p, q, far_edge) in edges {
        if p == 0.0 {
            // Parallel to the edge: the far edges are exclusive.
            if q < 0.0 || (far_edge && q == 0.0) {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t_enter = t_enter.max(t);
        } else {
            t_exit = t_exit.min(t);
        }
    }
    (t_enter <= t_exit).then_some((t_enter, t_exit))
}

fn axis_boundary(origin: f64, delta: f64, cell: i64, size: f64) -> f64 {
    if delta > 0.0 {
        ((cell + 1) as f64 * size - origin) / delta
    } else if delta < 0.0 {
        (cell as f64 * size - origin) / delta
    } else {
        f64::INFINITY
    }
}
