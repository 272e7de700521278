use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::atomic_io::write_bytes_atomic;
use crate::tile::{Tile, TileRef, TileSheets};

use super::{TileGrid, TileGridError};

/// Columns per block in the level file.
pub const BLOC_SIZE: u32 = 256;

#[derive(Debug, Error)]
pub enum LevelFileError {
    #[error("failed to read/write level file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("level at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
    #[error("level at {path} does not fit its sheets: {source}")]
    Tiles {
        path: PathBuf,
        #[source]
        source: TileGridError,
    },
}

/// Decoded level contents before they are bound to loaded sheets.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelData {
    /// Sheets descriptor reference stored in the header.
    pub sheets_ref: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles: Vec<Tile>,
}

impl LevelData {
    pub fn into_grid(self, sheets: TileSheets, path: &Path) -> Result<TileGrid, LevelFileError> {
        if sheets.tile_width() != self.tile_width || sheets.tile_height() != self.tile_height {
            return Err(invalid_format(
                path,
                &format!(
                    "level tile size {}x{} differs from sheets tile size {}x{}",
                    self.tile_width,
                    self.tile_height,
                    sheets.tile_width(),
                    sheets.tile_height()
                ),
            ));
        }
        let tiles_error = |source| LevelFileError::Tiles {
            path: path.to_path_buf(),
            source,
        };
        let mut grid = TileGrid::create(self.width, self.height, sheets).map_err(tiles_error)?;
        for tile in &self.tiles {
            grid.set_tile(tile.col, tile.row, Some(tile.tile_ref))
                .map_err(tiles_error)?;
        }
        Ok(grid)
    }
}

impl TileGrid {
    pub fn save(&self, path: &Path, sheets_ref: &str) -> Result<(), LevelFileError> {
        save_level(path, self, sheets_ref)
    }

    pub fn load(path: &Path, sheets: TileSheets) -> Result<Self, LevelFileError> {
        load_level(path, sheets)
    }
}

pub fn save_level(path: &Path, grid: &TileGrid, sheets_ref: &str) -> Result<(), LevelFileError> {
    let bytes = encode_level(grid, sheets_ref, path)?;
    write_bytes_atomic(path, &bytes).map_err(|source| LevelFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        width = grid.width(),
        height = grid.height(),
        tiles = grid.tiles_number(),
        "level_saved"
    );
    Ok(())
}

pub fn read_level(path: &Path) -> Result<LevelData, LevelFileError> {
    let bytes = fs::read(path).map_err(|source| LevelFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_level(&bytes, path)
}

pub fn load_level(path: &Path, sheets: TileSheets) -> Result<TileGrid, LevelFileError> {
    let data = read_level(path)?;
    let grid = data.into_grid(sheets, path)?;
    info!(
        path = %path.display(),
        width = grid.width(),
        height = grid.height(),
        tiles = grid.tiles_number(),
        "level_loaded"
    );
    Ok(grid)
}

/// Big-endian layout: sheets reference, size header, then the tiles split in
/// blocks of [`BLOC_SIZE`] columns.
pub fn encode_level(
    grid: &TileGrid,
    sheets_ref: &str,
    path: &Path,
) -> Result<Vec<u8>, LevelFileError> {
    let width = u16::try_from(grid.width())
        .map_err(|_| invalid_format(path, "grid width does not fit in u16"))?;
    let height = u16::try_from(grid.height())
        .map_err(|_| invalid_format(path, "grid height does not fit in u16"))?;
    let tile_width = u8::try_from(grid.tile_width())
        .map_err(|_| invalid_format(path, "tile width does not fit in u8"))?;
    let tile_height = u8::try_from(grid.tile_height())
        .map_err(|_| invalid_format(path, "tile height does not fit in u8"))?;

    let blocks = block_count(grid.width());
    let mut per_block = vec![Vec::<Tile>::new(); blocks as usize];
    for tile in grid.tiles() {
        per_block[(tile.col / BLOC_SIZE) as usize].push(tile);
    }

    let mut bytes = Vec::<u8>::new();
    write_string(&mut bytes, sheets_ref, path)?;
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.push(tile_width);
    bytes.push(tile_height);
    bytes.extend_from_slice(&(blocks as u16).to_be_bytes());
    for (block, tiles) in per_block.iter().enumerate() {
        let count = u16::try_from(tiles.len())
            .map_err(|_| invalid_format(path, "too many tiles in one block"))?;
        bytes.extend_from_slice(&count.to_be_bytes());
        for tile in tiles {
            let col_in_block = tile.col - block as u32 * BLOC_SIZE;
            bytes.extend_from_slice(&(tile.tile_ref.sheet as i32).to_be_bytes());
            bytes.extend_from_slice(&(tile.tile_ref.number as i32).to_be_bytes());
            bytes.extend_from_slice(&(col_in_block as i32).to_be_bytes());
            bytes.extend_from_slice(&(tile.row as i32).to_be_bytes());
        }
    }
    Ok(bytes)
}

pub fn decode_level(bytes: &[u8], path: &Path) -> Result<LevelData, LevelFileError> {
    let mut cursor = 0usize;
    let sheets_ref = read_string(bytes, &mut cursor, path)?;
    let width = read_u16(bytes, &mut cursor, path)? as u32;
    let height = read_u16(bytes, &mut cursor, path)? as u32;
    let tile_width = read_u8(bytes, &mut cursor, path)? as u32;
    let tile_height = read_u8(bytes, &mut cursor, path)? as u32;
    if width == 0 || height == 0 || tile_width == 0 || tile_height == 0 {
        return Err(invalid_format(path, "level and tile sizes must be positive"));
    }
    let blocks = read_u16(bytes, &mut cursor, path)? as u32;
    if blocks != block_count(width) {
        return Err(invalid_format(path, "block count does not match level width"));
    }

    let mut tiles = Vec::new();
    for block in 0..blocks {
        let count = read_u16(bytes, &mut cursor, path)?;
        for _ in 0..count {
            let sheet = read_non_negative(bytes, &mut cursor, path, "sheet")?;
            let number = read_non_negative(bytes, &mut cursor, path, "tile number")?;
            let col_in_block = read_non_negative(bytes, &mut cursor, path, "column")?;
            let row = read_non_negative(bytes, &mut cursor, path, "row")?;
            let col = block * BLOC_SIZE + col_in_block;
            if col_in_block >= BLOC_SIZE || col >= width || row >= height {
                return Err(invalid_format(
                    path,
                    &format!("tile position ({col},{row}) is outside the level"),
                ));
            }
            tiles.push(Tile {
                tile_ref: TileRef::new(sheet, number),
                col,
                row,
            });
        }
    }
    if cursor != bytes.len() {
        return Err(invalid_format(path, "unexpected trailing bytes"));
    }

    debug!(path = %path.display(), width, height, tiles = tiles.len(), "level_decoded");
    Ok(LevelData {
        sheets_ref,
        width,
        height,
        tile_width,
        tile_height,
        tiles,
    })
}

fn block_count(width: u32) -> u32 {
    width.div_ceil(BLOC_SIZE)
}

fn write_string(target: &mut Vec<u8>, value: &str, path: &Path) -> Result<(), LevelFileError> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(invalid_format(path, "string too long for u16 length"));
    }
    target.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    target.extend_from_slice(bytes);
    Ok(())
}

fn read_string(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<String, LevelFileError> {
    let len = read_u16(bytes, cursor, path)? as usize;
    let raw = read_exact(bytes, cursor, len, path)?;
    std::str::from_utf8(raw)
        .map(|value| value.to_string())
        .map_err(|_| invalid_format(path, "invalid UTF-8 string in level"))
}

fn read_u8(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u8, LevelFileError> {
    Ok(read_exact(bytes, cursor, 1, path)?[0])
}

fn read_u16(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u16, LevelFileError> {
    Ok(u16::from_be_bytes(
        read_exact(bytes, cursor, 2, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u16 encoding"))?,
    ))
}

fn read_i32(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<i32, LevelFileError> {
    Ok(i32::from_be_bytes(
        read_exact(bytes, cursor, 4, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid i32 encoding"))?,
    ))
}

fn read_non_negative(
    bytes: &[u8],
    cursor: &mut usize,
    path: &Path,
    field: &str,
) -> Result<u32, LevelFileError> {
    let value = read_i32(bytes, cursor, path)?;
    u32::try_from(value).map_err(|_| invalid_format(path, &format!("negative {field} {value}")))
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    path: &Path,
) -> Result<&'a [u8], LevelFileError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(invalid_format(path, "unexpected end of file"));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn invalid_format(path: &Path, message: &str) -> LevelFileError {
    LevelFileError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::tile::test_support::sheets_16;

    fn sample_grid() -> TileGrid {
        let mut grid = TileGrid::create(300, 3, sheets_16(64)).expect("grid");
        grid.set_tile(0, 0, Some(TileRef::new(0, 1))).expect("set");
        grid.set_tile(255, 2, Some(TileRef::new(0, 2))).expect("set");
        grid.set_tile(256, 1, Some(TileRef::new(0, 3))).expect("set");
        grid.set_tile(299, 0, Some(TileRef::new(0, 63))).expect("set");
        grid
    }

    #[test]
    fn save_then_load_restores_every_tile() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("level.lvl");
        let grid = sample_grid();
        grid.save(&path, "sheets.xml").expect("save");

        let data = read_level(&path).expect("read");
        assert_eq!(data.sheets_ref, "sheets.xml");
        assert_eq!((data.width, data.height), (300, 3));

        let loaded = TileGrid::load(&path, sheets_16(64)).expect("load");
        assert_eq!(loaded, grid);
    }

    #[test]
    fn header_layout_is_big_endian_with_column_blocks() {
        let grid = sample_grid();
        let bytes = encode_level(&grid, "s", Path::new("mem")).expect("encode");
        // len "s" | width | height | tw | th | blocks
        assert_eq!(&bytes[..10], &[0, 1, b's', 1, 44, 0, 3, 16, 16, 0]);
        assert_eq!(bytes[10], 2);
        // First block holds two tiles: (0,0) and (255,2).
        assert_eq!(&bytes[11..13], &[0, 2]);
        assert_eq!(
            bytes.len(),
            13 + 2 * 16 + 2 + 2 * 16,
            "second block carries its own count"
        );
    }

    #[test]
    fn truncated_and_trailing_data_are_invalid_format() {
        let bytes = encode_level(&sample_grid(), "s", Path::new("mem")).expect("encode");

        let truncated = &bytes[..bytes.len() - 3];
        let err = decode_level(truncated, Path::new("mem")).expect_err("truncated");
        assert!(matches!(err, LevelFileError::InvalidFormat { .. }));

        let mut trailing = bytes.clone();
        trailing.push(0);
        let err = decode_level(&trailing, Path::new("mem")).expect_err("trailing");
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn tile_size_mismatch_is_rejected_on_load() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("level.lvl");
        sample_grid().save(&path, "sheets.xml").expect("save");
        let other = TileSheets::new(
            8,
            8,
            vec![crate::tile::SheetInfo::new("ground.png", 64)],
        );
        let err = TileGrid::load(&path, other).expect_err("mismatch");
        assert!(matches!(err, LevelFileError::InvalidFormat { .. }));
    }

    #[test]
    fn tile_unknown_to_sheets_is_a_tiles_error() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("level.lvl");
        sample_grid().save(&path, "sheets.xml").expect("save");
        let err = TileGrid::load(&path, sheets_16(8)).expect_err("unknown");
        assert!(matches!(
            err,
            LevelFileError::Tiles {
                source: TileGridError::UnknownTile { .. },
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = TempDir::new().expect("temp");
        let err = read_level(&temp.path().join("absent.lvl")).expect_err("missing");
        assert!(matches!(err, LevelFileError::Io { .. }));
    }
}
