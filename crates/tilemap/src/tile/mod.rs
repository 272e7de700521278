mod group;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::xml::{parse_document, read_config_file, NodeReader};
use crate::config::{ConfigError, ConfigErrorCode};

pub use group::{CatalogError, TileGroup, TileGroupCatalog, TileGroupType, UnknownGroupType};

/// Identity of a tile image: sheet index plus tile number inside that sheet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileRef {
    pub sheet: u32,
    pub number: u32,
}

impl TileRef {
    pub const fn new(sheet: u32, number: u32) -> Self {
        Self { sheet, number }
    }
}

impl fmt::Display for TileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sheet, self.number)
    }
}

/// A tile placed on a grid cell. The position is fixed at placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub tile_ref: TileRef,
    pub col: u32,
    pub row: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub file: String,
    /// Number of tiles in the sheet image, when known.
    pub tile_count: Option<u32>,
}

impl SheetInfo {
    pub fn new(file: &str, tile_count: u32) -> Self {
        Self {
            file: file.to_string(),
            tile_count: Some(tile_count),
        }
    }
}

/// Tile size and the ordered sheet images a grid draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSheets {
    tile_width: u32,
    tile_height: u32,
    sheets: Vec<SheetInfo>,
    source: Option<PathBuf>,
}

impl TileSheets {
    pub fn new(tile_width: u32, tile_height: u32, sheets: Vec<SheetInfo>) -> Self {
        Self {
            tile_width,
            tile_height,
            sheets,
            source: None,
        }
    }

    /// Reads a sheets descriptor:
    ///
    /// ```xml
    /// <sheets>
    ///     <tileSize width="16" height="16"/>
    ///     <sheet>ground.png</sheet>
    /// </sheets>
    /// ```
    ///
    /// Sheet images are resolved next to the descriptor; their dimensions give
    /// the tile count of each sheet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_config_file(path)?;
        let doc = parse_document(path, &raw)?;
        let reader = NodeReader::new(path, &doc);
        let root = reader.expect_root("sheets")?;

        let size = reader.first_child(root, "tileSize").ok_or_else(|| {
            reader.error_at(
                ConfigErrorCode::MissingAttribute,
                "missing required element <tileSize>".to_string(),
                root,
            )
        })?;
        let tile_width: u32 = reader.parse_attr(size, "width")?;
        let tile_height: u32 = reader.parse_attr(size, "height")?;
        if !(1..=255).contains(&tile_width) || !(1..=255).contains(&tile_height) {
            return Err(reader.error_at(
                ConfigErrorCode::InvalidValue,
                format!("tile size {tile_width}x{tile_height} must be within 1..=255"),
                size,
            ));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut sheets = Vec::new();
        for node in reader.children(root, "sheet") {
            let file = reader.required_text(node, "sheet")?;
            let image_path = base_dir.join(&file);
            let (width, height) = image::image_dimensions(&image_path).map_err(|error| {
                reader.error_at(
                    ConfigErrorCode::MissingSheetImage,
                    format!(
                        "sheet image {} cannot be read: {error}",
                        image_path.display()
                    ),
                    node,
                )
            })?;
            let tile_count = (width / tile_width) * (height / tile_height);
            sheets.push(SheetInfo {
                file,
                tile_count: Some(tile_count),
            });
        }

        debug!(
            path = %path.display(),
            tile_width,
            tile_height,
            sheet_count = sheets.len(),
            "tile_sheets_loaded"
        );
        Ok(Self {
            tile_width,
            tile_height,
            sheets,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn sheets(&self) -> &[SheetInfo] {
        &self.sheets
    }

    pub fn sheets_number(&self) -> usize {
        self.sheets.len()
    }

    /// Descriptor the sheets were loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn with_source(mut self, source: &Path) -> Self {
        self.source = Some(source.to_path_buf());
        self
    }

    pub fn sheet_image_path(&self, sheet: u32) -> Option<PathBuf> {
        let info = self.sheets.get(sheet as usize)?;
        let base_dir = self
            .source
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new(""));
        Some(base_dir.join(&info.file))
    }

    /// True when the sheet is loaded and the number fits its known tile count.
    pub fn contains(&self, tile: TileRef) -> bool {
        match self.sheets.get(tile.sheet as usize) {
            Some(info) => info.tile_count.map_or(true, |count| tile.number < count),
            None => false,
        }
    }
}
