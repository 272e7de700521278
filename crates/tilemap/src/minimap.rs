use std::collections::BTreeMap;
use std::path::Path;

use image::{Rgb, RgbImage};
use tracing::{debug, info};

use crate::config::atomic_io::write_text_atomic;
use crate::config::xml::{parse_document, read_config_file, NodeReader, XmlElement};
use crate::config::{ConfigError, ConfigErrorCode};
use crate::grid::{block_pixels, TileGrid};
use crate::tile::{TileRef, TileSheets};

const EMPTY_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Tile to colour table used to draw one pixel per tile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinimapColors {
    colors: BTreeMap<TileRef, Rgb<u8>>,
}

impl MinimapColors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tile: TileRef, color: Rgb<u8>) {
        self.colors.insert(tile, color);
    }

    pub fn get(&self, tile: TileRef) -> Option<Rgb<u8>> {
        self.colors.get(&tile).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileRef, Rgb<u8>)> + '_ {
        self.colors.iter().map(|(tile, color)| (*tile, *color))
    }

    /// Reads a minimap descriptor where tiles are grouped by colour:
    ///
    /// ```xml
    /// <minimap>
    ///     <color r="0" g="0" b="255"><tile sheet="0" number="3"/></color>
    /// </minimap>
    /// ```
    ///
    /// A tile may have one colour only. When `sheets` is given every tile must
    /// exist in them.
    pub fn import(path: &Path, sheets: Option<&TileSheets>) -> Result<Self, ConfigError> {
        let raw = read_config_file(path)?;
        let doc = parse_document(path, &raw)?;
        let reader = NodeReader::new(path, &doc);
        let root = reader.expect_root("minimap")?;

        let mut colors = Self::new();
        for node in reader.children(root, "color") {
            let color = Rgb([
                reader.parse_attr(node, "r")?,
                reader.parse_attr(node, "g")?,
                reader.parse_attr(node, "b")?,
            ]);
            for child in reader.children(node, "tile") {
                let tile = reader.tile_ref(child)?;
                if sheets.is_some_and(|sheets| !sheets.contains(tile)) {
                    return Err(reader.error_at(
                        ConfigErrorCode::InvalidTileRange,
                        format!("minimap colours unknown tile {tile}"),
                        child,
                    ));
                }
                if colors.get(tile).is_some() {
                    return Err(reader.error_at(
                        ConfigErrorCode::DuplicateTile,
                        format!("tile {tile} is given more than one minimap colour"),
                        child,
                    ));
                }
                colors.insert(tile, color);
            }
        }
        debug!(path = %path.display(), tiles = colors.len(), "minimap_imported");
        Ok(colors)
    }

    /// Writes the table grouped by colour, colours and tiles in ascending order.
    pub fn export(&self, path: &Path) -> Result<(), ConfigError> {
        let mut by_color = BTreeMap::<[u8; 3], Vec<TileRef>>::new();
        for (tile, color) in self.iter() {
            by_color.entry(color.0).or_default().push(tile);
        }

        let mut root = XmlElement::new("minimap");
        for ([r, g, b], tiles) in &by_color {
            let mut node = XmlElement::new("color")
                .attr("r", r)
                .attr("g", g)
                .attr("b", b);
            for tile in tiles {
                node.push(XmlElement::tile(*tile));
            }
            root.push(node);
        }
        write_text_atomic(path, &root.to_document()).map_err(|error| {
            ConfigError::new(
                ConfigErrorCode::Write,
                format!("failed to write minimap descriptor: {error}"),
                path,
            )
        })?;
        info!(path = %path.display(), tiles = self.len(), colors = by_color.len(), "minimap_exported");
        Ok(())
    }

    /// Average colour of every opaque pixel of each tile in the sheet images.
    pub fn from_sheet_averages(sheets: &TileSheets) -> Result<Self, ConfigError> {
        let source = sheets.source().unwrap_or_else(|| Path::new("sheets.xml"));
        let mut colors = Self::new();
        for sheet in 0..sheets.sheets_number() as u32 {
            let Some(image_path) = sheets.sheet_image_path(sheet) else {
                continue;
            };
            let image = image::open(&image_path)
                .map_err(|error| {
                    ConfigError::new(
                        ConfigErrorCode::MissingSheetImage,
                        format!(
                            "sheet image {} cannot be read: {error}",
                            image_path.display()
                        ),
                        source,
                    )
                })?
                .to_rgba8();
            let columns = image.width() / sheets.tile_width();
            let rows = image.height() / sheets.tile_height();
            for block_y in 0..rows {
                for block_x in 0..columns {
                    let block = block_pixels(
                        &image,
                        block_x,
                        block_y,
                        sheets.tile_width(),
                        sheets.tile_height(),
                    );
                    let opaque = block.iter().filter(|pixel| pixel[3] != 0);
                    let mut sum = [0u64; 3];
                    let mut count = 0u64;
                    for pixel in opaque {
                        for (total, channel) in sum.iter_mut().zip(pixel) {
                            *total += *channel as u64;
                        }
                        count += 1;
                    }
                    if count == 0 {
                        continue;
                    }
                    colors.insert(
                        TileRef::new(sheet, block_y * columns + block_x),
                        Rgb(sum.map(|total| (total / count) as u8)),
                    );
                }
            }
        }
        debug!(tiles = colors.len(), "minimap_colors_computed");
        Ok(colors)
    }
}

/// One pixel per cell, top image row being the top grid row. Empty cells and
/// tiles without a colour are black.
pub fn minimap_image(grid: &TileGrid, colors: &MinimapColors) -> RgbImage {
    let mut image = RgbImage::from_pixel(grid.width(), grid.height(), EMPTY_COLOR);
    for tile in grid.tiles() {
        let color = colors.get(tile.tile_ref).unwrap_or(EMPTY_COLOR);
        image.put_pixel(tile.col, grid.height() - 1 - tile.row, color);
    }
    image
}
