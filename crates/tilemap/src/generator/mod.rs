mod transition;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::grid::{TileGrid, TileGridError};
use crate::tile::{TileGroupCatalog, TileRef, TileSheets};

pub use transition::{ReconcileReport, RuleKind, ShapeRules};

/// Tile rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileArea {
    pub min_col: u32,
    pub min_row: u32,
    pub max_col: u32,
    pub max_row: u32,
}

impl TileArea {
    pub const fn new(min_col: u32, min_row: u32, max_col: u32, max_row: u32) -> Self {
        Self {
            min_col,
            min_row,
            max_col,
            max_row,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_col >= self.max_col || self.min_row >= self.max_row
    }

    pub fn contains(&self, col: u32, row: u32) -> bool {
        (self.min_col..self.max_col).contains(&col) && (self.min_row..self.max_row).contains(&row)
    }

    pub fn cell_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.max_col - self.min_col) as usize * (self.max_row - self.min_row) as usize
    }
}

/// One generation rule. Preferences apply in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preference {
    /// Map and tile size; exactly one per parameter set.
    Size {
        tile_width: u32,
        tile_height: u32,
        width: u32,
        height: u32,
    },
    /// Covers the whole map with one tile.
    Fill { tile: TileRef },
    /// Stamps squares of side `2*size-1` at random cells of `area`, `number` times.
    Region {
        tile: TileRef,
        area: TileArea,
        size: u32,
        number: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorParameter {
    pub preferences: Vec<Preference>,
    #[serde(default)]
    pub seed: u64,
}

impl GeneratorParameter {
    pub fn new(seed: u64) -> Self {
        Self {
            preferences: Vec::new(),
            seed,
        }
    }

    pub fn add(mut self, preference: Preference) -> Self {
        self.preferences.push(preference);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("generator preference list is empty")]
    EmptyPreferences,
    #[error("expected exactly one size preference, found {count}")]
    SizeCount { count: usize },
    #[error("map size {width}x{height} must be strictly positive")]
    InvalidSize { width: u32, height: u32 },
    #[error(
        "tile size {found_width}x{found_height} does not match sheets tile size {expected_width}x{expected_height}"
    )]
    TileSizeMismatch {
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },
    #[error("region area {area:?} is empty or outside the {width}x{height} map")]
    AreaOutOfBounds { area: TileArea, width: u32, height: u32 },
    #[error("region size must be at least 1")]
    InvalidRegionSize,
    #[error("tile {tile} is not part of the loaded sheets")]
    UnknownTile { tile: TileRef },
    #[error("tile {tile} does not belong to any group")]
    UngroupedTile { tile: TileRef },
    #[error(transparent)]
    Grid(#[from] TileGridError),
}

#[derive(Debug, Clone)]
pub struct GeneratedMap {
    pub grid: TileGrid,
    pub reconcile: ReconcileReport,
}

/// Builds maps from preference lists, then reconciles group borders against
/// the transition and circuit rules.
pub struct MapGenerator<'a> {
    sheets: &'a TileSheets,
    groups: &'a TileGroupCatalog,
    transitions: Option<&'a ShapeRules>,
    circuits: Option<&'a ShapeRules>,
}

impl<'a> MapGenerator<'a> {
    pub fn new(sheets: &'a TileSheets, groups: &'a TileGroupCatalog) -> Self {
        Self {
            sheets,
            groups,
            transitions: None,
            circuits: None,
        }
    }

    pub fn with_transitions(mut self, transitions: &'a ShapeRules) -> Self {
        self.transitions = Some(transitions);
        self
    }

    pub fn with_circuits(mut self, circuits: &'a ShapeRules) -> Self {
        self.circuits = Some(circuits);
        self
    }

    /// Checks the whole parameter set before any placement.
    pub fn validate(&self, params: &GeneratorParameter) -> Result<(u32, u32), GeneratorError> {
        if params.preferences.is_empty() {
            return Err(GeneratorError::EmptyPreferences);
        }
        let sizes = params
            .preferences
            .iter()
            .filter_map(|preference| match preference {
                Preference::Size {
                    tile_width,
                    tile_height,
                    width,
                    height,
                } => Some((*tile_width, *tile_height, *width, *height)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let &[(tile_width, tile_height, width, height)] = sizes.as_slice() else {
            return Err(GeneratorError::SizeCount { count: sizes.len() });
        };
        if width == 0 || height == 0 {
            return Err(GeneratorError::InvalidSize { width, height });
        }
        if tile_width != self.sheets.tile_width() || tile_height != self.sheets.tile_height() {
            return Err(GeneratorError::TileSizeMismatch {
                expected_width: self.sheets.tile_width(),
                expected_height: self.sheets.tile_height(),
                found_width: tile_width,
                found_height: tile_height,
            });
        }

        for preference in &params.preferences {
            match preference {
                Preference::Size { .. } => {}
                Preference::Fill { tile } => self.check_tile(*tile)?,
                Preference::Region {
                    tile, area, size, ..
                } => {
                    self.check_tile(*tile)?;
                    if area.is_empty() || area.max_col > width || area.max_row > height {
                        return Err(GeneratorError::AreaOutOfBounds {
                            area: *area,
                            width,
                            height,
                        });
                    }
                    if *size == 0 {
                        return Err(GeneratorError::InvalidRegionSize);
                    }
                }
            }
        }
        Ok((width, height))
    }

    pub fn generate(&self, params: &GeneratorParameter) -> Result<GeneratedMap, GeneratorError> {
        let (width, height) = self.validate(params)?;
        let mut grid = TileGrid::create(width, height, self.sheets.clone())?;
        let mut rng = StdRng::seed_from_u64(params.seed);

        for preference in &params.preferences {
            match preference {
                Preference::Size { .. } => {}
                Preference::Fill { tile } => {
                    for col in 0..width {
                        for row in 0..height {
                            grid.set_tile(col, row, Some(*tile))?;
                        }
                    }
                    debug!(tile = %tile, "fill_applied");
                }
                Preference::Region {
                    tile,
                    area,
                    size,
                    number,
                } => {
                    let stamps = apply_region(&mut grid, &mut rng, *tile, *area, *size, *number)?;
                    debug!(tile = %tile, stamps, "region_applied");
                }
            }
        }

        let reconcile = transition::reconcile(&mut grid, self.groups, self.transitions, self.circuits);
        info!(
            width,
            height,
            preferences = params.preferences.len(),
            seed = params.seed,
            transitions = reconcile.transitions,
            circuits = reconcile.circuits,
            missing_rules = reconcile.missing_rules,
            "map_generated"
        );
        Ok(GeneratedMap { grid, reconcile })
    }

    fn check_tile(&self, tile: TileRef) -> Result<(), GeneratorError> {
        if !self.sheets.contains(tile) {
            return Err(GeneratorError::UnknownTile { tile });
        }
        if self.groups.group_of(tile).is_none() {
            return Err(GeneratorError::UngroupedTile { tile });
        }
        Ok(())
    }
}

/// Returns the number of stamps performed.
fn apply_region(
    grid: &mut TileGrid,
    rng: &mut impl Rng,
    tile: TileRef,
    area: TileArea,
    size: u32,
    number: u32,
) -> Result<u32, TileGridError> {
    let mut remaining = 0usize;
    for col in area.min_col..area.max_col {
        for row in area.min_row..area.max_row {
            if grid.get_tile(col, row)?.map(|placed| placed.tile_ref) != Some(tile) {
                remaining += 1;
            }
        }
    }

    let reach = size - 1;
    let mut stamps = 0;
    while stamps < number && remaining > 0 {
        let center_col = rng.gen_range(area.min_col..area.max_col);
        let center_row = rng.gen_range(area.min_row..area.max_row);
        let min_col = center_col.saturating_sub(reach).max(area.min_col);
        let min_row = center_row.saturating_sub(reach).max(area.min_row);
        let max_col = center_col.saturating_add(reach).min(area.max_col - 1);
        let max_row = center_row.saturating_add(reach).min(area.max_row - 1);
        for col in min_col..=max_col {
            for row in min_row..=max_row {
                if grid.get_tile(col, row)?.map(|placed| placed.tile_ref) != Some(tile) {
                    grid.set_tile(col, row, Some(tile))?;
                    remaining -= 1;
                }
            }
        }
        stamps += 1;
    }
    Ok(stamps)
}
