use std::borrow::Cow;

use crate::context::Pathable;
use crate::grid::TileGrid;
use crate::tile::TileGroupCatalog;

use super::{MovementTile, PathCatalog, PathData};

const ORTHOGONAL: [MovementTile; 4] = [
    MovementTile::Up,
    MovementTile::Right,
    MovementTile::Down,
    MovementTile::Left,
];

const DIAGONAL: [MovementTile; 4] = [
    MovementTile::UpRight,
    MovementTile::DownRight,
    MovementTile::DownLeft,
    MovementTile::UpLeft,
];

/// One legal move out of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub col: u32,
    pub row: u32,
    pub movement: MovementTile,
    pub cost: f64,
}

/// Adjacency over a grid, derived from the path category of each tile.
///
/// Empty cells, tiles without a group and groups without path data are
/// blocked. Entering a cell requires its category to be non-blocking and to
/// allow the movement direction; the step costs the destination category cost.
pub struct PathGraph<'a> {
    grid: &'a TileGrid,
    groups: &'a TileGroupCatalog,
    catalog: &'a PathCatalog,
    diagonals: bool,
    pathable: Option<&'a dyn Pathable>,
}

impl<'a> PathGraph<'a> {
    pub fn new(grid: &'a TileGrid, groups: &'a TileGroupCatalog, catalog: &'a PathCatalog) -> Self {
        Self {
            grid,
            groups,
            catalog,
            diagonals: false,
            pathable: None,
        }
    }

    /// Enables the four diagonal moves; corners are never cut.
    pub fn with_diagonals(mut self, diagonals: bool) -> Self {
        self.diagonals = diagonals;
        self
    }

    pub fn with_pathable(mut self, pathable: &'a dyn Pathable) -> Self {
        self.pathable = Some(pathable);
        self
    }

    pub fn grid(&self) -> &TileGrid {
        self.grid
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn path_data(&self, col: i64, row: i64) -> Option<Cow<'a, PathData>> {
        let tile = self.grid.tile(col, row)?;
        let category = self.groups.group_name_of(tile.tile_ref)?;
        if let Some(data) = self.pathable.and_then(|pathable| pathable.path_override(category)) {
            return Some(Cow::Owned(data));
        }
        self.catalog.get(category).map(Cow::Borrowed)
    }

    pub fn is_blocked(&self, col: i64, row: i64) -> bool {
        self.path_data(col, row).map_or(true, |data| data.blocking)
    }

    /// Legal moves out of `(col,row)` in a fixed order: orthogonal moves
    /// clockwise from up, then diagonals clockwise from up-right.
    pub fn neighbours(&self, col: u32, row: u32) -> Vec<Step> {
        let mut steps = Vec::with_capacity(8);
        let diagonals: &[MovementTile] = if self.diagonals { &DIAGONAL } else { &[] };
        for movement in ORTHOGONAL.iter().chain(diagonals) {
            let (dcol, drow) = movement.offset();
            let (to_col, to_row) = (col as i64 + dcol, row as i64 + drow);
            let Some(data) = self.path_data(to_col, to_row) else {
                continue;
            };
            if !data.allows(*movement) {
                continue;
            }
            if movement.is_diagonal()
                && (self.is_blocked(col as i64 + dcol, row as i64)
                    || self.is_blocked(col as i64, row as i64 + drow))
            {
                continue;
            }
            steps.push(Step {
                col: to_col as u32,
                row: to_row as u32,
                movement: *movement,
                cost: data.cost,
            });
        }
        steps
    }
}
