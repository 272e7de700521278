mod astar;
mod graph;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info};

use crate::config::atomic_io::write_text_atomic;
use crate::config::xml::{parse_document, read_config_file, NodeReader, XmlElement};
use crate::config::{ConfigError, ConfigErrorCode};
use crate::tile::TileGroupCatalog;

pub use astar::{
    Chebyshev, Closest, ClosestSquared, Heuristic, Manhattan, PathFinder, PathOutcome, TilePath,
};
pub use graph::{PathGraph, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MovementTile {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl MovementTile {
    pub const ALL: [MovementTile; 8] = [
        MovementTile::Up,
        MovementTile::Down,
        MovementTile::Left,
        MovementTile::Right,
        MovementTile::UpLeft,
        MovementTile::UpRight,
        MovementTile::DownLeft,
        MovementTile::DownRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementTile::Up => "UP",
            MovementTile::Down => "DOWN",
            MovementTile::Left => "LEFT",
            MovementTile::Right => "RIGHT",
            MovementTile::UpLeft => "UP_LEFT",
            MovementTile::UpRight => "UP_RIGHT",
            MovementTile::DownLeft => "DOWN_LEFT",
            MovementTile::DownRight => "DOWN_RIGHT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|movement| movement.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Cell offset with rows growing upward.
    pub fn offset(self) -> (i64, i64) {
        match self {
            MovementTile::Up => (0, 1),
            MovementTile::Down => (0, -1),
            MovementTile::Left => (-1, 0),
            MovementTile::Right => (1, 0),
            MovementTile::UpLeft => (-1, 1),
            MovementTile::UpRight => (1, 1),
            MovementTile::DownLeft => (-1, -1),
            MovementTile::DownRight => (1, -1),
        }
    }

    pub fn is_diagonal(self) -> bool {
        let (dcol, drow) = self.offset();
        dcol != 0 && drow != 0
    }
}

/// Movement rules shared by every tile of a category (a tile group name).
#[derive(Debug, Clone, PartialEq)]
pub struct PathData {
    pub category: String,
    pub cost: f64,
    pub blocking: bool,
    /// Directions allowed when entering a tile of this category.
    pub movements: BTreeSet<MovementTile>,
}

impl PathData {
    pub fn new(
        category: &str,
        cost: f64,
        blocking: bool,
        movements: impl IntoIterator<Item = MovementTile>,
    ) -> Self {
        Self {
            category: category.to_string(),
            cost,
            blocking,
            movements: movements.into_iter().collect(),
        }
    }

    /// Non-blocking category reachable from every direction.
    pub fn open(category: &str, cost: f64) -> Self {
        Self::new(category, cost, false, MovementTile::ALL)
    }

    pub fn allows(&self, movement: MovementTile) -> bool {
        !self.blocking && self.movements.contains(&movement)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathCatalog {
    categories: BTreeMap<String, PathData>,
}

impl PathCatalog {
    pub fn new(categories: impl IntoIterator<Item = PathData>) -> Self {
        Self {
            categories: categories
                .into_iter()
                .map(|data| (data.category.clone(), data))
                .collect(),
        }
    }

    /// Reads a pathfinding descriptor:
    ///
    /// ```xml
    /// <pathfinding>
    ///     <path category="ground" cost="1" block="false">
    ///         <movement>UP</movement>
    ///     </path>
    /// </pathfinding>
    /// ```
    pub fn load(path: &Path, groups: &TileGroupCatalog) -> Result<Self, ConfigError> {
        let raw = read_config_file(path)?;
        let doc = parse_document(path, &raw)?;
        let reader = NodeReader::new(path, &doc);
        let root = reader.expect_root("pathfinding")?;

        let mut categories = Vec::new();
        for node in reader.children(root, "path") {
            let category = reader.required_attr(node, "category")?.trim().to_string();
            if categories.iter().any(|data: &PathData| data.category == category) {
                return Err(reader.error_at(
                    ConfigErrorCode::DuplicateGroup,
                    format!("path category '{category}' is declared more than once"),
                    node,
                ));
            }
            if !groups.contains(&category) {
                return Err(reader.error_at(
                    ConfigErrorCode::UnknownGroup,
                    format!("path category '{category}' is not a known tile group"),
                    node,
                ));
            }
            let cost: f64 = reader.parse_optional_attr(node, "cost")?.unwrap_or(0.0);
            if !cost.is_finite() || cost < 0.0 {
                return Err(reader.error_at(
                    ConfigErrorCode::InvalidValue,
                    format!("path cost {cost} of '{category}' must be finite and positive"),
                    node,
                ));
            }
            let blocking = match node.attribute("block") {
                Some(_) => reader.parse_bool_attr(node, "block")?,
                None => false,
            };

            let mut movements = BTreeSet::new();
            for movement in reader.children(node, "movement") {
                let name = reader.required_text(movement, "movement")?;
                let parsed = MovementTile::from_name(&name).ok_or_else(|| {
                    reader.error_at(
                        ConfigErrorCode::InvalidValue,
                        format!("unknown movement '{name}' in path '{category}'"),
                        movement,
                    )
                })?;
                movements.insert(parsed);
            }
            categories.push(PathData {
                category,
                cost,
                blocking,
                movements,
            });
        }

        debug!(path = %path.display(), category_count = categories.len(), "path_catalog_loaded");
        Ok(Self::new(categories))
    }

    pub fn export(&self, path: &Path) -> Result<(), ConfigError> {
        let mut root = XmlElement::new("pathfinding");
        for data in self.categories.values() {
            let mut node = XmlElement::new("path")
                .attr("category", &data.category)
                .attr("cost", data.cost)
                .attr("block", data.blocking);
            for movement in &data.movements {
                node.push(XmlElement::new("movement").text(movement.as_str()));
            }
            root.push(node);
        }
        write_text_atomic(path, &root.to_document()).map_err(|error| {
            ConfigError::new(
                ConfigErrorCode::Write,
                format!("failed to write pathfinding descriptor: {error}"),
                path,
            )
        })?;
        info!(path = %path.display(), categories = self.categories.len(), "path_catalog_exported");
        Ok(())
    }

    pub fn get(&self, category: &str) -> Option<&PathData> {
        self.categories.get(category)
    }

    pub fn insert(&mut self, data: PathData) {
        self.categories.insert(data.category.clone(), data);
    }

    pub fn categories(&self) -> impl Iterator<Item = &PathData> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
