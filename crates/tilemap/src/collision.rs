use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, trace};

use crate::config::xml::{parse_document, read_config_file, NodeReader};
use crate::config::{ConfigError, ConfigErrorCode};
use crate::context::Collidable;
use crate::grid::TileGrid;
use crate::tile::{Tile, TileGroupCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "X" | "x" => Some(Axis::X),
            "Y" | "y" => Some(Axis::Y),
            _ => None,
        }
    }
}

/// `output = value * input + offset`, valid while `input` lies in `[min,max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionFunction {
    pub output: Axis,
    pub input: Axis,
    pub value: f64,
    pub offset: f64,
    pub min: f64,
    pub max: f64,
}

impl CollisionFunction {
    pub fn accepts(&self, input: f64) -> bool {
        input >= self.min && input <= self.max
    }

    pub fn compute(&self, input: f64) -> f64 {
        (self.value * input + self.offset).clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionFormula {
    pub name: String,
    pub group: String,
    pub functions: Vec<CollisionFunction>,
}

/// Surface offsets inside a tile, per output axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionResult {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl CollisionResult {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none()
    }
}

/// First tile along a movement where the entity reaches the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub tile: Tile,
    pub result: CollisionResult,
    /// Pixel position snapped onto the surface on every touched axis.
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionResolver {
    formulas: Vec<CollisionFormula>,
    by_group: HashMap<String, Vec<usize>>,
}

impl CollisionResolver {
    pub fn new(formulas: Vec<CollisionFormula>) -> Self {
        let mut by_group = HashMap::<String, Vec<usize>>::new();
        for (index, formula) in formulas.iter().enumerate() {
            by_group
                .entry(formula.group.clone())
                .or_default()
                .push(index);
        }
        Self { formulas, by_group }
    }

    /// Reads a collisions descriptor:
    ///
    /// ```xml
    /// <collisions>
    ///     <formula name="slope" group="slope">
    ///         <function axis="Y" input="X" value="0.5" offset="0" min="0" max="15"/>
    ///     </formula>
    /// </collisions>
    /// ```
    pub fn load(path: &Path, groups: &TileGroupCatalog) -> Result<Self, ConfigError> {
        let raw = read_config_file(path)?;
        let doc = parse_document(path, &raw)?;
        let reader = NodeReader::new(path, &doc);
        let root = reader.expect_root("collisions")?;

        let mut formulas = Vec::new();
        for node in reader.children(root, "formula") {
            let name = reader.required_attr(node, "name")?.trim().to_string();
            let group = reader.required_attr(node, "group")?.trim().to_string();
            if !groups.contains(&group) {
                return Err(reader.error_at(
                    ConfigErrorCode::UnknownGroup,
                    format!("formula '{name}' references unknown group '{group}'"),
                    node,
                ));
            }

            let mut functions = Vec::new();
            for function in reader.children(node, "function") {
                let output = parse_axis(&reader, function, "axis")?;
                let input = parse_axis(&reader, function, "input")?;
                let value: f64 = reader.parse_attr(function, "value")?;
                let offset: f64 = reader
                    .parse_optional_attr(function, "offset")?
                    .unwrap_or(0.0);
                let min: f64 = reader.parse_attr(function, "min")?;
                let max: f64 = reader.parse_attr(function, "max")?;
                if !(min <= max) {
                    return Err(reader.error_at(
                        ConfigErrorCode::InvalidValue,
                        format!("function range [{min},{max}] of formula '{name}' is empty"),
                        function,
                    ));
                }
                functions.push(CollisionFunction {
                    output,
                    input,
                    value,
                    offset,
                    min,
                    max,
                });
            }
            formulas.push(CollisionFormula {
                name,
                group,
                functions,
            });
        }

        debug!(path = %path.display(), formula_count = formulas.len(), "collisions_loaded");
        Ok(Self::new(formulas))
    }

    pub fn formulas(&self) -> &[CollisionFormula] {
        &self.formulas
    }

    pub fn formulas_for<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a CollisionFormula> {
        self.by_group
            .get(group)
            .into_iter()
            .flatten()
            .map(|index| &self.formulas[*index])
    }

    /// Applies the group's functions to a tile-local position.
    ///
    /// For each output axis the first function, in declaration order, whose
    /// range holds its input wins. Later overlapping functions are ignored.
    pub fn resolve(&self, group: &str, local_x: f64, local_y: f64) -> CollisionResult {
        let mut result = CollisionResult::default();
        for function in self.formulas_for(group).flat_map(|formula| &formula.functions) {
            let input = match function.input {
                Axis::X => local_x,
                Axis::Y => local_y,
            };
            if !function.accepts(input) {
                continue;
            }
            let slot = match function.output {
                Axis::X => &mut result.x,
                Axis::Y => &mut result.y,
            };
            if slot.is_none() {
                *slot = Some(function.compute(input));
            }
        }
        result
    }

    /// Resolves a pixel position against one tile of the grid.
    pub fn resolve_tile(
        &self,
        grid: &TileGrid,
        groups: &TileGroupCatalog,
        tile: &Tile,
        x: f64,
        y: f64,
    ) -> CollisionResult {
        let Some(group) = groups.group_name_of(tile.tile_ref) else {
            return CollisionResult::default();
        };
        let bounds = grid.tile_bounds(tile);
        self.resolve(group, x - bounds.x as f64, y - bounds.y as f64)
    }

    /// Walks the tiles crossed since the previous position and returns the
    /// first one whose surface the entity reached.
    pub fn first_contact(
        &self,
        grid: &TileGrid,
        groups: &TileGroupCatalog,
        collidable: &dyn Collidable,
    ) -> Option<Contact> {
        let (ox, oy) = collidable.old_position();
        let (x, y) = collidable.position();
        for tile in grid.get_tiles_hit(ox, oy, x, y) {
            let result = self.resolve_tile(grid, groups, &tile, x, y);
            if result.is_empty() {
                continue;
            }
            let bounds = grid.tile_bounds(&tile);
            let (tile_x, tile_y) = (bounds.x as f64, bounds.y as f64);
            let touch_x = result.x.filter(|surface| x - tile_x <= *surface);
            let touch_y = result.y.filter(|surface| y - tile_y <= *surface);
            if touch_x.is_none() && touch_y.is_none() {
                continue;
            }
            trace!(col = tile.col, row = tile.row, "collision_contact");
            return Some(Contact {
                tile,
                result,
                x: touch_x.map_or(x, |surface| tile_x + surface),
                y: touch_y.map_or(y, |surface| tile_y + surface),
            });
        }
        None
    }
}

fn parse_axis<'input>(
    reader: &NodeReader<'_, 'input>,
    node: roxmltree::Node<'_, 'input>,
    name: &str,
) -> Result<Axis, ConfigError> {
    let raw = reader.required_attr(node, name)?;
    Axis::from_name(raw).ok_or_else(|| {
        reader.error_at(
            ConfigErrorCode::InvalidValue,
            format!("attribute '{name}' value '{raw}' is not an axis (X or Y)"),
            node,
        )
    })
}
