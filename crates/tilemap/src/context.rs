use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use thiserror::Error;

use crate::collision::{CollisionResolver, Contact};
use crate::grid::TileGrid;
use crate::path::{PathCatalog, PathData, PathGraph};
use crate::tile::TileGroupCatalog;

/// Rectangle of cells an entity covers, `(col,row)` being its bottom-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileFootprint {
    pub col: i64,
    pub row: i64,
    pub width: u32,
    pub height: u32,
}

impl TileFootprint {
    pub const fn single(col: i64, row: i64) -> Self {
        Self {
            col,
            row,
            width: 1,
            height: 1,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (0..self.width as i64).flat_map(move |dx| {
            (0..self.height as i64).map(move |dy| (self.col + dx, self.row + dy))
        })
    }

    /// Axis distances from a cell to the nearest footprint cell.
    pub(crate) fn distance_to(&self, col: i64, row: i64) -> (i64, i64) {
        let axis = |value: i64, start: i64, size: u32| {
            let end = start.saturating_add(size as i64 - 1);
            if value < start {
                start.saturating_sub(value)
            } else if value > end {
                value.saturating_sub(end)
            } else {
                0
            }
        };
        (
            axis(col, self.col, self.width),
            axis(row, self.row, self.height),
        )
    }
}

/// Anything placed on the grid.
pub trait Tiled {
    fn footprint(&self) -> TileFootprint;
}

/// Entity revealing the map around itself.
pub trait Fovable: Tiled {
    fn fov_radius(&self) -> u32;

    /// Owner used by the fog player filter; `None` is seen by every filter.
    fn player_id(&self) -> Option<u32> {
        None
    }
}

/// Entity moving over the path graph.
pub trait Pathable {
    /// Replaces the catalog rules of a category for this entity only.
    fn path_override(&self, _category: &str) -> Option<PathData> {
        None
    }
}

/// Entity resolved against collision formulas between two positions.
pub trait Collidable {
    fn old_position(&self) -> (f64, f64);
    fn position(&self) -> (f64, f64);
}

/// Camera window in map pixels, `y` measured upward.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive tile window `(min_col, min_row, max_col, max_row)` covered by the view.
    pub fn tile_window(&self, grid: &TileGrid) -> (i64, i64, i64, i64) {
        (
            grid.in_tile_x(self.x),
            grid.in_tile_y(self.y),
            grid.in_tile_x(self.x + self.width),
            grid.in_tile_y(self.y + self.height),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("map feature {0} is not registered")]
    Missing(&'static str),
}

/// Typed store of the catalogs and services a map was built with.
#[derive(Default)]
pub struct FeatureRegistry {
    features: HashMap<TypeId, Box<dyn Any>>,
}

impl FeatureRegistry {
    /// Returns the previous feature of the same type, if any.
    pub fn insert<T: Any>(&mut self, feature: T) -> Option<T> {
        self.features
            .insert(TypeId::of::<T>(), Box::new(feature))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.features
            .get(&TypeId::of::<T>())
            .and_then(|feature| feature.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.features
            .get_mut(&TypeId::of::<T>())
            .and_then(|feature| feature.downcast_mut::<T>())
    }

    pub fn require<T: Any>(&self) -> Result<&T, FeatureError> {
        self.get::<T>()
            .ok_or(FeatureError::Missing(type_name::<T>()))
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.features.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("len", &self.features.len())
            .finish()
    }
}

/// Map state handed to the components instead of process-wide singletons.
#[derive(Debug)]
pub struct MapContext {
    grid: TileGrid,
    view: ViewBounds,
    features: FeatureRegistry,
}

impl MapContext {
    pub fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            view: ViewBounds::default(),
            features: FeatureRegistry::default(),
        }
    }

    pub fn with_feature<T: Any>(mut self, feature: T) -> Self {
        self.features.insert(feature);
        self
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TileGrid {
        &mut self.grid
    }

    pub fn view(&self) -> ViewBounds {
        self.view
    }

    pub fn set_view(&mut self, view: ViewBounds) {
        self.view = view;
    }

    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut FeatureRegistry {
        &mut self.features
    }

    pub fn feature<T: Any>(&self) -> Result<&T, FeatureError> {
        self.features.require::<T>()
    }

    /// Graph over the context grid using the registered group and path catalogs.
    pub fn path_graph(&self) -> Result<PathGraph<'_>, FeatureError> {
        let groups = self.feature::<TileGroupCatalog>()?;
        let catalog = self.feature::<PathCatalog>()?;
        Ok(PathGraph::new(&self.grid, groups, catalog))
    }

    pub fn first_contact(&self, collidable: &dyn Collidable) -> Result<Option<Contact>, FeatureError> {
        let resolver = self.feature::<CollisionResolver>()?;
        let groups = self.feature::<TileGroupCatalog>()?;
        Ok(resolver.first_contact(&self.grid, groups, collidable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::test_support::sheets_16;
    use crate::tile::{TileGroupCatalog, TileRef};

    #[test]
    fn registry_is_keyed_by_type() {
        let mut registry = FeatureRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.insert(7u32), None);
        assert_eq!(registry.insert(9u32), Some(7));
        registry.insert("label");
        assert_eq!(registry.get::<u32>(), Some(&9));
        assert_eq!(registry.get::<&str>(), Some(&"label"));
        assert_eq!(registry.len(), 2);
        *registry.get_mut::<u32>().expect("u32") += 1;
        assert_eq!(registry.require::<u32>(), Ok(&10));
    }

    #[test]
    fn missing_feature_names_the_type() {
        let registry = FeatureRegistry::default();
        let err = registry.require::<TileGroupCatalog>().expect_err("missing");
        assert!(err.to_string().contains("TileGroupCatalog"));
    }

    #[test]
    fn context_exposes_grid_view_and_features() {
        let grid = TileGrid::create(4, 4, sheets_16(4)).expect("grid");
        let mut context = MapContext::new(grid).with_feature(TileGroupCatalog::default());
        context
            .grid_mut()
            .set_tile(1, 1, Some(TileRef::new(0, 0)))
            .expect("set");
        context.set_view(ViewBounds::new(0.0, 0.0, 32.0, 16.0));
        assert_eq!(context.grid().tiles_number(), 1);
        assert_eq!(context.view().tile_window(context.grid()), (0, 0, 2, 1));
        assert!(context.feature::<TileGroupCatalog>().is_ok());
    }

    #[test]
    fn services_read_their_catalogs_from_the_registry() {
        use crate::collision::{Axis, CollisionFormula, CollisionFunction};
        use crate::path::MovementTile;
        use crate::tile::{TileGroup, TileGroupType};

        struct Falling;

        impl Collidable for Falling {
            fn old_position(&self) -> (f64, f64) {
                (8.0, 40.0)
            }

            fn position(&self) -> (f64, f64) {
                (8.0, 4.0)
            }
        }

        let floor = TileRef::new(0, 1);
        let mut grid = TileGrid::create(2, 3, sheets_16(4)).expect("grid");
        grid.set_tile(0, 0, Some(floor)).expect("set");
        grid.set_tile(1, 0, Some(floor)).expect("set");
        let groups = TileGroupCatalog::new(vec![TileGroup::new(
            "floor",
            TileGroupType::Plain,
            [floor],
        )])
        .expect("groups");

        let bare = MapContext::new(grid.clone()).with_feature(groups.clone());
        assert!(matches!(bare.path_graph(), Err(FeatureError::Missing(_))));
        assert!(bare.first_contact(&Falling).is_err());

        let context = MapContext::new(grid)
            .with_feature(groups)
            .with_feature(PathCatalog::new([PathData::new(
                "floor",
                2.0,
                false,
                MovementTile::ALL,
            )]))
            .with_feature(CollisionResolver::new(vec![CollisionFormula {
                name: "floor".to_string(),
                group: "floor".to_string(),
                functions: vec![CollisionFunction {
                    output: Axis::Y,
                    input: Axis::X,
                    value: 0.0,
                    offset: 15.0,
                    min: 0.0,
                    max: 15.0,
                }],
            }]));
        let graph = context.path_graph().expect("graph");
        let steps = graph.neighbours(0, 0);
        assert_eq!(steps.len(), 1);
        assert_eq!((steps[0].col, steps[0].row, steps[0].cost), (1, 0, 2.0));

        let contact = context
            .first_contact(&Falling)
            .expect("features")
            .expect("contact");
        assert_eq!((contact.tile.col, contact.tile.row), (0, 0));
        assert_eq!(contact.y, 15.0);
    }

    #[test]
    fn footprint_distance_is_zero_inside() {
        let footprint = TileFootprint {
            col: 2,
            row: 2,
            width: 2,
            height: 3,
        };
        assert_eq!(footprint.cells().count(), 6);
        assert_eq!(footprint.distance_to(3, 4), (0, 0));
        assert_eq!(footprint.distance_to(0, 6), (2, 2));
        assert_eq!(footprint.distance_to(5, 1), (2, 1));
    }
}
