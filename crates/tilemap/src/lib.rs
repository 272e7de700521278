pub mod collision;
pub mod config;
pub mod context;
pub mod fog;
pub mod generator;
pub mod grid;
pub mod minimap;
pub mod path;
pub mod tile;

pub use collision::{
    Axis, CollisionFormula, CollisionFunction, CollisionResolver, CollisionResult, Contact,
};
pub use config::{
    resolve_resources_dir, ConfigError, ConfigErrorCode, MapResources, ResourcesError,
    SourceLocation, RESOURCES_ENV_VAR,
};
pub use context::{
    Collidable, FeatureError, FeatureRegistry, Fovable, MapContext, Pathable, TileFootprint,
    Tiled, ViewBounds,
};
pub use fog::{Border20, FogCell, VisibilityField};
pub use generator::{
    GeneratedMap, GeneratorError, GeneratorParameter, MapGenerator, Preference, ReconcileReport,
    RuleKind, ShapeRules, TileArea,
};
pub use grid::{
    LevelData, LevelFileError, LevelRipError, LevelRipReport, TileBounds, TileGrid, TileGridError,
};
pub use minimap::{minimap_image, MinimapColors};
pub use path::{
    Chebyshev, Closest, ClosestSquared, Heuristic, Manhattan, MovementTile, PathCatalog, PathData,
    PathFinder, PathGraph, PathOutcome, Step, TilePath,
};
pub use tile::{
    SheetInfo, Tile, TileGroup, TileGroupCatalog, TileGroupType, TileRef, TileSheets,
};
