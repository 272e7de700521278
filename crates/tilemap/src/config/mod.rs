pub(crate) mod atomic_io;
mod resources;
pub(crate) mod xml;

pub use resources::{
    resolve_resources_dir, MapResources, ResourcesError, CIRCUITS_FILE, COLLISIONS_FILE,
    GROUPS_FILE, MINIMAP_FILE, PATHFINDING_FILE, RESOURCES_ENV_VAR, SHEETS_FILE,
    TRANSITIONS_FILE,
};
pub use xml::{ConfigError, ConfigErrorCode, SourceLocation};
