use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::collision::CollisionResolver;
use crate::context::MapContext;
use crate::generator::{MapGenerator, RuleKind, ShapeRules};
use crate::grid::TileGrid;
use crate::minimap::MinimapColors;
use crate::path::PathCatalog;
use crate::tile::{TileGroupCatalog, TileSheets};

use super::ConfigError;

pub const RESOURCES_ENV_VAR: &str = "TILEMAP_RESOURCES";

pub const SHEETS_FILE: &str = "sheets.xml";
pub const GROUPS_FILE: &str = "groups.xml";
pub const COLLISIONS_FILE: &str = "collisions.xml";
pub const PATHFINDING_FILE: &str = "pathfinding.xml";
pub const MINIMAP_FILE: &str = "minimap.xml";
pub const TRANSITIONS_FILE: &str = "transitions.xml";
pub const CIRCUITS_FILE: &str = "circuits.xml";

#[derive(Debug, Error)]
pub enum ResourcesError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error(
        "resource directory {path} is not usable\n\
A resource directory must contain sheets.xml."
    )]
    InvalidDir { path: PathBuf },
    #[error(
        "no resource directory given\n\
Pass one explicitly or set {env_var}, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/resources\""
    )]
    NotConfigured { env_var: &'static str },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Every descriptor of a resource directory, cross-checked against each
/// other. Only the sheets and groups descriptors are mandatory.
#[derive(Debug, Clone)]
pub struct MapResources {
    pub dir: PathBuf,
    pub sheets: TileSheets,
    pub groups: TileGroupCatalog,
    pub collisions: CollisionResolver,
    pub paths: PathCatalog,
    pub minimap: MinimapColors,
    pub transitions: Option<ShapeRules>,
    pub circuits: Option<ShapeRules>,
}

impl MapResources {
    pub fn load(dir: &Path) -> Result<Self, ResourcesError> {
        if !is_resources_dir(dir) {
            return Err(ResourcesError::InvalidDir {
                path: dir.to_path_buf(),
            });
        }

        let sheets = TileSheets::load(&dir.join(SHEETS_FILE))?;
        let groups = TileGroupCatalog::load(&dir.join(GROUPS_FILE), Some(&sheets))?;
        let collisions = optional(dir, COLLISIONS_FILE, |path| {
            CollisionResolver::load(path, &groups)
        })?
        .unwrap_or_default();
        let paths = optional(dir, PATHFINDING_FILE, |path| PathCatalog::load(path, &groups))?
            .unwrap_or_default();
        let minimap = optional(dir, MINIMAP_FILE, |path| {
            MinimapColors::import(path, Some(&sheets))
        })?
        .unwrap_or_default();
        let transitions = optional(dir, TRANSITIONS_FILE, |path| {
            ShapeRules::load(path, RuleKind::Transition, &groups, Some(&sheets))
        })?;
        let circuits = optional(dir, CIRCUITS_FILE, |path| {
            ShapeRules::load(path, RuleKind::Circuit, &groups, Some(&sheets))
        })?;

        info!(
            dir = %dir.display(),
            sheet_count = sheets.sheets_number(),
            group_count = groups.groups().len(),
            formula_count = collisions.formulas().len(),
            path_categories = paths.len(),
            minimap_tiles = minimap.len(),
            has_transitions = transitions.is_some(),
            has_circuits = circuits.is_some(),
            "map_resources_loaded"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            sheets,
            groups,
            collisions,
            paths,
            minimap,
            transitions,
            circuits,
        })
    }

    pub fn generator(&self) -> MapGenerator<'_> {
        let mut generator = MapGenerator::new(&self.sheets, &self.groups);
        if let Some(transitions) = &self.transitions {
            generator = generator.with_transitions(transitions);
        }
        if let Some(circuits) = &self.circuits {
            generator = generator.with_circuits(circuits);
        }
        generator
    }

    /// Moves the catalogs into the feature registry of a new context.
    pub fn into_context(self, grid: TileGrid) -> MapContext {
        MapContext::new(grid)
            .with_feature(self.groups)
            .with_feature(self.collisions)
            .with_feature(self.paths)
            .with_feature(self.minimap)
    }
}

fn optional<T>(
    dir: &Path,
    file: &str,
    load: impl FnOnce(&Path) -> Result<T, ConfigError>,
) -> Result<Option<T>, ConfigError> {
    let path = dir.join(file);
    if !path.is_file() {
        debug!(path = %path.display(), "optional_descriptor_absent");
        return Ok(None);
    }
    load(&path).map(Some)
}

/// Explicit directory first, then `TILEMAP_RESOURCES`.
pub fn resolve_resources_dir(explicit: Option<&Path>) -> Result<PathBuf, ResourcesError> {
    resolve_from(explicit, env::var(RESOURCES_ENV_VAR))
}

fn resolve_from(
    explicit: Option<&Path>,
    env_value: Result<String, env::VarError>,
) -> Result<PathBuf, ResourcesError> {
    let raw = match (explicit, env_value) {
        (Some(path), _) => path.to_path_buf(),
        (None, Ok(value)) => PathBuf::from(value),
        (None, Err(env::VarError::NotPresent)) => {
            return Err(ResourcesError::NotConfigured {
                env_var: RESOURCES_ENV_VAR,
            })
        }
        (None, Err(source)) => {
            return Err(ResourcesError::EnvVar {
                var: RESOURCES_ENV_VAR,
                source,
            })
        }
    };

    let normalized = normalize_path(&raw);
    if is_resources_dir(&normalized) {
        Ok(normalized)
    } else {
        Err(ResourcesError::InvalidDir { path: normalized })
    }
}

fn is_resources_dir(path: &Path) -> bool {
    path.join(SHEETS_FILE).is_file()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;
    use tempfile::TempDir;

    use super::*;
    use crate::config::ConfigErrorCode;
    use crate::tile::TileRef;

    fn write_minimal(dir: &Path) {
        RgbaImage::new(32, 16)
            .save(dir.join("ground.png"))
            .expect("sheet image");
        fs::write(
            dir.join(SHEETS_FILE),
            r#"<sheets><tileSize width="16" height="16"/><sheet>ground.png</sheet></sheets>"#,
        )
        .expect("sheets");
        fs::write(
            dir.join(GROUPS_FILE),
            r#"<groups>
                <group name="water" type="plain"><tile sheet="0" number="0"/></group>
                <group name="grass" type="plain"><tile sheet="0" number="1"/></group>
            </groups>"#,
        )
        .expect("groups");
    }

    #[test]
    fn load_accepts_missing_optional_descriptors() {
        let temp = TempDir::new().expect("temp");
        write_minimal(temp.path());

        let resources = MapResources::load(temp.path()).expect("load");
        assert_eq!(resources.sheets.sheets_number(), 1);
        assert_eq!(resources.groups.groups().len(), 2);
        assert!(resources.collisions.formulas().is_empty());
        assert!(resources.paths.is_empty());
        assert!(resources.minimap.is_empty());
        assert!(resources.transitions.is_none());
        assert!(resources.circuits.is_none());
    }

    #[test]
    fn optional_descriptors_are_cross_checked_against_groups() {
        let temp = TempDir::new().expect("temp");
        write_minimal(temp.path());
        fs::write(
            temp.path().join(PATHFINDING_FILE),
            r#"<pathfinding><path category="lava" cost="1"/></pathfinding>"#,
        )
        .expect("pathfinding");

        let err = MapResources::load(temp.path()).expect_err("unknown category");
        match err {
            ResourcesError::Config(error) => {
                assert_eq!(error.code, ConfigErrorCode::UnknownGroup);
                assert!(error.file_path.ends_with(PATHFINDING_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_wires_minimap_and_transitions() {
        let temp = TempDir::new().expect("temp");
        write_minimal(temp.path());
        fs::write(
            temp.path().join(MINIMAP_FILE),
            r#"<minimap><color r="0" g="0" b="255"><tile sheet="0" number="0"/></color></minimap>"#,
        )
        .expect("minimap");
        fs::write(
            temp.path().join(TRANSITIONS_FILE),
            r#"<transitions><transition group="water" neighbor="grass" shape="TOP"><tile sheet="0" number="1"/></transition></transitions>"#,
        )
        .expect("transitions");

        let resources = MapResources::load(temp.path()).expect("load");
        assert_eq!(resources.minimap.len(), 1);
        assert_eq!(resources.transitions.as_ref().map(ShapeRules::len), Some(1));

        let grid = TileGrid::create(2, 2, resources.sheets.clone()).expect("grid");
        let context = resources.into_context(grid);
        let minimap = context.feature::<MinimapColors>().expect("minimap feature");
        assert!(minimap.get(TileRef::new(0, 0)).is_some());
        assert!(context.feature::<PathCatalog>().is_ok());
    }

    #[test]
    fn directory_without_sheets_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let err = MapResources::load(temp.path()).expect_err("no sheets");
        assert!(matches!(err, ResourcesError::InvalidDir { .. }));
    }

    #[test]
    fn explicit_dir_wins_over_environment() {
        let temp = TempDir::new().expect("temp");
        write_minimal(temp.path());
        let resolved = resolve_from(
            Some(temp.path()),
            Ok("/definitely/not/a/resource/dir".to_string()),
        )
        .expect("explicit");
        assert_eq!(resolved, normalize_path(temp.path()));
    }

    #[test]
    fn environment_dir_is_validated() {
        let temp = TempDir::new().expect("temp");
        let err = resolve_from(None, Ok(temp.path().display().to_string())).expect_err("empty dir");
        assert!(matches!(err, ResourcesError::InvalidDir { .. }));

        let err = resolve_from(None, Err(env::VarError::NotPresent)).expect_err("unset");
        assert!(matches!(err, ResourcesError::NotConfigured { .. }));
    }
}
