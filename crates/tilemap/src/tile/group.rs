use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::config::xml::{parse_document, read_config_file, NodeReader};
use crate::config::{ConfigError, ConfigErrorCode};

use super::{TileRef, TileSheets};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TileGroupType {
    #[default]
    None,
    Plain,
    Transition,
    Circuit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tile group type '{0}'; allowed values: NONE, PLAIN, TRANSITION, CIRCUIT")]
pub struct UnknownGroupType(pub String);

impl TileGroupType {
    pub const ALL: [TileGroupType; 4] = [
        TileGroupType::None,
        TileGroupType::Plain,
        TileGroupType::Transition,
        TileGroupType::Circuit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TileGroupType::None => "NONE",
            TileGroupType::Plain => "PLAIN",
            TileGroupType::Transition => "TRANSITION",
            TileGroupType::Circuit => "CIRCUIT",
        }
    }

    /// Case-insensitive parse of the canonical names.
    pub fn from_name(name: &str) -> Result<Self, UnknownGroupType> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| UnknownGroupType(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGroup {
    pub name: String,
    pub group_type: TileGroupType,
    pub tiles: BTreeSet<TileRef>,
}

impl TileGroup {
    pub fn new(
        name: &str,
        group_type: TileGroupType,
        tiles: impl IntoIterator<Item = TileRef>,
    ) -> Self {
        Self {
            name: name.to_string(),
            group_type,
            tiles: tiles.into_iter().collect(),
        }
    }

    pub fn contains(&self, tile: TileRef) -> bool {
        self.tiles.contains(&tile)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("group '{0}' is declared more than once")]
    DuplicateGroup(String),
    #[error("tile {tile} belongs to both '{first}' and '{second}'")]
    DuplicateTile {
        tile: TileRef,
        first: String,
        second: String,
    },
}

/// Read-only mapping between tiles and named groups.
#[derive(Debug, Clone, Default)]
pub struct TileGroupCatalog {
    groups: Vec<TileGroup>,
    by_name: HashMap<String, usize>,
    by_tile: HashMap<TileRef, usize>,
}

impl TileGroupCatalog {
    pub fn new(groups: Vec<TileGroup>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(groups.len());
        let mut by_tile = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            if by_name.insert(group.name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateGroup(group.name.clone()));
            }
            for tile in &group.tiles {
                if let Some(previous) = by_tile.insert(*tile, index) {
                    return Err(CatalogError::DuplicateTile {
                        tile: *tile,
                        first: groups[previous].name.clone(),
                        second: group.name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            groups,
            by_name,
            by_tile,
        })
    }

    /// Reads a groups descriptor. Tiles are listed one by one or as an
    /// inclusive number range:
    ///
    /// ```xml
    /// <groups>
    ///     <group name="water" type="PLAIN">
    ///         <tile sheet="0" number="3"/>
    ///         <tiles sheet="0" start="4" end="7"/>
    ///     </group>
    /// </groups>
    /// ```
    ///
    /// When `sheets` is given every referenced tile must exist in them.
    pub fn load(path: &Path, sheets: Option<&TileSheets>) -> Result<Self, ConfigError> {
        let raw = read_config_file(path)?;
        let doc = parse_document(path, &raw)?;
        let reader = NodeReader::new(path, &doc);
        let root = reader.expect_root("groups")?;

        let mut groups = Vec::<TileGroup>::new();
        let mut owners = HashMap::<TileRef, String>::new();
        for node in reader.children(root, "group") {
            let name = reader.required_attr(node, "name")?.trim().to_string();
            if groups.iter().any(|group| group.name == name) {
                return Err(reader.error_at(
                    ConfigErrorCode::DuplicateGroup,
                    format!("group '{name}' is declared more than once"),
                    node,
                ));
            }
            let group_type = match node.attribute("type") {
                Some(raw_type) => TileGroupType::from_name(raw_type).map_err(|error| {
                    reader.error_at(ConfigErrorCode::InvalidValue, error.to_string(), node)
                })?,
                None => TileGroupType::None,
            };

            let mut tiles = BTreeSet::new();
            for child in node.children().filter(|child| child.is_element()) {
                let refs = match child.tag_name().name() {
                    "tile" => vec![reader.tile_ref(child)?],
                    "tiles" => {
                        let sheet: u32 = reader.parse_attr(child, "sheet")?;
                        let start: u32 = reader.parse_attr(child, "start")?;
                        let end: u32 = reader.parse_attr(child, "end")?;
                        if start > end {
                            return Err(reader.error_at(
                                ConfigErrorCode::InvalidTileRange,
                                format!("tile range {start}..={end} of group '{name}' is empty"),
                                child,
                            ));
                        }
                        (start..=end).map(|number| TileRef::new(sheet, number)).collect()
                    }
                    _ => continue,
                };
                for tile in refs {
                    if let Some(sheets) = sheets {
                        if !sheets.contains(tile) {
                            return Err(reader.error_at(
                                ConfigErrorCode::InvalidTileRange,
                                format!("group '{name}' references unknown tile {tile}"),
                                child,
                            ));
                        }
                    }
                    if let Some(first) = owners.get(&tile) {
                        if first != &name {
                            return Err(reader.error_at(
                                ConfigErrorCode::DuplicateTile,
                                format!("tile {tile} belongs to both '{first}' and '{name}'"),
                                child,
                            ));
                        }
                    }
                    owners.insert(tile, name.clone());
                    tiles.insert(tile);
                }
            }

            groups.push(TileGroup {
                name,
                group_type,
                tiles,
            });
        }

        debug!(path = %path.display(), group_count = groups.len(), "tile_groups_loaded");
        Self::new(groups).map_err(|error| {
            ConfigError::new(ConfigErrorCode::DuplicateTile, error.to_string(), path)
        })
    }

    pub fn groups(&self) -> &[TileGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&TileGroup> {
        self.by_name.get(name).map(|index| &self.groups[*index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn group_of(&self, tile: TileRef) -> Option<&TileGroup> {
        self.by_tile.get(&tile).map(|index| &self.groups[*index])
    }

    pub fn group_name_of(&self, tile: TileRef) -> Option<&str> {
        self.group_of(tile).map(|group| group.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::tile::test_support::sheets_16;

    fn write_groups(temp: &TempDir, content: &str) -> std::path::PathBuf {
        let path = temp.path().join("groups.xml");
        fs::write(&path, content).expect("write");
        path
    }

    #[test]
    fn group_type_round_trips_through_its_name() {
        for kind in TileGroupType::ALL {
            assert_eq!(TileGroupType::from_name(kind.as_str()), Ok(kind));
        }
        assert_eq!(TileGroupType::from_name("plain"), Ok(TileGroupType::Plain));
    }

    #[test]
    fn group_type_rejects_unknown_name() {
        let err = TileGroupType::from_name("null").expect_err("err");
        assert_eq!(err, UnknownGroupType("null".to_string()));
    }

    #[test]
    fn load_resolves_single_tiles_and_ranges() {
        let temp = TempDir::new().expect("temp");
        let path = write_groups(
            &temp,
            r#"<groups>
                <group name="water" type="PLAIN"><tile sheet="0" number="3"/><tiles sheet="0" start="4" end="6"/></group>
                <group name="shore" type="transition"><tile sheet="0" number="9"/></group>
                <group name="misc"><tile sheet="0" number="10"/></group>
            </groups>"#,
        );
        let catalog = TileGroupCatalog::load(&path, Some(&sheets_16(16))).expect("load");
        assert_eq!(catalog.groups().len(), 3);
        assert_eq!(catalog.group_name_of(TileRef::new(0, 5)), Some("water"));
        assert_eq!(
            catalog.group("shore").map(|group| group.group_type),
            Some(TileGroupType::Transition)
        );
        assert_eq!(
            catalog.group("misc").map(|group| group.group_type),
            Some(TileGroupType::None)
        );
        assert!(catalog.group_of(TileRef::new(0, 11)).is_none());
    }

    #[test]
    fn reversed_range_is_invalid_tile_range() {
        let temp = TempDir::new().expect("temp");
        let path = write_groups(
            &temp,
            r#"<groups><group name="water"><tiles sheet="0" start="6" end="4"/></group></groups>"#,
        );
        let err = TileGroupCatalog::load(&path, None).expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::InvalidTileRange);
    }

    #[test]
    fn tile_outside_loaded_sheets_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let path = write_groups(
            &temp,
            r#"<groups><group name="water"><tile sheet="2" number="0"/></group></groups>"#,
        );
        let err = TileGroupCatalog::load(&path, Some(&sheets_16(4))).expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::InvalidTileRange);
        assert!(err.message.contains("2:0"));
    }

    #[test]
    fn duplicate_group_and_shared_tile_are_rejected() {
        let temp = TempDir::new().expect("temp");
        let path = write_groups(
            &temp,
            r#"<groups><group name="a"/><group name="a"/></groups>"#,
        );
        let err = TileGroupCatalog::load(&path, None).expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::DuplicateGroup);

        let path = write_groups(
            &temp,
            r#"<groups>
                <group name="a"><tile sheet="0" number="1"/></group>
                <group name="b"><tile sheet="0" number="1"/></group>
            </groups>"#,
        );
        let err = TileGroupCatalog::load(&path, None).expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::DuplicateTile);
    }

    #[test]
    fn invalid_group_type_is_invalid_value() {
        let temp = TempDir::new().expect("temp");
        let path = write_groups(&temp, r#"<groups><group name="a" type="lava"/></groups>"#);
        let err = TileGroupCatalog::load(&path, None).expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::InvalidValue);
    }
}
