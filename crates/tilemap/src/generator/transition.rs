use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::xml::{parse_document, read_config_file, NodeReader};
use crate::config::{ConfigError, ConfigErrorCode};
use crate::fog::{compute_border_state, mask, neighbour_mask, Border20};
use crate::grid::TileGrid;
use crate::tile::{TileGroupCatalog, TileGroupType, TileRef, TileSheets};

/// Descriptor family a rule set is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Transition,
    Circuit,
}

impl RuleKind {
    fn root(self) -> &'static str {
        match self {
            RuleKind::Transition => "transitions",
            RuleKind::Circuit => "circuits",
        }
    }

    fn element(self) -> &'static str {
        match self {
            RuleKind::Transition => "transition",
            RuleKind::Circuit => "circuit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RuleKey {
    group: String,
    neighbour: String,
    shape: Border20,
}

/// `(group, neighbour group, shape) -> tiles` lookup for transitions or circuits.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRules {
    kind: RuleKind,
    rules: BTreeMap<RuleKey, Vec<TileRef>>,
}

impl ShapeRules {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            rules: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn insert(&mut self, group: &str, neighbour: &str, shape: Border20, tiles: Vec<TileRef>) {
        self.rules.insert(
            RuleKey {
                group: group.to_string(),
                neighbour: neighbour.to_string(),
                shape,
            },
            tiles,
        );
    }

    pub fn get(&self, group: &str, neighbour: &str, shape: Border20) -> Option<&[TileRef]> {
        self.rules
            .get(&RuleKey {
                group: group.to_string(),
                neighbour: neighbour.to_string(),
                shape,
            })
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Reads `<transitions><transition group neighbor shape><tile/>..` or the
    /// `<circuits><circuit ..>` equivalent.
    pub fn load(
        path: &Path,
        kind: RuleKind,
        groups: &TileGroupCatalog,
        sheets: Option<&TileSheets>,
    ) -> Result<Self, ConfigError> {
        let raw = read_config_file(path)?;
        let doc = parse_document(path, &raw)?;
        let reader = NodeReader::new(path, &doc);
        let root = reader.expect_root(kind.root())?;

        let mut rules = Self::new(kind);
        for node in reader.children(root, kind.element()) {
            let group = reader.required_attr(node, "group")?.trim();
            let neighbour = reader.required_attr(node, "neighbor")?.trim();
            for name in [group, neighbour] {
                if !groups.contains(name) {
                    return Err(reader.error_at(
                        ConfigErrorCode::UnknownGroup,
                        format!("{} references unknown group '{name}'", kind.element()),
                        node,
                    ));
                }
            }
            let raw_shape = reader.required_attr(node, "shape")?;
            let shape = Border20::from_name(raw_shape).ok_or_else(|| {
                reader.error_at(
                    ConfigErrorCode::InvalidValue,
                    format!("unknown shape '{raw_shape}'"),
                    node,
                )
            })?;

            let mut tiles = Vec::new();
            for child in reader.children(node, "tile") {
                let tile = reader.tile_ref(child)?;
                if sheets.is_some_and(|sheets| !sheets.contains(tile)) {
                    return Err(reader.error_at(
                        ConfigErrorCode::InvalidTileRange,
                        format!("{} uses unknown tile {tile}", kind.element()),
                        child,
                    ));
                }
                tiles.push(tile);
            }
            if tiles.is_empty() {
                return Err(reader.error_at(
                    ConfigErrorCode::MissingAttribute,
                    format!("{} {group}/{neighbour} lists no tile", kind.element()),
                    node,
                ));
            }
            rules.insert(group, neighbour, shape, tiles);
        }

        debug!(path = %path.display(), kind = ?kind, rule_count = rules.len(), "shape_rules_loaded");
        Ok(rules)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub transitions: usize,
    pub circuits: usize,
    pub missing_rules: usize,
}

/// Replaces border cells of plain and circuit groups with the tile their
/// rule names for the border shape. Shapes are computed from a snapshot of
/// the grid, so replacements never feed back into the same pass.
pub(crate) fn reconcile(
    grid: &mut TileGrid,
    groups: &TileGroupCatalog,
    transitions: Option<&ShapeRules>,
    circuits: Option<&ShapeRules>,
) -> ReconcileReport {
    let snapshot = grid.clone();
    let group_at = |col: i64, row: i64| {
        snapshot
            .tile(col, row)
            .and_then(|tile| groups.group_of(tile.tile_ref))
    };

    let mut report = ReconcileReport::default();
    for col in 0..snapshot.width() as i64 {
        for row in 0..snapshot.height() as i64 {
            let Some(group) = group_at(col, row) else {
                continue;
            };
            let rules = match group.group_type {
                TileGroupType::Plain => transitions,
                TileGroupType::Circuit => circuits,
                TileGroupType::None | TileGroupType::Transition => continue,
            };

            let neighbours = neighbour_mask(col, row, |c, r| {
                let inside = c >= 0 && r >= 0 && c < snapshot.width() as i64 && r < snapshot.height() as i64;
                inside.then(|| group_at(c, r).is_some_and(|other| other.name == group.name))
            });
            let shape = compute_border_state(neighbours);
            if shape == Border20::Center {
                continue;
            }
            let Some(neighbour) = mask::OFFSETS
                .iter()
                .filter_map(|(_, dcol, drow)| group_at(col + dcol, row + drow))
                .find(|other| other.name != group.name)
            else {
                continue;
            };

            match rules.and_then(|rules| rules.get(&group.name, &neighbour.name, shape)) {
                Some(tiles) => match grid.set_tile(col as u32, row as u32, tiles.first().copied()) {
                    Ok(()) => match group.group_type {
                        TileGroupType::Circuit => report.circuits += 1,
                        _ => report.transitions += 1,
                    },
                    Err(error) => {
                        // Rules built in code or loaded without sheets can name unknown tiles.
                        report.missing_rules += 1;
                        warn!(
                            group = %group.name,
                            neighbour = %neighbour.name,
                            shape = shape.as_str(),
                            col,
                            row,
                            %error,
                            "shape_rule_tile_rejected"
                        );
                    }
                },
                None => {
                    report.missing_rules += 1;
                    debug!(
                        group = %group.name,
                        neighbour = %neighbour.name,
                        shape = shape.as_str(),
                        col,
                        row,
                        "shape_rule_missing"
                    );
                }
            }
        }
    }
    report
}
