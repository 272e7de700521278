use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tilemap::config::SHEETS_FILE;
use tilemap::grid::{load_level, read_level, save_level};
use tilemap::{
    minimap_image, resolve_resources_dir, Chebyshev, GeneratorParameter, Manhattan, MapResources,
    MinimapColors, PathFinder, PathOutcome, TileGrid,
};
use tracing::info;

pub const DEFAULT_MAX_SEARCH: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonOptions {
    /// Falls back to `TILEMAP_RESOURCES` when absent.
    pub resources: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Generate {
        params: PathBuf,
        output: PathBuf,
        seed: Option<u64>,
        minimap: Option<PathBuf>,
    },
    Inspect {
        level: PathBuf,
        json: bool,
    },
    Path {
        level: PathBuf,
        start: (u32, u32),
        goal: (u32, u32),
        diagonals: bool,
        max_search: usize,
    },
    Rip {
        image: PathBuf,
        output: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Help,
    Run {
        kind: CommandKind,
        options: CommonOptions,
    },
}

pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        return Ok(Invocation::Help);
    }

    let mut options = CommonOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--resources" => {
                let value = option_value(args, index, "--resources")?;
                options.resources = Some(PathBuf::from(value));
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "generate" => parse_generate(command_args)?,
        "inspect" => {
            let (positional, flags) = split_flags(command_args);
            let [level] = positional.as_slice() else {
                return Err("inspect requires exactly one level file".to_string());
            };
            let mut json = false;
            for flag in flags {
                match flag.as_str() {
                    "--json" => json = true,
                    other => return Err(format!("unknown inspect argument '{other}' (expected --json)")),
                }
            }
            CommandKind::Inspect {
                level: PathBuf::from(level.as_str()),
                json,
            }
        }
        "path" => parse_path(command_args)?,
        "rip" => {
            let [image, output] = command_args else {
                return Err("rip requires an image file and an output level file".to_string());
            };
            CommandKind::Rip {
                image: PathBuf::from(image),
                output: PathBuf::from(output),
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    Ok(Invocation::Run { kind, options })
}

fn parse_generate(args: &[String]) -> Result<CommandKind, String> {
    if args.len() < 2 {
        return Err("generate requires a parameter file and an output level file".to_string());
    }
    let mut seed = None;
    let mut minimap = None;
    let mut index = 2usize;
    while index < args.len() {
        match args[index].as_str() {
            "--seed" => {
                let value = option_value(args, index, "--seed")?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("invalid --seed value '{value}' (expected u64)"))?,
                );
                index += 2;
            }
            "--minimap" => {
                minimap = Some(PathBuf::from(option_value(args, index, "--minimap")?));
                index += 2;
            }
            other => {
                return Err(format!(
                    "unknown generate argument '{other}' (expected --seed or --minimap)"
                ))
            }
        }
    }
    Ok(CommandKind::Generate {
        params: PathBuf::from(&args[0]),
        output: PathBuf::from(&args[1]),
        seed,
        minimap,
    })
}

fn parse_path(args: &[String]) -> Result<CommandKind, String> {
    if args.len() < 3 {
        return Err("path requires a level file, a start cell and a goal cell".to_string());
    }
    let mut diagonals = false;
    let mut max_search = DEFAULT_MAX_SEARCH;
    let mut index = 3usize;
    while index < args.len() {
        match args[index].as_str() {
            "--diagonals" => {
                diagonals = true;
                index += 1;
            }
            "--max-search" => {
                let value = option_value(args, index, "--max-search")?;
                max_search = value.parse::<usize>().map_err(|_| {
                    format!("invalid --max-search value '{value}' (expected usize)")
                })?;
                index += 2;
            }
            other => {
                return Err(format!(
                    "unknown path argument '{other}' (expected --diagonals or --max-search)"
                ))
            }
        }
    }
    Ok(CommandKind::Path {
        level: PathBuf::from(&args[0]),
        start: parse_cell(&args[1])?,
        goal: parse_cell(&args[2])?,
        diagonals,
        max_search,
    })
}

fn option_value<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {name}"))
}

fn split_flags(args: &[String]) -> (Vec<&String>, Vec<&String>) {
    args.iter().partition(|arg| !arg.starts_with("--"))
}

/// Parses `col,row`.
pub fn parse_cell(raw: &str) -> Result<(u32, u32), String> {
    let (col, row) = raw
        .split_once(',')
        .ok_or_else(|| format!("invalid cell '{raw}' (expected col,row)"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid cell '{raw}' (expected col,row)"))
    };
    Ok((parse(col)?, parse(row)?))
}

pub fn parse_generator_params(raw: &str) -> Result<GeneratorParameter, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, GeneratorParameter>(&mut deserializer) {
        Ok(params) => Ok(params),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse generator json: {source}"))
            } else {
                Err(format!("parse generator json at {path}: {source}"))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct LevelSummary {
    sheets_ref: String,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    tiles: usize,
    tiles_per_sheet: BTreeMap<u32, usize>,
}

pub fn run<W: Write>(kind: CommandKind, options: CommonOptions, stdout: &mut W) -> Result<(), String> {
    match kind {
        CommandKind::Generate {
            params,
            output,
            seed,
            minimap,
        } => {
            let resources = load_resources(&options)?;
            let raw = fs::read_to_string(&params).map_err(|error| {
                format!("failed to read parameter file '{}': {error}", params.display())
            })?;
            let mut params = parse_generator_params(&raw)?;
            if let Some(seed) = seed {
                params.seed = seed;
            }
            let generated = resources
                .generator()
                .generate(&params)
                .map_err(|error| format!("generation failed: {error}"))?;
            save_level(&output, &generated.grid, SHEETS_FILE).map_err(|error| error.to_string())?;
            writeln_out(
                stdout,
                &format!(
                    "generated {}x{} tiles={} transitions={} circuits={} missing_rules={} seed={}",
                    generated.grid.width(),
                    generated.grid.height(),
                    generated.grid.tiles_number(),
                    generated.reconcile.transitions,
                    generated.reconcile.circuits,
                    generated.reconcile.missing_rules,
                    params.seed
                ),
            )?;
            if let Some(minimap) = minimap {
                write_minimap(&minimap, &generated.grid, &resources)?;
                writeln_out(stdout, &format!("minimap {}", minimap.display()))?;
            }
            Ok(())
        }
        CommandKind::Inspect { level, json } => {
            let data = read_level(&level).map_err(|error| error.to_string())?;
            let mut tiles_per_sheet = BTreeMap::<u32, usize>::new();
            for tile in &data.tiles {
                *tiles_per_sheet.entry(tile.tile_ref.sheet).or_default() += 1;
            }
            let summary = LevelSummary {
                sheets_ref: data.sheets_ref,
                width: data.width,
                height: data.height,
                tile_width: data.tile_width,
                tile_height: data.tile_height,
                tiles: data.tiles.len(),
                tiles_per_sheet,
            };
            if json {
                let encoded = serde_json::to_string_pretty(&summary)
                    .map_err(|error| format!("encode summary json: {error}"))?;
                return writeln_out(stdout, &encoded);
            }
            writeln_out(
                stdout,
                &format!(
                    "level {} sheets={} size={}x{} tile={}x{} tiles={}",
                    level.display(),
                    summary.sheets_ref,
                    summary.width,
                    summary.height,
                    summary.tile_width,
                    summary.tile_height,
                    summary.tiles
                ),
            )?;
            for (sheet, count) in &summary.tiles_per_sheet {
                writeln_out(stdout, &format!("  sheet {sheet}: {count}"))?;
            }
            Ok(())
        }
        CommandKind::Path {
            level,
            start,
            goal,
            diagonals,
            max_search,
        } => {
            let resources = load_resources(&options)?;
            let grid =
                load_level(&level, resources.sheets.clone()).map_err(|error| error.to_string())?;
            let min_cost = resources
                .paths
                .categories()
                .filter(|data| !data.blocking)
                .map(|data| data.cost)
                .fold(f64::INFINITY, f64::min);
            let min_cost = if min_cost.is_finite() { min_cost } else { 0.0 };
            let context = resources.into_context(grid);
            let graph = context
                .path_graph()
                .map_err(|error| error.to_string())?
                .with_diagonals(diagonals);
            // Diagonal steps cost the same as orthogonal ones.
            let outcome = if diagonals {
                PathFinder::new(Chebyshev { min_cost }, max_search).find_path(&graph, start, goal)
            } else {
                PathFinder::new(Manhattan { min_cost }, max_search).find_path(&graph, start, goal)
            };
            info!(?start, ?goal, diagonals, max_search, "path_query_finished");
            match outcome {
                PathOutcome::Found(path) => {
                    writeln_out(
                        stdout,
                        &format!("found steps={} cost={}", path.steps(), path.cost),
                    )?;
                    let cells = path
                        .tiles
                        .iter()
                        .map(|(col, row)| format!("{col},{row}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    writeln_out(stdout, &cells)
                }
                PathOutcome::Exhausted { expanded } => {
                    writeln_out(stdout, &format!("exhausted expanded={expanded}"))
                }
                PathOutcome::Unreachable => writeln_out(stdout, "unreachable"),
            }
        }
        CommandKind::Rip { image, output } => {
            let resources = load_resources(&options)?;
            let (grid, report) = TileGrid::from_level_rip(&image, resources.sheets.clone())
                .map_err(|error| error.to_string())?;
            save_level(&output, &grid, SHEETS_FILE).map_err(|error| error.to_string())?;
            writeln_out(
                stdout,
                &format!(
                    "ripped {}x{} matched={} empty={} unmatched={}",
                    grid.width(),
                    grid.height(),
                    report.matched,
                    report.empty,
                    report.unmatched
                ),
            )
        }
    }
}

fn load_resources(options: &CommonOptions) -> Result<MapResources, String> {
    let dir = resolve_resources_dir(options.resources.as_deref()).map_err(|error| error.to_string())?;
    MapResources::load(&dir).map_err(|error| error.to_string())
}

/// Uses the minimap descriptor when present, sheet colour averages otherwise.
fn write_minimap(path: &Path, grid: &TileGrid, resources: &MapResources) -> Result<(), String> {
    let computed;
    let colors = if resources.minimap.is_empty() {
        computed = MinimapColors::from_sheet_averages(&resources.sheets)
            .map_err(|error| error.to_string())?;
        &computed
    } else {
        &resources.minimap
    };
    minimap_image(grid, colors)
        .save(path)
        .map_err(|error| format!("failed to write minimap '{}': {error}", path.display()))
}

fn writeln_out<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))
}

pub fn usage_text() -> String {
    [
        "maptool - tile map generation and inspection",
        "",
        "Usage:",
        "  maptool [--resources <dir>] generate <params.json> <level> [--seed <u64>] [--minimap <png>]",
        "  maptool inspect <level> [--json]",
        "  maptool [--resources <dir>] path <level> <col,row> <col,row> [--diagonals] [--max-search <usize>]",
        "  maptool [--resources <dir>] rip <image> <level>",
        "",
        "Resources default to the directory named by TILEMAP_RESOURCES.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;
    use tempfile::TempDir;
    use tilemap::config::GROUPS_FILE;
    use tilemap::{PathGraph, TileRef};

    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    fn run_to_string(kind: CommandKind, options: CommonOptions) -> String {
        let mut out = Vec::new();
        run(kind, options, &mut out).expect("run");
        String::from_utf8(out).expect("utf8")
    }

    fn write_resources(dir: &Path) {
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
                <group name="ground" type="plain"><tile sheet="0" number="0"/></group>
                <group name="wall" type="plain"><tile sheet="0" number="1"/></group>
            </groups>"#,
        )
        .expect("groups");
        fs::write(
            dir.join("pathfinding.xml"),
            r#"<pathfinding>
                <path category="ground" cost="1"><movement>UP</movement><movement>DOWN</movement><movement>LEFT</movement><movement>RIGHT</movement></path>
                <path category="wall" block="true"/>
            </pathfinding>"#,
        )
        .expect("pathfinding");
    }

    #[test]
    fn parse_generate_with_common_options() {
        let parsed = parse_args(&args(&[
            "--resources",
            "res",
            "generate",
            "params.json",
            "out.lvl",
            "--seed",
            "7",
            "--minimap",
            "mini.png",
        ]))
        .expect("parse");
        assert_eq!(
            parsed,
            Invocation::Run {
                kind: CommandKind::Generate {
                    params: PathBuf::from("params.json"),
                    output: PathBuf::from("out.lvl"),
                    seed: Some(7),
                    minimap: Some(PathBuf::from("mini.png")),
                },
                options: CommonOptions {
                    resources: Some(PathBuf::from("res")),
                },
            }
        );
    }

    #[test]
    fn parse_path_defaults_and_flags() {
        let parsed = parse_args(&args(&["path", "a.lvl", "0,0", "4, 2", "--diagonals"])).expect("parse");
        let Invocation::Run { kind, options } = parsed else {
            panic!("expected run invocation");
        };
        assert_eq!(options, CommonOptions::default());
        assert_eq!(
            kind,
            CommandKind::Path {
                level: PathBuf::from("a.lvl"),
                start: (0, 0),
                goal: (4, 2),
                diagonals: true,
                max_search: DEFAULT_MAX_SEARCH,
            }
        );
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_args(&[]).is_err());
        assert_eq!(parse_args(&args(&["--help"])).expect("help"), Invocation::Help);
        assert!(parse_args(&args(&["--resources"])).is_err());
        assert!(parse_args(&args(&["explode"])).is_err());
        assert!(parse_args(&args(&["generate", "params.json"])).is_err());
        assert!(parse_args(&args(&["generate", "p.json", "o.lvl", "--seed", "x"])).is_err());
        assert!(parse_args(&args(&["path", "a.lvl", "0;0", "1,1"])).is_err());
        assert!(parse_args(&args(&["inspect", "a.lvl", "--yaml"])).is_err());
        assert!(parse_args(&args(&["rip", "only.png"])).is_err());
    }

    #[test]
    fn generator_json_errors_name_the_field() {
        let err = parse_generator_params(
            r#"{"preferences":[{"kind":"size","tile_width":16,"tile_height":"big","width":4,"height":4}]}"#,
        )
        .expect_err("bad field");
        assert!(err.contains("preferences[0]"), "{err}");

        let params = parse_generator_params(
            r#"{"preferences":[{"kind":"fill","tile":{"sheet":0,"number":1}}],"seed":3}"#,
        )
        .expect("params");
        assert_eq!(params.seed, 3);
        assert_eq!(params.preferences.len(), 1);
    }

    #[test]
    fn diagonal_path_matches_uniform_cost_search() {
        let temp = TempDir::new().expect("temp");
        let resources = temp.path().join("res");
        fs::create_dir_all(&resources).expect("res dir");
        write_resources(&resources);
        fs::write(
            resources.join("pathfinding.xml"),
            r#"<pathfinding>
                <path category="ground" cost="1"><movement>UP</movement><movement>DOWN</movement><movement>LEFT</movement><movement>RIGHT</movement><movement>UP_LEFT</movement><movement>UP_RIGHT</movement><movement>DOWN_LEFT</movement><movement>DOWN_RIGHT</movement></path>
                <path category="wall" block="true"/>
            </pathfinding>"#,
        )
        .expect("pathfinding");
        let loaded = MapResources::load(&resources).expect("resources");
        let ground = TileRef::new(0, 0);
        let wall = TileRef::new(0, 1);
        let mut grid = TileGrid::create(7, 7, loaded.sheets.clone()).expect("grid");
        for col in 0..7 {
            for row in 0..7 {
                grid.set_tile(col, row, Some(ground)).expect("ground");
            }
        }
        for (col, row) in [(1, 1), (2, 2), (4, 1), (1, 4), (3, 4), (4, 4), (5, 3), (5, 5)] {
            grid.set_tile(col, row, Some(wall)).expect("wall");
        }
        let level = temp.path().join("walls.lvl");
        save_level(&level, &grid, SHEETS_FILE).expect("save");

        let graph = PathGraph::new(&grid, &loaded.groups, &loaded.paths).with_diagonals(true);
        let baseline = PathFinder::new(Manhattan { min_cost: 0.0 }, DEFAULT_MAX_SEARCH)
            .find_path(&graph, (0, 0), (6, 6));
        let optimal = baseline.path().expect("reachable").cost;

        let out = run_to_string(
            CommandKind::Path {
                level,
                start: (0, 0),
                goal: (6, 6),
                diagonals: true,
                max_search: DEFAULT_MAX_SEARCH,
            },
            CommonOptions {
                resources: Some(resources),
            },
        );
        assert!(out.starts_with("found "), "{out}");
        assert!(out.contains(&format!(" cost={optimal}\n")), "{out}");
    }

    #[test]
    fn generate_then_inspect_and_path() {
        let temp = TempDir::new().expect("temp");
        let resources = temp.path().join("res");
        fs::create_dir_all(&resources).expect("res dir");
        write_resources(&resources);
        let params = temp.path().join("params.json");
        fs::write(
            &params,
            r#"{"preferences":[
                {"kind":"size","tile_width":16,"tile_height":16,"width":5,"height":3},
                {"kind":"fill","tile":{"sheet":0,"number":0}}
            ]}"#,
        )
        .expect("params");
        let level = temp.path().join("map.lvl");
        let minimap = temp.path().join("map.png");
        let options = CommonOptions {
            resources: Some(resources),
        };

        let out = run_to_string(
            CommandKind::Generate {
                params,
                output: level.clone(),
                seed: Some(11),
                minimap: Some(minimap.clone()),
            },
            options.clone(),
        );
        assert!(out.starts_with("generated 5x3 tiles=15"), "{out}");
        assert!(minimap.is_file());

        let out = run_to_string(
            CommandKind::Inspect {
                level: level.clone(),
                json: true,
            },
            CommonOptions::default(),
        );
        let summary: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(summary["width"], 5);
        assert_eq!(summary["tiles"], 15);
        assert_eq!(summary["sheets_ref"], SHEETS_FILE);

        let out = run_to_string(
            CommandKind::Path {
                level,
                start: (0, 0),
                goal: (4, 2),
                diagonals: false,
                max_search: DEFAULT_MAX_SEARCH,
            },
            options,
        );
        assert!(out.starts_with("found steps=6 cost=6"), "{out}");
    }
}
