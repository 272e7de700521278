mod border;

use tracing::debug;

use crate::context::{Fovable, MapContext, Tiled, ViewBounds};
use crate::grid::TileGrid;

pub use border::{compute_border_state, mask, neighbour_mask, Border20};

/// One drawable fog cell of the camera window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FogCell {
    pub col: u32,
    pub row: u32,
    /// Ordinal in the hide sheet, present when hide mode is on.
    pub hide: Option<usize>,
    /// Ordinal in the fog sheet, present when fog mode is on and the cell was visited.
    pub fog: Option<usize>,
}

/// Fog of war over a grid: a monotonic `visited` layer and a transient
/// `in_sight` layer, each with its border states.
#[derive(Debug, Clone)]
pub struct VisibilityField {
    width: u32,
    height: u32,
    hide: bool,
    fog: bool,
    visited: Vec<bool>,
    in_sight: Vec<bool>,
    visited_border: Vec<Border20>,
    fog_border: Vec<Border20>,
    player_filter: Option<u32>,
}

impl VisibilityField {
    /// Both modes start enabled, so the whole map is hidden.
    pub fn create(grid: &TileGrid) -> Self {
        let cells = grid.width() as usize * grid.height() as usize;
        let mut field = Self {
            width: grid.width(),
            height: grid.height(),
            hide: true,
            fog: true,
            visited: vec![false; cells],
            in_sight: vec![false; cells],
            visited_border: vec![Border20::None; cells],
            fog_border: vec![Border20::None; cells],
            player_filter: None,
        };
        field.refresh_borders();
        field
    }

    pub fn from_context(context: &MapContext) -> Self {
        Self::create(context.grid())
    }

    /// Resets both layers: a disabled layer is fully revealed, an enabled one
    /// fully hidden.
    pub fn set_fog_of_war(&mut self, hide: bool, fog: bool) {
        self.hide = hide;
        self.fog = fog;
        self.visited.iter_mut().for_each(|cell| *cell = !hide);
        self.in_sight.iter_mut().for_each(|cell| *cell = !fog);
        self.refresh_borders();
        debug!(hide, fog, "fog_of_war_configured");
    }

    /// True when either mode is enabled.
    pub fn has_fog_of_war(&self) -> bool {
        self.hide || self.fog
    }

    pub fn hide_enabled(&self) -> bool {
        self.hide
    }

    pub fn fog_enabled(&self) -> bool {
        self.fog
    }

    /// Restricts updates to agents of one player. Agents without an owner are
    /// always stamped.
    pub fn set_player_filter(&mut self, player: Option<u32>) {
        self.player_filter = player;
    }

    pub fn update(&mut self, agents: &[&dyn Fovable]) {
        if self.fog {
            self.in_sight.iter_mut().for_each(|cell| *cell = false);
        }
        let mut stamped = 0usize;
        for agent in agents {
            if let (Some(filter), Some(owner)) = (self.player_filter, agent.player_id()) {
                if filter != owner {
                    continue;
                }
            }
            let radius = agent.fov_radius() as i64;
            if self.hide {
                stamp(&mut self.visited, self.width, self.height, *agent, radius + 1);
            }
            if self.fog {
                stamp(&mut self.in_sight, self.width, self.height, *agent, radius);
            }
            stamped += 1;
        }
        self.refresh_borders();
        debug!(agents = agents.len(), stamped, "fog_updated");
    }

    pub fn is_visited(&self, col: i64, row: i64) -> bool {
        self.index_of(col, row)
            .is_some_and(|index| self.visited[index])
    }

    /// True when the cell is currently revealed by an agent.
    pub fn is_in_sight(&self, col: i64, row: i64) -> bool {
        self.index_of(col, row)
            .is_some_and(|index| self.in_sight[index])
    }

    /// Hidden unless at least one footprint cell is both visited and in sight.
    pub fn is_fogged(&self, entity: &dyn Tiled) -> bool {
        !entity
            .footprint()
            .cells()
            .any(|(col, row)| self.is_visited(col, row) && self.is_in_sight(col, row))
    }

    pub fn visited_border(&self, col: i64, row: i64) -> Option<Border20> {
        self.index_of(col, row).map(|index| self.visited_border[index])
    }

    pub fn fog_border(&self, col: i64, row: i64) -> Option<Border20> {
        self.index_of(col, row).map(|index| self.fog_border[index])
    }

    /// Sprite ordinals for the cells of the camera window that hold a tile.
    pub fn visible_cells(&self, grid: &TileGrid, view: ViewBounds) -> Vec<FogCell> {
        let (min_col, min_row, max_col, max_row) = view.tile_window(grid);
        let (min_col, max_col) = (min_col.max(0), max_col.min(self.width as i64 - 1));
        let (min_row, max_row) = (min_row.max(0), max_row.min(self.height as i64 - 1));
        let mut cells = Vec::new();
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                let Some(index) = self.index_of(col, row) else {
                    continue;
                };
                if grid.tile(col, row).is_none() {
                    continue;
                }
                let visited = self.visited_border[index];
                cells.push(FogCell {
                    col: col as u32,
                    row: row as u32,
                    hide: self.hide.then(|| visited.ordinal()),
                    fog: (self.fog && visited != Border20::None)
                        .then(|| self.fog_border[index].ordinal()),
                });
            }
        }
        cells
    }

    /// `visible_cells` over the context grid and camera window.
    pub fn visible_cells_in(&self, context: &MapContext) -> Vec<FogCell> {
        self.visible_cells(context.grid(), context.view())
    }

    fn refresh_borders(&mut self) {
        refresh_layer(&self.visited, &mut self.visited_border, self.width, self.height);
        refresh_layer(&self.in_sight, &mut self.fog_border, self.width, self.height);
    }

    fn index_of(&self, col: i64, row: i64) -> Option<usize> {
        layer_index(self.width, self.height, col, row)
    }
}

fn layer_index(width: u32, height: u32, col: i64, row: i64) -> Option<usize> {
    if col < 0 || row < 0 || col >= width as i64 || row >= height as i64 {
        return None;
    }
    Some(col as usize * height as usize + row as usize)
}

/// Reveals the inclusive disc of `radius` cells around the agent's footprint.
/// Only cells of the layer are visited, wherever the agent stands.
fn stamp(layer: &mut [bool], width: u32, height: u32, agent: &dyn Fovable, radius: i64) {
    let footprint = agent.footprint();
    let min_col = footprint.col.saturating_sub(radius).max(0);
    let min_row = footprint.row.saturating_sub(radius).max(0);
    let max_col = footprint
        .col
        .saturating_add(footprint.width as i64 - 1)
        .saturating_add(radius)
        .min(width as i64 - 1);
    let max_row = footprint
        .row
        .saturating_add(footprint.height as i64 - 1)
        .saturating_add(radius)
        .min(height as i64 - 1);
    let radius_sq = (radius as u128) * (radius as u128);
    for col in min_col..=max_col {
        for row in min_row..=max_row {
            let Some(index) = layer_index(width, height, col, row) else {
                continue;
            };
            let (dx, dy) = footprint.distance_to(col, row);
            let (dx, dy) = (dx as u128, dy as u128);
            if dx * dx + dy * dy <= radius_sq {
                layer[index] = true;
            }
        }
    }
}

fn refresh_layer(layer: &[bool], borders: &mut [Border20], width: u32, height: u32) {
    for col in 0..width as i64 {
        for row in 0..height as i64 {
            let Some(index) = layer_index(width, height, col, row) else {
                continue;
            };
            borders[index] = if layer[index] {
                let neighbours = neighbour_mask(col, row, |c, r| {
                    layer_index(width, height, c, r).map(|i| layer[i])
                });
                compute_border_state(neighbours)
            } else {
                Border20::None
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TileFootprint;
    use crate::tile::test_support::sheets_16;
    use crate::tile::TileRef;

    struct Scout {
        footprint: TileFootprint,
        radius: u32,
        player: Option<u32>,
    }

    impl Scout {
        fn at(col: i64, row: i64, radius: u32) -> Self {
            Self {
                footprint: TileFootprint::single(col, row),
                radius,
                player: None,
            }
        }
    }

    impl Tiled for Scout {
        fn footprint(&self) -> TileFootprint {
            self.footprint
        }
    }

    impl Fovable for Scout {
        fn fov_radius(&self) -> u32 {
            self.radius
        }

        fn player_id(&self) -> Option<u32> {
            self.player
        }
    }

    fn filled_grid(size: u32) -> TileGrid {
        let mut grid = TileGrid::create(size, size, sheets_16(4)).expect("grid");
        for col in 0..size {
            for row in 0..size {
                grid.set_tile(col, row, Some(TileRef::new(0, 0)))
                    .expect("set");
            }
        }
        grid
    }

    #[test]
    fn layers_start_hidden_when_enabled_and_revealed_when_disabled() {
        let grid = filled_grid(4);
        let mut field = VisibilityField::create(&grid);
        assert!(field.has_fog_of_war());
        assert_eq!(field.visited_border(1, 1), Some(Border20::None));
        assert!(!field.is_visited(1, 1));

        field.set_fog_of_war(false, true);
        assert!(field.is_visited(1, 1));
        assert!(!field.is_in_sight(1, 1));
        assert_eq!(field.visited_border(1, 1), Some(Border20::Center));
        assert_eq!(field.fog_border(1, 1), Some(Border20::None));

        field.set_fog_of_war(false, false);
        assert!(!field.has_fog_of_war());
        assert_eq!(field.fog_border(0, 0), Some(Border20::Center));
    }

    #[test]
    fn single_agent_reveals_its_disc_only() {
        let grid = filled_grid(20);
        let mut field = VisibilityField::create(&grid);
        let scout = Scout::at(10, 10, 3);
        field.update(&[&scout]);

        assert!(field.is_visited(10, 10));
        assert!(field.is_in_sight(10, 10));
        assert!(field.is_in_sight(13, 10));
        assert!(!field.is_in_sight(14, 10));
        // Visited reaches one cell further than sight.
        assert!(field.is_visited(14, 10));
        assert!(!field.is_visited(15, 10));
        // Corner (13,13) has distance sqrt(18) > 4.
        assert!(!field.is_visited(13, 13));
        assert!(!field.is_in_sight(12, 13));
        assert!(field.is_in_sight(12, 12));
        assert!(!field.is_fogged(&scout));
    }

    #[test]
    fn visited_is_monotonic_but_sight_follows_agents() {
        let grid = filled_grid(20);
        let mut field = VisibilityField::create(&grid);
        field.update(&[&Scout::at(3, 3, 2)]);
        field.update(&[&Scout::at(15, 15, 2)]);

        assert!(field.is_visited(3, 3));
        assert!(!field.is_in_sight(3, 3));
        assert!(field.is_in_sight(15, 15));
        assert!(field.is_fogged(&Scout::at(3, 3, 0)));
    }

    #[test]
    fn large_footprint_is_visible_through_any_cell() {
        let grid = filled_grid(20);
        let mut field = VisibilityField::create(&grid);
        field.update(&[&Scout::at(2, 2, 1)]);
        let wide = Scout {
            footprint: TileFootprint {
                col: 3,
                row: 2,
                width: 3,
                height: 1,
            },
            radius: 0,
            player: None,
        };
        assert!(!field.is_fogged(&wide));
        let far = Scout::at(8, 8, 0);
        assert!(field.is_fogged(&far));
    }

    #[test]
    fn borders_follow_the_revealed_area() {
        let grid = filled_grid(9);
        let mut field = VisibilityField::create(&grid);
        field.update(&[&Scout::at(4, 4, 1)]);
        // A radius-1 disc is a plus sign: open sides, hidden diagonals.
        assert_eq!(field.fog_border(4, 4), Some(Border20::InsideTopLeft));
        assert_eq!(field.fog_border(4, 5), Some(Border20::EndTop));
        assert_eq!(field.fog_border(4, 3), Some(Border20::EndBottom));
        assert_eq!(field.fog_border(3, 4), Some(Border20::EndLeft));
        assert_eq!(field.visited_border(4, 4), Some(Border20::Center));
        assert_eq!(field.fog_border(0, 0), Some(Border20::None));
    }

    #[test]
    fn player_filter_skips_other_owners() {
        let grid = filled_grid(10);
        let mut field = VisibilityField::create(&grid);
        field.set_player_filter(Some(1));
        let ally = Scout {
            player: Some(1),
            ..Scout::at(2, 2, 1)
        };
        let enemy = Scout {
            player: Some(2),
            ..Scout::at(7, 7, 1)
        };
        let neutral = Scout::at(2, 7, 1);
        field.update(&[&ally, &enemy, &neutral]);
        assert!(field.is_in_sight(2, 2));
        assert!(!field.is_in_sight(7, 7));
        assert!(field.is_in_sight(2, 7));
    }

    #[test]
    fn huge_radius_and_far_agents_stay_inside_the_layer() {
        let grid = filled_grid(6);
        let mut field = VisibilityField::create(&grid);
        field.update(&[&Scout::at(2, 2, u32::MAX)]);
        assert!(field.is_in_sight(0, 0));
        assert!(field.is_in_sight(5, 5));
        assert!(field.is_visited(5, 0));

        let mut field = VisibilityField::create(&grid);
        let far = Scout::at(-1_000_000_000, 3, 2);
        let edge = Scout::at(i64::MAX - 1, i64::MIN + 1, 4);
        field.update(&[&far, &edge]);
        assert!((0..6).all(|col| (0..6).all(|row| !field.is_visited(col, row))));

        // Radius reaching back from just outside the grid.
        field.update(&[&Scout::at(-2, 0, 3)]);
        assert!(field.is_in_sight(1, 0));
        assert!(!field.is_in_sight(2, 0));
    }

    #[test]
    fn context_window_limits_visible_cells() {
        let grid = filled_grid(4);
        let mut context = MapContext::new(grid);
        let mut field = VisibilityField::from_context(&context);
        field.set_fog_of_war(false, false);

        context.set_view(ViewBounds::new(-1.0e12, -1.0e12, 2.0e12, 2.0e12));
        assert_eq!(field.visible_cells_in(&context).len(), 16);

        context.set_view(ViewBounds::new(16.0, 16.0, 0.0, 0.0));
        let cells = field.visible_cells_in(&context);
        assert_eq!(cells.len(), 1);
        assert_eq!((cells[0].col, cells[0].row), (1, 1));
    }

    #[test]
    fn visible_cells_skip_empty_and_outside_cells() {
        let mut grid = filled_grid(4);
        grid.set_tile(1, 0, None).expect("clear");
        let mut field = VisibilityField::create(&grid);
        field.update(&[&Scout::at(0, 0, 1)]);

        let view = ViewBounds::new(-16.0, 0.0, 32.0, 0.0);
        let cells = field.visible_cells(&grid, view);
        // Window covers cols -1..=1 on row 0; -1 is outside and 1 is empty.
        assert_eq!(cells.len(), 1);
        let cell = cells[0];
        assert_eq!((cell.col, cell.row), (0, 0));
        assert!(cell.hide.is_some());
        assert!(cell.fog.is_some());

        field.set_fog_of_war(true, false);
        let cells = field.visible_cells(&grid, view);
        assert_eq!(cells[0].fog, None);
        assert_eq!(cells[0].hide, Some(Border20::None.ordinal()));
    }
}
