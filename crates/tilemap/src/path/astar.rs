use std::cmp::Ordering;

use tracing::debug;

use super::graph::PathGraph;

/// Estimate of the remaining cost between two cells. Paths are shortest only
/// while it never exceeds the real remaining cost.
///
/// `Closest` and `Manhattan` are admissible for 4-directional search only:
/// with diagonals enabled a diagonal step costs the same as an orthogonal one,
/// so use `Chebyshev` there. `ClosestSquared` overestimates on any map larger
/// than a few cells.
pub trait Heuristic {
    fn estimate(&self, from: (u32, u32), to: (u32, u32)) -> f64;
}

/// Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Closest;

/// Squared Euclidean distance. Cheaper, but not admissible.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosestSquared;

/// Manhattan distance scaled by the cheapest step cost of the map.
#[derive(Debug, Clone, Copy)]
pub struct Manhattan {
    pub min_cost: f64,
}

/// Largest axis distance scaled by the cheapest step cost of the map.
#[derive(Debug, Clone, Copy)]
pub struct Chebyshev {
    pub min_cost: f64,
}

impl Heuristic for Closest {
    fn estimate(&self, from: (u32, u32), to: (u32, u32)) -> f64 {
        let (dx, dy) = deltas(from, to);
        (dx * dx + dy * dy).sqrt()
    }
}

impl Heuristic for ClosestSquared {
    fn estimate(&self, from: (u32, u32), to: (u32, u32)) -> f64 {
        let (dx, dy) = deltas(from, to);
        dx * dx + dy * dy
    }
}

impl Heuristic for Manhattan {
    fn estimate(&self, from: (u32, u32), to: (u32, u32)) -> f64 {
        let (dx, dy) = deltas(from, to);
        self.min_cost * (dx + dy)
    }
}

impl Heuristic for Chebyshev {
    fn estimate(&self, from: (u32, u32), to: (u32, u32)) -> f64 {
        let (dx, dy) = deltas(from, to);
        self.min_cost * dx.max(dy)
    }
}

fn deltas(from: (u32, u32), to: (u32, u32)) -> (f64, f64) {
    (
        from.0.abs_diff(to.0) as f64,
        from.1.abs_diff(to.1) as f64,
    )
}

/// Cells from start to goal, both included.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePath {
    pub tiles: Vec<(u32, u32)>,
    pub cost: f64,
}

impl TilePath {
    pub fn steps(&self) -> usize {
        self.tiles.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathOutcome {
    Found(TilePath),
    /// The expanded-node cap was reached before the goal.
    Exhausted { expanded: usize },
    /// Goal blocked or outside the grid, or every reachable cell explored.
    Unreachable,
}

impl PathOutcome {
    pub fn path(&self) -> Option<&TilePath> {
        match self {
            PathOutcome::Found(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    index: usize,
    g_cost: f64,
    h_cost: f64,
    f_cost: f64,
    insertion_order: u64,
}

/// A* search with a cap on the number of expanded nodes.
#[derive(Debug, Clone)]
pub struct PathFinder<H> {
    heuristic: H,
    max_search_distance: usize,
}

impl<H: Heuristic> PathFinder<H> {
    pub fn new(heuristic: H, max_search_distance: usize) -> Self {
        Self {
            heuristic,
            max_search_distance,
        }
    }

    pub fn max_search_distance(&self) -> usize {
        self.max_search_distance
    }

    /// Ties on `f` go to the lower `h`, then to the earlier inserted node, so
    /// identical inputs always give identical paths.
    pub fn find_path(
        &self,
        graph: &PathGraph<'_>,
        start: (u32, u32),
        goal: (u32, u32),
    ) -> PathOutcome {
        let width = graph.width();
        let height = graph.height();
        let index_of = |(col, row): (u32, u32)| -> Option<usize> {
            (col < width && row < height).then(|| col as usize * height as usize + row as usize)
        };
        let coord_of = |index: usize| -> (u32, u32) {
            ((index / height as usize) as u32, (index % height as usize) as u32)
        };

        let (Some(start_index), Some(goal_index)) = (index_of(start), index_of(goal)) else {
            return PathOutcome::Unreachable;
        };
        if graph.is_blocked(goal.0 as i64, goal.1 as i64) {
            debug!(goal_col = goal.0, goal_row = goal.1, "path_goal_blocked");
            return PathOutcome::Unreachable;
        }

        let node_count = width as usize * height as usize;
        let mut closed = vec![false; node_count];
        let mut best_g = vec![f64::INFINITY; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = Vec::new();
        let mut next_insertion = 0u64;
        let mut expanded = 0usize;

        let start_h = self.heuristic.estimate(start, goal);
        open.push(OpenNode {
            index: start_index,
            g_cost: 0.0,
            h_cost: start_h,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion += 1;
        best_g[start_index] = 0.0;

        while !open.is_empty() {
            let best_index = pick_best_open_node_index(&open);
            let current = open.swap_remove(best_index);
            if closed[current.index] {
                continue;
            }
            closed[current.index] = true;

            if current.index == goal_index {
                let tiles = reconstruct_tile_path(&parent, start_index, goal_index)
                    .into_iter()
                    .map(coord_of)
                    .collect::<Vec<_>>();
                debug!(expanded, steps = tiles.len() - 1, "path_found");
                return PathOutcome::Found(TilePath {
                    tiles,
                    cost: current.g_cost,
                });
            }

            expanded += 1;
            if expanded > self.max_search_distance {
                debug!(expanded, "path_search_exhausted");
                return PathOutcome::Exhausted { expanded };
            }

            let (col, row) = coord_of(current.index);
            for step in graph.neighbours(col, row) {
                let Some(neighbour_index) = index_of((step.col, step.row)) else {
                    continue;
                };
                if closed[neighbour_index] {
                    continue;
                }
                let tentative_g = current.g_cost + step.cost;
                if tentative_g >= best_g[neighbour_index] {
                    continue;
                }

                best_g[neighbour_index] = tentative_g;
                parent[neighbour_index] = Some(current.index);
                let h_cost = self.heuristic.estimate((step.col, step.row), goal);
                open.push(OpenNode {
                    index: neighbour_index,
                    g_cost: tentative_g,
                    h_cost,
                    f_cost: tentative_g + h_cost,
                    insertion_order: next_insertion,
                });
                next_insertion += 1;
            }
        }

        debug!(expanded, "path_unreachable");
        PathOutcome::Unreachable
    }
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order(&open[index], &open[best_index]) == Ordering::Less {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order(a: &OpenNode, b: &OpenNode) -> Ordering {
    a.f_cost
        .total_cmp(&b.f_cost)
        .then(a.h_cost.total_cmp(&b.h_cost))
        .then(a.insertion_order.cmp(&b.insertion_order))
}

fn reconstruct_tile_path(parent: &[Option<usize>], start_index: usize, goal_index: usize) -> Vec<usize> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];
    while cursor != start_index {
        let Some(next) = parent[cursor] else {
            break;
        };
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    indices
}
