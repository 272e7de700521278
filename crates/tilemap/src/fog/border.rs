/// Edge pattern of a cell against its eight neighbours.
///
/// The discriminant is the sprite ordinal used by fog and transition sheets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Border20 {
    /// The cell itself does not share the state.
    #[default]
    None,
    Center,
    Top,
    Bottom,
    Left,
    Right,
    CornerTopLeft,
    CornerTopRight,
    CornerBottomLeft,
    CornerBottomRight,
    InsideTopLeft,
    InsideTopRight,
    InsideBottomLeft,
    InsideBottomRight,
    NarrowHorizontal,
    NarrowVertical,
    EndTop,
    EndBottom,
    EndLeft,
    EndRight,
    Isolated,
}

/// Neighbour bits: a set bit means that neighbour shares the cell's state.
pub mod mask {
    pub const TOP: u8 = 1 << 0;
    pub const TOP_RIGHT: u8 = 1 << 1;
    pub const RIGHT: u8 = 1 << 2;
    pub const BOTTOM_RIGHT: u8 = 1 << 3;
    pub const BOTTOM: u8 = 1 << 4;
    pub const BOTTOM_LEFT: u8 = 1 << 5;
    pub const LEFT: u8 = 1 << 6;
    pub const TOP_LEFT: u8 = 1 << 7;
    pub const ALL: u8 = u8::MAX;

    /// `(bit, dcol, drow)` with rows growing upward.
    pub const OFFSETS: [(u8, i64, i64); 8] = [
        (TOP, 0, 1),
        (TOP_RIGHT, 1, 1),
        (RIGHT, 1, 0),
        (BOTTOM_RIGHT, 1, -1),
        (BOTTOM, 0, -1),
        (BOTTOM_LEFT, -1, -1),
        (LEFT, -1, 0),
        (TOP_LEFT, -1, 1),
    ];
}

impl Border20 {
    pub const ALL: [Border20; 21] = [
        Border20::None,
        Border20::Center,
        Border20::Top,
        Border20::Bottom,
        Border20::Left,
        Border20::Right,
        Border20::CornerTopLeft,
        Border20::CornerTopRight,
        Border20::CornerBottomLeft,
        Border20::CornerBottomRight,
        Border20::InsideTopLeft,
        Border20::InsideTopRight,
        Border20::InsideBottomLeft,
        Border20::InsideBottomRight,
        Border20::NarrowHorizontal,
        Border20::NarrowVertical,
        Border20::EndTop,
        Border20::EndBottom,
        Border20::EndLeft,
        Border20::EndRight,
        Border20::Isolated,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Border20::None => "NONE",
            Border20::Center => "CENTER",
            Border20::Top => "TOP",
            Border20::Bottom => "BOTTOM",
            Border20::Left => "LEFT",
            Border20::Right => "RIGHT",
            Border20::CornerTopLeft => "CORNER_TOP_LEFT",
            Border20::CornerTopRight => "CORNER_TOP_RIGHT",
            Border20::CornerBottomLeft => "CORNER_BOTTOM_LEFT",
            Border20::CornerBottomRight => "CORNER_BOTTOM_RIGHT",
            Border20::InsideTopLeft => "INSIDE_TOP_LEFT",
            Border20::InsideTopRight => "INSIDE_TOP_RIGHT",
            Border20::InsideBottomLeft => "INSIDE_BOTTOM_LEFT",
            Border20::InsideBottomRight => "INSIDE_BOTTOM_RIGHT",
            Border20::NarrowHorizontal => "NARROW_HORIZONTAL",
            Border20::NarrowVertical => "NARROW_VERTICAL",
            Border20::EndTop => "END_TOP",
            Border20::EndBottom => "END_BOTTOM",
            Border20::EndLeft => "END_LEFT",
            Border20::EndRight => "END_RIGHT",
            Border20::Isolated => "ISOLATED",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|border| border.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Classifies a cell that shares the state from its neighbour mask.
///
/// Orthogonal sides decide first: four hidden sides is `Isolated`, three an
/// end cap named after the side opposite the open one, two a narrow strip or
/// an outer corner, one an edge. With every side open the first hidden
/// diagonal (top-left, top-right, bottom-left, bottom-right) gives an inner
/// corner, otherwise the cell is `Center`.
pub fn compute_border_state(neighbours: u8) -> Border20 {
    let hidden = |bit: u8| neighbours & bit == 0;
    let top = hidden(mask::TOP);
    let bottom = hidden(mask::BOTTOM);
    let left = hidden(mask::LEFT);
    let right = hidden(mask::RIGHT);

    match (top, bottom, left, right) {
        (true, true, true, true) => Border20::Isolated,
        (true, false, true, true) => Border20::EndTop,
        (false, true, true, true) => Border20::EndBottom,
        (true, true, true, false) => Border20::EndLeft,
        (true, true, false, true) => Border20::EndRight,
        (true, true, false, false) => Border20::NarrowHorizontal,
        (false, false, true, true) => Border20::NarrowVertical,
        (true, false, true, false) => Border20::CornerTopLeft,
        (true, false, false, true) => Border20::CornerTopRight,
        (false, true, true, false) => Border20::CornerBottomLeft,
        (false, true, false, true) => Border20::CornerBottomRight,
        (true, false, false, false) => Border20::Top,
        (false, true, false, false) => Border20::Bottom,
        (false, false, true, false) => Border20::Left,
        (false, false, false, true) => Border20::Right,
        (false, false, false, false) => {
            if hidden(mask::TOP_LEFT) {
                Border20::InsideTopLeft
            } else if hidden(mask::TOP_RIGHT) {
                Border20::InsideTopRight
            } else if hidden(mask::BOTTOM_LEFT) {
                Border20::InsideBottomLeft
            } else if hidden(mask::BOTTOM_RIGHT) {
                Border20::InsideBottomRight
            } else {
                Border20::Center
            }
        }
    }
}

/// Builds the neighbour mask of `(col,row)`; cells outside the layer count as
/// sharing the state.
pub fn neighbour_mask(col: i64, row: i64, shares: impl Fn(i64, i64) -> Option<bool>) -> u8 {
    mask::OFFSETS
        .iter()
        .filter(|(_, dcol, drow)| shares(col + dcol, row + drow).unwrap_or(true))
        .fold(0, |acc, (bit, _, _)| acc | bit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mask_is_center_and_empty_mask_is_isolated() {
        assert_eq!(compute_border_state(mask::ALL), Border20::Center);
        assert_eq!(compute_border_state(0), Border20::Isolated);
    }

    #[test]
    fn single_hidden_side_is_an_edge() {
        assert_eq!(compute_border_state(mask::ALL & !mask::TOP), Border20::Top);
        assert_eq!(
            compute_border_state(mask::ALL & !mask::BOTTOM),
            Border20::Bottom
        );
        assert_eq!(compute_border_state(mask::ALL & !mask::LEFT), Border20::Left);
        assert_eq!(
            compute_border_state(mask::ALL & !mask::RIGHT),
            Border20::Right
        );
    }

    #[test]
    fn two_hidden_sides_are_corners_or_strips() {
        assert_eq!(
            compute_border_state(mask::ALL & !(mask::TOP | mask::LEFT)),
            Border20::CornerTopLeft
        );
        assert_eq!(
            compute_border_state(mask::ALL & !(mask::BOTTOM | mask::RIGHT)),
            Border20::CornerBottomRight
        );
        assert_eq!(
            compute_border_state(mask::LEFT | mask::RIGHT),
            Border20::NarrowHorizontal
        );
        assert_eq!(
            compute_border_state(mask::TOP | mask::BOTTOM),
            Border20::NarrowVertical
        );
    }

    #[test]
    fn three_hidden_sides_are_end_caps() {
        assert_eq!(compute_border_state(mask::BOTTOM), Border20::EndTop);
        assert_eq!(compute_border_state(mask::TOP), Border20::EndBottom);
        assert_eq!(compute_border_state(mask::RIGHT), Border20::EndLeft);
        assert_eq!(compute_border_state(mask::LEFT), Border20::EndRight);
    }

    #[test]
    fn diagonals_only_matter_when_sides_are_open() {
        let sides = mask::TOP | mask::BOTTOM | mask::LEFT | mask::RIGHT;
        assert_eq!(
            compute_border_state(mask::ALL & !mask::BOTTOM_RIGHT),
            Border20::InsideBottomRight
        );
        assert_eq!(
            compute_border_state(sides | mask::TOP_LEFT | mask::BOTTOM_LEFT),
            Border20::InsideTopRight
        );
        assert_eq!(compute_border_state(sides), Border20::InsideTopLeft);
        assert_eq!(
            compute_border_state(mask::ALL & !(mask::TOP | mask::TOP_LEFT)),
            Border20::Top
        );
    }

    #[test]
    fn every_variant_round_trips_by_name_and_ordinal() {
        for (index, border) in Border20::ALL.into_iter().enumerate() {
            assert_eq!(border.ordinal(), index);
            assert_eq!(Border20::from_name(border.as_str()), Some(border));
        }
        assert_eq!(Border20::from_name("narrow_vertical"), Some(Border20::NarrowVertical));
        assert_eq!(Border20::from_name("diagonal"), None);
    }

    #[test]
    fn mask_treats_outside_cells_as_shared() {
        let shares = |col: i64, row: i64| {
            if col < 0 || row < 0 {
                None
            } else {
                Some(col == 0 || row == 0)
            }
        };
        // (0,0): outside neighbours shared, (1,1) is hidden.
        let neighbours = neighbour_mask(0, 0, shares);
        assert_eq!(neighbours, mask::ALL & !mask::TOP_RIGHT);
        assert_eq!(compute_border_state(neighbours), Border20::InsideTopRight);
    }
}
