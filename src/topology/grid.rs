//! Rectangular process grids.
//!
//! Ranks are laid out row-major: rank `r` sits at `(r / py, r % py)`.

use std::fmt;
use std::str::FromStr;

use crate::error::DistError;

/// Known-good factorizations of the supported process counts, `(count, px, py)`.
const GRID_TABLE: [(usize, usize, usize); 9] = [
    (1, 1, 1),
    (2, 1, 2),
    (4, 2, 2),
    (8, 2, 4),
    (16, 4, 4),
    (32, 4, 8),
    (64, 8, 8),
    (128, 8, 16),
    (256, 16, 16),
];

/// How a total process count is turned into a grid shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridPolicy {
    /// Closed lookup table; any other count is rejected.
    #[default]
    Table,
    /// Any positive count, factored by [`ProcessGrid::closest_to_square`].
    ClosestToSquare,
}

impl FromStr for GridPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(GridPolicy::Table),
            "square" | "closest-to-square" => Ok(GridPolicy::ClosestToSquare),
            other => Err(format!("unknown grid policy `{other}` (expected `table` or `square`)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGrid {
    pub px: usize,
    pub py: usize,
}

impl ProcessGrid {
    pub fn new(px: usize, py: usize) -> Self {
        assert!(px > 0 && py > 0, "grid dimensions must be positive");
        Self { px, py }
    }

    /// The 1x1 grid of a single-process run.
    pub fn single() -> Self {
        Self { px: 1, py: 1 }
    }

    /// A 1-D arrangement of `size` ranks along the second grid axis, so that
    /// west/east neighbors are `rank - 1` / `rank + 1`.
    pub fn linear(size: usize) -> Self {
        Self::new(1, size)
    }

    /// Grid shape for `count` processes from the static table.
    pub fn lookup(count: usize) -> Result<Self, DistError> {
        GRID_TABLE
            .iter()
            .find(|&&(n, _, _)| n == count)
            .map(|&(_, px, py)| Self { px, py })
            .ok_or(DistError::UnsupportedProcessCount { count })
    }

    /// Factor pair of `count` minimizing `|px - py|`; ties go to the larger `px`.
    pub fn closest_to_square(count: usize) -> Result<Self, DistError> {
        if count == 0 {
            return Err(DistError::UnsupportedProcessCount { count });
        }
        let mut best = Self { px: count, py: 1 };
        for px in 1..=count {
            if count % px != 0 {
                continue;
            }
            let py = count / px;
            let cand = px.abs_diff(py);
            let cur = best.px.abs_diff(best.py);
            if cand < cur || (cand == cur && px > best.px) {
                best = Self { px, py };
            }
        }
        Ok(best)
    }

    pub fn for_count(count: usize, policy: GridPolicy) -> Result<Self, DistError> {
        match policy {
            GridPolicy::Table => Self::lookup(count),
            GridPolicy::ClosestToSquare => Self::closest_to_square(count),
        }
    }

    pub fn size(&self) -> usize {
        self.px * self.py
    }

    /// Same ranks with the axes swapped.
    pub fn transposed(&self) -> Self {
        Self { px: self.py, py: self.px }
    }

    /// Grid with `px >= py`, used by kernels that assume a tall grid.
    pub fn tall(&self) -> Self {
        if self.px < self.py { self.transposed() } else { *self }
    }

    pub fn coord_of(&self, rank: usize) -> (usize, usize) {
        debug_assert!(rank < self.size());
        (rank / self.py, rank % self.py)
    }

    pub fn rank_of(&self, pi: usize, pj: usize) -> usize {
        debug_assert!(pi < self.px && pj < self.py);
        pi * self.py + pj
    }

    /// Ranks sharing grid row `pi`, ordered by column.
    pub fn row_ranks(&self, pi: usize) -> Vec<usize> {
        (0..self.py).map(|pj| self.rank_of(pi, pj)).collect()
    }

    /// Ranks sharing grid column `pj`, ordered by row.
    pub fn col_ranks(&self, pj: usize) -> Vec<usize> {
        (0..self.px).map(|pi| self.rank_of(pi, pj)).collect()
    }
}

impl fmt::Display for ProcessGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.px, self.py)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_powers_of_two() {
        for &(n, px, py) in GRID_TABLE.iter() {
            let g = ProcessGrid::lookup(n).unwrap();
            assert_eq!((g.px, g.py), (px, py));
            assert_eq!(g.size(), n);
        }
    }

    #[test]
    fn unsupported_count_is_rejected() {
        assert_eq!(
            ProcessGrid::lookup(3),
            Err(DistError::UnsupportedProcessCount { count: 3 })
        );
        assert!(ProcessGrid::lookup(0).is_err());
        assert!(ProcessGrid::lookup(512).is_err());
    }

    #[test]
    fn closest_to_square_tie_break() {
        assert_eq!(ProcessGrid::closest_to_square(8).unwrap(), ProcessGrid::new(4, 2));
        assert_eq!(ProcessGrid::closest_to_square(16).unwrap(), ProcessGrid::new(4, 4));
        assert_eq!(ProcessGrid::closest_to_square(3).unwrap(), ProcessGrid::new(3, 1));
        assert_eq!(ProcessGrid::closest_to_square(12).unwrap(), ProcessGrid::new(4, 3));
        assert_eq!(ProcessGrid::closest_to_square(1).unwrap(), ProcessGrid::single());
    }

    #[test]
    fn tall_grid_swaps_wide_shapes_only() {
        assert_eq!(ProcessGrid::new(2, 4).tall(), ProcessGrid::new(4, 2));
        assert_eq!(ProcessGrid::new(4, 2).tall(), ProcessGrid::new(4, 2));
    }

    #[test]
    fn row_and_col_ranks() {
        let g = ProcessGrid::new(2, 4);
        assert_eq!(g.row_ranks(1), vec![4, 5, 6, 7]);
        assert_eq!(g.col_ranks(2), vec![2, 6]);
    }
}
