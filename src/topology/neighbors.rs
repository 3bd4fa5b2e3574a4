//! Coordinate, neighbor ranks and boundary offsets of one rank.
//!
//! North/south move along grid axis 0 (`pi`), west/east along grid axis 1
//! (`pj`). A 1-D run uses [`ProcessGrid::linear`], so only west/east exist.
//! Grid edges are not periodic: a missing neighbor is `None` and the matching
//! halo offset is 1, which pulls the compute range one cell away from the
//! never-exchanged ghost layer.

use bitflags::bitflags;

use super::grid::ProcessGrid;
use crate::error::DistError;

/// Integer sentinel handed to kernels for a missing neighbor.
pub const NO_NEIGHBOR: i64 = -1;

bitflags! {
    /// Sides of the local block that lie on the global domain boundary.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Boundary: u8 {
        const NORTH = 0b0001;
        const SOUTH = 0b0010;
        const WEST  = 0b0100;
        const EAST  = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbors {
    pub north: Option<usize>,
    pub south: Option<usize>,
    pub west: Option<usize>,
    pub east: Option<usize>,
}

impl Neighbors {
    /// Ranks as kernel symbols, [`NO_NEIGHBOR`] where absent.
    pub fn as_symbols(&self) -> [i64; 4] {
        let f = |n: Option<usize>| n.map_or(NO_NEIGHBOR, |r| r as i64);
        [f(self.north), f(self.south), f(self.west), f(self.east)]
    }

    pub fn count(&self) -> usize {
        [self.north, self.south, self.west, self.east].iter().flatten().count()
    }
}

/// Per-side compute offsets: 1 on a grid edge, 0 where a neighbor exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offsets {
    pub north: usize,
    pub south: usize,
    pub west: usize,
    pub east: usize,
}

impl Offsets {
    /// Every side treated as a fixed boundary (single-process reference run).
    pub fn all_boundary() -> Self {
        Self { north: 1, south: 1, west: 1, east: 1 }
    }

    pub fn from_boundary(b: Boundary) -> Self {
        Self {
            north: b.contains(Boundary::NORTH) as usize,
            south: b.contains(Boundary::SOUTH) as usize,
            west: b.contains(Boundary::WEST) as usize,
            east: b.contains(Boundary::EAST) as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub grid: ProcessGrid,
    pub rank: usize,
    /// `(pi, pj)`
    pub coord: (usize, usize),
    pub neighbors: Neighbors,
    pub boundary: Boundary,
}

impl Topology {
    pub fn new(grid: ProcessGrid, rank: usize) -> Result<Self, DistError> {
        if rank >= grid.size() {
            return Err(DistError::RankOutOfRange { rank, size: grid.size() });
        }
        let (pi, pj) = grid.coord_of(rank);
        let neighbors = Neighbors {
            north: (pi > 0).then(|| grid.rank_of(pi - 1, pj)),
            south: (pi + 1 < grid.px).then(|| grid.rank_of(pi + 1, pj)),
            west: (pj > 0).then(|| grid.rank_of(pi, pj - 1)),
            east: (pj + 1 < grid.py).then(|| grid.rank_of(pi, pj + 1)),
        };
        let mut boundary = Boundary::empty();
        boundary.set(Boundary::NORTH, neighbors.north.is_none());
        boundary.set(Boundary::SOUTH, neighbors.south.is_none());
        boundary.set(Boundary::WEST, neighbors.west.is_none());
        boundary.set(Boundary::EAST, neighbors.east.is_none());
        Ok(Self { grid, rank, coord: (pi, pj), neighbors, boundary })
    }

    /// Topology of a lone process owning the whole problem.
    pub fn single() -> Self {
        Self {
            grid: ProcessGrid::single(),
            rank: 0,
            coord: (0, 0),
            neighbors: Neighbors::default(),
            boundary: Boundary::all(),
        }
    }

    pub fn offsets(&self) -> Offsets {
        Offsets::from_boundary(self.boundary)
    }

    pub fn pi(&self) -> usize {
        self.coord.0
    }

    pub fn pj(&self) -> usize {
        self.coord.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_and_interior_neighbors_on_4x4() {
        let g = ProcessGrid::new(4, 4);
        let corner = Topology::new(g, 0).unwrap();
        assert_eq!(corner.neighbors.north, None);
        assert_eq!(corner.neighbors.west, None);
        assert_eq!(corner.neighbors.south, Some(4));
        assert_eq!(corner.neighbors.east, Some(1));
        assert_eq!(corner.boundary, Boundary::NORTH | Boundary::WEST);
        assert_eq!(corner.offsets(), Offsets { north: 1, south: 0, west: 1, east: 0 });

        let inner = Topology::new(g, 5).unwrap();
        assert_eq!(inner.coord, (1, 1));
        assert_eq!(inner.neighbors.count(), 4);
        assert_eq!(inner.neighbors.as_symbols(), [1, 9, 4, 6]);
        assert!(inner.boundary.is_empty());
    }

    #[test]
    fn linear_grid_has_only_west_east() {
        let g = ProcessGrid::linear(4);
        let t = Topology::new(g, 3).unwrap();
        assert_eq!(t.neighbors.as_symbols(), [NO_NEIGHBOR, NO_NEIGHBOR, 2, NO_NEIGHBOR]);
        assert_eq!(t.offsets(), Offsets { north: 1, south: 1, west: 0, east: 1 });
    }

    #[test]
    fn single_is_all_boundary() {
        assert_eq!(Topology::single().offsets(), Offsets::all_boundary());
        assert_eq!(Topology::new(ProcessGrid::single(), 0).unwrap(), Topology::single());
    }
}
