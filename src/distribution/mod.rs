//! Exact block distribution of global arrays over a process grid.
//!
//! Every distributed axis is cut into equal contiguous blocks, one per grid
//! coordinate along that axis. There is no remainder policy: a global
//! dimension that does not divide evenly is rejected with
//! `DistError::NonDivisiblePartition` before anything is allocated.

use crate::error::DistError;
use crate::topology::{GridPolicy, ProcessGrid, Topology};

/// Size of one block when `global` is cut into `parts` equal pieces.
pub fn block_size(dim: usize, global: usize, parts: usize) -> Result<usize, DistError> {
    if parts == 0 || global % parts != 0 {
        return Err(DistError::NonDivisiblePartition { dim, global, parts });
    }
    Ok(global / parts)
}

/// Local-to-global index: `local + coord * block`.
#[inline]
pub fn l2g(local: usize, coord: usize, block: usize) -> usize {
    local + coord * block
}

/// How one axis of an array is spread over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisDist {
    /// Whole axis on every rank.
    Replicated,
    /// Cut over grid rows (`px` blocks, indexed by `pi`).
    Rows,
    /// Cut over grid columns (`py` blocks, indexed by `pj`).
    Cols,
    /// Cut over all ranks in rank order (`px * py` blocks).
    Ranks,
}

impl AxisDist {
    pub fn parts(&self, grid: ProcessGrid) -> usize {
        match self {
            AxisDist::Replicated => 1,
            AxisDist::Rows => grid.px,
            AxisDist::Cols => grid.py,
            AxisDist::Ranks => grid.size(),
        }
    }

    pub fn coord(&self, topo: &Topology) -> usize {
        match self {
            AxisDist::Replicated => 0,
            AxisDist::Rows => topo.pi(),
            AxisDist::Cols => topo.pj(),
            AxisDist::Ranks => topo.rank,
        }
    }
}

/// Global shape of one array plus the distribution of each of its axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpec {
    pub global: Vec<usize>,
    pub axes: Vec<AxisDist>,
}

impl BlockSpec {
    pub fn new(global: Vec<usize>, axes: Vec<AxisDist>) -> Self {
        assert_eq!(global.len(), axes.len(), "one distribution per axis");
        Self { global, axes }
    }

    /// `m x n` matrix cut into `px x py` blocks.
    pub fn matrix(m: usize, n: usize) -> Self {
        Self::new(vec![m, n], vec![AxisDist::Rows, AxisDist::Cols])
    }

    /// Vector cut over grid columns and replicated over grid rows.
    pub fn col_vector(n: usize) -> Self {
        Self::new(vec![n], vec![AxisDist::Cols])
    }

    /// Vector cut over grid rows and replicated over grid columns.
    pub fn row_vector(n: usize) -> Self {
        Self::new(vec![n], vec![AxisDist::Rows])
    }

    pub fn replicated(shape: Vec<usize>) -> Self {
        let axes = vec![AxisDist::Replicated; shape.len()];
        Self::new(shape, axes)
    }

    pub fn ndim(&self) -> usize {
        self.global.len()
    }

    /// Block length of every axis on `grid`.
    pub fn local_shape(&self, grid: ProcessGrid) -> Result<Vec<usize>, DistError> {
        self.global
            .iter()
            .zip(&self.axes)
            .enumerate()
            .map(|(dim, (&g, ax))| block_size(dim, g, ax.parts(grid)))
            .collect()
    }

    /// Global index of this rank's local element `[0, 0, ...]`.
    pub fn origin(&self, topo: &Topology) -> Result<Vec<usize>, DistError> {
        let local = self.local_shape(topo.grid)?;
        Ok(self
            .axes
            .iter()
            .zip(&local)
            .map(|(ax, &l)| l2g(0, ax.coord(topo), l))
            .collect())
    }

    pub fn global_len(&self) -> usize {
        self.global.iter().product()
    }
}

/// Result of resolving one rank's place in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub topology: Topology,
    pub local_dims: Vec<usize>,
}

impl Decomposition {
    /// Resolve grid, coordinate, neighbors and local dimensions of `rank`.
    ///
    /// With one global dimension the ranks form a 1-D chain; with two or more
    /// the first two dimensions are cut over grid rows and columns and the
    /// rest stay whole.
    pub fn new(
        rank: usize,
        total: usize,
        global: &[usize],
        policy: GridPolicy,
    ) -> Result<Self, DistError> {
        let grid = ProcessGrid::for_count(total, policy)?;
        let (grid, spec) = match global.len() {
            0 => (grid, BlockSpec::replicated(Vec::new())),
            1 => (ProcessGrid::linear(total), BlockSpec::col_vector(global[0])),
            _ => {
                let mut axes = vec![AxisDist::Rows, AxisDist::Cols];
                axes.resize(global.len(), AxisDist::Replicated);
                (grid, BlockSpec::new(global.to_vec(), axes))
            }
        };
        let local_dims = spec.local_shape(grid)?;
        let topology = Topology::new(grid, rank)?;
        Ok(Self { topology, local_dims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_division_only() {
        assert_eq!(block_size(0, 16, 4), Ok(4));
        assert_eq!(
            block_size(1, 10, 4),
            Err(DistError::NonDivisiblePartition { dim: 1, global: 10, parts: 4 })
        );
    }

    #[test]
    fn matrix_origin_follows_coordinate() {
        let grid = ProcessGrid::new(2, 4);
        let topo = Topology::new(grid, 6).unwrap(); // (1, 2)
        let spec = BlockSpec::matrix(8, 16);
        assert_eq!(spec.local_shape(grid).unwrap(), vec![4, 4]);
        assert_eq!(spec.origin(&topo).unwrap(), vec![4, 8]);
    }

    #[test]
    fn decomposition_of_three_dims_keeps_last_axis() {
        let d = Decomposition::new(3, 4, &[8, 8, 5], GridPolicy::Table).unwrap();
        assert_eq!(d.topology.coord, (1, 1));
        assert_eq!(d.local_dims, vec![4, 4, 5]);
    }

    #[test]
    fn decomposition_rejects_bad_counts_and_sizes() {
        assert_eq!(
            Decomposition::new(0, 3, &[12, 12], GridPolicy::Table),
            Err(DistError::UnsupportedProcessCount { count: 3 })
        );
        assert!(matches!(
            Decomposition::new(0, 4, &[9, 8], GridPolicy::Table),
            Err(DistError::NonDivisiblePartition { dim: 0, .. })
        ));
    }

    #[test]
    fn one_dimension_uses_a_chain() {
        let d = Decomposition::new(2, 4, &[16], GridPolicy::Table).unwrap();
        assert_eq!(d.local_dims, vec![4]);
        assert_eq!(d.topology.neighbors.west, Some(1));
        assert_eq!(d.topology.neighbors.east, Some(3));
    }
}
