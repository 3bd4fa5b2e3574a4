//! Gathering distributed results on one rank and checking them against a
//! single-process reference.
//!
//! Two gather paths exist:
//! - [`gather_blocks`] collects every rank's unpadded block in rank order
//!   into a staging array of shape `(Px, Py, l0, l1, rest..)` and permutes it
//!   to `(Px*l0, Py*l1, rest..)`.
//! - [`gather_offsets`] is point-to-point: the ranks owning distinct pieces
//!   of a 1-D distributed axis send them to the root, which writes each at
//!   its global offset. Replicated copies never travel.

use log::{debug, warn};
use num_traits::Float;
use std::fmt;

use crate::block::LocalBlock;
use crate::distribution::AxisDist;
use crate::error::DistError;
use crate::kernel::KernelArgs;
use crate::parallel::Comm;
use crate::topology::{ProcessGrid, Topology};

/// Pass threshold on the relative L2 error.
pub const THRESHOLD: f64 = 1e-12;

const TAG_OFFSET_GATHER: u16 = 0xE000;

/// `||reference - value||_2 / ||reference||_2`.
///
/// Identical arrays give exactly zero, including all-zero ones; a non-zero
/// difference against a zero reference gives infinity.
pub fn rel_l2_error<T: Float>(reference: &[T], value: &[T]) -> Result<T, DistError> {
    if reference.len() != value.len() {
        return Err(DistError::ShapeMismatch { expected: reference.len(), found: value.len() });
    }
    let mut diff = T::zero();
    let mut norm = T::zero();
    for (&r, &v) in reference.iter().zip(value) {
        let d = r - v;
        diff = diff + d * d;
        norm = norm + r * r;
    }
    if diff == T::zero() {
        return Ok(T::zero());
    }
    if norm == T::zero() {
        return Ok(T::infinity());
    }
    Ok((diff / norm).sqrt())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub name: String,
    pub error: f64,
    pub passed: bool,
}

impl ValidationResult {
    pub fn compare(name: &str, reference: &[f64], value: &[f64]) -> Result<Self, DistError> {
        let error = rel_l2_error(reference, value)?;
        let passed = error < THRESHOLD;
        if !passed {
            warn!("validation of `{name}` failed: relative error {error:e}");
        }
        Ok(Self { name: name.to_string(), error, passed })
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation: {} ({})", self.passed, self.error)
    }
}

/// How a kernel output is brought back to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherKind {
    /// Axes 0 and 1 cut over grid rows and columns; later axes whole.
    Blocks,
    /// Axis 0 cut as described; later axes whole. Sent point-to-point.
    Offsets(AxisDist),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: &'static str,
    pub global: Vec<usize>,
    pub gather: GatherKind,
}

impl OutputSpec {
    pub fn blocks(name: &'static str, global: Vec<usize>) -> Self {
        Self { name, global, gather: GatherKind::Blocks }
    }

    /// Vector cut over grid columns, replicated over rows.
    pub fn vector(name: &'static str, n: usize) -> Self {
        Self { name, global: vec![n], gather: GatherKind::Offsets(AxisDist::Cols) }
    }

    /// Leading axis cut over all ranks.
    pub fn slabs(name: &'static str, global: Vec<usize>) -> Self {
        Self { name, global, gather: GatherKind::Offsets(AxisDist::Ranks) }
    }
}

/// Permute a rank-ordered staging buffer `(Px, Py, l0, l1, rest..)` into the
/// global row-major array `(Px*l0, Py*l1, rest..)`.
///
/// Grid axis 0 interleaves with block axis 0 and grid axis 1 with block
/// axis 1.
pub fn reassemble(staged: &[f64], grid: ProcessGrid, local: &[usize]) -> Result<Vec<f64>, DistError> {
    if local.len() < 2 {
        return Err(DistError::ShapeMismatch { expected: 2, found: local.len() });
    }
    let (l0, l1) = (local[0], local[1]);
    let run: usize = local[2..].iter().product();
    let block_len = l0 * l1 * run;
    let expected = grid.size() * block_len;
    if staged.len() != expected {
        return Err(DistError::ShapeMismatch { expected, found: staged.len() });
    }
    let row = grid.py * l1 * run;
    let mut out = vec![0.0; expected];
    for (rank, block) in staged.chunks_exact(block_len.max(1)).enumerate().take(grid.size()) {
        let (pi, pj) = grid.coord_of(rank);
        for i in 0..l0 {
            for j in 0..l1 {
                let src = (i * l1 + j) * run;
                let dst = (pi * l0 + i) * row + (pj * l1 + j) * run;
                out[dst..dst + run].copy_from_slice(&block[src..src + run]);
            }
        }
    }
    Ok(out)
}

/// Collective: every rank contributes the interior of `block`; the root
/// returns the reassembled global array.
pub fn gather_blocks<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    block: &LocalBlock,
    root: usize,
) -> Result<Option<Vec<f64>>, DistError> {
    let staged = comm.gather(&block.interior(), root);
    match staged {
        Some(staged) => reassemble(&staged, topo.grid, block.shape()).map(Some),
        None => Ok(None),
    }
}

/// Whether this rank holds the canonical copy of its piece of an axis cut
/// by `dist`, and which piece it is.
fn owned_piece(dist: AxisDist, topo: &Topology) -> Option<usize> {
    match dist {
        AxisDist::Cols => (topo.pi() == 0).then(|| topo.pj()),
        AxisDist::Rows => (topo.pj() == 0).then(|| topo.pi()),
        AxisDist::Ranks => Some(topo.rank),
        AxisDist::Replicated => (topo.rank == 0).then_some(0),
    }
}

/// Point-to-point gather of a leading-axis distribution: owners send their
/// interior to `root`, which places piece `k` at offset `k * len`.
pub fn gather_offsets<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    block: &LocalBlock,
    dist: AxisDist,
    root: usize,
) -> Result<Option<Vec<f64>>, DistError> {
    let local = block.interior();
    let len = local.len();
    let grid = topo.grid;
    let owners: Vec<(usize, usize)> = (0..grid.size())
        .filter_map(|r| {
            let t = Topology::new(grid, r).ok()?;
            owned_piece(dist, &t).map(|k| (r, k))
        })
        .collect();

    if topo.rank != root {
        if owned_piece(dist, topo).is_some() {
            comm.send(root, TAG_OFFSET_GATHER, &local);
        }
        return Ok(None);
    }

    let mut out = vec![0.0; owners.len() * len];
    let remote: Vec<(usize, usize)> = owners.iter().copied().filter(|&(r, _)| r != root).collect();
    let recvs = remote.iter().map(|&(r, _)| comm.irecv(r, TAG_OFFSET_GATHER, len)).collect();
    let pieces = comm.wait_all(Vec::new(), recvs);
    for (&(_, k), piece) in remote.iter().zip(pieces) {
        if piece.len() != len {
            return Err(DistError::ShapeMismatch { expected: len, found: piece.len() });
        }
        out[k * len..(k + 1) * len].copy_from_slice(&piece);
    }
    if let Some(k) = owned_piece(dist, topo) {
        out[k * len..(k + 1) * len].copy_from_slice(&local);
    }
    Ok(Some(out))
}

/// Collective: gather every output named in `outputs` from `args`. The root
/// receives them in `outputs` order.
pub fn collect_outputs<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    args: &KernelArgs,
    outputs: &[OutputSpec],
    root: usize,
) -> Result<Option<Vec<Vec<f64>>>, DistError> {
    let mut gathered = Vec::with_capacity(outputs.len());
    for out in outputs {
        let block = args.buffer(out.name)?;
        let global = match out.gather {
            GatherKind::Blocks => gather_blocks(comm, topo, block, root)?,
            GatherKind::Offsets(dist) => gather_offsets(comm, topo, block, dist, root)?,
        };
        if let Some(g) = global {
            let expected: usize = out.global.iter().product();
            if g.len() != expected {
                return Err(DistError::ShapeMismatch { expected, found: g.len() });
            }
            gathered.push(g);
        }
    }
    debug!("rank {}: gathered {} outputs", comm.rank(), outputs.len());
    Ok((comm.rank() == root).then_some(gathered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zeros_against_zeros_pass() {
        let z = vec![0.0f64; 16];
        let r = ValidationResult::compare("A", &z, &z).unwrap();
        assert_eq!(r.error, 0.0);
        assert!(r.passed);
    }

    #[test]
    fn relative_error_values() {
        let e = rel_l2_error(&[3.0f64, 4.0], &[3.0, 3.0]).unwrap();
        assert_abs_diff_eq!(e, 0.2, epsilon = 1e-15);
        assert!(rel_l2_error(&[0.0f64], &[1.0]).unwrap().is_infinite());
        assert!(rel_l2_error(&[0.0f32; 2], &[0.0; 3]).is_err());
        let r = ValidationResult::compare("x", &[1.0], &[1.1]).unwrap();
        assert!(!r.passed);
    }

    #[test]
    fn reassemble_non_square_grid() {
        // 2x3 grid of 1x2 blocks holding their global column-major ids
        let grid = ProcessGrid::new(2, 3);
        let local = [1, 2];
        let mut staged = Vec::new();
        for rank in 0..6 {
            let (pi, pj) = grid.coord_of(rank);
            for j in 0..2 {
                staged.push((pi * 10 + pj * 2 + j) as f64);
            }
        }
        let out = reassemble(&staged, grid, &local).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn reassemble_keeps_trailing_axes_contiguous() {
        let grid = ProcessGrid::new(1, 2);
        let staged = vec![0.0, 1.0, 2.0, 3.0];
        // local (1, 1, 2): global (1, 2, 2)
        assert_eq!(reassemble(&staged, grid, &[1, 1, 2]).unwrap(), staged);
        assert!(reassemble(&staged, grid, &[2, 1, 2]).is_err());
    }
}
