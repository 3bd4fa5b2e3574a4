//! Redistribution and local products used inside the dense kernels.
//!
//! Matrices are cut into `Px x Py` blocks. Vectors are cut over grid columns
//! and replicated over grid rows unless stated otherwise. Mat-vec products
//! multiply the local panel and sum the zero-padded partial results over the
//! world; matrix products assemble a full row panel of the left operand and a
//! full column panel of the right operand, then multiply locally with faer.

use faer::Mat;

use crate::block::LocalBlock;
use crate::distribution::AxisDist;
use crate::error::DistError;
use crate::parallel::Comm;
use crate::topology::Topology;

pub(crate) fn to_mat(b: &LocalBlock) -> Result<Mat<f64>, DistError> {
    if b.ndim() != 2 || b.has_halo() {
        return Err(DistError::ShapeMismatch { expected: 2, found: b.ndim() });
    }
    let (m, n) = (b.shape()[0], b.shape()[1]);
    let data = b.as_slice();
    Ok(Mat::from_fn(m, n, |i, j| data[i * n + j]))
}

pub(crate) fn store_mat(b: &mut LocalBlock, m: &Mat<f64>) -> Result<(), DistError> {
    let n = m.ncols();
    let expected = b.shape().iter().product::<usize>();
    if m.nrows() * n != expected || b.has_halo() {
        return Err(DistError::ShapeMismatch { expected, found: m.nrows() * n });
    }
    for (k, v) in b.as_mut_slice().iter_mut().enumerate() {
        *v = m[(k / n, k % n)];
    }
    Ok(())
}

/// Full copy of a vector cut by `dist`. Only the canonical owner of each
/// piece contributes, so the all-reduce adds exact zeros elsewhere.
pub fn assemble_vector<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    local: &[f64],
    dist: AxisDist,
) -> Vec<f64> {
    let parts = dist.parts(topo.grid);
    let len = local.len();
    let mut full = vec![0.0; parts * len];
    let owner = match dist {
        AxisDist::Cols => topo.pi() == 0,
        AxisDist::Rows => topo.pj() == 0,
        AxisDist::Ranks => true,
        AxisDist::Replicated => topo.rank == 0,
    };
    if owner {
        let k = dist.coord(topo);
        full[k * len..(k + 1) * len].copy_from_slice(local);
    }
    comm.all_reduce_sum(&mut full);
    full
}

/// `A x` for a block-cut `A` (`lm x ln`) and the segment of `x` matching this
/// rank's columns. Returns the full result of length `Px * lm` on every rank.
pub fn matvec<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    a: &LocalBlock,
    x_cols: &[f64],
) -> Result<Vec<f64>, DistError> {
    let a = to_mat(a)?;
    if x_cols.len() != a.ncols() {
        return Err(DistError::ShapeMismatch { expected: a.ncols(), found: x_cols.len() });
    }
    let x = Mat::from_fn(a.ncols(), 1, |i, _| x_cols[i]);
    let y = &a * &x;
    let lm = a.nrows();
    let mut full = vec![0.0; topo.grid.px * lm];
    let base = topo.pi() * lm;
    for i in 0..lm {
        full[base + i] = y[(i, 0)];
    }
    comm.all_reduce_sum(&mut full);
    Ok(full)
}

/// `x A` for a block-cut `A` (`lm x ln`) and the segment of `x` matching this
/// rank's rows. Returns the full result of length `Py * ln` on every rank.
pub fn vecmat<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    x_rows: &[f64],
    a: &LocalBlock,
) -> Result<Vec<f64>, DistError> {
    let a = to_mat(a)?;
    if x_rows.len() != a.nrows() {
        return Err(DistError::ShapeMismatch { expected: a.nrows(), found: x_rows.len() });
    }
    let x = Mat::from_fn(1, a.nrows(), |_, j| x_rows[j]);
    let y = &x * &a;
    let ln = a.ncols();
    let mut full = vec![0.0; topo.grid.py * ln];
    let base = topo.pj() * ln;
    for j in 0..ln {
        full[base + j] = y[(0, j)];
    }
    comm.all_reduce_sum(&mut full);
    Ok(full)
}

/// Piece `coord` of length `len` of a full vector.
pub fn segment(full: &[f64], coord: usize, len: usize) -> Result<&[f64], DistError> {
    full.get(coord * len..(coord + 1) * len)
        .ok_or(DistError::ShapeMismatch { expected: (coord + 1) * len, found: full.len() })
}

/// The `lm x (Py * ln)` row panel holding every block of this grid row.
pub fn row_panel<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    a: &LocalBlock,
) -> Result<Mat<f64>, DistError> {
    let local = to_mat(a)?;
    let (lm, ln) = (local.nrows(), local.ncols());
    let blocks = comm.all_gather_group(&topo.grid.row_ranks(topo.pi()), a.as_slice());
    check_blocks(&blocks, lm * ln)?;
    Ok(Mat::from_fn(lm, blocks.len() * ln, |i, j| blocks[j / ln][i * ln + j % ln]))
}

/// The `(Px * lm) x ln` column panel holding every block of this grid
/// column.
pub fn col_panel<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    b: &LocalBlock,
) -> Result<Mat<f64>, DistError> {
    let local = to_mat(b)?;
    let (lm, ln) = (local.nrows(), local.ncols());
    let blocks = comm.all_gather_group(&topo.grid.col_ranks(topo.pj()), b.as_slice());
    check_blocks(&blocks, lm * ln)?;
    Ok(Mat::from_fn(blocks.len() * lm, ln, |i, j| blocks[i / lm][(i % lm) * ln + j]))
}

fn check_blocks(blocks: &[Vec<f64>], len: usize) -> Result<(), DistError> {
    match blocks.iter().find(|b| b.len() != len) {
        Some(b) => Err(DistError::ShapeMismatch { expected: len, found: b.len() }),
        None => Ok(()),
    }
}

/// This rank's block of `A B`, where both operands are block-cut on the same
/// grid and the inner dimension divides by both `Px` and `Py`.
pub fn block_matmul<C: Comm + ?Sized>(
    comm: &C,
    topo: &Topology,
    a: &LocalBlock,
    b: &LocalBlock,
) -> Result<Mat<f64>, DistError> {
    let ap = row_panel(comm, topo, a)?;
    let bp = col_panel(comm, topo, b)?;
    if ap.ncols() != bp.nrows() {
        return Err(DistError::ShapeMismatch { expected: ap.ncols(), found: bp.nrows() });
    }
    Ok(&ap * &bp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::init_block;
    use crate::distribution::BlockSpec;
    use crate::parallel::ThreadUniverse;
    use crate::topology::ProcessGrid;
    use approx::assert_abs_diff_eq;

    fn a_of(g: &[usize]) -> f64 {
        (g[0] * 3 + g[1]) as f64 / 7.0
    }

    #[test]
    fn distributed_matvec_matches_serial() {
        let (m, n) = (4, 6);
        let x: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
        let expected: Vec<f64> =
            (0..m).map(|i| (0..n).map(|j| a_of(&[i, j]) * x[j]).sum()).collect();
        let results = ThreadUniverse::run(4, |comm| {
            let topo = Topology::new(ProcessGrid::new(2, 2), comm.rank()).unwrap();
            let a = init_block(&BlockSpec::matrix(m, n), &topo, &[0, 0], a_of).unwrap();
            let xs = segment(&x, topo.pj(), n / 2).unwrap();
            matvec(comm, &topo, &a, xs).unwrap()
        });
        for r in results {
            for (got, want) in r.iter().zip(&expected) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn block_matmul_on_wide_grid() {
        let (m, k, n) = (4, 4, 8);
        let b_of = |g: &[usize]| (g[0] + 2 * g[1]) as f64 / 5.0;
        let blocks = ThreadUniverse::run(8, |comm| {
            let topo = Topology::new(ProcessGrid::new(2, 4), comm.rank()).unwrap();
            let a = init_block(&BlockSpec::matrix(m, k), &topo, &[0, 0], a_of).unwrap();
            let b = init_block(&BlockSpec::matrix(k, n), &topo, &[0, 0], b_of).unwrap();
            let c = block_matmul(comm, &topo, &a, &b).unwrap();
            (topo.coord, c)
        });
        for ((pi, pj), c) in blocks {
            assert_eq!((c.nrows(), c.ncols()), (2, 2));
            for i in 0..2 {
                for j in 0..2 {
                    let (gi, gj) = (pi * 2 + i, pj * 2 + j);
                    let want: f64 = (0..k).map(|l| a_of(&[gi, l]) * b_of(&[l, gj])).sum();
                    assert_abs_diff_eq!(c[(i, j)], want, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn assemble_uses_first_grid_row_only() {
        let full = ThreadUniverse::run(4, |comm| {
            let topo = Topology::new(ProcessGrid::new(2, 2), comm.rank()).unwrap();
            let local = [topo.pj() as f64 * 2.0, topo.pj() as f64 * 2.0 + 1.0];
            assemble_vector(comm, &topo, &local, AxisDist::Cols)
        });
        for f in full {
            assert_eq!(f, vec![0.0, 1.0, 2.0, 3.0]);
        }
    }
}
