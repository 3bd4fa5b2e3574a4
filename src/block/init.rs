use log::debug;

use super::LocalBlock;
use crate::distribution::BlockSpec;
use crate::error::DistError;
use crate::topology::Topology;

/// Allocate this rank's block of `spec` and fill its interior with
/// `f(global_index)`.
///
/// `halo[a]` is the ghost width of axis `a` (0 or 1); ghost cells stay zero.
/// Nothing is communicated. Running the same `f` on a 1x1 grid yields the
/// union of all distributed blocks bit for bit.
pub fn init_block<F>(
    spec: &BlockSpec,
    topo: &Topology,
    halo: &[usize],
    f: F,
) -> Result<LocalBlock, DistError>
where
    F: Fn(&[usize]) -> f64 + Sync,
{
    if halo.len() != spec.ndim() {
        return Err(DistError::ShapeMismatch { expected: spec.ndim(), found: halo.len() });
    }
    let local = spec.local_shape(topo.grid)?;
    let origin = spec.origin(topo)?;
    let mut block = LocalBlock::with_halo(&local, halo);
    block.fill_interior(|li| {
        // stack scratch for the common low-rank case
        let mut gi = [0usize; 8];
        let n = li.len();
        if n <= gi.len() {
            for (g, (l, o)) in gi.iter_mut().zip(li.iter().zip(&origin)) {
                *g = l + o;
            }
            f(&gi[..n])
        } else {
            let gi: Vec<usize> = li.iter().zip(&origin).map(|(l, o)| l + o).collect();
            f(&gi)
        }
    });
    debug!("rank {}: initialised block {:?} at origin {:?}", topo.rank, local, origin);
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ProcessGrid;

    #[test]
    fn interior_is_global_function() {
        let grid = ProcessGrid::new(2, 2);
        let topo = Topology::new(grid, 3).unwrap();
        let spec = BlockSpec::matrix(4, 6);
        let b = init_block(&spec, &topo, &[1, 1], |g| (g[0] * 100 + g[1]) as f64).unwrap();
        assert_eq!(b.shape(), &[2, 3]);
        assert_eq!(b.get(&[1, 1]), 203.0);
        assert_eq!(b.get(&[2, 3]), 305.0);
        assert_eq!(b.get(&[0, 1]), 0.0);
    }

    #[test]
    fn non_divisible_spec_fails_before_allocating() {
        let topo = Topology::new(ProcessGrid::new(2, 2), 0).unwrap();
        let err = init_block(&BlockSpec::matrix(5, 4), &topo, &[0, 0], |_| 1.0).unwrap_err();
        assert_eq!(err, DistError::NonDivisiblePartition { dim: 0, global: 5, parts: 2 });
    }
}
