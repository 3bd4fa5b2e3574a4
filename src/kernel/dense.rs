//! Dense linear-algebra kernels.
//!
//! Matrices are cut into `Px x Py` blocks; vectors are cut over grid columns
//! and replicated over grid rows, except the row-aligned `u1`/`u2` of
//! `gemver`. `doitgen` cuts its leading axis over all ranks. The products
//! kernels (`gemm`, `k2mm`, `k3mm`) run on a tall grid.
//!
//! References are computed with faer on the full arrays, initialised by the
//! same global-index functions as the distributed blocks.

use faer::Mat;
use log::debug;

use super::collective::{
    assemble_vector, block_matmul, matvec, segment, store_mat, to_mat, vecmat,
};
use super::{Benchmark, KernelArgs, KernelFn};
use crate::block::{init_block, LocalBlock};
use crate::distribution::{AxisDist, BlockSpec};
use crate::error::DistError;
use crate::parallel::Comm;
use crate::topology::{ProcessGrid, Topology};
use crate::validation::OutputSpec;

const ALPHA: f64 = 1.5;
const BETA: f64 = 1.2;

#[inline]
fn frac(num: usize, den: usize) -> f64 {
    num as f64 / den as f64
}

/// Validate every partition before anything is allocated.
fn check_partition(specs: &[&BlockSpec], grid: ProcessGrid) -> Result<(), DistError> {
    for s in specs {
        s.local_shape(grid)?;
    }
    Ok(())
}

fn halo_free(spec: &BlockSpec, topo: &Topology, f: impl Fn(&[usize]) -> f64 + Sync) -> Result<LocalBlock, DistError> {
    init_block(spec, topo, &vec![0; spec.ndim()], f)
}

fn zeros(spec: &BlockSpec, topo: &Topology) -> Result<LocalBlock, DistError> {
    Ok(LocalBlock::zeros(&spec.local_shape(topo.grid)?))
}

fn dense_args(topo: &Topology) -> KernelArgs {
    let mut args = KernelArgs::new();
    args.set_topology(topo);
    args
}

fn full_mat(m: usize, n: usize, f: impl Fn(&[usize]) -> f64) -> Mat<f64> {
    Mat::from_fn(m, n, |i, j| f(&[i, j]))
}

fn full_col(n: usize, f: impl Fn(&[usize]) -> f64) -> Mat<f64> {
    Mat::from_fn(n, 1, |i, _| f(&[i]))
}

fn full_row(n: usize, f: impl Fn(&[usize]) -> f64) -> Mat<f64> {
    Mat::from_fn(1, n, |_, j| f(&[j]))
}

/// Row-major contents of a matrix (a column or row vector flattens to its
/// entries).
fn flatten(m: &Mat<f64>) -> Vec<f64> {
    (0..m.nrows())
        .flat_map(|i| (0..m.ncols()).map(move |j| m[(i, j)]))
        .collect()
}

fn from_mat(m: &Mat<f64>) -> Result<LocalBlock, DistError> {
    LocalBlock::from_vec(&[m.nrows(), m.ncols()], flatten(m))
}

/// `dst[k] = f(k, dst[k])` over a vector buffer.
fn update(args: &mut KernelArgs, name: &'static str, f: impl Fn(usize, f64) -> f64) -> Result<(), DistError> {
    for (k, v) in args.buffer_mut(name)?.as_mut_slice().iter_mut().enumerate() {
        *v = f(k, *v);
    }
    Ok(())
}

/// Overwrite a vector buffer with `values`.
fn store(args: &mut KernelArgs, name: &'static str, values: &[f64]) -> Result<(), DistError> {
    let buf = args.buffer_mut(name)?.as_mut_slice();
    if buf.len() != values.len() {
        return Err(DistError::ShapeMismatch { expected: buf.len(), found: values.len() });
    }
    buf.copy_from_slice(values);
    Ok(())
}

/// `C = alpha * tmp + beta * C` on a local block.
fn axpby_block(args: &mut KernelArgs, name: &'static str, tmp: &Mat<f64>, alpha: f64, beta: f64) -> Result<(), DistError> {
    let c = args.buffer_mut(name)?;
    let ln = tmp.ncols();
    let expected = c.shape().iter().product::<usize>();
    if tmp.nrows() * ln != expected {
        return Err(DistError::ShapeMismatch { expected, found: tmp.nrows() * ln });
    }
    for (k, v) in c.as_mut_slice().iter_mut().enumerate() {
        *v = alpha * tmp[(k / ln, k % ln)] + beta * *v;
    }
    Ok(())
}

// ----- atax -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Atax;

impl Atax {
    fn a(m: usize, n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] + g[1]) % n, 5 * m)
    }
    fn x(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| 1.0 + frac(g[0], n)
    }
}

/// `y = (A x) A`
pub fn atax_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let a = args.buffer("A")?;
    let (lm, ln) = (a.shape()[0], a.shape()[1]);
    let tmp = matvec(comm, &topo, a, args.buffer("x")?.as_slice())?;
    let y = vecmat(comm, &topo, segment(&tmp, topo.pi(), lm)?, a)?;
    let y = segment(&y, topo.pj(), ln)?.to_vec();
    store(args, "y", &y)
}

impl Benchmark for Atax {
    fn name(&self) -> &'static str {
        "atax"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["M", "N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![1800, 2200], vec![3600, 4400], vec![7200, 8800], vec![14400, 17600]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let (m, n) = (sizes[0], sizes[1]);
        let (sa, sv) = (BlockSpec::matrix(m, n), BlockSpec::col_vector(n));
        check_partition(&[&sa, &sv], topo.grid)?;
        let mut args = dense_args(topo);
        let a = halo_free(&sa, topo, Self::a(m, n))?;
        args.set_symbol("lM", a.shape()[0] as i64);
        args.set_symbol("lN", a.shape()[1] as i64);
        args.insert_buffer("A", a);
        args.insert_buffer("x", halo_free(&sv, topo, Self::x(n))?);
        args.insert_buffer("y", zeros(&sv, topo)?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        atax_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::vector("y", sizes[1])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (m, n) = (sizes[0], sizes[1]);
        let a = full_mat(m, n, Self::a(m, n));
        let x = full_col(n, Self::x(n));
        let tmp = &a * &x;
        let tmp = Mat::from_fn(1, m, |_, j| tmp[(j, 0)]);
        Ok(vec![flatten(&(&tmp * &a))])
    }
}

// ----- bicg -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Bicg;

impl Bicg {
    fn a(m: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * (g[1] + 1) % m, m)
    }
    fn p(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] % n, n)
    }
    fn r(m: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] % m, m)
    }
}

/// `o1 = r A`, `o2 = A p`
pub fn bicg_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let a = args.buffer("A")?;
    let (lm, ln) = (a.shape()[0], a.shape()[1]);
    let r = assemble_vector(comm, &topo, args.buffer("r")?.as_slice(), AxisDist::Cols);
    let o1 = vecmat(comm, &topo, segment(&r, topo.pi(), lm)?, a)?;
    let o2 = matvec(comm, &topo, a, args.buffer("p")?.as_slice())?;
    let lmy = args.buffer("o2")?.shape()[0];
    let o1 = segment(&o1, topo.pj(), ln)?.to_vec();
    let o2 = segment(&o2, topo.pj(), lmy)?.to_vec();
    store(args, "o1", &o1)?;
    store(args, "o2", &o2)
}

impl Benchmark for Bicg {
    fn name(&self) -> &'static str {
        "bicg"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["M", "N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![2200, 1800], vec![4400, 3600], vec![7200, 8800]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let (m, n) = (sizes[0], sizes[1]);
        let sa = BlockSpec::matrix(m, n);
        let (sn, sm) = (BlockSpec::col_vector(n), BlockSpec::col_vector(m));
        check_partition(&[&sa, &sn, &sm], topo.grid)?;
        let mut args = dense_args(topo);
        args.insert_buffer("A", halo_free(&sa, topo, Self::a(m))?);
        args.insert_buffer("p", halo_free(&sn, topo, Self::p(n))?);
        args.insert_buffer("r", halo_free(&sm, topo, Self::r(m))?);
        args.insert_buffer("o1", zeros(&sn, topo)?);
        args.insert_buffer("o2", zeros(&sm, topo)?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        bicg_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::vector("o1", sizes[1]), OutputSpec::vector("o2", sizes[0])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (m, n) = (sizes[0], sizes[1]);
        let a = full_mat(m, n, Self::a(m));
        let o1 = &full_row(m, Self::r(m)) * &a;
        let o2 = &a * &full_col(n, Self::p(n));
        Ok(vec![flatten(&o1), flatten(&o2)])
    }
}

// ----- doitgen -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Doitgen;

impl Doitgen {
    fn spec(nr: usize, nq: usize, np: usize) -> BlockSpec {
        BlockSpec::new(
            vec![nr, nq, np],
            vec![AxisDist::Ranks, AxisDist::Replicated, AxisDist::Replicated],
        )
    }
    fn a(np: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * g[1] + g[2]) % np, np)
    }
    fn c4(np: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * g[1] % np, np)
    }

    fn apply(slabs: &mut [f64], nq: usize, c4: &Mat<f64>) {
        let np = c4.nrows();
        for slab in slabs.chunks_exact_mut((nq * np).max(1)) {
            let s = Mat::from_fn(nq, np, |q, p| slab[q * np + p]);
            let prod = &s * c4;
            for (k, v) in slab.iter_mut().enumerate() {
                *v = prod[(k / np, k % np)];
            }
        }
    }
}

/// `A[r] = A[r] C4` for every local slab `r`.
pub fn doitgen_kernel(_comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let c4 = to_mat(args.buffer("C4")?)?;
    let a = args.buffer_mut("A")?;
    let nq = a.shape()[1];
    Doitgen::apply(a.as_mut_slice(), nq, &c4);
    Ok(())
}

impl Benchmark for Doitgen {
    fn name(&self) -> &'static str {
        "doitgen"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["NR", "NQ", "NP"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![256, 250, 270], vec![512, 500, 540]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let (nr, nq, np) = (sizes[0], sizes[1], sizes[2]);
        let sa = Self::spec(nr, nq, np);
        let sc = BlockSpec::replicated(vec![np, np]);
        check_partition(&[&sa], topo.grid)?;
        let mut args = dense_args(topo);
        let a = halo_free(&sa, topo, Self::a(np))?;
        args.set_symbol("lR", a.shape()[0] as i64);
        args.insert_buffer("A", a);
        args.insert_buffer("C4", halo_free(&sc, topo, Self::c4(np))?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        doitgen_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::slabs("A", sizes.to_vec())]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (nr, nq, np) = (sizes[0], sizes[1], sizes[2]);
        let fa = Self::a(np);
        let mut a: Vec<f64> = (0..nr * nq * np)
            .map(|k| fa(&[k / (nq * np), (k / np) % nq, k % np]))
            .collect();
        let c4 = full_mat(np, np, Self::c4(np));
        Self::apply(&mut a, nq, &c4);
        Ok(vec![a])
    }
}

// ----- gemm -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Gemm;

impl Gemm {
    fn c(ni: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * g[1] + 1) % ni, ni)
    }
    fn a(nk: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * (g[1] + 1) % nk, nk)
    }
    fn b(nj: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * (g[1] + 2) % nj, nj)
    }
}

/// `C = alpha A B + beta C`
pub fn gemm_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let (alpha, beta) = (args.scalar("alpha")?, args.scalar("beta")?);
    let tmp = block_matmul(comm, &topo, args.buffer("A")?, args.buffer("B")?)?;
    axpby_block(args, "C", &tmp, alpha, beta)
}

impl Benchmark for Gemm {
    fn name(&self) -> &'static str {
        "gemm"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["NI", "NJ", "NK"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![2000, 2300, 2600], vec![4000, 4600, 5200]]
    }
    fn adjust_grid(&self, grid: ProcessGrid) -> ProcessGrid {
        grid.tall()
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let (ni, nj, nk) = (sizes[0], sizes[1], sizes[2]);
        let (sc, sa, sb) =
            (BlockSpec::matrix(ni, nj), BlockSpec::matrix(ni, nk), BlockSpec::matrix(nk, nj));
        check_partition(&[&sc, &sa, &sb], topo.grid)?;
        let mut args = dense_args(topo);
        args.set_scalar("alpha", ALPHA);
        args.set_scalar("beta", BETA);
        args.insert_buffer("C", halo_free(&sc, topo, Self::c(ni))?);
        args.insert_buffer("A", halo_free(&sa, topo, Self::a(nk))?);
        args.insert_buffer("B", halo_free(&sb, topo, Self::b(nj))?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        gemm_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::blocks("C", vec![sizes[0], sizes[1]])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (ni, nj, nk) = (sizes[0], sizes[1], sizes[2]);
        let c = full_mat(ni, nj, Self::c(ni));
        let ab = &full_mat(ni, nk, Self::a(nk)) * &full_mat(nk, nj, Self::b(nj));
        let out = Mat::from_fn(ni, nj, |i, j| ALPHA * ab[(i, j)] + BETA * c[(i, j)]);
        Ok(vec![flatten(&out)])
    }
}

// ----- gemver -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Gemver;

impl Gemver {
    fn a(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * g[1] % n, n)
    }
    /// `((i + 1) / N) / div`
    fn ramp(n: usize, div: f64) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] + 1, n) / div
    }
}

/// Rank-2 update of `A`, then `x += beta y A + z` and `w += alpha A x`.
pub fn gemver_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let (alpha, beta) = (args.scalar("alpha")?, args.scalar("beta")?);
    {
        let [a, u1, u2, v1, v2] = args.buffers_mut(["A", "u1", "u2", "v1", "v2"])?;
        let ln = a.shape()[1];
        let (u1, u2, v1, v2) = (u1.as_slice(), u2.as_slice(), v1.as_slice(), v2.as_slice());
        for (k, v) in a.as_mut_slice().iter_mut().enumerate() {
            let (i, j) = (k / ln, k % ln);
            *v += u1[i] * v1[j] + u2[i] * v2[j];
        }
    }
    let a = args.buffer("A")?;
    let (lm, ln) = (a.shape()[0], a.shape()[1]);
    let y = assemble_vector(comm, &topo, args.buffer("y")?.as_slice(), AxisDist::Cols);
    let t1 = vecmat(comm, &topo, segment(&y, topo.pi(), lm)?, a)?;
    let t1 = segment(&t1, topo.pj(), ln)?.to_vec();
    let z = args.buffer("z")?.as_slice().to_vec();
    update(args, "x", |j, x| x + (beta * t1[j] + z[j]))?;

    let t2 = matvec(comm, &topo, args.buffer("A")?, args.buffer("x")?.as_slice())?;
    let lw = args.buffer("w")?.shape()[0];
    let t2 = segment(&t2, topo.pj(), lw)?.to_vec();
    update(args, "w", |j, w| w + alpha * t2[j])
}

impl Benchmark for Gemver {
    fn name(&self) -> &'static str {
        "gemver"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![4000], vec![8000]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[0];
        let (sa, sr, sc) = (BlockSpec::matrix(n, n), BlockSpec::row_vector(n), BlockSpec::col_vector(n));
        check_partition(&[&sa, &sr, &sc], topo.grid)?;
        let mut args = dense_args(topo);
        args.set_scalar("alpha", ALPHA);
        args.set_scalar("beta", BETA);
        args.insert_buffer("A", halo_free(&sa, topo, Self::a(n))?);
        args.insert_buffer("u1", halo_free(&sr, topo, |g| g[0] as f64)?);
        args.insert_buffer("u2", halo_free(&sr, topo, Self::ramp(n, 2.0))?);
        args.insert_buffer("v1", halo_free(&sc, topo, Self::ramp(n, 4.0))?);
        args.insert_buffer("v2", halo_free(&sc, topo, Self::ramp(n, 6.0))?);
        args.insert_buffer("w", zeros(&sc, topo)?);
        args.insert_buffer("x", zeros(&sc, topo)?);
        args.insert_buffer("y", halo_free(&sc, topo, Self::ramp(n, 8.0))?);
        args.insert_buffer("z", halo_free(&sc, topo, Self::ramp(n, 9.0))?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        gemver_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        let n = sizes[0];
        vec![
            OutputSpec::blocks("A", vec![n, n]),
            OutputSpec::vector("x", n),
            OutputSpec::vector("w", n),
        ]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[0];
        let (u2, v1, v2) = (Self::ramp(n, 2.0), Self::ramp(n, 4.0), Self::ramp(n, 6.0));
        let a0 = Self::a(n);
        let a = Mat::from_fn(n, n, |i, j| {
            a0(&[i, j]) + (i as f64 * v1(&[j]) + u2(&[i]) * v2(&[j]))
        });
        let ya = &full_row(n, Self::ramp(n, 8.0)) * &a;
        let z = Self::ramp(n, 9.0);
        let x = Mat::from_fn(n, 1, |j, _| BETA * ya[(0, j)] + z(&[j]));
        let ax = &a * &x;
        let w: Vec<f64> = (0..n).map(|i| ALPHA * ax[(i, 0)]).collect();
        Ok(vec![flatten(&a), flatten(&x), w])
    }
}

// ----- gesummv -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Gesummv;

impl Gesummv {
    fn a(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * g[1] + 1) % n, n)
    }
    fn b(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * g[1] + 2) % n, n)
    }
    fn x(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] % n, n)
    }
}

/// `y = alpha A x + beta B x`
pub fn gesummv_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let (alpha, beta) = (args.scalar("alpha")?, args.scalar("beta")?);
    let x = args.buffer("x")?.as_slice();
    let t1 = matvec(comm, &topo, args.buffer("A")?, x)?;
    let t2 = matvec(comm, &topo, args.buffer("B")?, x)?;
    let ly = args.buffer("y")?.shape()[0];
    let (t1, t2) = (segment(&t1, topo.pj(), ly)?.to_vec(), segment(&t2, topo.pj(), ly)?.to_vec());
    update(args, "y", |j, _| alpha * t1[j] + beta * t2[j])
}

impl Benchmark for Gesummv {
    fn name(&self) -> &'static str {
        "gesummv"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![2800], vec![5600], vec![11200]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[0];
        let (sa, sv) = (BlockSpec::matrix(n, n), BlockSpec::col_vector(n));
        check_partition(&[&sa, &sv], topo.grid)?;
        let mut args = dense_args(topo);
        args.set_scalar("alpha", ALPHA);
        args.set_scalar("beta", BETA);
        args.insert_buffer("A", halo_free(&sa, topo, Self::a(n))?);
        args.insert_buffer("B", halo_free(&sa, topo, Self::b(n))?);
        args.insert_buffer("x", halo_free(&sv, topo, Self::x(n))?);
        args.insert_buffer("y", zeros(&sv, topo)?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        gesummv_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::vector("y", sizes[0])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[0];
        let x = full_col(n, Self::x(n));
        let ax = &full_mat(n, n, Self::a(n)) * &x;
        let bx = &full_mat(n, n, Self::b(n)) * &x;
        Ok(vec![(0..n).map(|i| ALPHA * ax[(i, 0)] + BETA * bx[(i, 0)]).collect()])
    }
}

// ----- k2mm -----

#[derive(Debug, Clone, Copy, Default)]
pub struct K2mm;

impl K2mm {
    fn a(ni: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * g[1] + 1) % ni, ni)
    }
    fn b(nj: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * (g[1] + 1) % nj, nj)
    }
    fn c(nl: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * (g[1] + 3) + 1) % nl, nl)
    }
    fn d(nk: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * (g[1] + 2) % nk, nk)
    }
}

/// `D = alpha A B C + beta D`
pub fn k2mm_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let (alpha, beta) = (args.scalar("alpha")?, args.scalar("beta")?);
    let ab = from_mat(&block_matmul(comm, &topo, args.buffer("A")?, args.buffer("B")?)?)?;
    let abc = block_matmul(comm, &topo, &ab, args.buffer("C")?)?;
    axpby_block(args, "D", &abc, alpha, beta)
}

impl Benchmark for K2mm {
    fn name(&self) -> &'static str {
        "k2mm"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["NI", "NJ", "NK", "NL"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![1600, 1800, 2200, 2400], vec![3200, 3600, 4400, 4800]]
    }
    fn adjust_grid(&self, grid: ProcessGrid) -> ProcessGrid {
        grid.tall()
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let (ni, nj, nk, nl) = (sizes[0], sizes[1], sizes[2], sizes[3]);
        let specs = [
            BlockSpec::matrix(ni, nk),
            BlockSpec::matrix(nk, nj),
            BlockSpec::matrix(nj, nl),
            BlockSpec::matrix(ni, nl),
        ];
        check_partition(&specs.iter().collect::<Vec<_>>(), topo.grid)?;
        let mut args = dense_args(topo);
        args.set_scalar("alpha", ALPHA);
        args.set_scalar("beta", BETA);
        args.insert_buffer("A", halo_free(&specs[0], topo, Self::a(ni))?);
        args.insert_buffer("B", halo_free(&specs[1], topo, Self::b(nj))?);
        args.insert_buffer("C", halo_free(&specs[2], topo, Self::c(nl))?);
        args.insert_buffer("D", halo_free(&specs[3], topo, Self::d(nk))?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        k2mm_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::blocks("D", vec![sizes[0], sizes[3]])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (ni, nj, nk, nl) = (sizes[0], sizes[1], sizes[2], sizes[3]);
        let ab = &full_mat(ni, nk, Self::a(ni)) * &full_mat(nk, nj, Self::b(nj));
        let abc = &ab * &full_mat(nj, nl, Self::c(nl));
        let d = full_mat(ni, nl, Self::d(nk));
        let out = Mat::from_fn(ni, nl, |i, j| ALPHA * abc[(i, j)] + BETA * d[(i, j)]);
        Ok(vec![flatten(&out)])
    }
}

// ----- k3mm -----

#[derive(Debug, Clone, Copy, Default)]
pub struct K3mm;

impl K3mm {
    fn a(ni: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * g[1] + 1) % ni, 5 * ni)
    }
    fn b(nj: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * (g[1] + 1) + 2) % nj, 5 * nj)
    }
    fn c(nl: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * (g[1] + 3) % nl, 5 * nl)
    }
    fn d(nk: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] * (g[1] + 2) + 2) % nk, 5 * nk)
    }
}

/// `E = A B C D`
pub fn k3mm_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let ab = from_mat(&block_matmul(comm, &topo, args.buffer("A")?, args.buffer("B")?)?)?;
    let abc = from_mat(&block_matmul(comm, &topo, &ab, args.buffer("C")?)?)?;
    let e = block_matmul(comm, &topo, &abc, args.buffer("D")?)?;
    store_mat(args.buffer_mut("E")?, &e)
}

impl Benchmark for K3mm {
    fn name(&self) -> &'static str {
        "k3mm"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["NI", "NJ", "NK", "NL", "NM"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![1600, 1800, 2000, 2200, 2400], vec![3200, 3600, 4000, 4400, 4800]]
    }
    fn adjust_grid(&self, grid: ProcessGrid) -> ProcessGrid {
        grid.tall()
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let (ni, nj, nk, nl, nm) = (sizes[0], sizes[1], sizes[2], sizes[3], sizes[4]);
        let specs = [
            BlockSpec::matrix(ni, nk),
            BlockSpec::matrix(nk, nj),
            BlockSpec::matrix(nj, nm),
            BlockSpec::matrix(nm, nl),
            BlockSpec::matrix(ni, nl),
        ];
        check_partition(&specs.iter().collect::<Vec<_>>(), topo.grid)?;
        let mut args = dense_args(topo);
        args.insert_buffer("A", halo_free(&specs[0], topo, Self::a(ni))?);
        args.insert_buffer("B", halo_free(&specs[1], topo, Self::b(nj))?);
        args.insert_buffer("C", halo_free(&specs[2], topo, Self::c(nl))?);
        args.insert_buffer("D", halo_free(&specs[3], topo, Self::d(nk))?);
        args.insert_buffer("E", zeros(&specs[4], topo)?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        k3mm_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::blocks("E", vec![sizes[0], sizes[3]])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (ni, nj, nk, nl, nm) = (sizes[0], sizes[1], sizes[2], sizes[3], sizes[4]);
        let ab = &full_mat(ni, nk, Self::a(ni)) * &full_mat(nk, nj, Self::b(nj));
        let abc = &ab * &full_mat(nj, nm, Self::c(nl));
        let e = &abc * &full_mat(nm, nl, Self::d(nk));
        Ok(vec![flatten(&e)])
    }
}

// ----- mvt -----

#[derive(Debug, Clone, Copy, Default)]
pub struct Mvt;

impl Mvt {
    fn shifted(n: usize, s: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac((g[0] + s) % n, n)
    }
    fn a(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| frac(g[0] * g[1] % n, n)
    }
}

/// `x1 += A y_1`, `x2 += y_2 A`
pub fn mvt_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let topo = args.topology(comm.rank())?;
    let a = args.buffer("A")?;
    let (lm, ln) = (a.shape()[0], a.shape()[1]);
    let t1 = matvec(comm, &topo, a, args.buffer("y_1")?.as_slice())?;
    let y2 = assemble_vector(comm, &topo, args.buffer("y_2")?.as_slice(), AxisDist::Cols);
    let t2 = vecmat(comm, &topo, segment(&y2, topo.pi(), lm)?, a)?;
    let lx1 = args.buffer("x1")?.shape()[0];
    let t1 = segment(&t1, topo.pj(), lx1)?.to_vec();
    let t2 = segment(&t2, topo.pj(), ln)?.to_vec();
    update(args, "x1", |j, x| x + t1[j])?;
    update(args, "x2", |j, x| x + t2[j])
}

impl Benchmark for Mvt {
    fn name(&self) -> &'static str {
        "mvt"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![4000], vec![8000], vec![16000]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[0];
        let (sa, sv) = (BlockSpec::matrix(n, n), BlockSpec::col_vector(n));
        check_partition(&[&sa, &sv], topo.grid)?;
        let mut args = dense_args(topo);
        args.insert_buffer("x1", halo_free(&sv, topo, Self::shifted(n, 0))?);
        args.insert_buffer("x2", halo_free(&sv, topo, Self::shifted(n, 1))?);
        args.insert_buffer("y_1", halo_free(&sv, topo, Self::shifted(n, 3))?);
        args.insert_buffer("y_2", halo_free(&sv, topo, Self::shifted(n, 4))?);
        args.insert_buffer("A", halo_free(&sa, topo, Self::a(n))?);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        mvt_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::vector("x1", sizes[0]), OutputSpec::vector("x2", sizes[0])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[0];
        let a = full_mat(n, n, Self::a(n));
        let ay = &a * &full_col(n, Self::shifted(n, 3));
        let ya = &full_row(n, Self::shifted(n, 4)) * &a;
        let (x1, x2) = (Self::shifted(n, 0), Self::shifted(n, 1));
        let x1: Vec<f64> = (0..n).map(|i| x1(&[i]) + ay[(i, 0)]).collect();
        let x2: Vec<f64> = (0..n).map(|j| x2(&[j]) + ya[(0, j)]).collect();
        debug!("mvt: reference for N={n} computed");
        Ok(vec![x1, x2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SelfComm;
    use approx::assert_abs_diff_eq;

    fn single_rank_matches(bench: &dyn Benchmark, sizes: &[usize]) {
        let topo = Topology::single();
        let mut args = bench.prepare(sizes, &topo).unwrap();
        (bench.kernel())(&SelfComm, &mut args).unwrap();
        let reference = bench.reference(sizes).unwrap();
        for (out, want) in bench.outputs(sizes).iter().zip(&reference) {
            let got = args.buffer(out.name).unwrap().interior();
            assert_eq!(got.len(), want.len(), "{}:{}", bench.name(), out.name);
            for (g, w) in got.iter().zip(want) {
                assert_abs_diff_eq!(*g, *w, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn every_dense_kernel_matches_on_one_rank() {
        single_rank_matches(&Atax, &[6, 8]);
        single_rank_matches(&Bicg, &[8, 6]);
        single_rank_matches(&Doitgen, &[4, 3, 5]);
        single_rank_matches(&Gemm, &[4, 6, 8]);
        single_rank_matches(&Gemver, &[8]);
        single_rank_matches(&Gesummv, &[8]);
        single_rank_matches(&K2mm, &[4, 6, 8, 4]);
        single_rank_matches(&K3mm, &[4, 6, 8, 4, 2]);
        single_rank_matches(&Mvt, &[8]);
    }

    #[test]
    fn partition_is_checked_for_every_buffer() {
        // x is fine on a 2x2 grid, A is not
        let topo = Topology::new(ProcessGrid::new(2, 2), 0).unwrap();
        assert!(matches!(
            Atax.prepare(&[3, 4], &topo),
            Err(DistError::NonDivisiblePartition { global: 3, parts: 2, .. })
        ));
    }

    #[test]
    fn gemver_rank_two_update_uses_row_vectors() {
        let topo = Topology::single();
        let mut args = Gemver.prepare(&[4], &topo).unwrap();
        gemver_kernel(&SelfComm, &mut args).unwrap();
        let a = args.buffer("A").unwrap();
        // A[2,3] = (6 % 4)/4 + 2 * (4/4)/4 + (3/4)/2 * (4/4)/6
        assert_abs_diff_eq!(a.get(&[2, 3]), 0.5 + 0.5 + 0.0625, epsilon = 1e-15);
    }
}
