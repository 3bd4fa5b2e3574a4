//! Structured-grid stencils with one-layer halo exchange.
//!
//! Each time step runs two exchange rounds, one per alternating buffer:
//! exchange `A`, update `B` from `A`, exchange `B`, update `A` from `B`.
//! On a padded axis of length `len` the update covers `1 + off_low ..
//! len - 1 - off_high`, so a side without a neighbor never reads its ghost
//! layer and keeps its initial edge value.

use log::debug;

use super::{Benchmark, KernelArgs, KernelFn};
use crate::block::{init_block, LocalBlock};
use crate::distribution::{AxisDist, BlockSpec};
use crate::error::DistError;
use crate::halo::HaloExchanger;
use crate::parallel::{Comm, SelfComm};
use crate::topology::{Offsets, ProcessGrid, Topology};
use crate::validation::OutputSpec;

const JACOBI_1D_COEFF: f64 = 0.33333;
const JACOBI_2D_COEFF: f64 = 0.2;
const HEAT_COEFF: f64 = 0.125;

fn sweep_1d(src: &LocalBlock, dst: &mut LocalBlock, off: Offsets) {
    let n = src.padded_shape()[0];
    let s = src.as_slice();
    let d = dst.as_mut_slice();
    for i in 1 + off.west..n - 1 - off.east {
        d[i] = JACOBI_1D_COEFF * (s[i - 1] + s[i] + s[i + 1]);
    }
}

fn sweep_2d(src: &LocalBlock, dst: &mut LocalBlock, off: Offsets) {
    let (pm, pn) = (src.padded_shape()[0], src.padded_shape()[1]);
    let s = src.as_slice();
    let d = dst.as_mut_slice();
    for i in 1 + off.north..pm - 1 - off.south {
        for j in 1 + off.west..pn - 1 - off.east {
            let c = i * pn + j;
            d[c] = JACOBI_2D_COEFF * (s[c] + s[c - 1] + s[c + 1] + s[c + pn] + s[c - pn]);
        }
    }
}

fn sweep_heat(src: &LocalBlock, dst: &mut LocalBlock, off: Offsets) {
    let p = src.padded_shape();
    let (pm, pn, nk) = (p[0], p[1], p[2]);
    let (si, sj) = (pn * nk, nk);
    let s = src.as_slice();
    let d = dst.as_mut_slice();
    for i in 1 + off.north..pm - 1 - off.south {
        for j in 1 + off.west..pn - 1 - off.east {
            for k in 1..nk.saturating_sub(1) {
                let c = i * si + j * sj + k;
                d[c] = HEAT_COEFF * (s[c + si] - 2.0 * s[c] + s[c - si])
                    + HEAT_COEFF * (s[c + sj] - 2.0 * s[c] + s[c - sj])
                    + HEAT_COEFF * (s[c + 1] - 2.0 * s[c] + s[c - 1])
                    + s[c];
            }
        }
    }
}

/// Shared time loop of the stencil kernels.
fn time_loop(
    comm: &dyn Comm,
    args: &mut KernelArgs,
    halo: HaloExchanger,
    sweep: fn(&LocalBlock, &mut LocalBlock, Offsets),
) -> Result<(), DistError> {
    let tsteps = args.extent("TSTEPS")?;
    let off = args.offsets()?;
    let [a, b] = args.buffers_mut(["A", "B"])?;
    for _ in 1..tsteps {
        halo.exchange(comm, a)?;
        sweep(a, b, off);
        halo.exchange(comm, b)?;
        sweep(b, a, off);
    }
    Ok(())
}

pub fn jacobi_1d_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let halo = HaloExchanger::linear(&args.neighbors()?);
    time_loop(comm, args, halo, sweep_1d)
}

pub fn jacobi_2d_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let halo = HaloExchanger::planar(&args.neighbors()?);
    time_loop(comm, args, halo, sweep_2d)
}

pub fn heat_3d_kernel(comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
    let halo = HaloExchanger::planar(&args.neighbors()?);
    time_loop(comm, args, halo, sweep_heat)
}

fn stencil_args(sizes: &[usize], topo: &Topology, a: LocalBlock, b: LocalBlock) -> KernelArgs {
    let mut args = KernelArgs::new().with_buffer("A", a).with_buffer("B", b);
    args.set_symbol("TSTEPS", sizes[0] as i64);
    args.set_topology(topo);
    args
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Jacobi1d;

impl Jacobi1d {
    fn init_a(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| (g[0] + 2) as f64 / n as f64
    }
    fn init_b(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| (g[0] + 3) as f64 / n as f64
    }
}

impl Benchmark for Jacobi1d {
    fn name(&self) -> &'static str {
        "jacobi_1d"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["TSTEPS", "N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![1000, 4000], vec![2000, 8000], vec![4000, 16000]]
    }
    fn adjust_grid(&self, grid: ProcessGrid) -> ProcessGrid {
        ProcessGrid::linear(grid.size())
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[1];
        let spec = BlockSpec::col_vector(n);
        let ln = spec.local_shape(topo.grid)?[0];
        let a = init_block(&spec, topo, &[1], Self::init_a(n))?;
        let b = init_block(&spec, topo, &[1], Self::init_b(n))?;
        let mut args = stencil_args(sizes, topo, a, b);
        args.set_symbol("lN", ln as i64);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        jacobi_1d_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        vec![OutputSpec::vector("A", sizes[1]), OutputSpec::vector("B", sizes[1])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (tsteps, n) = (sizes[0], sizes[1]);
        let (fa, fb) = (Self::init_a(n), Self::init_b(n));
        let mut a: Vec<f64> = (0..n).map(|i| fa(&[i])).collect();
        let mut b: Vec<f64> = (0..n).map(|i| fb(&[i])).collect();
        for _ in 1..tsteps {
            for i in 1..n.saturating_sub(1) {
                b[i] = JACOBI_1D_COEFF * (a[i - 1] + a[i] + a[i + 1]);
            }
            for i in 1..n.saturating_sub(1) {
                a[i] = JACOBI_1D_COEFF * (b[i - 1] + b[i] + b[i + 1]);
            }
        }
        Ok(vec![a, b])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Jacobi2d;

impl Jacobi2d {
    fn init_a(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| (g[0] * (g[1] + 2)) as f64 / n as f64
    }
    fn init_b(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| (g[0] * (g[1] + 3)) as f64 / n as f64
    }
}

impl Benchmark for Jacobi2d {
    fn name(&self) -> &'static str {
        "jacobi_2d"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["TSTEPS", "N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![10, 2800], vec![10, 5600], vec![10, 11200]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[1];
        let spec = BlockSpec::matrix(n, n);
        let local = spec.local_shape(topo.grid)?;
        let a = init_block(&spec, topo, &[1, 1], Self::init_a(n))?;
        let b = init_block(&spec, topo, &[1, 1], Self::init_b(n))?;
        let mut args = stencil_args(sizes, topo, a, b);
        args.set_symbol("lM", local[0] as i64);
        args.set_symbol("lN", local[1] as i64);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        jacobi_2d_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        let n = sizes[1];
        vec![OutputSpec::blocks("A", vec![n, n]), OutputSpec::blocks("B", vec![n, n])]
    }

    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        self.check_sizes(sizes)?;
        let (tsteps, n) = (sizes[0], sizes[1]);
        let (fa, fb) = (Self::init_a(n), Self::init_b(n));
        let mut a: Vec<f64> = (0..n * n).map(|c| fa(&[c / n, c % n])).collect();
        let mut b: Vec<f64> = (0..n * n).map(|c| fb(&[c / n, c % n])).collect();
        let step = |s: &[f64], d: &mut [f64]| {
            for i in 1..n.saturating_sub(1) {
                for j in 1..n - 1 {
                    let c = i * n + j;
                    d[c] = JACOBI_2D_COEFF * (s[c] + s[c - 1] + s[c + 1] + s[c + n] + s[c - n]);
                }
            }
        };
        for _ in 1..tsteps {
            step(&a, &mut b);
            step(&b, &mut a);
        }
        Ok(vec![a, b])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Heat3d;

impl Heat3d {
    fn spec(n: usize) -> BlockSpec {
        BlockSpec::new(vec![n, n, n], vec![AxisDist::Rows, AxisDist::Cols, AxisDist::Replicated])
    }
    fn init(n: usize) -> impl Fn(&[usize]) -> f64 + Sync {
        move |g| (g[0] + g[1] + (n - g[2])) as f64 * 10.0 / n as f64
    }
}

impl Benchmark for Heat3d {
    fn name(&self) -> &'static str {
        "heat_3d"
    }
    fn size_names(&self) -> &'static [&'static str] {
        &["TSTEPS", "N"]
    }
    fn default_sizes(&self) -> Vec<Vec<usize>> {
        vec![vec![10, 200], vec![10, 300], vec![10, 450]]
    }

    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError> {
        self.check_sizes(sizes)?;
        let n = sizes[1];
        let spec = Self::spec(n);
        let local = spec.local_shape(topo.grid)?;
        let a = init_block(&spec, topo, &[1, 1, 0], Self::init(n))?;
        let b = init_block(&spec, topo, &[1, 1, 0], Self::init(n))?;
        let mut args = stencil_args(sizes, topo, a, b);
        args.set_symbol("lM", local[0] as i64);
        args.set_symbol("lN", local[1] as i64);
        args.set_symbol("N", n as i64);
        Ok(args)
    }

    fn kernel(&self) -> KernelFn {
        heat_3d_kernel
    }

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec> {
        let n = sizes[1];
        vec![
            OutputSpec::blocks("A", vec![n, n, n]),
            OutputSpec::blocks("B", vec![n, n, n]),
        ]
    }

    /// The distributed kernel itself on a 1x1 grid with every side treated
    /// as a fixed boundary.
    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError> {
        let mut args = self.prepare(sizes, &Topology::single())?;
        args.set_offsets(Offsets::all_boundary());
        heat_3d_kernel(&SelfComm, &mut args)?;
        debug!("heat_3d: single-process reference done");
        Ok(vec![args.buffer("A")?.interior(), args.buffer("B")?.interior()])
    }
}
