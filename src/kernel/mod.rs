//! Kernel invocation boundary and the benchmark catalog.
//!
//! A kernel is a plain function over the communicator and its named
//! arguments. It mutates buffers in place; dense kernels redistribute data
//! internally, stencil kernels run halo exchange rounds.

pub mod args;
pub mod collective;
pub mod dense;
pub mod stencil;

pub use args::KernelArgs;

use log::trace;

use crate::error::DistError;
use crate::parallel::Comm;
use crate::topology::{ProcessGrid, Topology};
use crate::validation::OutputSpec;

/// Signature of a compiled kernel.
pub type KernelFn = fn(&dyn Comm, &mut KernelArgs) -> Result<(), DistError>;

/// Hands arguments to a kernel function and counts invocations.
#[derive(Debug, Clone)]
pub struct KernelInvoker {
    name: &'static str,
    func: KernelFn,
    invocations: usize,
}

impl KernelInvoker {
    pub fn new(name: &'static str, func: KernelFn) -> Self {
        Self { name, func, invocations: 0 }
    }

    pub fn invoke(&mut self, comm: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
        self.invocations += 1;
        trace!("rank {}: {} call #{}", comm.rank(), self.name, self.invocations);
        (self.func)(comm, args)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }
}

/// One benchmark family: distributed inputs, kernel, outputs and the
/// single-process reference.
pub trait Benchmark: Send + Sync {
    fn name(&self) -> &'static str;

    /// Names of the size parameters, in order.
    fn size_names(&self) -> &'static [&'static str];

    /// Problem sizes run when none are given.
    fn default_sizes(&self) -> Vec<Vec<usize>>;

    /// Grid actually used for `grid`, e.g. a 1-D chain or a tall grid.
    fn adjust_grid(&self, grid: ProcessGrid) -> ProcessGrid {
        grid
    }

    /// Check divisibility, then allocate and initialise this rank's buffers
    /// and symbols. Fails before allocating on a bad partition.
    fn prepare(&self, sizes: &[usize], topo: &Topology) -> Result<KernelArgs, DistError>;

    fn kernel(&self) -> KernelFn;

    fn outputs(&self, sizes: &[usize]) -> Vec<OutputSpec>;

    /// Full outputs of a single-process run, in [`Benchmark::outputs`] order.
    fn reference(&self, sizes: &[usize]) -> Result<Vec<Vec<f64>>, DistError>;

    fn check_sizes(&self, sizes: &[usize]) -> Result<(), DistError> {
        let names = self.size_names();
        if sizes.len() != names.len() {
            return Err(DistError::InvalidSizes {
                kernel: self.name(),
                reason: format!("expected {} sizes {:?}, got {}", names.len(), names, sizes.len()),
            });
        }
        if sizes.iter().any(|&s| s == 0) {
            return Err(DistError::InvalidSizes {
                kernel: self.name(),
                reason: "sizes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Every benchmark, in suite order.
pub fn catalog() -> Vec<Box<dyn Benchmark>> {
    vec![
        Box::new(dense::Atax),
        Box::new(dense::Bicg),
        Box::new(dense::Doitgen),
        Box::new(dense::Gemm),
        Box::new(dense::Gemver),
        Box::new(dense::Gesummv),
        Box::new(dense::K2mm),
        Box::new(dense::K3mm),
        Box::new(dense::Mvt),
        Box::new(stencil::Jacobi1d),
        Box::new(stencil::Jacobi2d),
        Box::new(stencil::Heat3d),
    ]
}

pub fn find(name: &str) -> Result<Box<dyn Benchmark>, DistError> {
    catalog()
        .into_iter()
        .find(|b| b.name() == name)
        .ok_or_else(|| DistError::UnknownKernel(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SelfComm;

    fn bump(_: &dyn Comm, args: &mut KernelArgs) -> Result<(), DistError> {
        let b = args.buffer_mut("A")?;
        let v = b.get(&[0]);
        b.set(&[0], v + 1.0);
        Ok(())
    }

    #[test]
    fn invoker_counts_and_forwards_errors() {
        let mut inv = KernelInvoker::new("bump", bump);
        let mut args = KernelArgs::new().with_buffer("A", crate::block::LocalBlock::zeros(&[1]));
        inv.invoke(&SelfComm, &mut args).unwrap();
        inv.invoke(&SelfComm, &mut args).unwrap();
        assert_eq!(inv.invocations(), 2);
        assert_eq!(args.buffer("A").unwrap().get(&[0]), 2.0);
        let mut empty = KernelArgs::new();
        assert_eq!(inv.invoke(&SelfComm, &mut empty), Err(DistError::MissingArgument("A")));
    }

    #[test]
    fn catalog_names_are_unique_and_findable() {
        let names: Vec<_> = catalog().iter().map(|b| b.name()).collect();
        assert_eq!(names.len(), 12);
        for n in &names {
            assert_eq!(find(n).unwrap().name(), *n);
        }
        assert!(matches!(find("lu"), Err(DistError::UnknownKernel(_))));
    }

    #[test]
    fn size_arity_is_checked() {
        let gemm = find("gemm").unwrap();
        assert!(gemm.check_sizes(&[8, 8, 8]).is_ok());
        assert!(matches!(gemm.check_sizes(&[8, 8]), Err(DistError::InvalidSizes { .. })));
        assert!(gemm.check_sizes(&[8, 0, 8]).is_err());
    }
}
