//! distbench: SPMD block distribution, halo exchange and validated timing
//! for distributed dense and stencil kernels.
//!
//! Ranks form a rectangular process grid. Each rank initialises its own
//! block of every global array from a pure function of the global index,
//! runs a kernel that exchanges ghost layers or redistributes panels through
//! a [`parallel::Comm`], and finally sends its results to one reporting rank
//! that compares them with a single-process reference.

pub mod parallel;

pub mod block;
pub mod config;
pub mod distribution;
pub mod error;
pub mod halo;
pub mod harness;
pub mod kernel;
pub mod topology;
pub mod validation;

// Re-exports for convenience
pub use block::{init_block, LocalBlock};
pub use config::*;
pub use distribution::{block_size, l2g, AxisDist, BlockSpec, Decomposition};
pub use error::*;
pub use halo::{Direction, HaloExchanger};
pub use harness::{run_case, run_suite, BenchContext, CaseReport};
pub use kernel::{Benchmark, KernelArgs, KernelFn, KernelInvoker};
pub use parallel::{Comm, SelfComm, ThreadComm, ThreadUniverse};
pub use topology::*;
pub use validation::{rel_l2_error, OutputSpec, ValidationResult};
