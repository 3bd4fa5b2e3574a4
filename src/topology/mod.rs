//! Process grids and per-rank topology.
//!
//! - [`grid`]: `ProcessGrid` and the process-count -> grid-shape policies.
//! - [`neighbors`]: `Topology` (coordinate, neighbor ranks, boundary flags and
//!   halo offsets of one rank).

pub mod grid;
pub use grid::{GridPolicy, ProcessGrid};
pub mod neighbors;
pub use neighbors::{Boundary, Neighbors, Offsets, Topology, NO_NEIGHBOR};
