//! Options of a benchmark run.
//!
//! `BenchOptions` is filled either by the `distbench` binary from its
//! command line or directly by library callers. Every field has a default
//! matching the classic driver: ten timed repetitions, validation on, the
//! static grid table and rank 0 as the reporting process.

use crate::topology::GridPolicy;

/// Run parameters shared by every benchmark case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchOptions {
    /// Timed calls per case; the median is reported.
    pub repetitions: usize,

    /// Gather outputs and compare them with the single-process reference.
    pub validate: bool,

    /// How the process count is turned into a grid.
    pub grid_policy: GridPolicy,

    /// Rank that gathers outputs and prints reports.
    pub root: usize,

    /// Kernels to run, in catalog order when empty.
    pub kernels: Vec<String>,

    /// Size override applied to every selected kernel instead of its
    /// defaults.
    pub sizes: Option<Vec<usize>>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            repetitions: 10,
            validate: true,
            grid_policy: GridPolicy::Table,
            root: 0,
            kernels: Vec::new(),
            sizes: None,
        }
    }
}

impl BenchOptions {
    pub fn with_kernel(mut self, name: &str) -> Self {
        self.kernels.push(name.to_string());
        self
    }

    pub fn with_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.sizes = Some(sizes);
        self
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_root(mut self, root: usize) -> Self {
        self.root = root;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_classic_driver() {
        let o = BenchOptions::default();
        assert_eq!(o.repetitions, 10);
        assert!(o.validate);
        assert_eq!(o.grid_policy, GridPolicy::Table);
        assert_eq!(o.root, 0);
        assert!(o.kernels.is_empty() && o.sizes.is_none());
    }
}
