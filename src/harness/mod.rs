//! Timing and validation driver.
//!
//! Every rank runs the same sequence per case: resolve the grid, prepare
//! buffers, one untimed call, an optional gather of the outputs, then the
//! timed repetitions with a barrier before each. Only the reporting rank
//! computes the reference and returns a [`CaseReport`].

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::config::BenchOptions;
use crate::error::DistError;
use crate::kernel::{catalog, find, Benchmark, KernelInvoker};
use crate::parallel::Comm;
use crate::topology::{ProcessGrid, Topology};
use crate::validation::{collect_outputs, ValidationResult};

/// Explicit state of one run, threaded through every phase.
pub struct BenchContext<'a> {
    pub comm: &'a dyn Comm,
    pub options: BenchOptions,
}

impl<'a> BenchContext<'a> {
    pub fn new(comm: &'a dyn Comm, options: BenchOptions) -> Result<Self, DistError> {
        if options.root >= comm.size() {
            return Err(DistError::RankOutOfRange { rank: options.root, size: comm.size() });
        }
        Ok(Self { comm, options })
    }

    pub fn is_root(&self) -> bool {
        self.comm.rank() == self.options.root
    }

    /// Grid and topology of this rank for `bench`.
    pub fn topology(&self, bench: &dyn Benchmark) -> Result<Topology, DistError> {
        let grid = ProcessGrid::for_count(self.comm.size(), self.options.grid_policy)?;
        Topology::new(bench.adjust_grid(grid), self.comm.rank())
    }
}

/// Time `repetitions` single calls of `f`, each preceded by a barrier.
pub fn time_repetitions<F>(comm: &dyn Comm, repetitions: usize, mut f: F) -> Result<Vec<Duration>, DistError>
where
    F: FnMut() -> Result<(), DistError>,
{
    let mut samples = Vec::with_capacity(repetitions);
    for _ in 0..repetitions {
        comm.barrier();
        let start = Instant::now();
        f()?;
        samples.push(start.elapsed());
    }
    Ok(samples)
}

/// Median sample; the mean of the two middle samples for an even count.
pub fn median(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    }
}

/// Whole milliseconds, rounded.
pub fn time_to_ms(d: Duration) -> u64 {
    (d.as_secs_f64() * 1000.0).round() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub kernel: &'static str,
    pub sizes: Vec<usize>,
    pub grid: ProcessGrid,
    pub median_ms: u64,
    pub validation: Vec<ValidationResult>,
}

impl CaseReport {
    /// True when every validated output passed (or nothing was validated).
    pub fn passed(&self) -> bool {
        self.validation.iter().all(|v| v.passed)
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== {} =====", self.kernel)?;
        writeln!(f, "sizes: {:?}", self.sizes)?;
        write!(f, "Median is {}ms", self.median_ms)?;
        for v in &self.validation {
            write!(f, "\n{v}")?;
        }
        Ok(())
    }
}

/// Run one case on every rank. The reporting rank gets `Some(report)`.
pub fn run_case(
    ctx: &BenchContext<'_>,
    bench: &dyn Benchmark,
    sizes: &[usize],
) -> Result<Option<CaseReport>, DistError> {
    let comm = ctx.comm;
    let root = ctx.options.root;
    bench.check_sizes(sizes)?;
    let topo = ctx.topology(bench)?;
    let mut args = bench.prepare(sizes, &topo)?;
    debug!(
        "rank {}: {} {:?} on grid {} at {:?}",
        comm.rank(),
        bench.name(),
        sizes,
        topo.grid,
        topo.coord
    );

    let mut invoker = KernelInvoker::new(bench.name(), bench.kernel());
    comm.barrier();
    invoker.invoke(comm, &mut args)?;
    comm.barrier();

    let outputs = bench.outputs(sizes);
    let snapshot = if ctx.options.validate {
        collect_outputs(comm, &topo, &args, &outputs, root)?
    } else {
        None
    };

    let samples = time_repetitions(comm, ctx.options.repetitions, || invoker.invoke(comm, &mut args))?;
    if comm.rank() != root {
        return Ok(None);
    }

    let median_ms = median(&samples).map_or(0, time_to_ms);
    let validation = match snapshot {
        Some(values) => {
            let reference = bench.reference(sizes)?;
            if reference.len() != outputs.len() {
                return Err(DistError::ShapeMismatch { expected: outputs.len(), found: reference.len() });
            }
            outputs
                .iter()
                .zip(reference.iter().zip(&values))
                .map(|(o, (r, v))| ValidationResult::compare(o.name, r, v))
                .collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };
    let report = CaseReport {
        kernel: bench.name(),
        sizes: sizes.to_vec(),
        grid: topo.grid,
        median_ms,
        validation,
    };
    info!(
        "{} {:?}: median {}ms over {} calls, {}",
        report.kernel,
        report.sizes,
        report.median_ms,
        samples.len(),
        if report.passed() { "valid" } else { "INVALID" }
    );
    Ok(Some(report))
}

/// Benchmarks named in `options`, or the whole catalog.
pub fn select(options: &BenchOptions) -> Result<Vec<Box<dyn Benchmark>>, DistError> {
    if options.kernels.is_empty() {
        return Ok(catalog());
    }
    options.kernels.iter().map(|k| find(k)).collect()
}

/// Run every selected benchmark over its sizes. A failed validation is
/// reported and the suite continues; partition and topology errors abort.
pub fn run_suite(ctx: &BenchContext<'_>) -> Result<Vec<CaseReport>, DistError> {
    let mut reports = Vec::new();
    for bench in select(&ctx.options)? {
        let cases = match &ctx.options.sizes {
            Some(s) => vec![s.clone()],
            None => bench.default_sizes(),
        };
        for sizes in cases {
            if let Some(report) = run_case(ctx, bench.as_ref(), &sizes)? {
                reports.push(report);
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SelfComm;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn median_is_robust_to_outliers() {
        assert_eq!(median(&[ms(5), ms(1), ms(1000)]), Some(ms(5)));
        assert_eq!(median(&[ms(4), ms(2), ms(8), ms(6)]), Some(ms(5)));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn rounding_to_milliseconds() {
        assert_eq!(time_to_ms(Duration::from_micros(1499)), 1);
        assert_eq!(time_to_ms(Duration::from_micros(1500)), 2);
        assert_eq!(time_to_ms(Duration::ZERO), 0);
    }

    #[test]
    fn report_format() {
        let r = CaseReport {
            kernel: "gemm",
            sizes: vec![8, 8, 8],
            grid: ProcessGrid::single(),
            median_ms: 3,
            validation: vec![ValidationResult { name: "C".into(), error: 0.0, passed: true }],
        };
        assert_eq!(
            r.to_string(),
            "===== gemm =====\nsizes: [8, 8, 8]\nMedian is 3ms\nvalidation: true (0)"
        );
    }

    #[test]
    fn repetitions_are_counted() {
        let mut calls = 0;
        let samples = time_repetitions(&SelfComm, 4, || {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!((samples.len(), calls), (4, 4));
    }

    #[test]
    fn root_must_exist() {
        let err = BenchContext::new(&SelfComm, BenchOptions::default().with_root(1)).err();
        assert_eq!(err, Some(DistError::RankOutOfRange { rank: 1, size: 1 }));
    }

    #[test]
    fn single_process_case_validates() {
        let ctx = BenchContext::new(&SelfComm, BenchOptions::default().with_repetitions(2)).unwrap();
        let report = run_case(&ctx, find("jacobi_2d").unwrap().as_ref(), &[4, 8]).unwrap().unwrap();
        assert_eq!(report.validation.len(), 2);
        assert!(report.passed());
    }
}
