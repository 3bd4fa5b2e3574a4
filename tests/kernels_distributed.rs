//! Every catalog kernel, run on 1, 2, 4 and 8 thread ranks with small
//! divisible sizes, must reproduce its single-process reference.

use distbench::{run_suite, BenchContext, BenchOptions, CaseReport, DistError, ThreadUniverse};

const CASES: &[(&str, &[usize])] = &[
    ("atax", &[8, 16]),
    ("bicg", &[16, 8]),
    ("doitgen", &[8, 4, 4]),
    ("gemm", &[8, 8, 8]),
    ("gemver", &[8]),
    ("gesummv", &[8]),
    ("k2mm", &[8, 8, 8, 8]),
    ("k3mm", &[8, 8, 8, 8, 8]),
    ("mvt", &[8]),
    ("jacobi_1d", &[4, 16]),
    ("jacobi_2d", &[3, 8]),
    ("heat_3d", &[3, 8]),
];

fn run(ranks: usize, options: BenchOptions) -> Vec<Result<Vec<CaseReport>, DistError>> {
    ThreadUniverse::run(ranks, |comm| {
        let ctx = BenchContext::new(comm, options.clone())?;
        run_suite(&ctx)
    })
}

fn case(kernel: &str, sizes: &[usize]) -> BenchOptions {
    BenchOptions::default()
        .with_kernel(kernel)
        .with_sizes(sizes.to_vec())
        .with_repetitions(2)
}

#[test]
fn every_kernel_validates_on_every_supported_count() {
    for ranks in [1, 2, 4, 8] {
        for &(kernel, sizes) in CASES {
            let results = run(ranks, case(kernel, sizes));
            let mut results = results.into_iter();
            let root = results.next().unwrap().unwrap_or_else(|e| panic!("{kernel} on {ranks}: {e}"));
            assert_eq!(root.len(), 1);
            let report = &root[0];
            assert_eq!(report.kernel, kernel);
            assert!(!report.validation.is_empty(), "{kernel} on {ranks}");
            assert!(report.passed(), "{kernel} on {ranks} ranks:\n{report}");
            // non-root ranks return no reports
            for other in results {
                assert_eq!(other, Ok(Vec::new()));
            }
        }
    }
}

#[test]
fn any_rank_can_report() {
    let results = run(4, case("jacobi_2d", &[3, 8]).with_root(3));
    assert_eq!(results[0], Ok(Vec::new()));
    let root = results[3].as_ref().unwrap();
    assert_eq!(root.len(), 1);
    assert!(root[0].passed());

    let results = run(8, case("atax", &[8, 16]).with_root(5));
    assert!(results[5].as_ref().unwrap()[0].passed());
}

#[test]
fn skipping_validation_still_times() {
    let mut opts = case("gemm", &[8, 8, 8]);
    opts.validate = false;
    let results = run(2, opts);
    let report = &results[0].as_ref().unwrap()[0];
    assert!(report.validation.is_empty());
    assert!(report.passed());
}

#[test]
fn grid_follows_the_kernel() {
    let results = run(8, case("jacobi_1d", &[2, 16]));
    assert_eq!(results[0].as_ref().unwrap()[0].grid, distbench::ProcessGrid::linear(8));
    let results = run(8, case("gemm", &[8, 8, 8]));
    assert_eq!(results[0].as_ref().unwrap()[0].grid, distbench::ProcessGrid::new(4, 2));
}

#[test]
fn bad_partition_fails_on_every_rank() {
    for r in run(4, case("jacobi_2d", &[2, 7])) {
        assert!(matches!(r, Err(DistError::NonDivisiblePartition { .. })));
    }
}

#[test]
fn unknown_kernel_is_an_error() {
    let results = run(2, BenchOptions::default().with_kernel("lu"));
    assert_eq!(results[1], Err(DistError::UnknownKernel("lu".to_string())));
}
