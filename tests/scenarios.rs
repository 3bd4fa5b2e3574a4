//! End-to-end scenarios over the in-process thread backend.
//!
//! Each test spawns one thread per rank through `ThreadUniverse::run` and
//! drives the library exactly as a multi-process run would.

use distbench::halo::HaloExchanger;
use distbench::validation::gather_blocks;
use distbench::{
    init_block, run_suite, BenchContext, BenchOptions, BlockSpec, Comm, DistError, KernelArgs,
    ProcessGrid, SelfComm, ThreadUniverse, Topology, ValidationResult,
};

fn f_a(g: &[usize]) -> f64 {
    ((g[0] * g[1]) % 8) as f64 / 8.0
}

#[test]
fn scenario_a_blocks_reassemble_to_the_global_function() {
    let grid = ProcessGrid::for_count(4, Default::default()).unwrap();
    assert_eq!(grid, ProcessGrid::new(2, 2));
    let spec = BlockSpec::matrix(8, 8);

    let out = ThreadUniverse::run(4, |comm| {
        let topo = Topology::new(grid, comm.rank()).unwrap();
        let block = init_block(&spec, &topo, &[1, 1], f_a).unwrap();
        assert_eq!(block.shape(), &[4, 4]);
        gather_blocks(comm, &topo, &block, 0).unwrap()
    });

    let direct: Vec<f64> = (0..8).flat_map(|i| (0..8).map(move |j| f_a(&[i, j]))).collect();
    assert_eq!(out[0].as_deref(), Some(&direct[..]));
    assert!(out[1..].iter().all(Option::is_none));
}

#[test]
fn scenario_b_one_exchange_round_on_a_chain() {
    let grid = ProcessGrid::linear(4);
    let spec = BlockSpec::col_vector(16);

    let ghosts = ThreadUniverse::run(4, |comm| {
        let topo = Topology::new(grid, comm.rank()).unwrap();
        let mut args = KernelArgs::new();
        args.set_topology(&topo);
        let mut block = init_block(&spec, &topo, &[1], |g| 1.0 + g[0] as f64).unwrap();
        assert_eq!(block.padded_shape(), &[6]);

        // kernels only see the integer symbols
        let exchanger = HaloExchanger::linear(&args.neighbors().unwrap());
        exchanger.exchange(comm, &mut block).unwrap();
        (block.get(&[0]), block.get(&[5]))
    });

    // rank 0's last owned value is global index 3
    assert_eq!(ghosts[1].0, 4.0);
    assert_eq!(ghosts[0].0, 0.0);
    assert_eq!(ghosts[3].1, 0.0);
    assert_eq!(ghosts[2].1, 13.0);
}

#[test]
fn scenario_c_three_processes_are_rejected() {
    let results = ThreadUniverse::run(3, |comm| {
        let ctx = BenchContext::new(comm, BenchOptions::default().with_kernel("gemm"))?;
        run_suite(&ctx)
    });
    for r in results {
        assert_eq!(r, Err(DistError::UnsupportedProcessCount { count: 3 }));
    }
}

#[test]
fn scenario_c_closest_to_square_accepts_three() {
    let mut opts = BenchOptions::default()
        .with_kernel("jacobi_1d")
        .with_sizes(vec![3, 12])
        .with_repetitions(1);
    opts.grid_policy = distbench::GridPolicy::ClosestToSquare;
    let results = ThreadUniverse::run(3, |comm| {
        let ctx = BenchContext::new(comm, opts.clone())?;
        run_suite(&ctx)
    });
    let root = results.into_iter().next().unwrap().unwrap();
    assert_eq!(root.len(), 1);
    assert!(root[0].passed());
}

#[test]
fn scenario_d_zero_against_zero_is_exact() {
    let zeros = vec![0.0; 64];
    let r = ValidationResult::compare("A", &zeros, &zeros).unwrap();
    assert_eq!(r.error, 0.0);
    assert!(r.passed);

    let gathered = gather_blocks(
        &SelfComm,
        &Topology::single(),
        &distbench::LocalBlock::zeros(&[8, 8]),
        0,
    )
    .unwrap()
    .unwrap();
    assert_eq!(ValidationResult::compare("A", &zeros, &gathered).unwrap().error, 0.0);
}
