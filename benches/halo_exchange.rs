use criterion::{black_box, criterion_group, criterion_main, Criterion};
use distbench::kernel::find;
use distbench::{
    init_block, BlockSpec, HaloExchanger, ProcessGrid, SelfComm, ThreadUniverse, Topology,
};

fn bench_exchange_rounds(c: &mut Criterion) {
    let grid = ProcessGrid::new(2, 2);
    let spec = BlockSpec::matrix(512, 512);

    c.bench_function("halo 2x2 x 20 rounds (512^2)", |b| {
        b.iter(|| {
            ThreadUniverse::run(4, |comm| {
                let topo = Topology::new(grid, comm.rank()).unwrap();
                let mut block = init_block(&spec, &topo, &[1, 1], |g| (g[0] + g[1]) as f64).unwrap();
                let ex = HaloExchanger::planar(&topo.neighbors);
                for _ in 0..20 {
                    ex.exchange(comm, &mut block).unwrap();
                }
                black_box(block.get(&[0, 1]))
            })
        })
    });
}

fn bench_local_stencil(c: &mut Criterion) {
    let bench = find("jacobi_2d").unwrap();
    let sizes = [10, 256];
    let args = bench.prepare(&sizes, &Topology::single()).unwrap();
    let kernel = bench.kernel();

    c.bench_function("jacobi_2d single rank (256^2, 10 steps)", |b| {
        b.iter(|| {
            let mut a = args.clone();
            kernel(&SelfComm, black_box(&mut a)).unwrap();
        })
    });
}

criterion_group!(benches, bench_exchange_rounds, bench_local_stencil);
criterion_main!(benches);
