use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use procsnap::system::args::parse_argument_blob;
use procsnap::system::collector::Collector;
use procsnap::system::host::HostInfo;
use procsnap::system::mock::{MockKernel, argument_blob, process, task, thread};
use std::hint::black_box;

fn make_kernel(n: usize) -> MockKernel {
    let mut kernel = MockKernel::new();
    for i in 0..n {
        let pid = i as i32 + 1;
        let ppid = if i == 0 { 0 } else { (i as i32 / 2) + 1 };
        let name = format!("proc_{i}");
        let path = format!("/usr/local/bin/{name}");
        kernel = kernel
            .with_process(process(pid, ppid, &name))
            .with_arguments(pid, &[path.as_str(), "--work", "--verbose"])
            .with_task(
                pid,
                task(((n - i) as u64 + 1) * 4096, (i % 300) as i32, 7),
                vec![thread(3, 1, false), thread(0, 0, true)],
            );
    }
    kernel
}

fn bench_argument_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("argument_blob_parse");

    for argc in [1usize, 8, 64] {
        let owned: Vec<String> = (0..argc).map(|i| format!("--flag-{i}=value")).collect();
        let argv: Vec<&str> = owned.iter().map(String::as_str).collect();
        let blob = argument_blob(&argv);
        group.bench_with_input(BenchmarkId::from_parameter(argc), &blob, |b, blob| {
            b.iter(|| {
                let parsed = parse_argument_blob(black_box(blob), black_box(blob.len()));
                black_box(parsed);
            })
        });
    }

    group.finish();
}

fn bench_build_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_snapshot_500_1000_2000");

    for size in [500usize, 1000, 2000] {
        let kernel = make_kernel(size);
        let host = match HostInfo::probe(&kernel) {
            Ok(host) => host,
            Err(err) => panic!("mock probe failed: {err}"),
        };
        let collector = Collector::new(&kernel, host);
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                let tree = collector.build_snapshot();
                black_box(tree)
            })
        });
    }

    group.finish();
}

fn bench_subtree_totals(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtree_totals_500_1000_2000");

    for size in [500usize, 1000, 2000] {
        let kernel = make_kernel(size);
        let host = match HostInfo::probe(&kernel) {
            Ok(host) => host,
            Err(err) => panic!("mock probe failed: {err}"),
        };
        let Ok(tree) = Collector::new(&kernel, host).build_snapshot() else {
            panic!("mock snapshot failed");
        };
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| black_box(tree.subtree_totals()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_argument_parsing,
    bench_build_snapshot,
    bench_subtree_totals
);
criterion_main!(benches);
