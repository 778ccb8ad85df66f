//! Performance benchmarks for PipeTune
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipetune::config::Config;
use pipetune::perf::{diagnose, parse_perf_log, TelemetryReport};

const REPORT: &str = "\
core 2 : 97.50%
avg_cpu_util: 54.88%
LLC-load-misses-rate : 0.31
LLC-store-misses-rate : 0.07
------Socket 0------
IO Read Miss Rate : 0.10
IO Write Miss Rate : 0.20
";

/// A perf log with `blocks` measurement blocks and some noise between them
fn perf_log(blocks: usize) -> String {
    let mut out = String::from("EAL: probing devices\n");
    for i in 0..blocks {
        out.push_str(&format!(
            "DPerf Statistics    Thpl. (Mpps)        Avg. [/P]           Avg. Stall [/P]\n\
             ------------------------------------------------------------------------\n\
             End-to-end          {:.3}              0.080\n\
             app_tx              12.500              0.900               0.300\n\
             app_rx              12.400              0.700               0.100\n\
             disp_tx             12.500              0.400               0.050\n\
             disp_rx             12.400              0.350               0.020\n\
             nic_tx              12.500              0.200\n\
             nic_rx              12.400              0.000\n\
             worker heartbeat\n",
            10.0 + i as f64
        ));
    }
    out
}

fn bench_parse_log(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_perf_log");

    for blocks in [10usize, 100, 1000].iter() {
        let text = perf_log(*blocks);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &text, |b, text| {
            b.iter(|| parse_perf_log(black_box(text), blocks / 2).unwrap());
        });
    }

    group.finish();
}

fn bench_diagnose(c: &mut Criterion) {
    let m = parse_perf_log(&perf_log(10), 5).unwrap();

    c.bench_function("telemetry_parse", |b| {
        b.iter(|| TelemetryReport::parse(black_box(REPORT), 0));
    });

    c.bench_function("diagnose", |b| {
        b.iter(|| diagnose(black_box(&m), 0, black_box(REPORT)).unwrap());
    });
}

fn bench_config_roundtrip(c: &mut Criterion) {
    let mut text = String::from("kAppCoreNum : 64\nkDispQueueNum : 32\n");
    for id in 0..32 {
        text.push_str(&format!(
            "workload : {} : tx,rx : {} : {}-{} : {}\n",
            id,
            100 + id,
            id * 2,
            id * 2 + 1,
            200 + id
        ));
    }
    text.push_str("iteration : 10\nduration : 3\n");

    c.bench_function("config_parse_render", |b| {
        b.iter(|| {
            let cfg = Config::parse(black_box(&text), "/tmp/bench.conf").unwrap();
            black_box(cfg.render())
        });
    });
}

criterion_group!(benches, bench_parse_log, bench_diagnose, bench_config_roundtrip);
criterion_main!(benches);
