//! FDN benchmarks

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tv_dsp::delay::FractionalDelayLine;
use tv_dsp::fdn::{FdnOrder, ReverbEngine};
use tv_dsp::{FdnConfig, FdnProcessor, FrameProcessor, MonoProcessor, ProcessorConfig};

fn bench_engine_orders(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_1024_frames");
    for order in FdnOrder::ALL {
        let n = order.size();
        let mut engine = ReverbEngine::with_seed(n as u32, 2.0, 0.5, 1).unwrap();
        engine.prepare(48000.0, 1024).unwrap();
        let input: Vec<f32> = (0..n).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut output = vec![0.0; n];

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                for _ in 0..1024 {
                    engine.process_frame(black_box(&mut output), black_box(&input));
                }
            })
        });
    }
    group.finish();
}

fn bench_modulated_engine(c: &mut Criterion) {
    let mut engine = ReverbEngine::with_seed(16, 2.0, 0.5, 1).unwrap();
    engine.prepare(48000.0, 1024).unwrap();
    engine.set_modulation(20.0, 1.0).unwrap();
    let input = vec![0.1; 16];
    let mut output = vec![0.0; 16];

    c.bench_function("engine_16_modulated_1024", |b| {
        b.iter(|| {
            for _ in 0..1024 {
                engine.process_frame(black_box(&mut output), black_box(&input));
            }
        })
    });
}

fn bench_delay_line(c: &mut Criterion) {
    let mut line = FractionalDelayLine::new(2700, 1234.5).unwrap();
    let mut buffer: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin()).collect();

    c.bench_function("fractional_delay_1024", |b| {
        b.iter(|| {
            line.process_block(black_box(&mut buffer));
        })
    });
}

fn bench_stereo_processor(c: &mut Criterion) {
    let (mut processor, _controls) = FdnProcessor::new(&FdnConfig::default(), 2).unwrap();
    processor.prepare(48000.0, 512).unwrap();
    let mut left: Vec<f32> = (0..512).map(|i| (i as f32 * 0.01).sin()).collect();
    let mut right = left.clone();

    c.bench_function("processor_stereo_512", |b| {
        b.iter(|| {
            processor
                .process_block(black_box(&mut [&mut left[..], &mut right[..]]))
                .unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_engine_orders,
    bench_modulated_engine,
    bench_delay_line,
    bench_stereo_processor
);
criterion_main!(benches);
