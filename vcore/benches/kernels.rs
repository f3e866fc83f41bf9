//! Hot kernels of the mode decision: transforms, interpolation and metrics.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use vcore::common::{Coeff, Residual, Sample};
use vcore::cu_types::TransformType;
use vcore::inter_prediction::{FilterStage, LUMA_FILTER, NUM_TAPS_LUMA, filter_pass};
use vcore::restrictions::Restrictions;
use vcore::sample_metric::{MetricKernels, MetricType, SampleMetric};
use vcore::transform::{ForwardTransform, InverseTransform};
use vcore::{ChromaFormat, Encoder, EncoderConfig, SpeedMode, YuvPicture};

fn residual(size: usize) -> Vec<Residual> {
    (0..size * size).map(|i| ((i * 37 % 61) as i16) - 30).collect()
}

fn samples(len: usize, seed: usize) -> Vec<Sample> {
    (0..len).map(|i| ((i * 13 + seed * 7) % 256) as Sample).collect()
}

fn bench_transforms(c: &mut Criterion) {
    let r = Restrictions::default();
    let mut group = c.benchmark_group("transform");
    for size in [4usize, 8, 16, 32] {
        let src = residual(size);
        let mut coeff = vec![0 as Coeff; size * size];
        let mut rec = vec![0 as Residual; size * size];
        let mut fwd = ForwardTransform::new(8, &r);
        let mut inv = InverseTransform::new(8, &r);
        let types = [TransformType::Dct2; 2];
        group.bench_with_input(BenchmarkId::new("dct2_forward", size), &size, |b, &n| {
            b.iter(|| fwd.transform(n as i32, n as i32, types, black_box(&src), n, &mut coeff, n))
        });
        group.bench_with_input(BenchmarkId::new("dct2_inverse", size), &size, |b, &n| {
            b.iter(|| inv.transform(n as i32, n as i32, types, black_box(&coeff), n, &mut rec, n))
        });
    }
    let src = residual(4);
    let mut coeff = vec![0 as Coeff; 16];
    let mut fwd = ForwardTransform::new(8, &r);
    group.bench_function("dst7_forward_4", |b| {
        b.iter(|| fwd.transform(4, 4, [TransformType::Dst7; 2], black_box(&src), 4, &mut coeff, 4))
    });
    group.finish();
}

fn bench_interpolation(c: &mut Criterion) {
    let stride = 64 + NUM_TAPS_LUMA;
    let src = samples(stride * stride, 1);
    let mut tmp = vec![0i16; stride * stride];
    let mut dst = vec![0 as Sample; 64 * 64];
    c.bench_function("luma_hpel_2d_64x64", |b| {
        b.iter(|| {
            filter_pass(
                black_box(&src),
                stride,
                1,
                64,
                64 + NUM_TAPS_LUMA - 1,
                &LUMA_FILTER[2],
                FilterStage::sample_to_intermediate(8),
                &mut tmp,
                stride,
                |v| v as i16,
            );
            filter_pass(
                &tmp,
                stride,
                stride,
                64,
                64,
                &LUMA_FILTER[2],
                FilterStage::intermediate_to_sample(8),
                &mut dst,
                64,
                |v| v.clamp(0, 255) as Sample,
            );
        })
    });
}

fn bench_metrics(c: &mut Criterion) {
    let a = samples(64 * 64, 1);
    let b2 = samples(64 * 64, 2);
    let mut group = c.benchmark_group("metric_64x64");
    for (name, metric) in [
        ("sse_scalar", SampleMetric::with_kernels(MetricType::Sse, MetricKernels::Scalar)),
        ("sse_unrolled", SampleMetric::with_kernels(MetricType::Sse, MetricKernels::Unrolled)),
        ("sad_unrolled", SampleMetric::with_kernels(MetricType::Sad, MetricKernels::Unrolled)),
        ("satd", SampleMetric::new(MetricType::Satd)),
    ] {
        group.bench_function(name, |b| b.iter(|| metric.compare(64, 64, black_box(&a), 64, black_box(&b2), 64)));
    }
    group.finish();
}

fn bench_intra_picture(c: &mut Criterion) {
    let mut frame = YuvPicture::new(ChromaFormat::Yuv420, 64, 64, 8, false);
    for &comp in ChromaFormat::Yuv420.components() {
        for y in 0..frame.height(comp) {
            for x in 0..frame.width(comp) {
                frame.set_sample(comp, x, y, ((x * 3 + y * 5) % 200 + 20) as Sample);
            }
        }
    }
    let mut group = c.benchmark_group("encode");
    group.sample_size(10);
    group.bench_function("intra_64x64_fast", |b| {
        b.iter(|| {
            let config = EncoderConfig {
                speed_mode: SpeedMode::Fast,
                ..EncoderConfig::default()
            };
            let mut enc = Encoder::new(64, 64, config).unwrap();
            enc.send_frame(black_box(&frame)).unwrap();
            enc.receive_packet()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_transforms, bench_interpolation, bench_metrics, bench_intra_picture);
criterion_main!(benches);
