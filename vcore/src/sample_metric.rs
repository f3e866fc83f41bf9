//! Block distortion metrics.
//!
//! Every metric has a scalar reference kernel and an unrolled variant that
//! must return identical results; [`MetricKernels::detect`] picks one once.

use crate::common::{Distortion, Sample, YuvComponent};
use crate::qp::Qp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Sse,
    Sad,
    /// Sum of absolute 4x4 Hadamard coefficients, halved.
    Satd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKernels {
    Scalar,
    Unrolled,
}

impl MetricKernels {
    pub fn detect() -> Self {
        if cfg!(target_arch = "aarch64") || has_sse41() {
            MetricKernels::Unrolled
        } else {
            MetricKernels::Scalar
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn has_sse41() -> bool {
    std::is_x86_feature_detected!("sse4.1")
}

#[cfg(not(target_arch = "x86_64"))]
fn has_sse41() -> bool {
    false
}

#[derive(Debug, Clone, Copy)]
pub struct SampleMetric {
    metric: MetricType,
    kernels: MetricKernels,
}

impl SampleMetric {
    pub fn new(metric: MetricType) -> Self {
        Self::with_kernels(metric, MetricKernels::detect())
    }

    pub fn with_kernels(metric: MetricType, kernels: MetricKernels) -> Self {
        Self { metric, kernels }
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    #[allow(clippy::too_many_arguments)]
    pub fn compare(
        &self,
        width: usize,
        height: usize,
        src1: &[Sample],
        stride1: usize,
        src2: &[Sample],
        stride2: usize,
    ) -> Distortion {
        let block = Block { width, height, src1, stride1, src2, stride2 };
        match (self.metric, self.kernels) {
            (MetricType::Sse, MetricKernels::Scalar) => sse_scalar(&block),
            (MetricType::Sse, MetricKernels::Unrolled) => sse_unrolled(&block),
            (MetricType::Sad, MetricKernels::Scalar) => sad_scalar(&block),
            (MetricType::Sad, MetricKernels::Unrolled) => sad_unrolled(&block),
            (MetricType::Satd, _) => satd(&block),
        }
    }

    /// Distortion of a component scaled to the luma lambda domain.
    #[allow(clippy::too_many_arguments)]
    pub fn compare_comp(
        &self,
        qp: &Qp,
        comp: YuvComponent,
        width: usize,
        height: usize,
        src1: &[Sample],
        stride1: usize,
        src2: &[Sample],
        stride2: usize,
    ) -> Distortion {
        qp.weighted_distortion(comp, self.compare(width, height, src1, stride1, src2, stride2))
    }
}

struct Block<'a> {
    width: usize,
    height: usize,
    src1: &'a [Sample],
    stride1: usize,
    src2: &'a [Sample],
    stride2: usize,
}

impl<'a> Block<'a> {
    fn rows(&self) -> impl Iterator<Item = (&'a [Sample], &'a [Sample])> + '_ {
        (0..self.height).map(move |y| {
            (
                &self.src1[y * self.stride1..y * self.stride1 + self.width],
                &self.src2[y * self.stride2..y * self.stride2 + self.width],
            )
        })
    }
}

#[inline]
fn diff(a: Sample, b: Sample) -> i64 {
    a as i64 - b as i64
}

fn sse_scalar(block: &Block) -> Distortion {
    block
        .rows()
        .map(|(a, b)| a.iter().zip(b).map(|(&x, &y)| (diff(x, y) * diff(x, y)) as u64).sum::<u64>())
        .sum()
}

fn sad_scalar(block: &Block) -> Distortion {
    block
        .rows()
        .map(|(a, b)| a.iter().zip(b).map(|(&x, &y)| diff(x, y).unsigned_abs()).sum::<u64>())
        .sum()
}

fn sse_unrolled(block: &Block) -> Distortion {
    let mut total = 0u64;
    for (a, b) in block.rows() {
        let mut acc = [0u64; 4];
        let ca = a.chunks_exact(4);
        let cb = b.chunks_exact(4);
        let (ra, rb) = (ca.remainder(), cb.remainder());
        for (qa, qb) in ca.zip(cb) {
            for i in 0..4 {
                let d = diff(qa[i], qb[i]);
                acc[i] += (d * d) as u64;
            }
        }
        total += acc.iter().sum::<u64>();
        total += ra.iter().zip(rb).map(|(&x, &y)| (diff(x, y) * diff(x, y)) as u64).sum::<u64>();
    }
    total
}

fn sad_unrolled(block: &Block) -> Distortion {
    let mut total = 0u64;
    for (a, b) in block.rows() {
        let mut acc = [0u64; 4];
        let ca = a.chunks_exact(4);
        let cb = b.chunks_exact(4);
        let (ra, rb) = (ca.remainder(), cb.remainder());
        for (qa, qb) in ca.zip(cb) {
            for i in 0..4 {
                acc[i] += diff(qa[i], qb[i]).unsigned_abs();
            }
        }
        total += acc.iter().sum::<u64>();
        total += ra.iter().zip(rb).map(|(&x, &y)| diff(x, y).unsigned_abs()).sum::<u64>();
    }
    total
}

#[inline]
fn hadamard_4x4(residual: &[i32; 16]) -> [i32; 16] {
    let mut temp = [0i32; 16];
    let mut out = [0i32; 16];
    for i in 0..4 {
        let r = &residual[i * 4..i * 4 + 4];
        let t0 = r[0] + r[1];
        let t1 = r[0] - r[1];
        let t2 = r[2] + r[3];
        let t3 = r[2] - r[3];
        temp[i * 4] = t0 + t2;
        temp[i * 4 + 1] = t1 + t3;
        temp[i * 4 + 2] = t0 - t2;
        temp[i * 4 + 3] = t1 - t3;
    }
    for j in 0..4 {
        let t0 = temp[j] + temp[4 + j];
        let t1 = temp[j] - temp[4 + j];
        let t2 = temp[8 + j] + temp[12 + j];
        let t3 = temp[8 + j] - temp[12 + j];
        out[j] = t0 + t2;
        out[4 + j] = t1 + t3;
        out[8 + j] = t0 - t2;
        out[12 + j] = t1 - t3;
    }
    out
}

fn satd(block: &Block) -> Distortion {
    // Blocks narrower than a Hadamard unit fall back to SAD.
    if block.width % 4 != 0 || block.height % 4 != 0 {
        return sad_scalar(block);
    }
    let mut total = 0u64;
    let mut residual = [0i32; 16];
    for by in (0..block.height).step_by(4) {
        for bx in (0..block.width).step_by(4) {
            for y in 0..4 {
                let o1 = (by + y) * block.stride1 + bx;
                let o2 = (by + y) * block.stride2 + bx;
                for x in 0..4 {
                    residual[y * 4 + x] = block.src1[o1 + x] as i32 - block.src2[o2 + x] as i32;
                }
            }
            let sum: u64 = hadamard_4x4(&residual).iter().map(|c| c.unsigned_abs() as u64).sum();
            total += (sum + 1) >> 1;
        }
    }
    total
}

/// Peak signal-to-noise ratio in dB; identical inputs are capped at 100.
pub fn psnr(sse: u64, num_samples: u64, bitdepth: u8) -> f64 {
    if sse == 0 || num_samples == 0 {
        return 100.0;
    }
    let max = ((1u64 << bitdepth) - 1) as f64;
    let mse = sse as f64 / num_samples as f64;
    10.0 * (max * max / mse).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_blocks_have_zero_distortion() {
        let src = [77u16; 64];
        for metric in [MetricType::Sse, MetricType::Sad, MetricType::Satd] {
            assert_eq!(SampleMetric::new(metric).compare(8, 8, &src, 8, &src, 8), 0);
        }
    }

    #[test]
    fn known_values() {
        let a = [10u16, 10, 0, 0];
        let b = [0u16, 0, 0, 0];
        let sse = SampleMetric::with_kernels(MetricType::Sse, MetricKernels::Scalar);
        let sad = SampleMetric::with_kernels(MetricType::Sad, MetricKernels::Scalar);
        assert_eq!(sse.compare(2, 2, &a, 2, &b, 2), 200);
        assert_eq!(sad.compare(2, 2, &a, 2, &b, 2), 20);
    }

    #[test]
    fn satd_of_dc_offset() {
        let a = [5u16; 16];
        let b = [0u16; 16];
        // a flat difference of 5 puts 16 * 5 into the DC coefficient only
        let satd = SampleMetric::new(MetricType::Satd).compare(4, 4, &a, 4, &b, 4);
        assert_eq!(satd, 40);
    }

    #[test]
    fn strided_access() {
        let mut a = vec![0u16; 32];
        let b = vec![0u16; 4];
        a[16] = 3;
        let sad = SampleMetric::new(MetricType::Sad);
        assert_eq!(sad.compare(2, 2, &a, 16, &b, 2), 3);
    }

    #[test]
    fn psnr_values() {
        assert_eq!(psnr(0, 64, 8), 100.0);
        let p = psnr(64, 64, 8);
        assert!((p - 48.1308).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn unrolled_matches_scalar(
            w in 1usize..20,
            h in 1usize..6,
            seed in prop::collection::vec(0u16..1024, 240),
        ) {
            let a = &seed[..120];
            let b = &seed[120..];
            for metric in [MetricType::Sse, MetricType::Sad] {
                let s = SampleMetric::with_kernels(metric, MetricKernels::Scalar).compare(w, h, a, 20, b, 20);
                let u = SampleMetric::with_kernels(metric, MetricKernels::Unrolled).compare(w, h, a, 20, b, 20);
                prop_assert_eq!(s, u);
            }
        }
    }
}
