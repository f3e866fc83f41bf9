use std::f64::consts::PI;
use std::sync::LazyLock;

use crate::common::{Coeff, MAX_BLOCK_SIZE, Residual, YuvComponent, clip16, size_to_log2};
use crate::quantize::transform_shift;
use crate::restrictions::Restrictions;
use crate::cu_types::TransformType;

/// `64 * sqrt(2) * cos(i * pi / 128)` for odd `i`, HEVC integer cosines for
/// even `i`. Entry 0 is the DC basis value.
const COS_TABLE: [i32; 65] = [
    64, 90, 90, 90, 90, 90, 90, 89, 89, 88, 88, 87, 87, 86, 85, 84, 83, 83, 82, 81, 80, 79, 78, 76,
    75, 74, 73, 71, 70, 69, 67, 66, 64, 62, 61, 59, 57, 56, 54, 52, 50, 48, 46, 45, 43, 41, 38, 37,
    36, 33, 31, 28, 25, 24, 22, 20, 18, 15, 13, 11, 9, 7, 4, 2, 0,
];

const EXTENDED_PRECISION_BITS: i32 = 2;
const INV_FIRST_SHIFT: i32 = 7;
const INV_SECOND_SHIFT_BASE: i32 = 20;
const MAX_SIZE: usize = MAX_BLOCK_SIZE as usize;

fn dct2_coef(size: usize, k: usize, n: usize) -> i32 {
    let mut a = (k * (2 * n + 1) * (64 / size)) % 256;
    if a > 128 {
        a = 256 - a;
    }
    if a > 64 { -COS_TABLE[128 - a] } else { COS_TABLE[a] }
}

/// Row-major DCT2 matrices indexed by `log2(size)`.
static DCT2_MATRICES: LazyLock<Vec<Vec<i32>>> = LazyLock::new(|| {
    (0..=6)
        .map(|log2| {
            let n = 1usize << log2;
            let mut m = vec![0; n * n];
            for k in 0..n {
                for i in 0..n {
                    m[k * n + i] = dct2_coef(n, k, i);
                }
            }
            m
        })
        .collect()
});

const GENERIC_TYPES: [TransformType; 4] = [
    TransformType::Dct5,
    TransformType::Dct8,
    TransformType::Dst1,
    TransformType::Dst7,
];

fn generic_basis(ty: TransformType, size: usize, k: usize, n: usize) -> f64 {
    let nf = size as f64;
    let (kf, xf) = (k as f64, n as f64);
    match ty {
        TransformType::Dct5 => {
            let w0 = if k == 0 { 0.5f64.sqrt() } else { 1.0 };
            let w1 = if n == 0 { 0.5f64.sqrt() } else { 1.0 };
            (4.0 / (2.0 * nf - 1.0)).sqrt() * w0 * w1 * (2.0 * PI * kf * xf / (2.0 * nf - 1.0)).cos()
        }
        TransformType::Dct8 => {
            (4.0 / (2.0 * nf + 1.0)).sqrt()
                * (PI * (2.0 * kf + 1.0) * (2.0 * xf + 1.0) / (4.0 * nf + 2.0)).cos()
        }
        TransformType::Dst1 => {
            (2.0 / (nf + 1.0)).sqrt() * (PI * (kf + 1.0) * (xf + 1.0) / (nf + 1.0)).sin()
        }
        TransformType::Dst7 => {
            (4.0 / (2.0 * nf + 1.0)).sqrt() * (PI * (2.0 * kf + 1.0) * (xf + 1.0) / (2.0 * nf + 1.0)).sin()
        }
        TransformType::Default | TransformType::Dct2 => unreachable!("not a matrix transform"),
    }
}

/// Matrices for sizes 4..=32, indexed by
/// `(precision * 4 + type) * 4 + log2(size) - 2`.
static GENERIC_MATRICES: LazyLock<Vec<Vec<i32>>> = LazyLock::new(|| {
    let mut all = Vec::with_capacity(2 * 4 * 4);
    for scale in [64.0f64, 256.0] {
        for &ty in &GENERIC_TYPES {
            for log2 in 2..=5 {
                let n = 1usize << log2;
                let norm = scale * (n as f64).sqrt();
                let mut m = vec![0; n * n];
                for k in 0..n {
                    for i in 0..n {
                        m[k * n + i] = (norm * generic_basis(ty, n, k, i)).round() as i32;
                    }
                }
                all.push(m);
            }
        }
    }
    all
});

fn generic_matrix(ty: TransformType, size: usize, high_precision: bool) -> &'static [i32] {
    let type_idx = GENERIC_TYPES.iter().position(|&t| t == ty).unwrap_or(0);
    let idx = (usize::from(high_precision) * 4 + type_idx) * 4 + size.trailing_zeros() as usize - 2;
    &GENERIC_MATRICES[idx]
}

/// Transform actually applied along a dimension of `size` samples.
fn effective_type(ty: TransformType, size: usize) -> TransformType {
    match ty {
        TransformType::Default | TransformType::Dct2 => TransformType::Dct2,
        _ if size < 4 || size > 32 => TransformType::Dct2,
        other => other,
    }
}

fn extra_bits(ty: TransformType, high_precision: bool) -> i32 {
    if ty != TransformType::Dct2 && high_precision {
        EXTENDED_PRECISION_BITS
    } else {
        0
    }
}

#[inline]
fn round_shift(v: i32, shift: i32) -> i32 {
    if shift > 0 {
        (v + (1 << (shift - 1))) >> shift
    } else {
        v << -shift
    }
}

fn fwd_dct2(src: &[i32], dst: &mut [i32]) {
    let n = src.len();
    if n == 1 {
        dst[0] = COS_TABLE[0] * src[0];
        return;
    }
    let half = n / 2;
    let mut even = [0i32; MAX_SIZE / 2];
    let mut odd = [0i32; MAX_SIZE / 2];
    for i in 0..half {
        even[i] = src[i] + src[n - 1 - i];
        odd[i] = src[i] - src[n - 1 - i];
    }
    let mut even_out = [0i32; MAX_SIZE / 2];
    fwd_dct2(&even[..half], &mut even_out[..half]);
    let m = &DCT2_MATRICES[size_to_log2(n as i32) as usize];
    for k in 0..half {
        dst[2 * k] = even_out[k];
        let row = &m[(2 * k + 1) * n..(2 * k + 1) * n + half];
        dst[2 * k + 1] = row.iter().zip(&odd[..half]).map(|(a, b)| a * b).sum();
    }
}

fn inv_dct2(src: &[i32], dst: &mut [i32]) {
    let n = src.len();
    if n == 1 {
        dst[0] = COS_TABLE[0] * src[0];
        return;
    }
    let half = n / 2;
    let mut even_in = [0i32; MAX_SIZE / 2];
    for k in 0..half {
        even_in[k] = src[2 * k];
    }
    let mut even = [0i32; MAX_SIZE / 2];
    inv_dct2(&even_in[..half], &mut even[..half]);
    let m = &DCT2_MATRICES[size_to_log2(n as i32) as usize];
    for i in 0..half {
        let mut odd = 0;
        for k in 0..half {
            let c = src[2 * k + 1];
            if c != 0 {
                odd += m[(2 * k + 1) * n + i] * c;
            }
        }
        dst[i] = even[i] + odd;
        dst[n - 1 - i] = even[i] - odd;
    }
}

fn fwd_generic(m: &[i32], src: &[i32], dst: &mut [i32]) {
    let n = src.len();
    for (k, d) in dst.iter_mut().enumerate().take(n) {
        *d = m[k * n..(k + 1) * n].iter().zip(src).map(|(a, b)| a * b).sum();
    }
}

fn inv_generic(m: &[i32], src: &[i32], dst: &mut [i32]) {
    let n = src.len();
    for (i, d) in dst.iter_mut().enumerate().take(n) {
        *d = (0..n).map(|k| m[k * n + i] * src[k]).sum();
    }
}

fn forward_1d(ty: TransformType, high_precision: bool, src: &[i32], dst: &mut [i32]) {
    let n = src.len();
    match ty {
        TransformType::Dct2 | TransformType::Default => {
            fwd_dct2(src, dst);
            if n == MAX_SIZE {
                dst[MAX_SIZE / 2..].fill(0);
            }
        }
        _ => fwd_generic(generic_matrix(ty, n, high_precision), src, dst),
    }
}

fn inverse_1d(ty: TransformType, high_precision: bool, src: &[i32], dst: &mut [i32]) {
    match ty {
        TransformType::Dct2 | TransformType::Default => inv_dct2(src, dst),
        _ => inv_generic(generic_matrix(ty, src.len(), high_precision), src, dst),
    }
}

/// Resolves [`TransformType::Default`] for a block. The returned pair is
/// `[vertical, horizontal]`.
pub fn resolve_transform_types(
    types: [TransformType; 2],
    comp: YuvComponent,
    width: i32,
    height: i32,
    intra: bool,
    restrictions: &Restrictions,
) -> [TransformType; 2] {
    types.map(|ty| match ty {
        TransformType::Default => {
            if comp.is_luma()
                && intra
                && width == 4
                && height == 4
                && !restrictions.disable_ext2_transform_dst
            {
                TransformType::Dst7
            } else {
                TransformType::Dct2
            }
        }
        other => other,
    })
}

pub fn is_transform_skip_allowed(width: i32, height: i32, restrictions: &Restrictions) -> bool {
    !restrictions.disable_ext2_transform_skip && width * height <= crate::common::TRANSFORM_SKIP_MAX_AREA
}

pub struct ForwardTransform {
    bitdepth: u8,
    high_precision: bool,
    tmp: Vec<i32>,
}

impl ForwardTransform {
    pub fn new(bitdepth: u8, restrictions: &Restrictions) -> Self {
        Self {
            bitdepth,
            high_precision: !restrictions.disable_ext2_transform_high_precision,
            tmp: vec![0; MAX_SIZE * MAX_SIZE],
        }
    }

    /// Separable 2D transform of a `width` x `height` residual block. `types`
    /// must already be resolved, `[vertical, horizontal]`.
    #[allow(clippy::too_many_arguments)]
    pub fn transform(
        &mut self,
        width: i32,
        height: i32,
        types: [TransformType; 2],
        src: &[Residual],
        src_stride: usize,
        dst: &mut [Coeff],
        dst_stride: usize,
    ) {
        let (w, h) = (width as usize, height as usize);
        let ver = effective_type(types[0], h);
        let hor = effective_type(types[1], w);
        let shift1 = size_to_log2(width) + self.bitdepth as i32 - 9 + extra_bits(hor, self.high_precision);
        let shift2 = size_to_log2(height) + 6 + extra_bits(ver, self.high_precision);

        let mut line_in = [0i32; MAX_SIZE];
        let mut line_out = [0i32; MAX_SIZE];
        for y in 0..h {
            for (x, v) in line_in[..w].iter_mut().enumerate() {
                *v = src[y * src_stride + x] as i32;
            }
            forward_1d(hor, self.high_precision, &line_in[..w], &mut line_out[..w]);
            for x in 0..w {
                self.tmp[x * h + y] = clip16(round_shift(line_out[x], shift1) as i64) as i32;
            }
        }
        for x in 0..w {
            forward_1d(ver, self.high_precision, &self.tmp[x * h..x * h + h], &mut line_out[..h]);
            for k in 0..h {
                dst[k * dst_stride + x] = clip16(round_shift(line_out[k], shift2) as i64);
            }
        }
    }

    pub fn transform_skip(
        &self,
        width: i32,
        height: i32,
        src: &[Residual],
        src_stride: usize,
        dst: &mut [Coeff],
        dst_stride: usize,
    ) {
        let shift = transform_shift(width, height, self.bitdepth);
        let odd = (size_to_log2(width) + size_to_log2(height)) & 1 != 0;
        for y in 0..height as usize {
            for x in 0..width as usize {
                let mut v = (src[y * src_stride + x] as i64) << shift;
                if odd {
                    v = (v * 181 + 128) >> 8;
                }
                dst[y * dst_stride + x] = clip16(v);
            }
        }
    }
}

pub struct InverseTransform {
    bitdepth: u8,
    high_precision: bool,
    tmp: Vec<i32>,
}

impl InverseTransform {
    pub fn new(bitdepth: u8, restrictions: &Restrictions) -> Self {
        Self {
            bitdepth,
            high_precision: !restrictions.disable_ext2_transform_high_precision,
            tmp: vec![0; MAX_SIZE * MAX_SIZE],
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transform(
        &mut self,
        width: i32,
        height: i32,
        types: [TransformType; 2],
        src: &[Coeff],
        src_stride: usize,
        dst: &mut [Residual],
        dst_stride: usize,
    ) {
        let (w, h) = (width as usize, height as usize);
        let ver = effective_type(types[0], h);
        let hor = effective_type(types[1], w);
        let shift1 = INV_FIRST_SHIFT + extra_bits(ver, self.high_precision);
        let shift2 = INV_SECOND_SHIFT_BASE - self.bitdepth as i32 + extra_bits(hor, self.high_precision);

        let mut line_in = [0i32; MAX_SIZE];
        let mut line_out = [0i32; MAX_SIZE];
        for x in 0..w {
            for (k, v) in line_in[..h].iter_mut().enumerate() {
                *v = src[k * src_stride + x] as i32;
            }
            inverse_1d(ver, self.high_precision, &line_in[..h], &mut line_out[..h]);
            for y in 0..h {
                self.tmp[y * w + x] = clip16(round_shift(line_out[y], shift1) as i64) as i32;
            }
        }
        for y in 0..h {
            inverse_1d(hor, self.high_precision, &self.tmp[y * w..y * w + w], &mut line_out[..w]);
            for x in 0..w {
                dst[y * dst_stride + x] = clip16(round_shift(line_out[x], shift2) as i64);
            }
        }
    }

    pub fn transform_skip(
        &self,
        width: i32,
        height: i32,
        src: &[Coeff],
        src_stride: usize,
        dst: &mut [Residual],
        dst_stride: usize,
    ) {
        let shift = transform_shift(width, height, self.bitdepth);
        let odd = (size_to_log2(width) + size_to_log2(height)) & 1 != 0;
        for y in 0..height as usize {
            for x in 0..width as usize {
                let mut v = src[y * src_stride + x] as i64;
                if odd {
                    v = (v * 362 + 128) >> 8;
                }
                dst[y * dst_stride + x] = clip16((v + (1 << (shift - 1))) >> shift);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dct2_row(size: usize, k: usize) -> Vec<i32> {
        (0..size).map(|n| dct2_coef(size, k, n)).collect()
    }

    fn pattern(w: usize, h: usize, seed: i32) -> Vec<Residual> {
        (0..w * h)
            .map(|i| (((i as i32 * 37 + seed * 11) % 201) - 100) as Residual)
            .collect()
    }

    #[test]
    fn dct2_matches_hevc_tables() {
        assert_eq!(dct2_row(4, 1), vec![83, 36, -36, -83]);
        assert_eq!(dct2_row(4, 2), vec![64, -64, -64, 64]);
        assert_eq!(dct2_row(8, 1), vec![89, 75, 50, 18, -18, -50, -75, -89]);
        assert_eq!(dct2_row(16, 1)[..4], [90, 87, 80, 70]);
        assert_eq!(dct2_row(2, 1), vec![64, -64]);
    }

    #[test]
    fn dst7_4_point_matches_hevc() {
        let m = generic_matrix(TransformType::Dst7, 4, false);
        assert_eq!(&m[0..4], &[29, 55, 74, 84]);
        assert_eq!(&m[4..8], &[74, 74, 0, -74]);
    }

    #[test]
    fn butterflies_equal_matrix_product() {
        for log2 in 1..=6 {
            let n = 1usize << log2;
            let src: Vec<i32> = (0..n as i32).map(|i| (i * 29 % 17) - 8).collect();
            let m = &DCT2_MATRICES[log2];
            let mut fast = vec![0; n];
            fwd_dct2(&src, &mut fast);
            let mut slow = vec![0; n];
            fwd_generic(m, &src, &mut slow);
            assert_eq!(fast, slow, "forward size {n}");
            inv_dct2(&src, &mut fast);
            inv_generic(m, &src, &mut slow);
            assert_eq!(fast, slow, "inverse size {n}");
        }
    }

    #[test]
    fn zero_residual_gives_zero_coefficients() {
        let r = Restrictions::default();
        let mut fwd = ForwardTransform::new(8, &r);
        let src = vec![0 as Residual; 64 * 64];
        let mut dst = vec![1 as Coeff; 64 * 64];
        fwd.transform(64, 64, [TransformType::Dct2; 2], &src, 64, &mut dst, 64);
        assert!(dst.iter().all(|&c| c == 0));
    }

    #[test]
    fn dc_coefficient_gives_flat_block() {
        let r = Restrictions::default();
        let mut inv = InverseTransform::new(8, &r);
        let mut src = vec![0 as Coeff; 64];
        src[0] = 256;
        let mut dst = vec![0 as Residual; 64];
        inv.transform(8, 8, [TransformType::Dct2; 2], &src, 8, &mut dst, 8);
        assert!(dst.iter().all(|&v| v == dst[0]));
        assert!(dst[0] > 0);
    }

    #[test]
    fn dct2_roundtrip_is_near_lossless() {
        let r = Restrictions::default();
        let mut fwd = ForwardTransform::new(8, &r);
        let mut inv = InverseTransform::new(8, &r);
        for (w, h) in [(4, 4), (8, 8), (16, 16), (32, 32), (8, 4), (4, 16), (32, 8), (2, 2), (2, 8)] {
            let src = pattern(w, h, 3);
            let mut coeff = vec![0; w * h];
            let mut rec = vec![0; w * h];
            let types = [TransformType::Dct2; 2];
            fwd.transform(w as i32, h as i32, types, &src, w, &mut coeff, w);
            inv.transform(w as i32, h as i32, types, &coeff, w, &mut rec, w);
            for (a, b) in src.iter().zip(&rec) {
                assert!((a - b).abs() <= 2, "{w}x{h}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn matrix_transforms_roundtrip() {
        for high_precision in [false, true] {
            let mut r = Restrictions::default();
            r.disable_ext2_transform_high_precision = !high_precision;
            let mut fwd = ForwardTransform::new(8, &r);
            let mut inv = InverseTransform::new(8, &r);
            for ty in GENERIC_TYPES {
                let src = pattern(4, 4, 7);
                let mut coeff = vec![0; 16];
                let mut rec = vec![0; 16];
                fwd.transform(4, 4, [ty, ty], &src, 4, &mut coeff, 4);
                inv.transform(4, 4, [ty, ty], &coeff, 4, &mut rec, 4);
                for (a, b) in src.iter().zip(&rec) {
                    assert!((a - b).abs() <= 2, "{ty:?}: {a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn size_64_zeroes_high_frequencies() {
        let r = Restrictions::default();
        let mut fwd = ForwardTransform::new(8, &r);
        let src = pattern(64, 64, 1);
        let mut dst = vec![0; 64 * 64];
        fwd.transform(64, 64, [TransformType::Dct2; 2], &src, 64, &mut dst, 64);
        for y in 0..64 {
            for x in 0..64 {
                if x >= 32 || y >= 32 {
                    assert_eq!(dst[y * 64 + x], 0);
                }
            }
        }
    }

    #[test]
    fn default_type_resolution() {
        let r = Restrictions::default();
        let d = [TransformType::Default; 2];
        assert_eq!(resolve_transform_types(d, YuvComponent::Y, 4, 4, true, &r), [TransformType::Dst7; 2]);
        assert_eq!(resolve_transform_types(d, YuvComponent::Y, 4, 4, false, &r), [TransformType::Dct2; 2]);
        assert_eq!(resolve_transform_types(d, YuvComponent::U, 4, 4, true, &r), [TransformType::Dct2; 2]);
        let mut no_dst = r;
        no_dst.disable_ext2_transform_dst = true;
        assert_eq!(resolve_transform_types(d, YuvComponent::Y, 4, 4, true, &no_dst), [TransformType::Dct2; 2]);
    }

    #[test]
    fn transform_skip_roundtrip() {
        let r = Restrictions::default();
        let fwd = ForwardTransform::new(8, &r);
        let inv = InverseTransform::new(8, &r);
        for (w, h) in [(4, 4), (4, 2), (2, 2)] {
            let src = pattern(w, h, 5);
            let mut coeff = vec![0; w * h];
            let mut rec = vec![0; w * h];
            fwd.transform_skip(w as i32, h as i32, &src, w, &mut coeff, w);
            inv.transform_skip(w as i32, h as i32, &coeff, w, &mut rec, w);
            for (a, b) in src.iter().zip(&rec) {
                assert!((a - b).abs() <= 1, "{w}x{h}: {a} vs {b}");
            }
        }
        assert!(is_transform_skip_allowed(4, 4, &r));
        assert!(!is_transform_skip_allowed(8, 4, &r));
    }
}
