use crate::common::{Coeff, YuvComponent, clip16, size_to_log2};
use crate::qp::Qp;

pub const QUANT_SHIFT: i32 = 14;
pub const IQUANT_SHIFT: i32 = 6;
pub const SCALE_BITS: i32 = 15;

/// Number of bits the forward transform grows the residual by, rounded down
/// to an integer for non-square blocks with an odd log2 area.
pub fn transform_shift(width: i32, height: i32, bitdepth: u8) -> i32 {
    let log2_sum = size_to_log2(width) + size_to_log2(height);
    SCALE_BITS - bitdepth as i32 - (log2_sum >> 1)
}

fn has_odd_log2_area(width: i32, height: i32) -> bool {
    (size_to_log2(width) + size_to_log2(height)) & 1 != 0
}

/// Dead-zone scalar quantizer. Returns the number of non-zero levels.
#[allow(clippy::too_many_arguments)]
pub fn quantize_forward(
    comp: YuvComponent,
    qp: &Qp,
    width: i32,
    height: i32,
    bitdepth: u8,
    intra: bool,
    src: &[Coeff],
    src_stride: usize,
    dst: &mut [Coeff],
    dst_stride: usize,
) -> usize {
    let ts = transform_shift(width, height, bitdepth);
    let mut scale = qp.fwd_scale(comp) as i64;
    let mut qbits = QUANT_SHIFT + qp.qp_per(comp) + ts;
    if has_odd_log2_area(width, height) {
        scale *= 181;
        qbits += 7;
    }
    let offset = (if intra { 171i64 } else { 85i64 }) << (qbits - 9);
    let mut num_non_zero = 0;
    for y in 0..height as usize {
        let src_row = &src[y * src_stride..y * src_stride + width as usize];
        let dst_row = &mut dst[y * dst_stride..y * dst_stride + width as usize];
        for (d, &c) in dst_row.iter_mut().zip(src_row) {
            let level = (((c as i64).abs() * scale + offset) >> qbits).min(i16::MAX as i64);
            if level != 0 {
                num_non_zero += 1;
            }
            *d = if c < 0 { -level as Coeff } else { level as Coeff };
        }
    }
    num_non_zero
}

/// Scales quantized levels back to transform coefficients. Output is
/// clamped to the 16-bit coefficient range.
#[allow(clippy::too_many_arguments)]
pub fn quantize_inverse(
    comp: YuvComponent,
    qp: &Qp,
    width: i32,
    height: i32,
    bitdepth: u8,
    src: &[Coeff],
    src_stride: usize,
    dst: &mut [Coeff],
    dst_stride: usize,
) {
    let ts = transform_shift(width, height, bitdepth);
    let mut scale = qp.inv_scale(comp) as i64;
    let mut shift = IQUANT_SHIFT - ts;
    if has_odd_log2_area(width, height) {
        scale *= 181;
        shift += 8;
    }
    for y in 0..height as usize {
        let src_row = &src[y * src_stride..y * src_stride + width as usize];
        let dst_row = &mut dst[y * dst_stride..y * dst_stride + width as usize];
        for (d, &c) in dst_row.iter_mut().zip(src_row) {
            let v = c as i64 * scale;
            *d = if shift > 0 {
                clip16((v + (1 << (shift - 1))) >> shift)
            } else {
                clip16(v << -shift)
            };
        }
    }
}
