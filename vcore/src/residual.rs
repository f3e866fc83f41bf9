//! Coefficient to sample reconstruction shared by both sides of the codec.

use crate::coding_unit::CodingUnit;
use crate::common::{Coeff, MAX_BLOCK_SAMPLES, Residual, Sample, YuvComponent, clip_bd};
use crate::quantize::quantize_inverse;
use crate::restrictions::Restrictions;
use crate::transform::{InverseTransform, resolve_transform_types};
use crate::yuv_pic::YuvPicture;

pub struct ResidualDecoder {
    bitdepth: u8,
    restrictions: Restrictions,
    inv: InverseTransform,
    dequant: Vec<Coeff>,
    resi: Vec<Residual>,
}

impl ResidualDecoder {
    pub fn new(bitdepth: u8, restrictions: &Restrictions) -> Self {
        Self {
            bitdepth,
            restrictions: *restrictions,
            inv: InverseTransform::new(bitdepth, restrictions),
            dequant: vec![0; MAX_BLOCK_SAMPLES],
            resi: vec![0; MAX_BLOCK_SAMPLES],
        }
    }

    /// Dequantizes and inverse transforms the levels of `comp`. The result
    /// has a stride equal to the component width.
    pub fn decode_residual(&mut self, cu: &CodingUnit, comp: YuvComponent) -> &[Residual] {
        let (w, h) = (cu.width(comp), cu.height(comp));
        let n = (w * h) as usize;
        let stride = w as usize;
        quantize_inverse(comp, cu.qp(), w, h, self.bitdepth, cu.coeff(comp), stride, &mut self.dequant, stride);
        if cu.transform_skip(comp) {
            self.inv
                .transform_skip(w, h, &self.dequant, stride, &mut self.resi, stride);
        } else {
            let types = resolve_transform_types(cu.transform_types(comp), comp, w, h, cu.is_intra(), &self.restrictions);
            self.inv
                .transform(w, h, types, &self.dequant, stride, &mut self.resi, stride);
        }
        &self.resi[..n]
    }

    /// Writes `pred + residual` of one component into `rec`. Without a coded
    /// block flag the prediction is copied unchanged.
    pub fn reconstruct(&mut self, cu: &CodingUnit, comp: YuvComponent, pred: &[Sample], rec: &mut YuvPicture) {
        let (w, h) = (cu.width(comp), cu.height(comp));
        let mut out = vec![0 as Sample; (w * h) as usize];
        self.reconstruct_block(cu, comp, pred, &mut out);
        rec.write_block(comp, cu.pos_x(comp), cu.pos_y(comp), w, h, &out);
    }

    /// Same as [`reconstruct`](Self::reconstruct) into a block buffer with a
    /// stride equal to the component width.
    pub fn reconstruct_block(&mut self, cu: &CodingUnit, comp: YuvComponent, pred: &[Sample], out: &mut [Sample]) {
        let n = (cu.width(comp) * cu.height(comp)) as usize;
        if !cu.cbf(comp) {
            out[..n].copy_from_slice(&pred[..n]);
            return;
        }
        let bitdepth = self.bitdepth;
        let resi = self.decode_residual(cu, comp);
        for ((o, &p), &r) in out[..n].iter_mut().zip(&pred[..n]).zip(resi) {
            *o = clip_bd(p as i32 + r as i32, bitdepth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ChromaFormat;
    use crate::qp::Qp;

    fn cu() -> CodingUnit {
        let qp = Qp::new(22, ChromaFormat::Yuv420, 8, 1.0, 0);
        CodingUnit::new(ChromaFormat::Yuv420, qp, 1, 8, 8, 8, 8)
    }

    #[test]
    fn zero_levels_reproduce_prediction() {
        let r = Restrictions::default();
        let mut dec = ResidualDecoder::new(8, &r);
        let mut cu = cu();
        cu.set_cbf(YuvComponent::Y, true);
        assert!(dec.decode_residual(&cu, YuvComponent::Y).iter().all(|&v| v == 0));
        let pred = vec![117 as Sample; 64];
        let mut rec = YuvPicture::new(ChromaFormat::Yuv420, 16, 16, 8, false);
        dec.reconstruct(&cu, YuvComponent::Y, &pred, &mut rec);
        assert_eq!(rec.sample(YuvComponent::Y, 8, 8), 117);
        assert_eq!(rec.sample(YuvComponent::Y, 15, 15), 117);
    }

    #[test]
    fn dc_level_adds_flat_offset_with_clipping() {
        let r = Restrictions::default();
        let mut dec = ResidualDecoder::new(8, &r);
        let mut cu = cu();
        cu.set_cbf(YuvComponent::Y, true);
        cu.coeff_mut(YuvComponent::Y)[0] = 4;
        let resi = dec.decode_residual(&cu, YuvComponent::Y).to_vec();
        assert!(resi[0] > 0);
        assert!(resi.iter().all(|&v| v == resi[0]));
        let pred = vec![254 as Sample; 64];
        let mut rec = YuvPicture::new(ChromaFormat::Yuv420, 16, 16, 8, false);
        dec.reconstruct(&cu, YuvComponent::Y, &pred, &mut rec);
        assert_eq!(rec.sample(YuvComponent::Y, 9, 9), 255);
    }
}
