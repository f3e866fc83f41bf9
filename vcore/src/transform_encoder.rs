//! Residual coding of one block component with a rate-distortion choice
//! between the available transform variants.

use crate::bitwriter::BitCounter;
use crate::coding_unit::CuId;
use crate::common::{
    Bits, Coeff, Cost, Distortion, MAX_BLOCK_SAMPLES, MAX_BLOCK_SIZE, MAX_TRANSFORM_SELECT_IDX,
    MAX_TRANSFORM_SELECT_SIZE, Residual, Sample, YuvComponent,
};
use crate::cu_writer::CuWriter;
use crate::encoder_settings::EncoderSettings;
use crate::picture_data::PictureData;
use crate::quantize::quantize_forward;
use crate::residual::ResidualDecoder;
use crate::restrictions::Restrictions;
use crate::sample_metric::{MetricType, SampleMetric};
use crate::syntax::SyntaxWriter;
use crate::transform::{ForwardTransform, is_transform_skip_allowed, resolve_transform_types};
use crate::yuv_pic::YuvPicture;

/// Distortion and rate of a coded block component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentCost {
    pub dist: Distortion,
    pub bits: Bits,
    pub cost: Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    /// Regular transform, optionally with a transform select index.
    Transform(i32),
    TransformSkip,
    Zero,
}

pub struct TransformEncoder {
    bitdepth: u8,
    restrictions: Restrictions,
    fwd: ForwardTransform,
    residual: ResidualDecoder,
    metric: SampleMetric,
    fast_transform_select: bool,
    fast_transform_select_eval: bool,
    fast_transform_size_64: bool,
    orig: Vec<Sample>,
    resi: Vec<Residual>,
    coeff: Vec<Coeff>,
    reco: Vec<Sample>,
    best_coeff: Vec<Coeff>,
    best_reco: Vec<Sample>,
}

impl TransformEncoder {
    pub fn new(bitdepth: u8, restrictions: &Restrictions, settings: &EncoderSettings) -> Self {
        Self {
            bitdepth,
            restrictions: *restrictions,
            fwd: ForwardTransform::new(bitdepth, restrictions),
            residual: ResidualDecoder::new(bitdepth, restrictions),
            metric: SampleMetric::new(MetricType::Sse),
            fast_transform_select: settings.fast_transform_select,
            fast_transform_select_eval: settings.fast_transform_select_eval,
            fast_transform_size_64: settings.fast_transform_size_64,
            orig: vec![0; MAX_BLOCK_SAMPLES],
            resi: vec![0; MAX_BLOCK_SAMPLES],
            coeff: vec![0; MAX_BLOCK_SAMPLES],
            reco: vec![0; MAX_BLOCK_SAMPLES],
            best_coeff: vec![0; MAX_BLOCK_SAMPLES],
            best_reco: vec![0; MAX_BLOCK_SAMPLES],
        }
    }

    /// Squared error between the source and a predicted or reconstructed
    /// block of `comp`, weighted into the luma lambda domain.
    pub fn distortion(&self, pic: &PictureData, id: CuId, comp: YuvComponent, orig: &YuvPicture, block: &[Sample]) -> Distortion {
        let cu = pic.cu(id);
        let (w, h) = (cu.width(comp), cu.height(comp));
        let mut src = vec![0 as Sample; (w * h) as usize];
        orig.read_block(comp, cu.pos_x(comp), cu.pos_y(comp), w, h, &mut src);
        self.metric
            .compare_comp(cu.qp(), comp, w as usize, h as usize, &src, w as usize, block, w as usize)
    }

    /// Codes the residual `orig - pred` of one component, picks the cheapest
    /// transform variant and writes the reconstruction into `rec`.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_component(
        &mut self,
        pic: &mut PictureData,
        id: CuId,
        comp: YuvComponent,
        orig: &YuvPicture,
        pred: &[Sample],
        rec: &mut YuvPicture,
        cu_writer: &CuWriter,
    ) -> ComponentCost {
        let (x, y, w, h) = {
            let cu = pic.cu(id);
            (cu.pos_x(comp), cu.pos_y(comp), cu.width(comp), cu.height(comp))
        };
        let n = (w * h) as usize;
        orig.read_block(comp, x, y, w, h, &mut self.orig[..n]);
        for ((r, &o), &p) in self.resi[..n].iter_mut().zip(&self.orig[..n]).zip(&pred[..n]) {
            *r = (o as i32 - p as i32) as Residual;
        }

        let mode_set = pic.intra_mode_set();
        let size_64 = w == MAX_BLOCK_SIZE || h == MAX_BLOCK_SIZE;
        let mut best: Option<(Candidate, ComponentCost)> = None;
        let mut default_has_coeff = false;
        let mut skip_select = false;
        for candidate in self.candidates(pic, id, comp) {
            let is_select = matches!(candidate, Candidate::Transform(idx) if idx >= 0);
            if is_select && (skip_select || (self.fast_transform_select && !default_has_coeff)) {
                continue;
            }
            if candidate == Candidate::Zero && self.fast_transform_size_64 && size_64 && best.is_some() {
                continue;
            }
            let num_nonzero = self.apply_candidate(pic, id, comp, candidate);
            if candidate == Candidate::Transform(-1) {
                default_has_coeff = num_nonzero > 0;
            }
            if candidate != Candidate::Zero && num_nonzero == 0 {
                // same result as the zero residual candidate
                continue;
            }
            self.residual
                .reconstruct_block(pic.cu(id), comp, &pred[..n], &mut self.reco[..n]);
            let cu = pic.cu(id);
            let dist = self.metric.compare_comp(
                cu.qp(),
                comp,
                w as usize,
                h as usize,
                &self.orig[..n],
                w as usize,
                &self.reco[..n],
                w as usize,
            );
            let bits = self.count_bits(pic, id, comp, cu_writer);
            let cost = cu.qp().cost(dist, bits);
            if best.is_none_or(|(_, b)| cost < b.cost) {
                best = Some((candidate, ComponentCost { dist, bits, cost }));
                self.best_coeff[..n].copy_from_slice(pic.cu(id).coeff(comp));
                self.best_reco[..n].copy_from_slice(&self.reco[..n]);
            } else if is_select && self.fast_transform_select_eval {
                skip_select = true;
            }
        }

        let (candidate, result) = best.unwrap_or((Candidate::Zero, ComponentCost::default()));
        self.restore_candidate(pic, id, comp, candidate);
        pic.cu_mut(id).coeff_mut(comp).copy_from_slice(&self.best_coeff[..n]);
        if candidate == Candidate::Zero {
            let r = self.restrictions;
            pic.cu_mut(id).clear_cbf(comp, &r, mode_set);
        }
        rec.write_block(comp, x, y, w, h, &self.best_reco[..n]);
        result
    }

    fn candidates(&self, pic: &PictureData, id: CuId, comp: YuvComponent) -> Vec<Candidate> {
        let cu = pic.cu(id);
        let (w, h) = (cu.width(comp), cu.height(comp));
        let mut list = vec![Candidate::Transform(-1)];
        if comp.is_luma() && select_size_ok(w, h, &self.restrictions) {
            list.extend((0..MAX_TRANSFORM_SELECT_IDX).map(Candidate::Transform));
        }
        if is_transform_skip_allowed(w, h, &self.restrictions) {
            list.push(Candidate::TransformSkip);
        }
        list.push(Candidate::Zero);
        list
    }

    fn restore_candidate(&mut self, pic: &mut PictureData, id: CuId, comp: YuvComponent, candidate: Candidate) {
        let r = self.restrictions;
        let mode_set = pic.intra_mode_set();
        let cu = pic.cu_mut(id);
        match candidate {
            Candidate::Transform(idx) => {
                cu.set_transform_skip(comp, false);
                cu.set_transform_from_select_idx(comp, idx, &r, mode_set);
                cu.set_cbf(comp, true);
            }
            Candidate::TransformSkip => {
                cu.set_transform_skip(comp, true);
                cu.set_transform_from_select_idx(comp, -1, &r, mode_set);
                cu.set_cbf(comp, true);
            }
            Candidate::Zero => {}
        }
    }

    /// Sets the transform flags of `candidate` on the CU and quantizes the
    /// residual into its coefficients. Returns the number of non-zero levels.
    fn apply_candidate(&mut self, pic: &mut PictureData, id: CuId, comp: YuvComponent, candidate: Candidate) -> usize {
        let r = self.restrictions;
        let mode_set = pic.intra_mode_set();
        if candidate == Candidate::Zero {
            let cu = pic.cu_mut(id);
            cu.clear_cbf(comp, &r, mode_set);
            return 0;
        }
        self.restore_candidate(pic, id, comp, candidate);
        let cu = pic.cu(id);
        let (w, h) = (cu.width(comp), cu.height(comp));
        let stride = w as usize;
        if candidate == Candidate::TransformSkip {
            self.fwd
                .transform_skip(w, h, &self.resi, stride, &mut self.coeff, stride);
        } else {
            let types = resolve_transform_types(cu.transform_types(comp), comp, w, h, cu.is_intra(), &r);
            self.fwd
                .transform(w, h, types, &self.resi, stride, &mut self.coeff, stride);
        }
        let qp = *cu.qp();
        let intra = cu.is_intra();
        let bitdepth = self.bitdepth;
        let coeff = &self.coeff;
        let cu = pic.cu_mut(id);
        let num_nonzero = quantize_forward(comp, &qp, w, h, bitdepth, intra, coeff, stride, cu.coeff_mut(comp), stride);
        if num_nonzero == 0 {
            cu.clear_cbf(comp, &r, mode_set);
        } else {
            cu.set_cbf(comp, true);
        }
        num_nonzero
    }

    fn count_bits(&self, pic: &PictureData, id: CuId, comp: YuvComponent, cu_writer: &CuWriter) -> Bits {
        let mut writer = SyntaxWriter::new(BitCounter::new(), &self.restrictions);
        cu_writer.write_residual_comp(pic, pic.cu(id), comp, &mut writer);
        writer.num_bits() as Bits
    }
}

fn select_size_ok(width: i32, height: i32, r: &Restrictions) -> bool {
    !r.disable_ext2_transform_select && width <= MAX_TRANSFORM_SELECT_SIZE && height <= MAX_TRANSFORM_SELECT_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChromaFormat, PicturePredictionType};
    use crate::intra_prediction::IntraPrediction;
    use crate::picture_data::tests::params;
    use crate::reference_picture_lists::ReferencePictureLists;

    fn setup(value: Sample) -> (PictureData, CuId, YuvPicture) {
        let mut pic = PictureData::new(params(16, 16, PicturePredictionType::Intra), ReferencePictureLists::default());
        let id = pic.create_cu(2, 0, 0, 8, 8);
        let mut orig = YuvPicture::new(ChromaFormat::Yuv420, 16, 16, 8, false);
        for y in 0..8 {
            for x in 0..8 {
                orig.set_sample(YuvComponent::Y, x, y, value);
            }
        }
        (pic, id, orig)
    }

    #[test]
    fn perfect_prediction_codes_no_residual() {
        let r = Restrictions::default();
        let intra = IntraPrediction::new(8, &r);
        let writer = CuWriter::new(&intra);
        let (mut pic, id, orig) = setup(128);
        let mut rec = YuvPicture::new(ChromaFormat::Yuv420, 16, 16, 8, false);
        let mut enc = TransformEncoder::new(8, &r, &EncoderSettings::default());
        let pred = vec![128 as Sample; 64];
        let result = enc.encode_component(&mut pic, id, YuvComponent::Y, &orig, &pred, &mut rec, &writer);
        assert_eq!(result.dist, 0);
        assert!(!pic.cu(id).cbf(YuvComponent::Y));
        assert!(pic.cu(id).coeff(YuvComponent::Y).iter().all(|&c| c == 0));
        assert_eq!(rec.sample(YuvComponent::Y, 7, 7), 128);
    }

    #[test]
    fn flat_offset_is_coded() {
        let r = Restrictions::default();
        let intra = IntraPrediction::new(8, &r);
        let writer = CuWriter::new(&intra);
        let (mut pic, id, orig) = setup(168);
        let mut rec = YuvPicture::new(ChromaFormat::Yuv420, 16, 16, 8, false);
        let mut enc = TransformEncoder::new(8, &r, &EncoderSettings::default());
        let pred = vec![128 as Sample; 64];
        let zero_dist = enc.distortion(&pic, id, YuvComponent::Y, &orig, &pred);
        assert_eq!(zero_dist, 40 * 40 * 64);
        let result = enc.encode_component(&mut pic, id, YuvComponent::Y, &orig, &pred, &mut rec, &writer);
        assert!(pic.cu(id).cbf(YuvComponent::Y));
        assert!(result.bits > 0);
        assert!(result.dist * 10 < zero_dist);
        let s = rec.sample(YuvComponent::Y, 3, 3) as i32;
        assert!((s - 168).abs() <= 4, "reconstructed {s}");
    }
}
