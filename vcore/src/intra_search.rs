//! Intra mode decision for luma and chroma.

use crate::bitwriter::BitCounter;
use crate::coding_unit::CuId;
use crate::common::{Bits, Cost, MAX_BLOCK_SAMPLES, Sample, YuvComponent};
use crate::cu_encoder::EncodeContext;
use crate::cu_types::{IntraChromaMode, IntraMode};
use crate::encoder_settings::EncoderSettings;
use crate::sample_metric::{MetricType, SampleMetric};
use crate::syntax::SyntaxWriter;
use crate::transform_encoder::ComponentCost;

pub struct IntraSearch {
    fast_mode_eval_level: i32,
    satd: SampleMetric,
    orig: Vec<Sample>,
    pred: Vec<Sample>,
}

impl IntraSearch {
    pub fn new(settings: &EncoderSettings) -> Self {
        Self {
            fast_mode_eval_level: settings.fast_intra_mode_eval_level,
            satd: SampleMetric::new(MetricType::Satd),
            orig: vec![0; MAX_BLOCK_SAMPLES],
            pred: vec![0; MAX_BLOCK_SAMPLES],
        }
    }

    /// Picks the luma mode with the lowest rate-distortion cost. With a fast
    /// evaluation level only the best candidates of a SATD pass get a full
    /// residual coding.
    pub fn search_intra_luma(&mut self, ctx: &mut EncodeContext, id: CuId) -> IntraMode {
        let comp = YuvComponent::Y;
        let mode_set = ctx.pic.intra_mode_set();
        let (mpm, refs, qp, n, w, h) = {
            let cu = ctx.pic.cu(id);
            let mpm = ctx.intra_pred.predictor_luma(ctx.pic, cu);
            let refs = ctx.intra_pred.fill_reference_state(ctx.pic, cu, comp, ctx.rec);
            let (w, h) = (cu.width(comp), cu.height(comp));
            ctx.orig
                .read_block(comp, cu.pos_x(comp), cu.pos_y(comp), w, h, &mut self.orig[..(w * h) as usize]);
            (mpm, refs, *cu.qp(), (w * h) as usize, w as usize, h as usize)
        };
        let r = *ctx.pic.restrictions();
        let mode_bits = |mode: IntraMode| -> Bits {
            let mut writer = SyntaxWriter::new(BitCounter::new(), &r);
            writer.write_intra_mode(mode, &mpm, mode_set);
            writer.num_bits() as Bits
        };

        let all_modes = (0..mode_set.num_modes()).map(IntraMode);
        let candidates: Vec<IntraMode> = if self.fast_mode_eval_level > 0 {
            let mut scored: Vec<(Cost, IntraMode)> = all_modes
                .map(|mode| {
                    ctx.intra_pred
                        .predict(mode, mode_set, ctx.pic.cu(id), comp, &refs, &mut self.pred[..n]);
                    let satd = self.satd.compare(w, h, &self.orig[..n], w, &self.pred[..n], w);
                    let rate = (qp.lambda_sqrt() * mode_bits(mode) as f64 + 0.5) as Cost;
                    (satd + rate, mode)
                })
                .collect();
            scored.sort_by_key(|&(cost, mode)| (cost, mode.0));
            let small = n <= 64;
            let keep = match (self.fast_mode_eval_level, small) {
                (1, true) => 8,
                (1, false) => 3,
                (_, true) => 3,
                (_, false) => 2,
            };
            let mut list: Vec<IntraMode> = scored.iter().take(keep).map(|&(_, m)| m).collect();
            if self.fast_mode_eval_level == 1 {
                for &m in &mpm.modes {
                    if !list.contains(&m) {
                        list.push(m);
                    }
                }
            }
            list
        } else {
            all_modes.collect()
        };

        let mut best: Option<(Cost, IntraMode)> = None;
        for mode in candidates {
            ctx.pic.cu_mut(id).set_intra_mode_luma(mode);
            ctx.intra_pred
                .predict(mode, mode_set, ctx.pic.cu(id), comp, &refs, &mut self.pred[..n]);
            let result = ctx.encode_component(id, comp, &self.pred[..n]);
            let cost = qp.cost(result.dist, result.bits + mode_bits(mode));
            if best.is_none_or(|(c, _)| cost < c) {
                best = Some((cost, mode));
            }
        }
        best.map_or(IntraMode::DC, |(_, mode)| mode)
    }

    /// Chroma mode decision over the predictor list of the current luma
    /// mode, coding both chroma components for every candidate.
    pub fn search_intra_chroma(&mut self, ctx: &mut EncodeContext, id: CuId) -> IntraChromaMode {
        if ctx.pic.chroma_format().num_components() == 1 {
            return IntraChromaMode::Dm;
        }
        let mode_set = ctx.pic.intra_mode_set();
        let luma_mode = ctx.pic.cu(id).intra_mode_luma();
        let predictors = ctx.intra_pred.predictors_chroma(luma_mode, mode_set);
        if predictors.len() == 1 {
            return predictors[0];
        }
        let r = *ctx.pic.restrictions();
        let qp = *ctx.pic.cu(id).qp();
        let mut best: Option<(Cost, IntraChromaMode)> = None;
        for &mode in &predictors {
            ctx.pic.cu_mut(id).set_intra_mode_chroma(mode);
            let mut writer = SyntaxWriter::new(BitCounter::new(), &r);
            writer.write_intra_chroma_mode(mode, &predictors);
            let mut dist = 0;
            let mut bits = writer.num_bits() as Bits;
            for comp in [YuvComponent::U, YuvComponent::V] {
                let result = self.compress_intra(ctx, id, comp);
                dist += result.dist;
                bits += result.bits;
            }
            let cost = qp.cost(dist, bits);
            if best.is_none_or(|(c, _)| cost < c) {
                best = Some((cost, mode));
            }
        }
        best.map_or(IntraChromaMode::Dm, |(_, mode)| mode)
    }

    /// Predicts one component with the modes already set on the CU and codes
    /// its residual.
    pub fn compress_intra(&mut self, ctx: &mut EncodeContext, id: CuId, comp: YuvComponent) -> ComponentCost {
        let n = {
            let cu = ctx.pic.cu(id);
            (cu.width(comp) * cu.height(comp)) as usize
        };
        ctx.intra_pred
            .predict_comp(ctx.pic, ctx.pic.cu(id), comp, ctx.rec, &mut self.pred[..n]);
        ctx.encode_component(id, comp, &self.pred[..n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChromaFormat, PicturePredictionType};
    use crate::cu_encoder::tests::Fixture;
    use crate::cu_types::PredictionMode;

    #[test]
    fn vertical_stripes_pick_a_vertical_mode() {
        let mut fx = Fixture::new(PicturePredictionType::Intra, 16, 16);
        // reconstructed row above the block carries the stripe pattern
        for x in 0..16 {
            let v = if x % 2 == 0 { 40 } else { 200 };
            for y in 0..16 {
                fx.orig.set_sample(YuvComponent::Y, x, y, v);
            }
            fx.rec.set_sample(YuvComponent::Y, x, 7, v);
        }
        let above = fx.pic.create_cu(1, 0, 0, 16, 8);
        fx.pic.mark_used_in_pic(above);
        let id = fx.pic.create_cu(1, 0, 8, 8, 8);
        fx.pic.cu_mut(id).set_pred_mode(PredictionMode::Intra);
        let mut search = IntraSearch::new(&EncoderSettings::default());
        let mut ctx = fx.context();
        let mode = search.search_intra_luma(&mut ctx, id);
        let set = ctx.pic.intra_mode_set();
        let vertical = set.vertical().0 as i32;
        assert!((mode.0 as i32 - vertical).abs() <= 2, "picked {mode:?}");
    }

    #[test]
    fn monochrome_chroma_is_derived() {
        let mut fx = Fixture::with_format(PicturePredictionType::Intra, 16, 16, ChromaFormat::Monochrome);
        let id = fx.pic.create_cu(1, 0, 0, 8, 8);
        let mut search = IntraSearch::new(&EncoderSettings::default());
        let mut ctx = fx.context();
        assert_eq!(search.search_intra_chroma(&mut ctx, id), IntraChromaMode::Dm);
    }

    #[test]
    fn flat_block_costs_little() {
        let mut fx = Fixture::new(PicturePredictionType::Intra, 16, 16);
        let id = fx.pic.create_cu(1, 0, 0, 8, 8);
        let mut search = IntraSearch::new(&EncoderSettings::default());
        let mut ctx = fx.context();
        let mode = search.search_intra_luma(&mut ctx, id);
        ctx.pic.cu_mut(id).set_intra_mode_luma(mode);
        let result = search.compress_intra(&mut ctx, id, YuvComponent::Y);
        // source and unavailable references are both mid gray
        assert_eq!(result.dist, 0);
        assert!(!ctx.pic.cu(id).cbf(YuvComponent::Y));
    }
}
