//! Motion estimation, merge candidate evaluation and the inter tool
//! decisions (full-pel motion, illumination compensation, affine motion).

use std::sync::Arc;

use crate::bitwriter::BitCounter;
use crate::coding_unit::{CodingUnit, CuId};
use crate::common::{Bits, Cost, Distortion, MAX_BLOCK_SAMPLES, NUM_INTER_MV_PREDICTORS, Sample, YuvComponent};
use crate::cu_encoder::EncodeContext;
use crate::cu_types::{InterDir, MotionVector, MotionVector3, MvDelta, PredictionMode, RefPicList};
use crate::cu_writer::{CuWriter, bipred_allowed};
use crate::encoder_settings::EncoderSettings;
use crate::inter_prediction::{
    AffineMergeCandidate, MergeCandidate, apply_affine_merge_cand, apply_merge_cand, clip_mv,
    derive_third_corner,
};
use crate::picture_data::PictureData;
use crate::qp::Qp;
use crate::restrictions::Restrictions;
use crate::sample_metric::{MetricType, SampleMetric};
use crate::syntax::SyntaxWriter;

/// Maximum number of small diamond steps after the coarse search.
const MAX_REFINE_STEPS: usize = 16;

/// Merge candidates of one CU, with the affine candidate kept apart since
/// it is signalled by its own flag.
#[derive(Debug, Clone)]
pub struct MergeList {
    pub candidates: Vec<MergeCandidate>,
    pub affine: Option<AffineMergeCandidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    Index(usize),
    Affine,
}

impl MergeList {
    /// Evaluation order: the first `num_cand` indexed candidates followed
    /// by the affine candidate.
    pub fn choices(&self, num_cand: usize) -> Vec<MergeChoice> {
        let mut out: Vec<MergeChoice> = (0..num_cand.min(self.candidates.len())).map(MergeChoice::Index).collect();
        if self.affine.is_some() {
            out.push(MergeChoice::Affine);
        }
        out
    }
}

/// Result of a motion search in one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MotionChoice {
    mv: MotionVector,
    ref_idx: usize,
    mvp: MotionVector,
    mvp_idx: usize,
    /// Motion vector delta and predictor index bits.
    bits: Bits,
    cost: Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Source,
    /// `2 * source - other list prediction`, for bi-prediction refinement.
    BiResidual,
}

struct BlockPos {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl BlockPos {
    fn of(cu: &CodingUnit) -> Self {
        Self {
            x: cu.pos_x(YuvComponent::Y),
            y: cu.pos_y(YuvComponent::Y),
            w: cu.width(YuvComponent::Y),
            h: cu.height(YuvComponent::Y),
        }
    }

    fn samples(&self) -> usize {
        (self.w * self.h) as usize
    }
}

fn rate(qp: &Qp, bits: Bits) -> Cost {
    (qp.lambda_sqrt() * bits as f64 + 0.5) as Cost
}

fn mvd_bits(r: &Restrictions, mvd: MvDelta, mvp_idx: usize) -> Bits {
    let mut writer = SyntaxWriter::new(BitCounter::new(), r);
    writer.write_mvd(mvd);
    writer.write_mvp_idx(mvp_idx as i32);
    writer.num_bits() as Bits
}

fn mvp_idx_bits(r: &Restrictions, mvp_idx: usize) -> Bits {
    let mut writer = SyntaxWriter::new(BitCounter::new(), r);
    writer.write_mvp_idx(mvp_idx as i32);
    writer.num_bits() as Bits
}

/// Predictor index with the cheapest delta towards `mv`. Full-pel deltas
/// are coded in integer sample units.
fn best_predictor(r: &Restrictions, mvps: &[MotionVector; NUM_INTER_MV_PREDICTORS], mv: MotionVector, fullpel: bool) -> (usize, MvDelta, Bits) {
    let mut best = (0, MvDelta::default(), Bits::MAX);
    for (idx, &mvp) in mvps.iter().enumerate() {
        let mut mvd = mv - mvp;
        if fullpel {
            mvd = MvDelta::new(mvd.x / MotionVector::SCALE, mvd.y / MotionVector::SCALE);
        }
        let bits = mvd_bits(r, mvd, idx);
        if bits < best.2 {
            best = (idx, mvd, bits);
        }
    }
    best
}

fn mean(block: &[Sample]) -> i64 {
    if block.is_empty() {
        return 0;
    }
    block.iter().map(|&s| s as i64).sum::<i64>() / block.len() as i64
}

pub struct InterSearch {
    bitdepth: u8,
    restrictions: Restrictions,
    search_range_min: i32,
    search_range_max: i32,
    bipred_refinement_iterations: i32,
    fast_lic: bool,
    fast_fullpel: bool,
    sad: SampleMetric,
    satd: SampleMetric,
    orig: Vec<Sample>,
    target: Vec<Sample>,
    pred: Vec<Sample>,
}

impl InterSearch {
    pub fn new(bitdepth: u8, restrictions: &Restrictions, settings: &EncoderSettings) -> Self {
        Self {
            bitdepth,
            restrictions: *restrictions,
            search_range_min: settings.inter_search_range_uni_min,
            search_range_max: settings.inter_search_range_uni_max,
            bipred_refinement_iterations: settings.bipred_refinement_iterations,
            fast_lic: settings.fast_inter_local_illumination_comp,
            fast_fullpel: settings.fast_inter_adaptive_fullpel_mv,
            sad: SampleMetric::new(MetricType::Sad),
            satd: SampleMetric::new(MetricType::Satd),
            orig: vec![0; MAX_BLOCK_SAMPLES],
            target: vec![0; MAX_BLOCK_SAMPLES],
            pred: vec![0; MAX_BLOCK_SAMPLES],
        }
    }

    pub fn merge_list(&self, ctx: &EncodeContext, id: CuId) -> MergeList {
        let cu = ctx.pic.cu(id);
        let candidates = ctx.inter_pred.merge_candidates(ctx.pic, cu);
        let affine = if !self.restrictions.disable_ext2_inter_affine_merge && ctx.pic.can_affine_merge(cu) {
            ctx.inter_pred.affine_merge_candidate(ctx.pic, cu)
        } else {
            None
        };
        MergeList { candidates, affine }
    }

    fn apply_merge(pic: &mut PictureData, id: CuId, list: &MergeList, choice: MergeChoice) {
        let cu = pic.cu_mut(id);
        cu.set_pred_mode(PredictionMode::Inter);
        cu.set_merge_flag(true);
        match (choice, list.affine.as_ref()) {
            (MergeChoice::Affine, Some(cand)) => {
                apply_affine_merge_cand(cu, cand);
                cu.set_merge_idx(-1);
            }
            (MergeChoice::Index(idx), _) => {
                apply_merge_cand(cu, &list.candidates[idx]);
                cu.set_merge_idx(idx as i32);
            }
            (MergeChoice::Affine, None) => {
                apply_merge_cand(cu, &list.candidates[0]);
                cu.set_merge_idx(0);
            }
        }
    }

    /// Predicts the CU from one merge candidate and codes the residual, or
    /// drops the residual entirely when `force_skip` is set.
    pub fn compress_merge_cand(
        &mut self,
        ctx: &mut EncodeContext,
        id: CuId,
        list: &MergeList,
        choice: MergeChoice,
        force_skip: bool,
    ) -> Distortion {
        Self::apply_merge(ctx.pic, id, list, choice);
        if force_skip {
            self.predict_without_residual(ctx, id)
        } else {
            self.encode_residual(ctx, id)
        }
    }

    fn predict_without_residual(&mut self, ctx: &mut EncodeContext, id: CuId) -> Distortion {
        let r = self.restrictions;
        let mode_set = ctx.pic.intra_mode_set();
        let mut dist = 0;
        for &comp in ctx.pic.chroma_format().components() {
            let (x, y, w, h) = {
                let cu = ctx.pic.cu(id);
                (cu.pos_x(comp), cu.pos_y(comp), cu.width(comp), cu.height(comp))
            };
            let n = (w * h) as usize;
            ctx.inter_pred
                .motion_compensation(ctx.pic, ctx.pic.cu(id), comp, ctx.rec, &mut self.pred[..n]);
            ctx.pic.cu_mut(id).clear_cbf(comp, &r, mode_set);
            ctx.rec.write_block(comp, x, y, w, h, &self.pred[..n]);
            dist += ctx.tenc.distortion(ctx.pic, id, comp, ctx.orig, &self.pred[..n]);
        }
        dist
    }

    /// Predicts every component from the motion set on the CU and codes the
    /// residuals.
    pub fn encode_residual(&mut self, ctx: &mut EncodeContext, id: CuId) -> Distortion {
        let mut dist = 0;
        for &comp in ctx.pic.chroma_format().components() {
            let n = {
                let cu = ctx.pic.cu(id);
                (cu.width(comp) * cu.height(comp)) as usize
            };
            ctx.inter_pred
                .motion_compensation(ctx.pic, ctx.pic.cu(id), comp, ctx.rec, &mut self.pred[..n]);
            dist += ctx.encode_component(id, comp, &self.pred[..n]).dist;
        }
        dist
    }

    /// Full motion search: uni-directional per list and reference, then
    /// bi-prediction, then the optional inter tools. Returns `None` when the
    /// picture has no usable reference.
    pub fn compress_inter(&mut self, ctx: &mut EncodeContext, id: CuId) -> Option<Distortion> {
        let rpl = ctx.pic.ref_pic_lists();
        let num_refs = [rpl.num_ref_pics(RefPicList::L0), rpl.num_ref_pics(RefPicList::L1)];
        if num_refs[0] == 0 {
            return None;
        }
        let r = self.restrictions;
        let qp = *ctx.pic.cu(id).qp();
        let pos = BlockPos::of(ctx.pic.cu(id));
        let n = pos.samples();
        ctx.orig
            .read_block(YuvComponent::Y, pos.x, pos.y, pos.w, pos.h, &mut self.orig[..n]);
        {
            let cu = ctx.pic.cu_mut(id);
            cu.set_pred_mode(PredictionMode::Inter);
            cu.set_merge_flag(false);
            cu.set_merge_idx(-1);
            cu.set_skip_flag(false);
            cu.set_use_affine(false);
            cu.set_use_lic(false);
            cu.set_fullpel_mv(false);
        }

        let bi_pic = ctx.pic.pic_type() == crate::common::PicturePredictionType::Bi;
        let lists: &[RefPicList] = if bi_pic && num_refs[1] > 0 { &RefPicList::ALL } else { &[RefPicList::L0] };
        let mut best_uni: [Option<(MotionChoice, Cost)>; 2] = [None, None];
        for &list in lists {
            for ref_idx in 0..num_refs[list.index()] {
                let choice = self.search_list(ctx, id, list, ref_idx, Target::Source, None);
                let ref_bits = ref_idx_bits(&r, ref_idx, num_refs[list.index()]);
                let cost = choice.cost + rate(&qp, ref_bits);
                if best_uni[list.index()].is_none_or(|(_, c)| cost < c) {
                    best_uni[list.index()] = Some((choice, cost));
                }
            }
        }

        let dir_bits = |dir: InterDir| -> Bits {
            if !bi_pic {
                return 0;
            }
            let mut writer = SyntaxWriter::new(BitCounter::new(), &r);
            writer.write_inter_dir(dir, bipred_allowed(ctx.pic));
            writer.num_bits() as Bits
        };
        let mut best: Option<(InterDir, [Option<MotionChoice>; 2], Cost)> = None;
        for (dir, list) in [(InterDir::L0, RefPicList::L0), (InterDir::L1, RefPicList::L1)] {
            if let Some((choice, cost)) = best_uni[list.index()] {
                let cost = cost + rate(&qp, dir_bits(dir));
                if best.as_ref().is_none_or(|b| cost < b.2) {
                    let mut motion = [None, None];
                    motion[list.index()] = Some(choice);
                    best = Some((dir, motion, cost));
                }
            }
        }
        if let (Some((l0, _)), Some((l1, _))) = (best_uni[0], best_uni[1]) {
            if bipred_allowed(ctx.pic) {
                let (m0, m1, cost) = self.search_bi(ctx, id, [l0, l1], num_refs);
                let cost = cost + rate(&qp, dir_bits(InterDir::Bi));
                if best.as_ref().is_none_or(|b| cost < b.2) {
                    best = Some((InterDir::Bi, [Some(m0), Some(m1)], cost));
                }
            }
        }
        let (dir, motion, _) = best?;
        Self::set_motion(ctx.pic.cu_mut(id), dir, &motion);

        if !r.disable_ext2_inter_adaptive_fullpel_mv {
            self.try_fullpel(ctx, id);
        }
        if dir != InterDir::Bi && !r.disable_ext2_inter_local_illumination_comp {
            self.try_lic(ctx, id);
        }
        let forced_l1 = dir == InterDir::Bi && ctx.pic.force_bipred_l1_mvd_zero();
        if ctx.pic.cu(id).can_use_affine() && !r.disable_ext2_inter_affine && !forced_l1 {
            self.try_affine(ctx, id);
        }
        Some(self.encode_residual(ctx, id))
    }

    /// Re-codes a CU whose motion was copied from an earlier decision at the
    /// same position. Predictor indices and deltas are derived again for the
    /// current neighborhood; `None` when the motion can no longer be
    /// expressed.
    pub fn compress_inter_fast(&mut self, ctx: &mut EncodeContext, id: CuId) -> Option<Distortion> {
        if ctx.pic.cu(id).merge_flag() {
            let list = self.merge_list(ctx, id);
            let cu = ctx.pic.cu(id);
            let choice = if cu.use_affine() {
                list.affine.as_ref()?;
                MergeChoice::Affine
            } else {
                let idx = usize::try_from(cu.merge_idx()).ok()?;
                if idx >= list.candidates.len() {
                    return None;
                }
                MergeChoice::Index(idx)
            };
            Self::apply_merge(ctx.pic, id, &list, choice);
        } else {
            self.rederive_motion_data(ctx, id)?;
        }
        Some(self.encode_residual(ctx, id))
    }

    fn rederive_motion_data(&self, ctx: &mut EncodeContext, id: CuId) -> Option<()> {
        let r = self.restrictions;
        let force_l1_zero = ctx.pic.force_bipred_l1_mvd_zero();
        for list in RefPicList::ALL {
            let cu = ctx.pic.cu(id);
            if !cu.has_mv(list) {
                continue;
            }
            let ref_idx = usize::try_from(cu.ref_idx(list)).ok()?;
            if ref_idx >= ctx.pic.ref_pic_lists().num_ref_pics(list) {
                return None;
            }
            let forced = cu.force_mvd_zero(list, force_l1_zero);
            if cu.use_affine() {
                let mvps = ctx.inter_pred.mvp_list_affine(ctx.pic, cu, list, ref_idx);
                let model = cu.mv_affine(list);
                let idx = if forced {
                    mvps.iter().position(|m| m[0] == model[0] && m[1] == model[1])?
                } else {
                    Self::best_affine_predictor(&r, &mvps, &model).0
                };
                let cu = ctx.pic.cu_mut(id);
                Self::set_affine_list(cu, list, model, &mvps, idx, forced);
            } else {
                let mv = cu.mv(list, crate::cu_types::MvCorner::UpLeft);
                let mvps = ctx.inter_pred.mvp_list(ctx.pic, cu, list, ref_idx);
                let fullpel = cu.fullpel_mv();
                let cu = ctx.pic.cu_mut(id);
                if forced {
                    let idx = mvps.iter().position(|&m| m == mv)?;
                    cu.set_mvp_idx(idx as i32, list);
                    cu.set_mv_delta(MvDelta::default(), list);
                } else {
                    let (idx, mvd, _) = best_predictor(&r, &mvps, mv, fullpel);
                    cu.set_mvp_idx(idx as i32, list);
                    cu.set_mv_delta(mvd, list);
                }
            }
        }
        Some(())
    }

    fn set_motion(cu: &mut CodingUnit, dir: InterDir, motion: &[Option<MotionChoice>; 2]) {
        cu.set_inter_dir(dir);
        for list in RefPicList::ALL {
            if let Some(m) = motion[list.index()] {
                cu.set_ref_idx(m.ref_idx as i32, list);
                cu.set_mv(m.mv, list);
                cu.set_mvp_idx(m.mvp_idx as i32, list);
                cu.set_mv_delta(m.mv - m.mvp, list);
            }
        }
    }

    fn search_range(&self, pic: &PictureData, list: RefPicList, ref_idx: usize) -> i32 {
        let ref_poc = pic.ref_pic_lists().ref_poc(list, ref_idx);
        let distance = (pic.poc() as i64 - ref_poc as i64).unsigned_abs().max(1) as i32;
        self.search_range_min
            .saturating_mul(distance)
            .clamp(self.search_range_min, self.search_range_max.max(self.search_range_min))
    }

    /// Integer diamond search followed by half and quarter sample
    /// refinement for one list and reference.
    fn search_list(
        &mut self,
        ctx: &EncodeContext,
        id: CuId,
        list: RefPicList,
        ref_idx: usize,
        target: Target,
        start: Option<MotionVector>,
    ) -> MotionChoice {
        let r = self.restrictions;
        let cu = ctx.pic.cu(id);
        let qp = *cu.qp();
        let pos = BlockPos::of(cu);
        let n = pos.samples();
        let ref_pic = Arc::clone(&ctx.pic.ref_pic_lists().entry(list, ref_idx).rec);
        let mvps = ctx.inter_pred.mvp_list(ctx.pic, cu, list, ref_idx);
        let range = self.search_range(ctx.pic, list, ref_idx);
        let mv_cost = |mv: MotionVector| -> (usize, Bits) {
            let (idx, _, bits) = best_predictor(&r, &mvps, mv, false);
            (idx, bits)
        };

        // integer positions, in sample units
        let mut starts: Vec<MotionVector> = mvps
            .iter()
            .map(|m| {
                let f = m.round_to_fullpel();
                MotionVector::new(f.x / MotionVector::SCALE, f.y / MotionVector::SCALE)
            })
            .collect();
        starts.push(MotionVector::default());
        if let Some(s) = start {
            let f = s.round_to_fullpel();
            starts.push(MotionVector::new(f.x / MotionVector::SCALE, f.y / MotionVector::SCALE));
        }
        let src: &[Sample] = match target {
            Target::Source => &self.orig[..n],
            Target::BiResidual => &self.target[..n],
        };
        let int_cost = |mv: MotionVector| -> Option<Cost> {
            let full = MotionVector::new(mv.x * MotionVector::SCALE, mv.y * MotionVector::SCALE);
            let clipped = clip_mv(full, pos.x, pos.y, pos.w, pos.h, ref_pic.width(YuvComponent::Y), ref_pic.height(YuvComponent::Y));
            if clipped != full {
                return None;
            }
            let off = ref_pic.offset(YuvComponent::Y, pos.x + mv.x, pos.y + mv.y);
            let dist = self.sad.compare(
                pos.w as usize,
                pos.h as usize,
                src,
                pos.w as usize,
                &ref_pic.plane(YuvComponent::Y)[off..],
                ref_pic.stride(YuvComponent::Y),
            );
            Some(dist + rate(&qp, mv_cost(full).1))
        };

        let mut best_int = (MotionVector::default(), Cost::MAX);
        for s in starts {
            if let Some(c) = int_cost(s) {
                if c < best_int.1 {
                    best_int = (s, c);
                }
            }
        }
        let center = best_int.0;
        let mut step = 1;
        while step <= range {
            let half = (step / 2).max(1);
            let points = [
                (step, 0),
                (-step, 0),
                (0, step),
                (0, -step),
                (half, half),
                (half, -half),
                (-half, half),
                (-half, -half),
            ];
            let num_points = if step == 1 { 4 } else { 8 };
            for &(dx, dy) in &points[..num_points] {
                let cand = MotionVector::new(center.x + dx, center.y + dy);
                if let Some(c) = int_cost(cand) {
                    if c < best_int.1 {
                        best_int = (cand, c);
                    }
                }
            }
            step *= 2;
        }
        for _ in 0..MAX_REFINE_STEPS {
            let around = best_int.0;
            let mut improved = false;
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let cand = MotionVector::new(around.x + dx, around.y + dy);
                if (cand.x - center.x).abs() > range || (cand.y - center.y).abs() > range {
                    continue;
                }
                if let Some(c) = int_cost(cand) {
                    if c < best_int.1 {
                        best_int = (cand, c);
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }

        // sub-sample refinement with SATD on the interpolated prediction
        let mut trial = cu.clone();
        trial.set_inter_dir(if list == RefPicList::L0 { InterDir::L0 } else { InterDir::L1 });
        trial.set_ref_idx(ref_idx as i32, list);
        trial.set_use_affine(false);
        trial.set_use_lic(false);
        trial.set_fullpel_mv(false);
        let int_mv = MotionVector::new(best_int.0.x * MotionVector::SCALE, best_int.0.y * MotionVector::SCALE);
        let mut best_mv = int_mv;
        let mut best_cost = Cost::MAX;
        let mut frac_cost = |this: &mut Self, mv: MotionVector| -> Option<Cost> {
            let clipped = clip_mv(mv, pos.x, pos.y, pos.w, pos.h, ref_pic.width(YuvComponent::Y), ref_pic.height(YuvComponent::Y));
            if clipped != mv {
                return None;
            }
            trial.set_mv(mv, list);
            ctx.inter_pred
                .motion_compensation(ctx.pic, &trial, YuvComponent::Y, ctx.rec, &mut this.pred[..n]);
            let src = match target {
                Target::Source => &this.orig[..n],
                Target::BiResidual => &this.target[..n],
            };
            let dist = this.satd.compare(pos.w as usize, pos.h as usize, src, pos.w as usize, &this.pred[..n], pos.w as usize);
            Some(dist + rate(&qp, mv_cost(mv).1))
        };
        if let Some(c) = frac_cost(self, int_mv) {
            best_cost = c;
        }
        for step in [2, 1] {
            let around = best_mv;
            for dy in [-step, 0, step] {
                for dx in [-step, 0, step] {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let cand = MotionVector::new(around.x + dx, around.y + dy);
                    if let Some(c) = frac_cost(self, cand) {
                        if c < best_cost {
                            best_cost = c;
                            best_mv = cand;
                        }
                    }
                }
            }
        }
        let (mvp_idx, bits) = mv_cost(best_mv);
        MotionChoice {
            mv: best_mv,
            ref_idx,
            mvp: mvps[mvp_idx],
            mvp_idx,
            bits,
            cost: best_cost,
        }
    }

    /// Iteratively refines one list against the residual left by the other.
    /// With a forced zero L1 delta only L0 is refined and L1 sits on a
    /// predictor.
    fn search_bi(
        &mut self,
        ctx: &EncodeContext,
        id: CuId,
        uni: [MotionChoice; 2],
        num_refs: [usize; 2],
    ) -> (MotionChoice, MotionChoice, Cost) {
        let r = self.restrictions;
        let cu = ctx.pic.cu(id);
        let pos = BlockPos::of(cu);
        let n = pos.samples();
        let forced = ctx.pic.force_bipred_l1_mvd_zero();
        let mut cur = uni;
        if forced {
            let l1 = uni[1];
            let mvps = ctx.inter_pred.mvp_list(ctx.pic, cu, RefPicList::L1, l1.ref_idx);
            let mut best = (0, Cost::MAX);
            for (idx, &mvp) in mvps.iter().enumerate() {
                let mut cand = cur;
                cand[1] = MotionChoice { mv: mvp, mvp, mvp_idx: idx, bits: mvp_idx_bits(&r, idx), ..l1 };
                let cost = self.bi_cost(ctx, id, &cand, num_refs);
                if cost < best.1 {
                    best = (idx, cost);
                }
            }
            let mvp = mvps[best.0];
            cur[1] = MotionChoice { mv: mvp, mvp, mvp_idx: best.0, bits: mvp_idx_bits(&r, best.0), ..l1 };
        }
        let mut trial = cu.clone();
        trial.set_use_affine(false);
        trial.set_use_lic(false);
        trial.set_fullpel_mv(false);
        let max_val = (1i32 << self.bitdepth) - 1;
        for iteration in 0..self.bipred_refinement_iterations.max(0) {
            let list = if forced || iteration % 2 == 1 { RefPicList::L0 } else { RefPicList::L1 };
            let other = list.other();
            let o = cur[other.index()];
            trial.set_inter_dir(if other == RefPicList::L0 { InterDir::L0 } else { InterDir::L1 });
            trial.set_ref_idx(o.ref_idx as i32, other);
            trial.set_mv(o.mv, other);
            ctx.inter_pred
                .motion_compensation(ctx.pic, &trial, YuvComponent::Y, ctx.rec, &mut self.pred[..n]);
            for ((t, &s), &p) in self.target[..n].iter_mut().zip(&self.orig[..n]).zip(&self.pred[..n]) {
                *t = (2 * s as i32 - p as i32).clamp(0, max_val) as Sample;
            }
            let c = cur[list.index()];
            cur[list.index()] = self.search_list(ctx, id, list, c.ref_idx, Target::BiResidual, Some(c.mv));
        }
        let cost = self.bi_cost(ctx, id, &cur, num_refs);
        (cur[0], cur[1], cost)
    }

    fn bi_cost(&mut self, ctx: &EncodeContext, id: CuId, motion: &[MotionChoice; 2], num_refs: [usize; 2]) -> Cost {
        let r = self.restrictions;
        let cu = ctx.pic.cu(id);
        let qp = *cu.qp();
        let pos = BlockPos::of(cu);
        let n = pos.samples();
        let mut trial = cu.clone();
        trial.set_inter_dir(InterDir::Bi);
        trial.set_use_affine(false);
        trial.set_use_lic(false);
        let mut bits = 0;
        for list in RefPicList::ALL {
            let m = motion[list.index()];
            trial.set_ref_idx(m.ref_idx as i32, list);
            trial.set_mv(m.mv, list);
            bits += m.bits + ref_idx_bits(&r, m.ref_idx, num_refs[list.index()]);
        }
        ctx.inter_pred
            .motion_compensation(ctx.pic, &trial, YuvComponent::Y, ctx.rec, &mut self.pred[..n]);
        let dist = self.satd.compare(pos.w as usize, pos.h as usize, &self.orig[..n], pos.w as usize, &self.pred[..n], pos.w as usize);
        dist + rate(&qp, bits)
    }

    /// SATD of the luma prediction plus the exact motion syntax rate of the
    /// motion currently set on the CU.
    fn motion_cost(&mut self, ctx: &EncodeContext, id: CuId) -> Cost {
        let cu = ctx.pic.cu(id);
        let pos = BlockPos::of(cu);
        let n = pos.samples();
        ctx.inter_pred
            .motion_compensation(ctx.pic, cu, YuvComponent::Y, ctx.rec, &mut self.pred[..n]);
        let dist = self.satd.compare(pos.w as usize, pos.h as usize, &self.orig[..n], pos.w as usize, &self.pred[..n], pos.w as usize);
        let mut writer = SyntaxWriter::new(BitCounter::new(), &self.restrictions);
        CuWriter::new(ctx.intra_pred).write_inter(ctx.pic, cu, &mut writer);
        dist + rate(cu.qp(), writer.num_bits() as Bits)
    }

    /// Moves every list onto the full-pel grid around its predictor and
    /// keeps the result when it is cheaper.
    fn try_fullpel(&mut self, ctx: &mut EncodeContext, id: CuId) {
        let r = self.restrictions;
        let before = ctx.pic.cu(id).inter_state();
        let base_cost = self.motion_cost(ctx, id);
        ctx.pic.cu_mut(id).set_fullpel_mv(true);
        let force_l1_zero = ctx.pic.force_bipred_l1_mvd_zero();
        let mut moved = false;
        for list in RefPicList::ALL {
            let cu = ctx.pic.cu(id);
            if !cu.has_mv(list) {
                continue;
            }
            let mv = cu.mv(list, crate::cu_types::MvCorner::UpLeft);
            let ref_idx = cu.ref_idx(list) as usize;
            let forced = cu.force_mvd_zero(list, force_l1_zero);
            let mvps = ctx.inter_pred.mvp_list(ctx.pic, cu, list, ref_idx);
            let mut best: Option<(usize, MotionVector, Bits)> = None;
            for (idx, &mvp) in mvps.iter().enumerate() {
                let snapped = if forced { mvp } else { mvp + (mv - mvp).round_to_fullpel() };
                let bits = if forced {
                    mvp_idx_bits(&r, idx)
                } else {
                    let d = snapped - mvp;
                    mvd_bits(&r, MvDelta::new(d.x / MotionVector::SCALE, d.y / MotionVector::SCALE), idx)
                };
                let err = (snapped.x - mv.x).abs() + (snapped.y - mv.y).abs();
                let better = match best {
                    None => true,
                    Some((_, b, b_bits)) => {
                        let b_err = (b.x - mv.x).abs() + (b.y - mv.y).abs();
                        err < b_err || (err == b_err && bits < b_bits)
                    }
                };
                if better {
                    best = Some((idx, snapped, bits));
                }
            }
            let Some((idx, snapped, _)) = best else {
                continue;
            };
            moved |= snapped != mv;
            let mvp = mvps[idx];
            let cu = ctx.pic.cu_mut(id);
            cu.set_mv(snapped, list);
            cu.set_mvp_idx(idx as i32, list);
            let d = snapped - mvp;
            cu.set_mv_delta(
                if forced { MvDelta::default() } else { MvDelta::new(d.x / MotionVector::SCALE, d.y / MotionVector::SCALE) },
                list,
            );
        }
        let keep = if self.fast_fullpel && moved {
            false
        } else {
            self.motion_cost(ctx, id) < base_cost
        };
        if !keep {
            ctx.pic.cu_mut(id).load_inter_state(&before);
        }
    }

    fn try_lic(&mut self, ctx: &mut EncodeContext, id: CuId) {
        let pos = BlockPos::of(ctx.pic.cu(id));
        let n = pos.samples();
        let base_cost = self.motion_cost(ctx, id);
        if self.fast_lic {
            // motion_cost left the plain prediction in the buffer
            let offset = (mean(&self.orig[..n]) - mean(&self.pred[..n])).abs();
            if offset < (1 << (self.bitdepth - 8)) * 2 {
                return;
            }
        }
        ctx.pic.cu_mut(id).set_use_lic(true);
        if self.motion_cost(ctx, id) >= base_cost {
            ctx.pic.cu_mut(id).set_use_lic(false);
        }
    }

    fn best_affine_predictor(r: &Restrictions, mvps: &[MotionVector3; NUM_INTER_MV_PREDICTORS], model: &MotionVector3) -> (usize, Bits) {
        let mut best = (0, Bits::MAX);
        for (idx, mvp) in mvps.iter().enumerate() {
            let mut writer = SyntaxWriter::new(BitCounter::new(), r);
            writer.write_mvd(model[0] - mvp[0]);
            writer.write_mvd(model[1] - mvp[1]);
            writer.write_mvp_idx(idx as i32);
            let bits = writer.num_bits() as Bits;
            if bits < best.1 {
                best = (idx, bits);
            }
        }
        best
    }

    fn set_affine_list(
        cu: &mut CodingUnit,
        list: RefPicList,
        model: MotionVector3,
        mvps: &[MotionVector3; NUM_INTER_MV_PREDICTORS],
        idx: usize,
        forced: bool,
    ) {
        cu.set_mv_affine(model, list);
        cu.set_mvp_idx(idx as i32, list);
        let (d0, d1) = if forced {
            (MvDelta::default(), MvDelta::default())
        } else {
            (model[0] - mvps[idx][0], model[1] - mvps[idx][1])
        };
        cu.set_mvd_affine(0, d0, list);
        cu.set_mvd_affine(1, d1, list);
    }

    /// Tries the affine predictors unchanged and the translational motion
    /// expressed as an affine model.
    fn try_affine(&mut self, ctx: &mut EncodeContext, id: CuId) {
        let r = self.restrictions;
        let before = ctx.pic.cu(id).inter_state();
        let mut best_cost = self.motion_cost(ctx, id);
        let mut best_state = None;
        let (w, h) = {
            let cu = ctx.pic.cu(id);
            (cu.width(YuvComponent::Y), cu.height(YuvComponent::Y))
        };
        let lists: Vec<(RefPicList, usize, MotionVector)> = RefPicList::ALL
            .into_iter()
            .filter(|&l| before_has_mv(&before, l))
            .map(|l| (l, before.ref_idx[l.index()] as usize, before.mv[l.index()][0]))
            .collect();
        let mvps: Vec<[MotionVector3; NUM_INTER_MV_PREDICTORS]> = {
            let cu = ctx.pic.cu(id);
            lists
                .iter()
                .map(|&(l, ref_idx, _)| ctx.inter_pred.mvp_list_affine(ctx.pic, cu, l, ref_idx))
                .collect()
        };
        let model_of = |v0: MotionVector, v1: MotionVector| -> MotionVector3 { [v0, v1, derive_third_corner(v0, v1, w, h)] };

        // candidate 0 and 1: predictor as is, candidate 2: translational model
        for candidate in 0..=NUM_INTER_MV_PREDICTORS {
            {
                let cu = ctx.pic.cu_mut(id);
                cu.load_inter_state(&before);
                cu.set_use_affine(true);
                cu.set_fullpel_mv(false);
                cu.set_use_lic(false);
                for (k, &(list, _, mv)) in lists.iter().enumerate() {
                    if candidate < NUM_INTER_MV_PREDICTORS {
                        let p = mvps[k][candidate];
                        Self::set_affine_list(cu, list, model_of(p[0], p[1]), &mvps[k], candidate, false);
                    } else {
                        let model = model_of(mv, mv);
                        let (idx, _) = Self::best_affine_predictor(&r, &mvps[k], &model);
                        Self::set_affine_list(cu, list, model, &mvps[k], idx, false);
                    }
                }
            }
            let cost = self.motion_cost(ctx, id);
            if cost < best_cost {
                best_cost = cost;
                best_state = Some(ctx.pic.cu(id).inter_state());
            }
        }
        let cu = ctx.pic.cu_mut(id);
        match best_state {
            Some(state) => cu.load_inter_state(&state),
            None => cu.load_inter_state(&before),
        }
    }
}

fn before_has_mv(state: &crate::coding_unit::InterState, list: RefPicList) -> bool {
    crate::reference_picture_lists::ReferencePictureLists::is_list_used(list, state.inter_dir)
}

fn ref_idx_bits(r: &Restrictions, ref_idx: usize, num_refs: usize) -> Bits {
    let mut writer = SyntaxWriter::new(BitCounter::new(), r);
    writer.write_ref_idx(ref_idx as i32, num_refs);
    writer.num_bits() as Bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PicturePredictionType;
    use crate::cu_encoder::tests::Fixture;
    use crate::yuv_pic::YuvPicture;

    /// Source moved by a whole-sample vector, borders clamped.
    fn shifted_picture(src: &YuvPicture, dx: i32, dy: i32) -> YuvPicture {
        let mut out = YuvPicture::new(src.chroma_format(), src.width(YuvComponent::Y), src.height(YuvComponent::Y), src.bitdepth(), true);
        for &comp in src.chroma_format().components() {
            let (sx, sy) = (src.shift_x(comp), src.shift_y(comp));
            let (w, h) = (src.width(comp), src.height(comp));
            for y in 0..h {
                for x in 0..w {
                    let fx = (x - (dx >> sx)).clamp(0, w - 1);
                    let fy = (y - (dy >> sy)).clamp(0, h - 1);
                    out.set_sample(comp, x, y, src.sample(comp, fx, fy));
                }
            }
        }
        out.pad_borders();
        out
    }

    fn textured(fx: &mut Fixture) {
        for y in 0..fx.orig.height(YuvComponent::Y) {
            for x in 0..fx.orig.width(YuvComponent::Y) {
                let v = ((x * 37 + y * 11) % 97 + (x * y) % 13 + 60) as Sample;
                fx.orig.set_sample(YuvComponent::Y, x, y, v);
            }
        }
    }

    #[test]
    fn finds_whole_sample_translation() {
        let mut fx = Fixture::new(PicturePredictionType::Uni, 64, 64);
        textured(&mut fx);
        // the reference holds the source moved 2 samples to the left
        let reference = shifted_picture(&fx.orig, -2, 0);
        fx.set_reference(RefPicList::L0, reference);
        let id = fx.pic.create_cu(1, 16, 16, 16, 16);
        let mut search = InterSearch::new(8, &Restrictions::default(), &EncoderSettings::default());
        let mut ctx = fx.context();
        let dist = search.compress_inter(&mut ctx, id).unwrap();
        let cu = ctx.pic.cu(id);
        assert_eq!(cu.inter_dir(), InterDir::L0);
        if !cu.use_affine() {
            assert_eq!(cu.mv(RefPicList::L0, crate::cu_types::MvCorner::UpLeft), MotionVector::new(-8, 0));
        }
        assert!(dist < 16 * 16 * 4, "distortion {dist}");
    }

    #[test]
    fn merge_list_orders_candidates_before_affine() {
        let list = MergeList {
            candidates: vec![MergeCandidate::default(); 5],
            affine: Some(AffineMergeCandidate::default()),
        };
        let choices = list.choices(5);
        assert_eq!(choices.len(), 6);
        assert_eq!(choices[0], MergeChoice::Index(0));
        assert_eq!(choices[5], MergeChoice::Affine);
        assert_eq!(list.choices(1), vec![MergeChoice::Index(0), MergeChoice::Affine]);
    }

    #[test]
    fn forced_skip_copies_prediction() {
        let mut fx = Fixture::new(PicturePredictionType::Uni, 32, 32);
        textured(&mut fx);
        let reference = fx.orig.clone();
        fx.set_reference(RefPicList::L0, reference);
        let id = fx.pic.create_cu(1, 0, 0, 16, 16);
        let mut search = InterSearch::new(8, &Restrictions::default(), &EncoderSettings::default());
        let mut ctx = fx.context();
        let list = search.merge_list(&ctx, id);
        let dist = search.compress_merge_cand(&mut ctx, id, &list, MergeChoice::Index(0), true);
        // no neighbors: the first candidate is zero motion into an identical picture
        assert_eq!(dist, 0);
        assert!(!ctx.pic.cu(id).has_any_cbf());
        assert_eq!(ctx.rec.sample(YuvComponent::Y, 5, 5), ctx.orig.sample(YuvComponent::Y, 5, 5));
    }

    #[test]
    fn best_predictor_prefers_small_delta() {
        let r = Restrictions::default();
        let mvps = [MotionVector::new(40, 0), MotionVector::new(4, 4)];
        let (idx, mvd, _) = best_predictor(&r, &mvps, MotionVector::new(4, 8), false);
        assert_eq!(idx, 1);
        assert_eq!(mvd, MotionVector::new(0, 4));
        let (_, mvd, _) = best_predictor(&r, &mvps, MotionVector::new(8, 8), true);
        assert_eq!(mvd, MotionVector::new(1, 1));
    }
}
