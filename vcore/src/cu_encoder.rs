//! Coding tree decision for one CTU.
//!
//! Every node is tried as a leaf first, then with a horizontal, a vertical
//! and a quad split. Split candidates are built on fresh arena nodes so the
//! current best subtree stays intact until a cheaper one replaces it.

use tracing::trace;

use crate::bitwriter::{BitCounter, BitSink};
use crate::coding_unit::{CodingUnit, CuId, ReconstructionState};
use crate::common::{
    Bits, Cost, Distortion, MAX_BLOCK_SAMPLES, NUM_INTER_MERGE_CANDIDATES, Sample, YuvComponent, size_to_log2,
};
use crate::cu_types::{CuTree, PredictionMode, SplitRestriction, SplitType};
use crate::cu_writer::CuWriter;
use crate::encoder_settings::EncoderSettings;
use crate::inter_prediction::InterPrediction;
use crate::inter_search::InterSearch;
use crate::intra_prediction::IntraPrediction;
use crate::intra_search::IntraSearch;
use crate::picture_data::PictureData;
use crate::restrictions::Restrictions;
use crate::syntax::SyntaxWriter;
use crate::transform_encoder::{ComponentCost, TransformEncoder};
use crate::yuv_pic::YuvPicture;

/// One slot per square CU size from 64 down to 4.
const CU_CACHE_SLOTS: usize = 5;

/// Picture state shared by the mode searches while one CTU is decided.
pub(crate) struct EncodeContext<'a> {
    pub(crate) pic: &'a mut PictureData,
    pub(crate) orig: &'a YuvPicture,
    pub(crate) rec: &'a mut YuvPicture,
    pub(crate) tenc: &'a mut TransformEncoder,
    pub(crate) intra_pred: &'a IntraPrediction,
    pub(crate) inter_pred: &'a InterPrediction,
}

impl EncodeContext<'_> {
    /// Codes the residual of `comp` against `pred` and reconstructs it.
    pub(crate) fn encode_component(&mut self, id: CuId, comp: YuvComponent, pred: &[Sample]) -> ComponentCost {
        let writer = CuWriter::new(self.intra_pred);
        self.tenc
            .encode_component(self.pic, id, comp, self.orig, pred, self.rec, &writer)
    }

    pub(crate) fn cu_bits(&self, id: CuId) -> Bits {
        let mut writer = SyntaxWriter::new(BitCounter::new(), self.pic.restrictions());
        CuWriter::new(self.intra_pred).write_components(self.pic, self.pic.cu(id), &mut writer);
        writer.num_bits() as Bits
    }

    pub(crate) fn split_bits(&self, id: CuId, restriction: SplitRestriction) -> Bits {
        let mut writer = SyntaxWriter::new(BitCounter::new(), self.pic.restrictions());
        CuWriter::new(self.intra_pred).write_split(self.pic, self.pic.cu(id), restriction, &mut writer);
        writer.num_bits() as Bits
    }

    pub(crate) fn distortion(&self, id: CuId) -> Distortion {
        let cu = self.pic.cu(id);
        let mut block = vec![0 as Sample; MAX_BLOCK_SAMPLES];
        let mut dist = 0;
        for &comp in cu.components() {
            let (w, h) = (cu.width(comp), cu.height(comp));
            let n = (w * h) as usize;
            self.rec
                .read_block(comp, cu.pos_x(comp), cu.pos_y(comp), w, h, &mut block[..n]);
            dist += self.tenc.distortion(self.pic, id, comp, self.orig, &block[..n]);
        }
        dist
    }
}

/// Outcome of deciding one node: the root of the winning subtree and its
/// cost including the split syntax of the node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdoResult {
    pub id: CuId,
    pub dist: Distortion,
    pub bits: Bits,
    pub cost: Cost,
}

/// Leaf state kept while the remaining prediction modes are tried.
struct LeafSnapshot {
    cost: Cost,
    cu: CodingUnit,
    reco: ReconstructionState,
}

pub struct CuEncoder {
    settings: EncoderSettings,
    tenc: TransformEncoder,
    intra_pred: IntraPrediction,
    inter_pred: InterPrediction,
    intra_search: IntraSearch,
    inter_search: InterSearch,
    cu_cache: [Option<CodingUnit>; CU_CACHE_SLOTS],
}

impl CuEncoder {
    pub fn new(bitdepth: u8, restrictions: &Restrictions, settings: &EncoderSettings) -> Self {
        Self {
            settings: settings.clone(),
            tenc: TransformEncoder::new(bitdepth, restrictions, settings),
            intra_pred: IntraPrediction::new(bitdepth, restrictions),
            inter_pred: InterPrediction::new(bitdepth, restrictions),
            intra_search: IntraSearch::new(settings),
            inter_search: InterSearch::new(bitdepth, restrictions, settings),
            cu_cache: Default::default(),
        }
    }

    /// Decides the coding trees of CTU `rsaddr`, leaves its reconstruction
    /// in `rec` and writes its syntax. Returns the rate-distortion outcome
    /// summed over the trees; `id` is the root of the primary tree.
    pub fn encode_ctu<S: BitSink>(
        &mut self,
        pic: &mut PictureData,
        orig: &YuvPicture,
        rec: &mut YuvPicture,
        rsaddr: usize,
        writer: &mut SyntaxWriter<S>,
    ) -> RdoResult {
        let mut result = self.decide_ctu(pic, orig, rec, CuTree::Primary, rsaddr);
        // chroma decisions look up the final luma leaves
        pic.mark_used_in_pic(result.id);
        for &tree in &pic.cu_trees()[1..] {
            let chroma = self.decide_ctu(pic, orig, rec, tree, rsaddr);
            result.dist += chroma.dist;
            result.bits += chroma.bits;
            result.cost += chroma.cost;
        }
        let cu_writer = CuWriter::new(&self.intra_pred);
        for &tree in pic.cu_trees() {
            let ctu = pic.ctu_in(tree, rsaddr);
            cu_writer.write_ctu(pic, ctu, writer);
        }
        trace!(rsaddr, dist = result.dist, bits = result.bits, "ctu encoded");
        result
    }

    fn decide_ctu(
        &mut self,
        pic: &mut PictureData,
        orig: &YuvPicture,
        rec: &mut YuvPicture,
        tree: CuTree,
        rsaddr: usize,
    ) -> RdoResult {
        let Self {
            settings,
            tenc,
            intra_pred,
            inter_pred,
            intra_search,
            inter_search,
            cu_cache,
        } = self;
        let mut rdo = Rdo {
            ctx: EncodeContext {
                pic,
                orig,
                rec,
                tenc,
                intra_pred,
                inter_pred,
            },
            settings,
            intra: intra_search,
            inter: inter_search,
            cache: cu_cache,
            #[cfg(test)]
            trace: SplitTrace::default(),
        };
        rdo.compress_ctu(tree, rsaddr)
    }
}

struct Rdo<'a, 'b> {
    ctx: EncodeContext<'a>,
    settings: &'b EncoderSettings,
    intra: &'b mut IntraSearch,
    inter: &'b mut InterSearch,
    cache: &'b mut [Option<CodingUnit>; CU_CACHE_SLOTS],
    #[cfg(test)]
    trace: SplitTrace,
}

/// Split candidates evaluated per node, with optional cost overrides.
#[cfg(test)]
#[derive(Default)]
struct SplitTrace {
    evaluated: Vec<(CuId, SplitType)>,
    costs: Vec<(CuId, SplitType, Cost)>,
}

#[cfg(test)]
impl SplitTrace {
    fn evaluated_at(&self, node: CuId) -> Vec<SplitType> {
        self.evaluated
            .iter()
            .filter(|&&(n, _)| n == node)
            .map(|&(_, s)| s)
            .collect()
    }
}

fn cache_slot(cu: &CodingUnit) -> Option<usize> {
    let comp = YuvComponent::Y;
    let (w, h) = (cu.width(comp), cu.height(comp));
    if w != h {
        return None;
    }
    usize::try_from(6 - size_to_log2(w))
        .ok()
        .filter(|&slot| slot < CU_CACHE_SLOTS)
}

impl Rdo<'_, '_> {
    fn compress_ctu(&mut self, tree: CuTree, rsaddr: usize) -> RdoResult {
        let ctu = self.ctx.pic.ctu_in(tree, rsaddr);
        self.ctx.pic.clear_mark_cu_in_pic(ctu);
        let best = self.compress_cu(ctu, SplitRestriction::None);
        self.ctx.pic.set_ctu(tree, rsaddr, best.id);
        best
    }

    fn qp_cost(&self, dist: Distortion, bits: Bits) -> Cost {
        self.ctx.pic.pic_qp().cost(dist, bits)
    }

    fn save_best(&self, best: &RdoResult) -> ReconstructionState {
        self.ctx.pic.cu(best.id).save_reconstruction(self.ctx.rec)
    }

    fn restore_best(&mut self, best: &RdoResult, state: &ReconstructionState) {
        let ctx = &mut self.ctx;
        ctx.pic.cu_mut(best.id).load_reconstruction(state, ctx.rec);
        ctx.pic.mark_used_in_pic(best.id);
    }

    /// Whether the quad split may be skipped because binary splits already
    /// lost against the leaf.
    fn skip_quad(&self, leaf_is_best: bool, binary_tried: usize) -> bool {
        match self.settings.fast_quad_split_based_on_binary_split {
            level if level <= 0 => false,
            1 => leaf_is_best && binary_tried == 2,
            _ => leaf_is_best && binary_tried >= 1,
        }
    }

    #[cfg(not(test))]
    fn evaluated(&mut self, _node: CuId, _split: SplitType, result: RdoResult) -> RdoResult {
        result
    }

    #[cfg(test)]
    fn evaluated(&mut self, node: CuId, split: SplitType, mut result: RdoResult) -> RdoResult {
        self.trace.evaluated.push((node, split));
        if let Some(&(_, _, cost)) = self.trace.costs.iter().find(|&&(n, s, _)| n == node && s == split) {
            result.cost = cost;
        }
        result
    }

    pub(crate) fn compress_cu(&mut self, id: CuId, restriction: SplitRestriction) -> RdoResult {
        let (opts, depth, binary_depth) = {
            let cu = self.ctx.pic.cu(id);
            (self.ctx.pic.split_options(cu, restriction), cu.depth(), cu.binary_depth())
        };
        if binary_depth == 0 {
            if let Some(slot) = self.cache.get_mut(depth as usize + 1) {
                *slot = None;
            }
        }

        let mut best: Option<RdoResult> = None;
        let mut best_reco: Option<ReconstructionState> = None;
        if opts.no_split {
            let result = self.compress_no_split(id, restriction);
            best = Some(self.evaluated(id, SplitType::None, result));
        }
        let candidates = [
            (SplitType::Horizontal, opts.horizontal),
            (SplitType::Vertical, opts.vertical),
            (SplitType::Quad, opts.quad),
        ];
        let mut binary_tried = 0;
        for (k, &(split, allowed)) in candidates.iter().enumerate() {
            if !allowed {
                continue;
            }
            if split == SplitType::Quad && self.skip_quad(best.is_some_and(|b| b.id == id), binary_tried) {
                continue;
            }
            if split != SplitType::Quad {
                binary_tried += 1;
            }
            if let Some(b) = best.as_ref() {
                if best_reco.is_none() {
                    best_reco = Some(self.save_best(b));
                }
            }
            let result = self.compress_split(id, split, restriction);
            let result = self.evaluated(id, split, result);
            if best.is_none_or(|b| result.cost < b.cost) {
                if let Some(old) = best {
                    if old.id != id {
                        self.ctx.pic.release_cu(old.id);
                    }
                }
                best = Some(result);
                best_reco = None;
                if !candidates[k + 1..].iter().any(|&(_, a)| a) {
                    break;
                }
            } else {
                self.ctx.pic.release_cu(result.id);
                if let (Some(b), Some(state)) = (best, best_reco.as_ref()) {
                    self.restore_best(&b, state);
                }
            }
        }
        let best = match best {
            Some(best) => best,
            None => self.compress_no_split(id, restriction),
        };
        if best.id != id {
            self.ctx.pic.release_cu(id);
        }
        best
    }

    fn compress_split(&mut self, id: CuId, split: SplitType, restriction: SplitRestriction) -> RdoResult {
        let comp = YuvComponent::Y;
        let tmp = {
            let cu = self.ctx.pic.cu(id);
            let (depth, x, y, w, h) = (cu.depth(), cu.pos_x(comp), cu.pos_y(comp), cu.width(comp), cu.height(comp));
            self.ctx.pic.create_cu_in(cu.cu_tree(), depth, x, y, w, h)
        };
        self.ctx.pic.split_cu(tmp, split);
        self.ctx.pic.clear_mark_cu_in_pic(tmp);
        let pic_type = self.ctx.pic.pic_type();
        let subs: Vec<(usize, CuId)> = (0..4)
            .filter_map(|i| self.ctx.pic.cu(tmp).sub_cu(i).map(|s| (i, s)))
            .collect();
        let mut dist = 0;
        let mut bits = 0;
        let mut sibling_restriction = SplitRestriction::None;
        for (i, sub) in subs {
            if !self.ctx.pic.is_inside_picture(sub) {
                continue;
            }
            let result = self.compress_cu(sub, sibling_restriction);
            if result.id != sub {
                self.ctx.pic.set_sub_cu(tmp, i, result.id);
            }
            dist += result.dist;
            bits += result.bits;
            if i == 0 && split != SplitType::Quad {
                sibling_restriction = self
                    .ctx
                    .pic
                    .cu(result.id)
                    .derive_sibling_split_restriction(split, pic_type);
            }
        }
        bits += self.ctx.split_bits(tmp, restriction);
        RdoResult {
            id: tmp,
            dist,
            bits,
            cost: self.qp_cost(dist, bits),
        }
    }

    fn compress_no_split(&mut self, id: CuId, restriction: SplitRestriction) -> RdoResult {
        let cached = if self.settings.skip_mode_decision_for_identical_cu {
            self.cached_cu(id)
        } else {
            None
        };
        let reused = cached.is_some_and(|c| self.compress_fast(id, &c));
        if !reused {
            if self.ctx.pic.is_intra_pic() {
                self.compress_intra(id);
            } else {
                self.compress_inter_leaf(id);
            }
        }
        self.ctx.pic.mark_used_in_pic(id);
        self.store_in_cache(id);

        let dist = self.ctx.distortion(id);
        let bits = self.ctx.cu_bits(id) + self.ctx.split_bits(id, restriction);
        RdoResult {
            id,
            dist,
            bits,
            cost: self.qp_cost(dist, bits),
        }
    }

    fn cached_cu(&self, id: CuId) -> Option<CodingUnit> {
        let comp = YuvComponent::Y;
        let cu = self.ctx.pic.cu(id);
        let cached = self.cache[cache_slot(cu)?].as_ref()?;
        let same = cached.cu_tree() == cu.cu_tree()
            && cached.pos_x(comp) == cu.pos_x(comp)
            && cached.pos_y(comp) == cu.pos_y(comp)
            && cached.width(comp) == cu.width(comp)
            && cached.height(comp) == cu.height(comp);
        same.then(|| cached.clone())
    }

    fn store_in_cache(&mut self, id: CuId) {
        let comp = YuvComponent::Y;
        let cu = self.ctx.pic.cu(id);
        if cu.binary_depth() != 2 {
            return;
        }
        let Some(slot) = cache_slot(cu) else {
            return;
        };
        let parent_mask = (cu.width(comp) << 1) - 1;
        if cu.pos_x(comp) & parent_mask == 0 && cu.pos_y(comp) & parent_mask == 0 {
            self.cache[slot] = Some(cu.clone());
        }
    }

    /// Skip flag and coded block flags as the syntax will carry them. The
    /// residual of every component without a coded block flag is dropped.
    fn finalize_leaf(&mut self, id: CuId, force_skip: bool) {
        let r = *self.ctx.pic.restrictions();
        let mode_set = self.ctx.pic.intra_mode_set();
        let cu = self.ctx.pic.cu_mut(id);
        let comps = cu.components();
        let no_coeffs = comps.iter().all(|&c| cu.coeff(c).iter().all(|&v| v == 0));
        let skip = cu.is_inter() && cu.merge_flag() && !r.disable_inter_skip_mode && (force_skip || no_coeffs);
        cu.set_skip_flag(skip);
        cu.derive_cbf_flags(&r);
        for &comp in comps {
            if !cu.cbf(comp) {
                cu.clear_cbf(comp, &r, mode_set);
            }
        }
    }

    fn leaf_cost(&self, id: CuId) -> Cost {
        self.qp_cost(self.ctx.distortion(id), self.ctx.cu_bits(id))
    }

    /// Keeps the current leaf state when it beats `best`.
    fn keep_if_better(&self, id: CuId, best: &mut Option<LeafSnapshot>) -> bool {
        let cost = self.leaf_cost(id);
        if best.as_ref().is_some_and(|b| cost >= b.cost) {
            return false;
        }
        let cu = self.ctx.pic.cu(id);
        *best = Some(LeafSnapshot {
            cost,
            cu: cu.clone(),
            reco: cu.save_reconstruction(self.ctx.rec),
        });
        true
    }

    fn compress_intra(&mut self, id: CuId) {
        {
            let cu = self.ctx.pic.cu_mut(id);
            cu.reset_prediction_state();
            cu.set_pred_mode(PredictionMode::Intra);
        }
        let comps = self.ctx.pic.cu(id).components();
        if comps.contains(&YuvComponent::Y) {
            let luma = self.intra.search_intra_luma(&mut self.ctx, id);
            self.ctx.pic.cu_mut(id).set_intra_mode_luma(luma);
            self.intra.compress_intra(&mut self.ctx, id, YuvComponent::Y);
        } else {
            let luma = self.ctx.pic.co_located_luma_mode(self.ctx.pic.cu(id));
            self.ctx.pic.cu_mut(id).set_intra_mode_luma(luma);
        }
        if comps.contains(&YuvComponent::U) {
            let chroma = self.intra.search_intra_chroma(&mut self.ctx, id);
            self.ctx.pic.cu_mut(id).set_intra_mode_chroma(chroma);
            for comp in [YuvComponent::U, YuvComponent::V] {
                self.intra.compress_intra(&mut self.ctx, id, comp);
            }
        }
        self.finalize_leaf(id, false);
    }

    /// Merge, explicit motion and, when residual remains or always asked
    /// for, intra. The cheapest of them ends up on the leaf.
    fn compress_inter_leaf(&mut self, id: CuId) {
        let mut best: Option<LeafSnapshot> = None;
        let mut current_is_best = false;
        if !self.ctx.pic.restrictions().disable_inter_merge_mode {
            current_is_best = self.compress_merge(id, &mut best);
        }

        self.ctx.pic.cu_mut(id).reset_prediction_state();
        if self.inter.compress_inter(&mut self.ctx, id).is_some() {
            self.finalize_leaf(id, false);
            current_is_best = self.keep_if_better(id, &mut best);
        }

        let residual_left = best.as_ref().is_none_or(|b| b.cu.has_any_cbf());
        if self.settings.always_evaluate_intra_in_inter || residual_left {
            self.compress_intra(id);
            current_is_best = self.keep_if_better(id, &mut best);
        }

        if !current_is_best {
            if let Some(b) = best {
                let ctx = &mut self.ctx;
                let cu = ctx.pic.cu_mut(id);
                *cu = b.cu;
                cu.load_reconstruction(&b.reco, ctx.rec);
            }
        }
    }

    /// Tries every merge candidate with its residual, then without. Returns
    /// whether the state left on the leaf is the best one seen.
    fn compress_merge(&mut self, id: CuId, best: &mut Option<LeafSnapshot>) -> bool {
        let num_cand = if self.ctx.pic.restrictions().disable_inter_merge_candidates {
            1
        } else {
            NUM_INTER_MERGE_CANDIDATES
        };
        let list = self.inter.merge_list(&self.ctx, id);
        let choices = list.choices(num_cand);
        let mut skip_evaluated = vec![false; choices.len()];
        let mut current_is_best = false;
        let mut found_skip = false;
        for force_skip in [false, true] {
            if force_skip && self.settings.fast_merge_eval && found_skip {
                break;
            }
            for (k, &choice) in choices.iter().enumerate() {
                if force_skip && skip_evaluated[k] {
                    continue;
                }
                self.ctx.pic.cu_mut(id).reset_prediction_state();
                self.inter
                    .compress_merge_cand(&mut self.ctx, id, &list, choice, force_skip);
                self.finalize_leaf(id, force_skip);
                let no_residual = !self.ctx.pic.cu(id).has_any_cbf();
                if no_residual {
                    skip_evaluated[k] = true;
                }
                current_is_best = self.keep_if_better(id, best);
                if current_is_best && no_residual && !force_skip {
                    found_skip = true;
                    break;
                }
            }
        }
        current_is_best
    }

    /// Re-codes a leaf with the prediction data decided earlier for the same
    /// block. Returns false when that data no longer applies.
    fn compress_fast(&mut self, id: CuId, cached: &CodingUnit) -> bool {
        {
            let cu = self.ctx.pic.cu_mut(id);
            cu.reset_prediction_state();
            cu.copy_prediction_data_from(cached);
        }
        if self.ctx.pic.cu(id).is_intra() {
            for &comp in self.ctx.pic.cu(id).components() {
                self.intra.compress_intra(&mut self.ctx, id, comp);
            }
        } else if self.inter.compress_inter_fast(&mut self.ctx, id).is_none() {
            self.ctx.pic.cu_mut(id).reset_prediction_state();
            return false;
        }
        self.finalize_leaf(id, false);
        true
    }
}
