//! Walks a coding tree and emits its syntax.

use crate::bitwriter::BitSink;
use crate::coding_unit::{CodingUnit, CuId};
use crate::common::{MAX_TRANSFORM_SELECT_SIZE, PicturePredictionType, YuvComponent};
use crate::cu_types::{InterDir, PredictionMode, RefPicList, SplitRestriction, SplitType};
use crate::intra_prediction::IntraPrediction;
use crate::picture_data::PictureData;
use crate::reference_picture_lists::ReferencePictureLists;
use crate::syntax::{SyntaxWriter, coeff_scan_order};
use crate::transform::is_transform_skip_allowed;

pub(crate) fn bipred_allowed(pic: &PictureData) -> bool {
    pic.pic_type() == PicturePredictionType::Bi && !pic.restrictions().disable_inter_bipred
}

pub(crate) fn transform_select_coded(pic: &PictureData, cu: &CodingUnit) -> bool {
    !pic.restrictions().disable_ext2_transform_select
        && cu.width(YuvComponent::Y) <= MAX_TRANSFORM_SELECT_SIZE
        && cu.height(YuvComponent::Y) <= MAX_TRANSFORM_SELECT_SIZE
        && !cu.transform_skip(YuvComponent::Y)
}

pub struct CuWriter<'a> {
    intra_pred: &'a IntraPrediction,
}

impl<'a> CuWriter<'a> {
    pub fn new(intra_pred: &'a IntraPrediction) -> Self {
        Self { intra_pred }
    }

    /// Writes a whole CTU. Leaves become visible to neighbor lookups in
    /// coding order, exactly as the reader sees them.
    pub fn write_ctu<S: BitSink>(&self, pic: &mut PictureData, ctu: CuId, writer: &mut SyntaxWriter<S>) {
        pic.clear_mark_cu_in_pic(ctu);
        self.write_cu(pic, ctu, SplitRestriction::None, writer);
    }

    fn write_cu<S: BitSink>(
        &self,
        pic: &mut PictureData,
        id: CuId,
        restriction: SplitRestriction,
        writer: &mut SyntaxWriter<S>,
    ) {
        self.write_split(pic, pic.cu(id), restriction, writer);
        let split = pic.cu(id).split();
        if split == SplitType::None {
            self.write_components(pic, pic.cu(id), writer);
            pic.mark_used_in_pic(id);
            return;
        }
        let subs: Vec<CuId> = pic.cu(id).sub_cus().collect();
        let mut sibling_restriction = SplitRestriction::None;
        for (i, sub) in subs.into_iter().enumerate() {
            if !pic.is_inside_picture(sub) {
                continue;
            }
            self.write_cu(pic, sub, sibling_restriction, writer);
            if i == 0 && split != SplitType::Quad {
                sibling_restriction = pic.cu(sub).derive_sibling_split_restriction(split, pic.pic_type());
            }
        }
    }

    pub fn write_split<S: BitSink>(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        restriction: SplitRestriction,
        writer: &mut SyntaxWriter<S>,
    ) {
        let opts = pic.split_options(cu, restriction);
        let split = cu.split();
        if opts.implicit_quad() {
            debug_assert_eq!(split, SplitType::Quad);
            return;
        }
        if opts.quad_flag_coded() {
            writer.write_split_quad(split == SplitType::Quad);
            if split == SplitType::Quad {
                return;
            }
        }
        if opts.any_binary() {
            writer.write_split_binary(split, opts.horizontal, opts.vertical);
        }
    }

    /// Prediction and residual syntax of one leaf.
    pub fn write_components<S: BitSink>(&self, pic: &PictureData, cu: &CodingUnit, writer: &mut SyntaxWriter<S>) {
        let r = *pic.restrictions();
        if !pic.is_intra_pic() {
            if !r.disable_inter_skip_mode {
                writer.write_skip_flag(cu.skip_flag());
            }
            if cu.skip_flag() {
                self.write_merge_data(pic, cu, writer);
                return;
            }
            writer.write_pred_mode(cu.pred_mode());
        }
        match cu.pred_mode() {
            PredictionMode::Intra => self.write_intra(pic, cu, writer),
            PredictionMode::Inter => {
                if !r.disable_inter_merge_mode {
                    writer.write_merge_flag(cu.merge_flag());
                }
                if cu.merge_flag() {
                    self.write_merge_data(pic, cu, writer);
                } else {
                    self.write_inter(pic, cu, writer);
                }
            }
        }
        self.write_residual(pic, cu, writer);
    }

    fn write_merge_data<S: BitSink>(&self, pic: &PictureData, cu: &CodingUnit, writer: &mut SyntaxWriter<S>) {
        if !pic.restrictions().disable_ext2_inter_affine_merge && pic.can_affine_merge(cu) {
            writer.write_affine_flag(cu.use_affine());
            if cu.use_affine() {
                return;
            }
        }
        writer.write_merge_idx(cu.merge_idx());
    }

    fn write_intra<S: BitSink>(&self, pic: &PictureData, cu: &CodingUnit, writer: &mut SyntaxWriter<S>) {
        let mode_set = pic.intra_mode_set();
        if cu.components().contains(&YuvComponent::Y) {
            let mpm = self.intra_pred.predictor_luma(pic, cu);
            writer.write_intra_mode(cu.intra_mode_luma(), &mpm, mode_set);
        }
        if cu.components().contains(&YuvComponent::U) {
            let predictors = self.intra_pred.predictors_chroma(cu.intra_mode_luma(), mode_set);
            writer.write_intra_chroma_mode(cu.intra_mode_chroma(), &predictors);
        }
    }

    /// Explicit motion data of a non-merge inter leaf.
    pub(crate) fn write_inter<S: BitSink>(&self, pic: &PictureData, cu: &CodingUnit, writer: &mut SyntaxWriter<S>) {
        let r = *pic.restrictions();
        if pic.pic_type() == PicturePredictionType::Bi {
            writer.write_inter_dir(cu.inter_dir(), bipred_allowed(pic));
        }
        if cu.can_use_affine() && !r.disable_ext2_inter_affine {
            writer.write_affine_flag(cu.use_affine());
        }
        if !r.disable_ext2_inter_adaptive_fullpel_mv && !cu.use_affine() {
            writer.write_fullpel_flag(cu.fullpel_mv());
        }
        for list in RefPicList::ALL {
            if !ReferencePictureLists::is_list_used(list, cu.inter_dir()) {
                continue;
            }
            writer.write_ref_idx(cu.ref_idx(list), pic.ref_pic_lists().num_ref_pics(list));
            if !cu.force_mvd_zero(list, pic.force_bipred_l1_mvd_zero()) {
                if cu.use_affine() {
                    writer.write_mvd(cu.mvd_affine(0, list));
                    writer.write_mvd(cu.mvd_affine(1, list));
                } else {
                    writer.write_mvd(cu.mv_delta(list));
                }
            }
            writer.write_mvp_idx(cu.mvp_idx(list));
        }
        if cu.inter_dir() != InterDir::Bi && !r.disable_ext2_inter_local_illumination_comp {
            writer.write_lic_flag(cu.use_lic());
        }
    }

    fn write_residual<S: BitSink>(&self, pic: &PictureData, cu: &CodingUnit, writer: &mut SyntaxWriter<S>) {
        let r = *pic.restrictions();
        if cu.is_inter() && !r.disable_transform_root_cbf {
            writer.write_root_cbf(cu.root_cbf());
        }
        if !cu.root_cbf() {
            return;
        }
        for &comp in cu.components() {
            self.write_residual_comp(pic, cu, comp, writer);
        }
    }

    pub fn write_residual_comp<S: BitSink>(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        writer: &mut SyntaxWriter<S>,
    ) {
        let r = *pic.restrictions();
        let cbf_implicit = r.disable_transform_cbf;
        if !cbf_implicit {
            writer.write_cbf(cu.cbf(comp));
        }
        if !cu.cbf(comp) {
            return;
        }
        let (w, h) = (cu.width(comp), cu.height(comp));
        if is_transform_skip_allowed(w, h, &r) {
            writer.write_transform_skip(cu.transform_skip(comp));
        }
        if comp.is_luma() && transform_select_coded(pic, cu) {
            writer.write_transform_select_enable(cu.has_transform_select_idx());
            if cu.has_transform_select_idx() {
                writer.write_transform_select_idx(cu.transform_select_idx());
            }
        }
        let scan = coeff_scan_order(cu, comp, pic.intra_mode_set(), &r);
        writer.write_coefficients(cu.coeff(comp), w, h, scan, cbf_implicit);
    }
}
