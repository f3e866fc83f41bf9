//! Parses the coding tree of a CTU back into [`PictureData`].

use crate::coding_unit::CuId;
use crate::common::{PicturePredictionType, YuvComponent};
use crate::cu_types::{InterDir, PredictionMode, RefPicList, SplitRestriction, SplitType};
use crate::cu_writer::{bipred_allowed, transform_select_coded};
use crate::error::{CodecError, Result};
use crate::intra_prediction::IntraPrediction;
use crate::picture_data::PictureData;
use crate::reference_picture_lists::ReferencePictureLists;
use crate::syntax::{SyntaxReader, coeff_scan_order};
use crate::transform::is_transform_skip_allowed;

pub struct CuReader<'a> {
    intra_pred: &'a IntraPrediction,
}

impl<'a> CuReader<'a> {
    pub fn new(intra_pred: &'a IntraPrediction) -> Self {
        Self { intra_pred }
    }

    /// Reads the split tree and leaf syntax of one CTU of either tree. The
    /// CTU must be an unsplit node; a chroma tree is read after the luma
    /// tree of the same CTU.
    pub fn read_ctu(&self, pic: &mut PictureData, ctu: CuId, reader: &mut SyntaxReader) -> Result<()> {
        self.read_cu(pic, ctu, SplitRestriction::None, reader)
    }

    fn read_cu(
        &self,
        pic: &mut PictureData,
        id: CuId,
        restriction: SplitRestriction,
        reader: &mut SyntaxReader,
    ) -> Result<()> {
        let split = self.read_split(pic, id, restriction, reader)?;
        if split == SplitType::None {
            self.read_components(pic, id, reader)?;
            pic.mark_used_in_pic(id);
            return Ok(());
        }
        pic.split_cu(id, split);
        let subs: Vec<CuId> = pic.cu(id).sub_cus().collect();
        let mut sibling_restriction = SplitRestriction::None;
        for (i, sub) in subs.into_iter().enumerate() {
            if !pic.is_inside_picture(sub) {
                continue;
            }
            self.read_cu(pic, sub, sibling_restriction, reader)?;
            if i == 0 && split != SplitType::Quad {
                sibling_restriction = pic.cu(sub).derive_sibling_split_restriction(split, pic.pic_type());
            }
        }
        Ok(())
    }

    fn read_split(
        &self,
        pic: &PictureData,
        id: CuId,
        restriction: SplitRestriction,
        reader: &mut SyntaxReader,
    ) -> Result<SplitType> {
        let opts = pic.split_options(pic.cu(id), restriction);
        if opts.implicit_quad() {
            return Ok(SplitType::Quad);
        }
        if opts.quad_flag_coded() && reader.read_split_quad()? {
            return Ok(SplitType::Quad);
        }
        if opts.any_binary() {
            return reader.read_split_binary(opts.horizontal, opts.vertical);
        }
        Ok(SplitType::None)
    }

    fn read_components(&self, pic: &mut PictureData, id: CuId, reader: &mut SyntaxReader) -> Result<()> {
        let r = *pic.restrictions();
        let mode_set = pic.intra_mode_set();
        let pred_mode = if pic.is_intra_pic() {
            PredictionMode::Intra
        } else {
            if !r.disable_inter_skip_mode && reader.read_skip_flag()? {
                let cu = pic.cu_mut(id);
                cu.set_pred_mode(PredictionMode::Inter);
                cu.set_skip_flag(true);
                cu.set_merge_flag(true);
                cu.set_root_cbf(false);
                self.read_merge_data(pic, id, reader)?;
                let cu = pic.cu_mut(id);
                for comp in YuvComponent::ALL {
                    cu.clear_cbf(comp, &r, mode_set);
                }
                return Ok(());
            }
            reader.read_pred_mode()?
        };
        pic.cu_mut(id).set_pred_mode(pred_mode);
        match pred_mode {
            PredictionMode::Intra => self.read_intra(pic, id, reader)?,
            PredictionMode::Inter => {
                let merge = !r.disable_inter_merge_mode && reader.read_merge_flag()?;
                pic.cu_mut(id).set_merge_flag(merge);
                if merge {
                    self.read_merge_data(pic, id, reader)?;
                } else {
                    self.read_inter(pic, id, reader)?;
                }
            }
        }
        self.read_residual(pic, id, reader)
    }

    fn read_merge_data(&self, pic: &mut PictureData, id: CuId, reader: &mut SyntaxReader) -> Result<()> {
        let affine = !pic.restrictions().disable_ext2_inter_affine_merge
            && pic.can_affine_merge(pic.cu(id))
            && reader.read_affine_flag()?;
        let idx = if affine { -1 } else { reader.read_merge_idx()? };
        let cu = pic.cu_mut(id);
        cu.set_use_affine(affine);
        cu.set_merge_idx(idx);
        Ok(())
    }

    fn read_intra(&self, pic: &mut PictureData, id: CuId, reader: &mut SyntaxReader) -> Result<()> {
        let mode_set = pic.intra_mode_set();
        let comps = pic.cu(id).components();
        let luma = if comps.contains(&YuvComponent::Y) {
            let mpm = self.intra_pred.predictor_luma(pic, pic.cu(id));
            reader.read_intra_mode(&mpm, mode_set)?
        } else {
            pic.co_located_luma_mode(pic.cu(id))
        };
        pic.cu_mut(id).set_intra_mode_luma(luma);
        if comps.contains(&YuvComponent::U) {
            let predictors = self.intra_pred.predictors_chroma(luma, mode_set);
            let chroma = reader.read_intra_chroma_mode(&predictors)?;
            pic.cu_mut(id).set_intra_mode_chroma(chroma);
        }
        Ok(())
    }

    fn read_inter(&self, pic: &mut PictureData, id: CuId, reader: &mut SyntaxReader) -> Result<()> {
        let r = *pic.restrictions();
        let dir = if pic.pic_type() == PicturePredictionType::Bi {
            reader.read_inter_dir(bipred_allowed(pic))?
        } else {
            InterDir::L0
        };
        pic.cu_mut(id).set_inter_dir(dir);
        let affine = pic.cu(id).can_use_affine() && !r.disable_ext2_inter_affine && reader.read_affine_flag()?;
        let fullpel = !r.disable_ext2_inter_adaptive_fullpel_mv && !affine && reader.read_fullpel_flag()?;
        {
            let cu = pic.cu_mut(id);
            cu.set_use_affine(affine);
            cu.set_fullpel_mv(fullpel);
        }
        let force_l1_zero = pic.force_bipred_l1_mvd_zero();
        for list in RefPicList::ALL {
            if !ReferencePictureLists::is_list_used(list, dir) {
                continue;
            }
            let num_refs = pic.ref_pic_lists().num_ref_pics(list);
            if num_refs == 0 {
                return Err(CodecError::Malformed(format!("prediction from empty list {list:?}")));
            }
            let ref_idx = reader.read_ref_idx(num_refs)?;
            let cu = pic.cu_mut(id);
            cu.set_ref_idx(ref_idx, list);
            if !cu.force_mvd_zero(list, force_l1_zero) {
                if affine {
                    let mvd0 = reader.read_mvd()?;
                    let mvd1 = reader.read_mvd()?;
                    cu.set_mvd_affine(0, mvd0, list);
                    cu.set_mvd_affine(1, mvd1, list);
                } else {
                    cu.set_mv_delta(reader.read_mvd()?, list);
                }
            }
            cu.set_mvp_idx(reader.read_mvp_idx()?, list);
        }
        let lic = dir != InterDir::Bi && !r.disable_ext2_inter_local_illumination_comp && reader.read_lic_flag()?;
        pic.cu_mut(id).set_use_lic(lic);
        Ok(())
    }

    fn read_residual(&self, pic: &mut PictureData, id: CuId, reader: &mut SyntaxReader) -> Result<()> {
        let r = *pic.restrictions();
        let mode_set = pic.intra_mode_set();
        let root = if pic.cu(id).is_inter() && !r.disable_transform_root_cbf {
            reader.read_root_cbf()?
        } else {
            true
        };
        pic.cu_mut(id).set_root_cbf(root);
        for &comp in pic.cu(id).components() {
            if !root {
                pic.cu_mut(id).clear_cbf(comp, &r, mode_set);
                continue;
            }
            self.read_residual_comp(pic, id, comp, reader)?;
        }
        Ok(())
    }

    fn read_residual_comp(
        &self,
        pic: &mut PictureData,
        id: CuId,
        comp: YuvComponent,
        reader: &mut SyntaxReader,
    ) -> Result<()> {
        let r = *pic.restrictions();
        let mode_set = pic.intra_mode_set();
        let cbf_implicit = r.disable_transform_cbf;
        if !cbf_implicit && !reader.read_cbf()? {
            pic.cu_mut(id).clear_cbf(comp, &r, mode_set);
            return Ok(());
        }
        let (w, h) = (pic.cu(id).width(comp), pic.cu(id).height(comp));
        let skip = is_transform_skip_allowed(w, h, &r) && reader.read_transform_skip()?;
        {
            let cu = pic.cu_mut(id);
            cu.set_cbf(comp, true);
            cu.set_transform_skip(comp, skip);
        }
        if comp.is_luma() {
            let idx = if transform_select_coded(pic, pic.cu(id)) && reader.read_transform_select_enable()? {
                reader.read_transform_select_idx()?
            } else {
                -1
            };
            pic.cu_mut(id).set_transform_from_select_idx(comp, idx, &r, mode_set);
        }
        let scan = coeff_scan_order(pic.cu(id), comp, mode_set, &r);
        reader.read_coefficients(pic.cu_mut(id).coeff_mut(comp), w, h, scan, cbf_implicit)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;
    use crate::bitwriter::{BitCounter, BitWriter};
    use crate::cu_types::{CuTree, IntraChromaMode, IntraMode, MotionVector};
    use crate::cu_writer::CuWriter;
    use crate::picture_data::tests::params;
    use crate::cu_types::IntraModeSet;
    use crate::reference_picture_lists::tests::entry;
    use crate::restrictions::Restrictions;
    use crate::syntax::SyntaxWriter;

    fn intra_picture(two_trees: bool) -> PictureData {
        let mut p = params(64, 64, PicturePredictionType::Intra);
        p.restrictions.disable_ext_two_cu_trees = !two_trees;
        PictureData::new(p, ReferencePictureLists::default())
    }

    fn inter_picture(pic_type: PicturePredictionType) -> PictureData {
        let mut lists = ReferencePictureLists::default();
        lists.reset(4);
        for (list, poc) in [(RefPicList::L0, 3), (RefPicList::L0, 2), (RefPicList::L1, 3)] {
            let idx = lists.num_ref_pics(list);
            lists.set_ref_pic(list, idx, entry(poc));
        }
        let mut p = params(64, 64, pic_type);
        p.poc = 4;
        PictureData::new(p, lists)
    }

    /// Puts a hand-built leaf into the state the encoder leaves it in.
    fn finish(cu: &mut crate::coding_unit::CodingUnit, r: &Restrictions, select_idx: i32, mode_set: IntraModeSet) {
        cu.set_transform_from_select_idx(YuvComponent::Y, select_idx, r, mode_set);
        cu.derive_cbf_flags(r);
    }

    fn round_trip(pic: &mut PictureData) -> PictureData {
        let r = *pic.restrictions();
        let intra_pred = IntraPrediction::new(8, &r);
        let mut writer = SyntaxWriter::new(BitWriter::new(), &r);
        let mut counter = SyntaxWriter::new(BitCounter::new(), &r);
        for &tree in pic.cu_trees() {
            let ctu = pic.ctu_in(tree, 0);
            CuWriter::new(&intra_pred).write_ctu(pic, ctu, &mut writer);
            CuWriter::new(&intra_pred).write_ctu(pic, ctu, &mut counter);
        }
        assert_eq!(counter.num_bits(), writer.num_bits());
        let data = writer.into_sink().finalize();

        let mut decoded = PictureData::new(pic.params().clone(), pic.ref_pic_lists().clone());
        let mut reader = SyntaxReader::new(BitReader::new(&data), &r);
        for &tree in decoded.cu_trees() {
            let ctu = decoded.ctu_in(tree, 0);
            CuReader::new(&intra_pred).read_ctu(&mut decoded, ctu, &mut reader).unwrap();
        }
        decoded
    }

    fn assert_same_leaves(a: &PictureData, b: &PictureData) {
        for &tree in a.cu_trees() {
            assert_same_tree(a, b, tree);
        }
    }

    fn assert_same_tree(a: &PictureData, b: &PictureData, tree: CuTree) {
        let la = a.leaves(a.ctu_in(tree, 0));
        let lb = b.leaves(b.ctu_in(tree, 0));
        assert_eq!(la.len(), lb.len());
        for (&x, &y) in la.iter().zip(&lb) {
            let (cx, cy) = (a.cu(x), b.cu(y));
            assert_eq!(cx.pos_x(YuvComponent::Y), cy.pos_x(YuvComponent::Y));
            assert_eq!(cx.pos_y(YuvComponent::Y), cy.pos_y(YuvComponent::Y));
            assert_eq!(cx.width(YuvComponent::Y), cy.width(YuvComponent::Y));
            assert_eq!(cx.height(YuvComponent::Y), cy.height(YuvComponent::Y));
            assert_eq!(cx.pred_mode(), cy.pred_mode());
            assert_eq!(cx.transform_state(), cy.transform_state());
            for comp in YuvComponent::ALL {
                assert_eq!(cx.coeff(comp), cy.coeff(comp));
            }
            if cx.is_intra() {
                assert_eq!(cx.intra_state(), cy.intra_state());
            } else {
                let (sx, sy) = (cx.inter_state(), cy.inter_state());
                assert_eq!(sx.skip_flag, sy.skip_flag);
                assert_eq!(sx.merge_flag, sy.merge_flag);
                assert_eq!(sx.use_affine, sy.use_affine);
                assert_eq!(sx.inter_dir, sy.inter_dir);
                if !sx.merge_flag {
                    assert_eq!(sx.mvd, sy.mvd);
                    assert_eq!(sx.ref_idx, sy.ref_idx);
                    assert_eq!(sx.mvp_idx, sy.mvp_idx);
                    assert_eq!(sx.use_lic, sy.use_lic);
                    assert_eq!(sx.fullpel_mv, sy.fullpel_mv);
                } else if !sx.use_affine {
                    assert_eq!(sx.merge_idx, sy.merge_idx);
                }
            }
        }
    }

    #[test]
    fn intra_tree_round_trip() {
        let mut pic = intra_picture(false);
        let r = Restrictions::default();
        let root = pic.ctu(0);
        pic.split_cu(root, SplitType::Quad);
        let subs: Vec<CuId> = pic.cu(root).sub_cus().collect();
        pic.split_cu(subs[1], SplitType::Vertical);
        let right = pic.cu(subs[1]).sub_cu(1).unwrap();
        pic.split_cu(right, SplitType::Horizontal);
        for (n, leaf) in pic.leaves(root).into_iter().enumerate() {
            let cu = pic.cu_mut(leaf);
            cu.set_intra_mode_luma(IntraMode((n * 7 % 67) as u8));
            cu.set_intra_mode_chroma(if n % 2 == 0 { IntraChromaMode::Dm } else { IntraChromaMode::Lm });
            if n % 3 == 0 {
                cu.coeff_mut(YuvComponent::Y)[0] = 12 - n as i16;
                cu.coeff_mut(YuvComponent::V)[1] = -1;
            }
            finish(cu, &r, -1, IntraModeSet::Modes67);
        }
        let decoded = round_trip(&mut pic);
        assert_same_leaves(&pic, &decoded);
        assert_eq!(decoded.cu(decoded.ctu(0)).split(), SplitType::Quad);
    }

    #[test]
    fn chroma_tree_round_trip() {
        let mut pic = intra_picture(true);
        let r = Restrictions::default();
        let luma_root = pic.ctu(0);
        pic.split_cu(luma_root, SplitType::Quad);
        for (n, leaf) in pic.leaves(luma_root).into_iter().enumerate() {
            let cu = pic.cu_mut(leaf);
            cu.set_intra_mode_luma(IntraMode(2 + 16 * n as u8));
            cu.coeff_mut(YuvComponent::Y)[n] = 7;
            finish(cu, &r, -1, IntraModeSet::Modes67);
        }
        pic.mark_used_in_pic(luma_root);

        let chroma_root = pic.ctu_in(CuTree::Secondary, 0);
        pic.split_cu(chroma_root, SplitType::Vertical);
        let right = pic.cu(chroma_root).sub_cu(1).unwrap();
        pic.split_cu(right, SplitType::Horizontal);
        let modes = [IntraChromaMode::Mode(IntraMode::PLANAR), IntraChromaMode::Lm, IntraChromaMode::Dm];
        for (n, leaf) in pic.leaves(chroma_root).into_iter().enumerate() {
            let luma = pic.co_located_luma_mode(pic.cu(leaf));
            let cu = pic.cu_mut(leaf);
            cu.set_intra_mode_luma(luma);
            cu.set_intra_mode_chroma(modes[n]);
            cu.coeff_mut(YuvComponent::U)[n] = -3;
            cu.derive_cbf_flags(&r);
        }

        let decoded = round_trip(&mut pic);
        assert_eq!(decoded.cu_trees().len(), 2);
        assert_same_leaves(&pic, &decoded);
        let chroma_leaves = decoded.leaves(decoded.ctu_in(CuTree::Secondary, 0));
        assert_eq!(chroma_leaves.len(), 3);
        let bottom_right = decoded.cu(chroma_leaves[2]);
        assert_eq!(bottom_right.intra_mode(YuvComponent::U), Some(IntraMode(2 + 16 * 3)));
        assert!(bottom_right.cbf(YuvComponent::U));
        assert!(!bottom_right.cbf(YuvComponent::Y));
        assert!(decoded.leaves(decoded.ctu(0)).iter().all(|&id| !decoded.cu(id).cbf(YuvComponent::V)));
    }

    #[test]
    fn inter_tree_round_trip() {
        let mut pic = inter_picture(PicturePredictionType::Bi);
        let r = *pic.restrictions();
        let root = pic.ctu(0);
        pic.split_cu(root, SplitType::Quad);
        let subs: Vec<CuId> = pic.cu(root).sub_cus().collect();
        {
            let cu = pic.cu_mut(subs[0]);
            cu.set_pred_mode(PredictionMode::Inter);
            cu.set_skip_flag(true);
            cu.set_merge_flag(true);
            cu.set_merge_idx(2);
            finish(cu, &r, -1, IntraModeSet::Modes67);
        }
        {
            let cu = pic.cu_mut(subs[1]);
            cu.set_pred_mode(PredictionMode::Inter);
            cu.set_inter_dir(InterDir::Bi);
            cu.set_ref_idx(1, RefPicList::L0);
            cu.set_mv_delta(MotionVector::new(-5, 9), RefPicList::L0);
            cu.set_mvp_idx(1, RefPicList::L0);
            cu.set_mv_delta(MotionVector::new(3, 0), RefPicList::L1);
            cu.coeff_mut(YuvComponent::Y)[5] = 3;
            finish(cu, &r, 2, IntraModeSet::Modes67);
        }
        {
            let cu = pic.cu_mut(subs[2]);
            cu.set_pred_mode(PredictionMode::Inter);
            cu.set_inter_dir(InterDir::L1);
            cu.set_use_affine(true);
            cu.set_mvd_affine(0, MotionVector::new(1, 1), RefPicList::L1);
            cu.set_mvd_affine(1, MotionVector::new(0, -2), RefPicList::L1);
            cu.set_use_lic(true);
            finish(cu, &r, -1, IntraModeSet::Modes67);
        }
        {
            let cu = pic.cu_mut(subs[3]);
            cu.set_intra_mode_luma(IntraMode::PLANAR);
            finish(cu, &r, -1, IntraModeSet::Modes67);
        }
        let decoded = round_trip(&mut pic);
        assert_same_leaves(&pic, &decoded);
    }

    #[test]
    fn baseline_restrictions_round_trip() {
        let mut pic = inter_picture(PicturePredictionType::Uni);
        let mut p = pic.params().clone();
        p.restrictions = Restrictions::new(crate::restrictions::RestrictedMode::ModeD);
        pic = PictureData::new(p, pic.ref_pic_lists().clone());
        let r = *pic.restrictions();
        let root = pic.ctu(0);
        pic.split_cu(root, SplitType::Quad);
        let subs: Vec<CuId> = pic.cu(root).sub_cus().collect();
        for (n, &id) in subs.iter().enumerate() {
            let cu = pic.cu_mut(id);
            if n % 2 == 0 {
                cu.set_pred_mode(PredictionMode::Inter);
                cu.set_mv_delta(MotionVector::new(n as i32, -(n as i32)), RefPicList::L0);
                cu.set_ref_idx(1, RefPicList::L0);
            } else {
                cu.set_intra_mode_luma(IntraMode(n as u8 + 3));
            }
            cu.coeff_mut(YuvComponent::U)[n] = 4;
            finish(cu, &r, -1, IntraModeSet::Modes35);
        }
        let decoded = round_trip(&mut pic);
        assert_same_leaves(&pic, &decoded);
    }
}
