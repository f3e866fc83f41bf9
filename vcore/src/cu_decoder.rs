//! Reconstruction of a parsed CTU.

use tracing::trace;

use crate::coding_unit::CuId;
use crate::common::{MAX_BLOCK_SAMPLES, Sample};
use crate::cu_reader::CuReader;
use crate::error::{CodecError, Result};
use crate::inter_prediction::{InterPrediction, apply_affine_merge_cand, apply_merge_cand};
use crate::intra_prediction::IntraPrediction;
use crate::picture_data::PictureData;
use crate::residual::ResidualDecoder;
use crate::restrictions::Restrictions;
use crate::syntax::SyntaxReader;
use crate::yuv_pic::YuvPicture;

pub struct CuDecoder {
    intra_pred: IntraPrediction,
    inter_pred: InterPrediction,
    residual: ResidualDecoder,
    pred: Vec<Sample>,
}

impl CuDecoder {
    pub fn new(bitdepth: u8, restrictions: &Restrictions) -> Self {
        Self {
            intra_pred: IntraPrediction::new(bitdepth, restrictions),
            inter_pred: InterPrediction::new(bitdepth, restrictions),
            residual: ResidualDecoder::new(bitdepth, restrictions),
            pred: vec![0; MAX_BLOCK_SAMPLES],
        }
    }

    /// Parses every tree of CTU `rsaddr`, then reconstructs the leaves into
    /// `rec` tree by tree in coding order.
    pub fn decode_ctu(&mut self, pic: &mut PictureData, rec: &mut YuvPicture, rsaddr: usize, reader: &mut SyntaxReader) -> Result<()> {
        let trees = pic.cu_trees();
        for &tree in trees {
            let ctu = pic.ctu_in(tree, rsaddr);
            CuReader::new(&self.intra_pred).read_ctu(pic, ctu, reader)?;
        }
        for &tree in trees {
            let ctu = pic.ctu_in(tree, rsaddr);
            pic.clear_mark_cu_in_pic(ctu);
            let leaves = pic.leaves(ctu);
            trace!(rsaddr, ?tree, leaves = leaves.len(), "ctu parsed");
            for id in leaves {
                self.decompress_cu(pic, rec, id)?;
            }
        }
        Ok(())
    }

    fn decompress_cu(&mut self, pic: &mut PictureData, rec: &mut YuvPicture, id: CuId) -> Result<()> {
        pic.mark_used_in_pic(id);
        if pic.cu(id).is_inter() {
            self.derive_motion(pic, id)?;
        }
        let cu = pic.cu(id);
        for &comp in cu.components() {
            let n = (cu.width(comp) * cu.height(comp)) as usize;
            let pred = &mut self.pred[..n];
            if cu.is_intra() {
                self.intra_pred.predict_comp(pic, cu, comp, rec, pred);
            } else {
                self.inter_pred.motion_compensation(pic, cu, comp, rec, pred);
            }
            self.residual.reconstruct(cu, comp, pred, rec);
        }
        Ok(())
    }

    fn derive_motion(&self, pic: &mut PictureData, id: CuId) -> Result<()> {
        let cu = pic.cu(id);
        if !cu.merge_flag() {
            self.inter_pred.calculate_mv(pic, id);
            return Ok(());
        }
        if cu.use_affine() {
            let cand = self
                .inter_pred
                .affine_merge_candidate(pic, cu)
                .ok_or_else(|| CodecError::Malformed("affine merge without affine neighbor".into()))?;
            apply_affine_merge_cand(pic.cu_mut(id), &cand);
            return Ok(());
        }
        let idx = cu.merge_idx();
        let cands = self.inter_pred.merge_candidates(pic, cu);
        let cand = usize::try_from(idx)
            .ok()
            .and_then(|i| cands.get(i))
            .copied()
            .ok_or_else(|| CodecError::Malformed(format!("merge index {idx} out of range")))?;
        apply_merge_cand(pic.cu_mut(id), &cand);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;
    use crate::bitwriter::BitWriter;
    use crate::common::PicturePredictionType;
    use crate::cu_encoder::CuEncoder;
    use crate::cu_encoder::tests::Fixture;
    use crate::encoder_settings::{EncoderSettings, SpeedMode};
    use crate::reference_picture_lists::ReferencePictureLists;
    use crate::syntax::SyntaxWriter;

    fn gradient(orig: &mut YuvPicture) {
        for &comp in orig.chroma_format().components() {
            for y in 0..orig.height(comp) {
                for x in 0..orig.width(comp) {
                    let v = 30 + x * 3 + y * 2 + ((x ^ y) & 7) * 5;
                    orig.set_sample(comp, x, y, v.min(255) as Sample);
                }
            }
        }
    }

    #[test]
    fn decoded_ctu_matches_encoder_reconstruction() {
        let r = Restrictions::default();
        let settings = EncoderSettings::new(SpeedMode::Fast);
        let mut fx = Fixture::new(PicturePredictionType::Intra, 64, 64);
        gradient(&mut fx.orig);
        let mut enc = CuEncoder::new(8, &r, &settings);
        let mut writer = SyntaxWriter::new(BitWriter::new(), &r);
        enc.encode_ctu(&mut fx.pic, &fx.orig, &mut fx.rec, 0, &mut writer);
        let bytes = writer.into_sink().finalize();

        let mut pic = PictureData::new(fx.pic.params().clone(), ReferencePictureLists::default());
        let mut rec = YuvPicture::new(pic.chroma_format(), 64, 64, 8, true);
        let mut reader = SyntaxReader::new(BitReader::new(&bytes), &r);
        CuDecoder::new(8, &r)
            .decode_ctu(&mut pic, &mut rec, 0, &mut reader)
            .unwrap();
        for &comp in pic.chroma_format().components() {
            for y in 0..rec.height(comp) {
                for x in 0..rec.width(comp) {
                    assert_eq!(rec.sample(comp, x, y), fx.rec.sample(comp, x, y), "{comp:?} at ({x}, {y})");
                }
            }
        }
        for &tree in pic.cu_trees() {
            let ctu = pic.ctu_in(tree, 0);
            assert_eq!(pic.leaves(ctu).len(), fx.pic.leaves(fx.pic.ctu_in(tree, 0)).len());
        }
        assert!(pic.has_secondary_cu_tree());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let r = Restrictions::default();
        let fx = Fixture::new(PicturePredictionType::Intra, 64, 64);
        let mut pic = PictureData::new(fx.pic.params().clone(), ReferencePictureLists::default());
        let mut rec = YuvPicture::new(pic.chroma_format(), 64, 64, 8, true);
        let mut reader = SyntaxReader::new(BitReader::new(&[]), &r);
        let err = CuDecoder::new(8, &r).decode_ctu(&mut pic, &mut rec, 0, &mut reader);
        assert!(err.is_err());
    }
}
