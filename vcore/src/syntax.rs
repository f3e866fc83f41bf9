//! Binarization of the coding-tree syntax elements.
//!
//! Every element is written with a static code (flags as single bits,
//! indices as truncated unary, magnitudes as Exp-Golomb or Golomb-Rice),
//! so the same [`SyntaxWriter`] drives the real bitstream through
//! [`BitWriter`](crate::bitwriter::BitWriter) and rate estimation through
//! [`BitCounter`](crate::bitwriter::BitCounter).

use crate::bitreader::BitReader;
use crate::bitwriter::BitSink;
use crate::coding_unit::CodingUnit;
use crate::common::{Coeff, NUM_INTER_MERGE_CANDIDATES, NUM_INTER_MV_PREDICTORS, YuvComponent};
use crate::cu_types::{InterDir, IntraChromaMode, IntraMode, IntraModeSet, MvDelta, PredictionMode, SplitType};
use crate::error::{CodecError, Result};
use crate::intra_prediction::IntraPredictorLuma;
use crate::restrictions::Restrictions;
use crate::scan::{ScanOrder, scan_table};

/// Scan positions sharing one coded-group flag.
pub const COEFF_GROUP_SIZE: usize = 16;
const MAX_RICE_PARAM: u32 = 4;
const LAST_POS_EG_ORDER: u32 = 2;
const MVD_EG_ORDER: u32 = 1;

fn bits_for(num_symbols: u32) -> u8 {
    if num_symbols <= 1 { 0 } else { (32 - (num_symbols - 1).leading_zeros()) as u8 }
}

/// Scan order of a component's coefficients. Small intra blocks with a
/// near-horizontal mode are scanned vertically and the other way around.
pub fn coeff_scan_order(cu: &CodingUnit, comp: YuvComponent, mode_set: IntraModeSet, r: &Restrictions) -> ScanOrder {
    if r.disable_transform_adaptive_scan_order || !cu.is_intra() {
        return ScanOrder::Diagonal;
    }
    let (w, h) = (cu.width(comp), cu.height(comp));
    let max_size = if comp.is_luma() { 8 } else { 4 };
    if w != h || w > max_size {
        return ScanOrder::Diagonal;
    }
    let Some(mode) = cu.intra_mode(comp) else {
        return ScanOrder::Diagonal;
    };
    let range = match mode_set {
        IntraModeSet::Modes35 => 4,
        IntraModeSet::Modes67 => 8,
    };
    let m = mode.0 as i32;
    if (m - mode_set.horizontal().0 as i32).abs() <= range {
        ScanOrder::Vertical
    } else if (m - mode_set.vertical().0 as i32).abs() <= range {
        ScanOrder::Horizontal
    } else {
        ScanOrder::Diagonal
    }
}

/// Shared state of the level binarization: the Rice parameter adapts to the
/// magnitudes coded so far in the block.
#[derive(Debug, Clone, Copy)]
struct LevelCoder {
    rice_k: u32,
    greater1: bool,
    greater2: bool,
    adaptive: bool,
}

impl LevelCoder {
    fn new(r: &Restrictions) -> Self {
        Self {
            rice_k: 0,
            greater1: !r.disable_transform_residual_greater_than_flags,
            greater2: !r.disable_transform_residual_greater_than_flags && !r.disable_transform_residual_greater2,
            adaptive: !r.disable_transform_adaptive_exp_golomb,
        }
    }

    fn update(&mut self, abs: u32) {
        if self.adaptive && abs > (3 << self.rice_k) {
            self.rice_k = (self.rice_k + 1).min(MAX_RICE_PARAM);
        }
    }

    /// Writes `abs >= 1`.
    fn write<S: BitSink>(&mut self, sink: &mut S, abs: u32) {
        let mut base = 1;
        if self.greater1 {
            sink.write_bit(abs > 1);
            if abs == 1 {
                self.update(abs);
                return;
            }
            base = 2;
            if self.greater2 {
                sink.write_bit(abs > 2);
                if abs == 2 {
                    self.update(abs);
                    return;
                }
                base = 3;
            }
        }
        sink.write_golomb_rice(abs - base, self.rice_k);
        self.update(abs);
    }

    fn read(&mut self, reader: &mut BitReader) -> Result<u32> {
        let mut base = 1;
        if self.greater1 {
            if !reader.read_bit()? {
                self.update(1);
                return Ok(1);
            }
            base = 2;
            if self.greater2 {
                if !reader.read_bit()? {
                    self.update(2);
                    return Ok(2);
                }
                base = 3;
            }
        }
        let abs = reader.read_golomb_rice(self.rice_k)? + base;
        self.update(abs);
        Ok(abs)
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxWriter<S: BitSink> {
    sink: S,
    restrictions: Restrictions,
}

impl<S: BitSink> SyntaxWriter<S> {
    pub fn new(sink: S, restrictions: &Restrictions) -> Self {
        Self {
            sink,
            restrictions: *restrictions,
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.sink.num_bits()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    pub fn write_split_quad(&mut self, split: bool) {
        self.sink.write_bit(split);
    }

    /// Binary split flag followed by the direction when both are legal.
    pub fn write_split_binary(&mut self, split: SplitType, allow_horizontal: bool, allow_vertical: bool) {
        debug_assert!(allow_horizontal || allow_vertical);
        self.sink.write_bit(split != SplitType::None);
        if split != SplitType::None && allow_horizontal && allow_vertical {
            self.sink.write_bit(split == SplitType::Vertical);
        }
    }

    pub fn write_skip_flag(&mut self, skip: bool) {
        self.sink.write_bit(skip);
    }

    pub fn write_pred_mode(&mut self, mode: PredictionMode) {
        self.sink.write_bit(mode == PredictionMode::Intra);
    }

    pub fn write_merge_flag(&mut self, merge: bool) {
        self.sink.write_bit(merge);
    }

    pub fn write_merge_idx(&mut self, idx: i32) {
        self.sink.write_unary_max(idx as u32, NUM_INTER_MERGE_CANDIDATES as u32 - 1);
    }

    pub fn write_affine_flag(&mut self, affine: bool) {
        self.sink.write_bit(affine);
    }

    pub fn write_lic_flag(&mut self, lic: bool) {
        self.sink.write_bit(lic);
    }

    pub fn write_fullpel_flag(&mut self, fullpel: bool) {
        self.sink.write_bit(fullpel);
    }

    /// `allow_bi` is false in pictures or blocks without bi-prediction.
    pub fn write_inter_dir(&mut self, dir: InterDir, allow_bi: bool) {
        if allow_bi {
            self.sink.write_bit(dir == InterDir::Bi);
            if dir == InterDir::Bi {
                return;
            }
        }
        self.sink.write_bit(dir == InterDir::L1);
    }

    pub fn write_ref_idx(&mut self, ref_idx: i32, num_refs: usize) {
        if num_refs > 1 {
            self.sink.write_unary_max(ref_idx as u32, num_refs as u32 - 1);
        }
    }

    pub fn write_mvd(&mut self, mvd: MvDelta) {
        let gt_flags = !self.restrictions.disable_inter_mvd_greater_than_flags;
        for v in [mvd.x, mvd.y] {
            let abs = v.unsigned_abs();
            if gt_flags {
                self.sink.write_bit(abs > 0);
                if abs > 0 {
                    self.sink.write_bit(abs > 1);
                    if abs > 1 {
                        self.sink.write_exp_golomb(abs - 2, MVD_EG_ORDER);
                    }
                }
            } else {
                self.sink.write_exp_golomb(abs, MVD_EG_ORDER);
            }
            if abs > 0 {
                self.sink.write_bit(v < 0);
            }
        }
    }

    pub fn write_mvp_idx(&mut self, idx: i32) {
        self.sink.write_unary_max(idx as u32, NUM_INTER_MV_PREDICTORS as u32 - 1);
    }

    pub fn write_intra_mode(&mut self, mode: IntraMode, mpm: &IntraPredictorLuma, mode_set: IntraModeSet) {
        let num_modes = mode_set.num_modes() as u32;
        if self.restrictions.disable_intra_mpm_prediction {
            self.sink.write_bits(mode.0 as u64, bits_for(num_modes));
            return;
        }
        let num_mpm = mpm.modes.len() as u32;
        match mpm.index_of(mode) {
            Some(idx) => {
                self.sink.write_bit(true);
                self.sink.write_unary_max(idx as u32, num_mpm - 1);
            }
            None => {
                self.sink.write_bit(false);
                let below = mpm.modes.iter().filter(|m| m.0 < mode.0).count() as u32;
                self.sink.write_bits((mode.0 as u32 - below) as u64, bits_for(num_modes - num_mpm));
            }
        }
    }

    pub fn write_intra_chroma_mode(&mut self, mode: IntraChromaMode, predictors: &[IntraChromaMode]) {
        let idx = predictors.iter().position(|&m| m == mode);
        debug_assert!(idx.is_some(), "chroma mode {mode:?} not among predictors");
        let idx = idx.unwrap_or(0) as u32;
        self.sink.write_unary_max(idx, predictors.len() as u32 - 1);
    }

    pub fn write_root_cbf(&mut self, cbf: bool) {
        self.sink.write_bit(cbf);
    }

    pub fn write_cbf(&mut self, cbf: bool) {
        self.sink.write_bit(cbf);
    }

    pub fn write_transform_skip(&mut self, skip: bool) {
        self.sink.write_bit(skip);
    }

    pub fn write_transform_select_enable(&mut self, enable: bool) {
        self.sink.write_bit(enable);
    }

    pub fn write_transform_select_idx(&mut self, idx: i32) {
        self.sink.write_bits(idx as u64, 2);
    }

    /// Writes the levels of a `width` x `height` block. When the coded block
    /// flag is not signalled the block may be empty. Returns the number of
    /// non-zero coefficients.
    pub fn write_coefficients(
        &mut self,
        coeff: &[Coeff],
        width: i32,
        height: i32,
        scan: ScanOrder,
        cbf_implicit: bool,
    ) -> usize {
        let table = scan_table(scan, width, height);
        let r = self.restrictions;
        let last = table.iter().rposition(|&p| coeff[p as usize] != 0);
        let end = if r.disable_transform_last_position {
            table.len()
        } else {
            match (last, cbf_implicit) {
                (Some(l), true) => {
                    self.sink.write_exp_golomb(l as u32 + 1, LAST_POS_EG_ORDER);
                    l + 1
                }
                (Some(l), false) => {
                    self.sink.write_exp_golomb(l as u32, LAST_POS_EG_ORDER);
                    l + 1
                }
                (None, _) => {
                    debug_assert!(cbf_implicit, "empty block with a coded cbf");
                    self.sink.write_exp_golomb(0, LAST_POS_EG_ORDER);
                    return 0;
                }
            }
        };
        let last_known = !r.disable_transform_last_position;
        let use_groups = !r.disable_transform_subblock_csbf;
        let mut levels = LevelCoder::new(&r);
        let mut num_nonzero = 0;
        let num_groups = end.div_ceil(COEFF_GROUP_SIZE);
        for group in (0..num_groups).rev() {
            let first = group * COEFF_GROUP_SIZE;
            let stop = ((group + 1) * COEFF_GROUP_SIZE).min(end);
            if use_groups && group != 0 && group + 1 != num_groups {
                let coded = table[first..stop].iter().any(|&p| coeff[p as usize] != 0);
                self.sink.write_bit(coded);
                if !coded {
                    continue;
                }
            }
            for pos in (first..stop).rev() {
                let c = coeff[table[pos] as usize];
                let abs = c.unsigned_abs() as u32;
                if !(last_known && pos + 1 == end) {
                    self.sink.write_bit(abs != 0);
                }
                if abs == 0 {
                    continue;
                }
                levels.write(&mut self.sink, abs);
                self.sink.write_bit(c < 0);
                num_nonzero += 1;
            }
        }
        num_nonzero
    }
}

/// Reading counterpart of [`SyntaxWriter`].
pub struct SyntaxReader<'a> {
    reader: BitReader<'a>,
    restrictions: Restrictions,
}

impl<'a> SyntaxReader<'a> {
    pub fn new(reader: BitReader<'a>, restrictions: &Restrictions) -> Self {
        Self {
            reader,
            restrictions: *restrictions,
        }
    }

    pub fn bit_reader(&mut self) -> &mut BitReader<'a> {
        &mut self.reader
    }

    pub fn into_bit_reader(self) -> BitReader<'a> {
        self.reader
    }

    pub fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    pub fn read_split_quad(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_split_binary(&mut self, allow_horizontal: bool, allow_vertical: bool) -> Result<SplitType> {
        if !self.reader.read_bit()? {
            return Ok(SplitType::None);
        }
        Ok(match (allow_horizontal, allow_vertical) {
            (true, true) => {
                if self.reader.read_bit()? {
                    SplitType::Vertical
                } else {
                    SplitType::Horizontal
                }
            }
            (true, false) => SplitType::Horizontal,
            _ => SplitType::Vertical,
        })
    }

    pub fn read_skip_flag(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_pred_mode(&mut self) -> Result<PredictionMode> {
        Ok(if self.reader.read_bit()? { PredictionMode::Intra } else { PredictionMode::Inter })
    }

    pub fn read_merge_flag(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_merge_idx(&mut self) -> Result<i32> {
        Ok(self.reader.read_unary_max(NUM_INTER_MERGE_CANDIDATES as u32 - 1)? as i32)
    }

    pub fn read_affine_flag(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_lic_flag(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_fullpel_flag(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_inter_dir(&mut self, allow_bi: bool) -> Result<InterDir> {
        if allow_bi && self.reader.read_bit()? {
            return Ok(InterDir::Bi);
        }
        Ok(if self.reader.read_bit()? { InterDir::L1 } else { InterDir::L0 })
    }

    pub fn read_ref_idx(&mut self, num_refs: usize) -> Result<i32> {
        if num_refs <= 1 {
            return Ok(0);
        }
        Ok(self.reader.read_unary_max(num_refs as u32 - 1)? as i32)
    }

    pub fn read_mvd(&mut self) -> Result<MvDelta> {
        let gt_flags = !self.restrictions.disable_inter_mvd_greater_than_flags;
        let mut comps = [0i32; 2];
        for v in comps.iter_mut() {
            let abs = if gt_flags {
                if !self.reader.read_bit()? {
                    0
                } else if !self.reader.read_bit()? {
                    1
                } else {
                    self.reader.read_exp_golomb(MVD_EG_ORDER)? + 2
                }
            } else {
                self.reader.read_exp_golomb(MVD_EG_ORDER)?
            };
            let abs = i32::try_from(abs).map_err(|_| CodecError::Malformed("motion vector delta overflow".into()))?;
            *v = if abs > 0 && self.reader.read_bit()? { -abs } else { abs };
        }
        Ok(MvDelta::new(comps[0], comps[1]))
    }

    pub fn read_mvp_idx(&mut self) -> Result<i32> {
        Ok(self.reader.read_unary_max(NUM_INTER_MV_PREDICTORS as u32 - 1)? as i32)
    }

    pub fn read_intra_mode(&mut self, mpm: &IntraPredictorLuma, mode_set: IntraModeSet) -> Result<IntraMode> {
        let num_modes = mode_set.num_modes() as u32;
        let mode = if self.restrictions.disable_intra_mpm_prediction {
            self.reader.read_bits(bits_for(num_modes))? as u32
        } else {
            let num_mpm = mpm.modes.len() as u32;
            if self.reader.read_bit()? {
                let idx = self.reader.read_unary_max(num_mpm - 1)?;
                mpm.modes[idx as usize].0 as u32
            } else {
                let mut mode = self.reader.read_bits(bits_for(num_modes - num_mpm))? as u32;
                let mut sorted: Vec<u32> = mpm.modes.iter().map(|m| m.0 as u32).collect();
                sorted.sort_unstable();
                for m in sorted {
                    if mode >= m {
                        mode += 1;
                    }
                }
                mode
            }
        };
        if mode >= num_modes {
            return Err(CodecError::Malformed(format!("intra mode {mode} out of range")));
        }
        Ok(IntraMode(mode as u8))
    }

    pub fn read_intra_chroma_mode(&mut self, predictors: &[IntraChromaMode]) -> Result<IntraChromaMode> {
        let idx = self.reader.read_unary_max(predictors.len() as u32 - 1)?;
        Ok(predictors[idx as usize])
    }

    pub fn read_root_cbf(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_cbf(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_transform_skip(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_transform_select_enable(&mut self) -> Result<bool> {
        self.reader.read_bit()
    }

    pub fn read_transform_select_idx(&mut self) -> Result<i32> {
        Ok(self.reader.read_bits(2)? as i32)
    }

    /// Fills `coeff` (stride `width`) and returns the number of non-zero
    /// levels read.
    pub fn read_coefficients(
        &mut self,
        coeff: &mut [Coeff],
        width: i32,
        height: i32,
        scan: ScanOrder,
        cbf_implicit: bool,
    ) -> Result<usize> {
        let table = scan_table(scan, width, height);
        let r = self.restrictions;
        coeff[..table.len()].fill(0);
        let end = if r.disable_transform_last_position {
            table.len()
        } else {
            let v = self.reader.read_exp_golomb(LAST_POS_EG_ORDER)? as usize;
            let end = if cbf_implicit { v } else { v + 1 };
            if end == 0 {
                return Ok(0);
            }
            if end > table.len() {
                return Err(CodecError::Malformed(format!("last position {} beyond block", end - 1)));
            }
            end
        };
        let last_known = !r.disable_transform_last_position;
        let use_groups = !r.disable_transform_subblock_csbf;
        let mut levels = LevelCoder::new(&r);
        let mut num_nonzero = 0;
        let num_groups = end.div_ceil(COEFF_GROUP_SIZE);
        for group in (0..num_groups).rev() {
            let first = group * COEFF_GROUP_SIZE;
            let stop = ((group + 1) * COEFF_GROUP_SIZE).min(end);
            if use_groups && group != 0 && group + 1 != num_groups && !self.reader.read_bit()? {
                continue;
            }
            for pos in (first..stop).rev() {
                let significant = (last_known && pos + 1 == end) || self.reader.read_bit()?;
                if !significant {
                    continue;
                }
                let abs = levels.read(&mut self.reader)?;
                let abs = i16::try_from(abs).map_err(|_| CodecError::Malformed("coefficient level overflow".into()))?;
                coeff[table[pos] as usize] = if self.reader.read_bit()? { -abs } else { abs };
                num_nonzero += 1;
            }
        }
        Ok(num_nonzero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitwriter::{BitCounter, BitWriter};
    use crate::cu_types::MotionVector;

    fn round_trip_coeffs(r: &Restrictions, coeff: &[Coeff], w: i32, h: i32, scan: ScanOrder, implicit: bool) {
        let mut sw = SyntaxWriter::new(BitWriter::new(), r);
        let n = sw.write_coefficients(coeff, w, h, scan, implicit);
        let mut counter = SyntaxWriter::new(BitCounter::new(), r);
        counter.write_coefficients(coeff, w, h, scan, implicit);
        assert_eq!(counter.num_bits(), sw.num_bits());
        let data = sw.into_sink().finalize();
        let mut sr = SyntaxReader::new(BitReader::new(&data), r);
        let mut out = vec![7; (w * h) as usize];
        assert_eq!(sr.read_coefficients(&mut out, w, h, scan, implicit).unwrap(), n);
        assert_eq!(out, coeff);
    }

    fn sample_block() -> Vec<Coeff> {
        let mut c = vec![0; 64];
        c[0] = 57;
        c[1] = -3;
        c[8] = 2;
        c[9] = -1;
        c[27] = 1;
        c[63] = -400;
        c
    }

    #[test]
    fn coefficients_round_trip_default() {
        let r = Restrictions::default();
        for scan in [ScanOrder::Diagonal, ScanOrder::Horizontal, ScanOrder::Vertical] {
            round_trip_coeffs(&r, &sample_block(), 8, 8, scan, false);
        }
        let mut rect = vec![0; 32];
        rect[5] = 9;
        round_trip_coeffs(&r, &rect, 8, 4, ScanOrder::Diagonal, false);
    }

    #[test]
    fn coefficients_round_trip_restricted() {
        let mut r = Restrictions::default();
        r.set_all(true);
        round_trip_coeffs(&r, &sample_block(), 8, 8, ScanOrder::Diagonal, true);
        round_trip_coeffs(&r, &[0; 16], 4, 4, ScanOrder::Diagonal, true);
        let mut r = Restrictions::default();
        r.disable_transform_subblock_csbf = true;
        r.disable_transform_residual_greater2 = true;
        round_trip_coeffs(&r, &sample_block(), 8, 8, ScanOrder::Vertical, false);
    }

    #[test]
    fn empty_block_with_implicit_cbf() {
        let r = Restrictions::default();
        round_trip_coeffs(&r, &[0; 16], 4, 4, ScanOrder::Diagonal, true);
    }

    #[test]
    fn motion_and_modes_round_trip() {
        let r = Restrictions::default();
        let mpm = IntraPredictorLuma {
            modes: vec![IntraMode(26), IntraMode(10), IntraMode::PLANAR],
        };
        let chroma = [IntraChromaMode::Lm, IntraChromaMode::Dm, IntraChromaMode::Mode(IntraMode::DC)];
        let mut sw = SyntaxWriter::new(BitWriter::new(), &r);
        sw.write_mvd(MotionVector::new(-17, 0));
        sw.write_mvd(MotionVector::new(1, 2));
        sw.write_inter_dir(InterDir::L1, true);
        sw.write_inter_dir(InterDir::Bi, true);
        sw.write_ref_idx(2, 3);
        sw.write_merge_idx(4);
        sw.write_intra_mode(IntraMode(10), &mpm, IntraModeSet::Modes35);
        sw.write_intra_mode(IntraMode(34), &mpm, IntraModeSet::Modes35);
        sw.write_intra_mode(IntraMode(1), &mpm, IntraModeSet::Modes35);
        sw.write_intra_chroma_mode(IntraChromaMode::Mode(IntraMode::DC), &chroma);
        sw.write_split_binary(SplitType::Vertical, true, true);
        sw.write_split_binary(SplitType::Horizontal, true, false);
        let data = sw.into_sink().finalize();

        let mut sr = SyntaxReader::new(BitReader::new(&data), &r);
        assert_eq!(sr.read_mvd().unwrap(), MotionVector::new(-17, 0));
        assert_eq!(sr.read_mvd().unwrap(), MotionVector::new(1, 2));
        assert_eq!(sr.read_inter_dir(true).unwrap(), InterDir::L1);
        assert_eq!(sr.read_inter_dir(true).unwrap(), InterDir::Bi);
        assert_eq!(sr.read_ref_idx(3).unwrap(), 2);
        assert_eq!(sr.read_merge_idx().unwrap(), 4);
        assert_eq!(sr.read_intra_mode(&mpm, IntraModeSet::Modes35).unwrap(), IntraMode(10));
        assert_eq!(sr.read_intra_mode(&mpm, IntraModeSet::Modes35).unwrap(), IntraMode(34));
        assert_eq!(sr.read_intra_mode(&mpm, IntraModeSet::Modes35).unwrap(), IntraMode(1));
        assert_eq!(sr.read_intra_chroma_mode(&chroma).unwrap(), IntraChromaMode::Mode(IntraMode::DC));
        assert_eq!(sr.read_split_binary(true, true).unwrap(), SplitType::Vertical);
        assert_eq!(sr.read_split_binary(true, false).unwrap(), SplitType::Horizontal);
    }

    #[test]
    fn raw_intra_modes_without_mpm() {
        let mut r = Restrictions::default();
        r.disable_intra_mpm_prediction = true;
        let mpm = IntraPredictorLuma { modes: vec![] };
        let mut sw = SyntaxWriter::new(BitCounter::new(), &r);
        sw.write_intra_mode(IntraMode(66), &mpm, IntraModeSet::Modes67);
        assert_eq!(sw.num_bits(), 7);
    }

    #[test]
    fn adaptive_scan_for_small_intra_blocks() {
        let r = Restrictions::default();
        let qp = crate::qp::Qp::new(30, crate::common::ChromaFormat::Yuv420, 8, 1.0, 0);
        let mut cu = CodingUnit::new(crate::common::ChromaFormat::Yuv420, qp, 3, 0, 0, 8, 8);
        cu.set_pred_mode(PredictionMode::Intra);
        cu.set_intra_mode_luma(IntraMode(10));
        assert_eq!(coeff_scan_order(&cu, YuvComponent::Y, IntraModeSet::Modes35, &r), ScanOrder::Vertical);
        cu.set_intra_mode_luma(IntraMode(26));
        assert_eq!(coeff_scan_order(&cu, YuvComponent::Y, IntraModeSet::Modes35, &r), ScanOrder::Horizontal);
        cu.set_intra_mode_luma(IntraMode(18));
        assert_eq!(coeff_scan_order(&cu, YuvComponent::Y, IntraModeSet::Modes35, &r), ScanOrder::Diagonal);
        cu.set_pred_mode(PredictionMode::Inter);
        assert_eq!(coeff_scan_order(&cu, YuvComponent::Y, IntraModeSet::Modes35, &r), ScanOrder::Diagonal);
    }
}
