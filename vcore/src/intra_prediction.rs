use crate::coding_unit::CodingUnit;
use crate::common::{
    CTU_SIZE, MAX_BLOCK_SIZE, NUM_INTRA_MPM, NUM_INTRA_MPM_EXT, Sample, YuvComponent, clip_bd,
    size_to_log2,
};
use crate::cu_types::{IntraChromaMode, IntraMode, IntraModeSet};
use crate::picture_data::PictureData;
use crate::restrictions::Restrictions;
use crate::yuv_pic::YuvPicture;

/// Reference samples on each side: corner at index 0 followed by up to
/// `width + height` samples.
pub const REF_LEN: usize = 2 * MAX_BLOCK_SIZE as usize + 1;

const ANGLES_35: [i32; 33] = [
    32, 26, 21, 17, 13, 9, 5, 2, 0, -2, -5, -9, -13, -17, -21, -26, -32, -26, -21, -17, -13, -9, -5,
    -2, 0, 2, 5, 9, 13, 17, 21, 26, 32,
];

const ANGLES_67: [i32; 65] = [
    32, 29, 26, 23, 21, 19, 17, 15, 13, 11, 9, 7, 5, 3, 2, 1, 0, -1, -2, -3, -5, -7, -9, -11, -13,
    -15, -17, -19, -21, -23, -26, -29, -32, -29, -26, -23, -21, -19, -17, -15, -13, -11, -9, -7, -5,
    -3, -2, -1, 0, 1, 2, 3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 26, 29, 32,
];

/// Minimum distance from pure horizontal/vertical, per log2 block size,
/// above which reference smoothing is applied (35-mode units).
const FILTER_DIST_THRESHOLD: [i32; 7] = [10, 10, 10, 7, 1, 0, 0];

const LM_SHIFT: i32 = 13;

#[derive(Debug, Clone)]
pub struct RefState {
    pub above: [Sample; REF_LEN],
    pub left: [Sample; REF_LEN],
    pub above_filtered: [Sample; REF_LEN],
    pub left_filtered: [Sample; REF_LEN],
}

impl Default for RefState {
    fn default() -> Self {
        Self {
            above: [0; REF_LEN],
            left: [0; REF_LEN],
            above_filtered: [0; REF_LEN],
            left_filtered: [0; REF_LEN],
        }
    }
}

/// Most probable luma modes, in signalling order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntraPredictorLuma {
    pub modes: Vec<IntraMode>,
}

impl IntraPredictorLuma {
    pub fn index_of(&self, mode: IntraMode) -> Option<usize> {
        self.modes.iter().position(|&m| m == mode)
    }
}

pub fn angle_of(mode: IntraMode, mode_set: IntraModeSet) -> i32 {
    let idx = mode.0 as usize - 2;
    match mode_set {
        IntraModeSet::Modes35 => ANGLES_35[idx],
        IntraModeSet::Modes67 => ANGLES_67[idx],
    }
}

fn inverse_angle(angle: i32) -> i32 {
    let a = angle.abs();
    (8192 + a / 2) / a
}

#[derive(Debug, Clone)]
pub struct IntraPrediction {
    bitdepth: u8,
    restrictions: Restrictions,
}

impl IntraPrediction {
    pub fn new(bitdepth: u8, restrictions: &Restrictions) -> Self {
        Self {
            bitdepth,
            restrictions: *restrictions,
        }
    }

    /// Predicts `comp` of `cu` into `out` (stride = block width), resolving
    /// the chroma mode against the luma mode.
    pub fn predict_comp(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        rec: &YuvPicture,
        out: &mut [Sample],
    ) {
        match cu.intra_mode(comp) {
            Some(mode) => {
                let refs = self.fill_reference_state(pic, cu, comp, rec);
                self.predict(mode, pic.intra_mode_set(), cu, comp, &refs, out);
            }
            None => self.predict_lm(pic, cu, comp, rec, out),
        }
    }

    pub fn predict(
        &self,
        mode: IntraMode,
        mode_set: IntraModeSet,
        cu: &CodingUnit,
        comp: YuvComponent,
        refs: &RefState,
        out: &mut [Sample],
    ) {
        let w = cu.width(comp) as usize;
        let h = cu.height(comp) as usize;
        let filtered = self.use_filtered_ref_samples(comp, w, h, mode, mode_set);
        let (above, left) = if filtered {
            (&refs.above_filtered[..], &refs.left_filtered[..])
        } else {
            (&refs.above[..], &refs.left[..])
        };
        let post_filter = comp.is_luma() && w < 32 && h < 32;
        if mode == IntraMode::PLANAR {
            predict_planar(above, left, w, h, out);
        } else if mode == IntraMode::DC {
            let dc_filter = post_filter && !self.restrictions.disable_intra_dc_post_filter;
            predict_dc(above, left, w, h, dc_filter, out);
        } else {
            let edge_filter = post_filter && !self.restrictions.disable_intra_ver_hor_post_filter;
            let vertical = mode >= mode_set.diagonal();
            let angle = angle_of(mode, mode_set);
            predict_angular(above, left, w, h, angle, vertical, edge_filter, self.bitdepth, out);
        }
    }

    fn use_filtered_ref_samples(
        &self,
        comp: YuvComponent,
        w: usize,
        h: usize,
        mode: IntraMode,
        mode_set: IntraModeSet,
    ) -> bool {
        if !comp.is_luma() || mode == IntraMode::DC || self.restrictions.disable_intra_ref_sample_filter {
            return false;
        }
        let log2_size = ((size_to_log2(w as i32) + size_to_log2(h as i32)) >> 1) as usize;
        let m = mode.0 as i32;
        let dist = (m - mode_set.horizontal().0 as i32)
            .abs()
            .min((m - mode_set.vertical().0 as i32).abs());
        let threshold = match mode_set {
            IntraModeSet::Modes35 => FILTER_DIST_THRESHOLD[log2_size],
            IntraModeSet::Modes67 => 2 * FILTER_DIST_THRESHOLD[log2_size],
        };
        dist > threshold
    }

    /// Gathers the neighboring reconstructed samples, substituting the
    /// positions that are not yet decoded.
    pub fn fill_reference_state(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        rec: &YuvPicture,
    ) -> RefState {
        let w = cu.width(comp);
        let h = cu.height(comp);
        let x0 = cu.pos_x(comp);
        let y0 = cu.pos_y(comp);
        let sx = rec.shift_x(comp);
        let sy = rec.shift_y(comp);
        let n = (w + h) as usize;
        let above_limit = if self.restrictions.disable_ext_intra_unrestricted_predictor { w } else { w + h };
        let left_limit = if self.restrictions.disable_ext_intra_unrestricted_predictor { h } else { w + h };
        let tree = cu.cu_tree();
        let available = |x: i32, y: i32| x >= 0 && y >= 0 && pic.cu_in_tree_at(tree, x << sx, y << sy).is_some();

        // Linear layout: left bottom-up, corner, above left-to-right.
        let total = 2 * n + 1;
        let mut line = vec![0 as Sample; total];
        let mut avail = vec![false; total];
        for i in 0..n {
            let y = y0 + i as i32;
            let k = n - 1 - i;
            if (i as i32) < left_limit && available(x0 - 1, y) {
                avail[k] = true;
                line[k] = rec.sample(comp, x0 - 1, y);
            }
        }
        if available(x0 - 1, y0 - 1) {
            avail[n] = true;
            line[n] = rec.sample(comp, x0 - 1, y0 - 1);
        }
        for i in 0..n {
            let x = x0 + i as i32;
            if (i as i32) < above_limit && available(x, y0 - 1) {
                avail[n + 1 + i] = true;
                line[n + 1 + i] = rec.sample(comp, x, y0 - 1);
            }
        }
        substitute_unavailable(&mut line, &avail, self.bitdepth, self.restrictions.disable_intra_ref_padding);

        let mut refs = RefState::default();
        refs.above[0] = line[n];
        refs.left[0] = line[n];
        for i in 0..n {
            refs.above[i + 1] = line[n + 1 + i];
            refs.left[i + 1] = line[n - 1 - i];
        }
        if comp.is_luma() && !self.restrictions.disable_intra_ref_sample_filter {
            let filtered = filter_ref_line(&line);
            refs.above_filtered[0] = filtered[n];
            refs.left_filtered[0] = filtered[n];
            for i in 0..n {
                refs.above_filtered[i + 1] = filtered[n + 1 + i];
                refs.left_filtered[i + 1] = filtered[n - 1 - i];
            }
        } else {
            refs.above_filtered = refs.above;
            refs.left_filtered = refs.left;
        }
        refs
    }

    /// Most probable modes derived from the left and above neighbors.
    pub fn predictor_luma(&self, pic: &PictureData, cu: &CodingUnit) -> IntraPredictorLuma {
        let mode_set = pic.intra_mode_set();
        let neighbor_mode = |n: Option<&CodingUnit>| {
            n.filter(|n| n.is_intra()).map_or(IntraMode::DC, |n| n.intra_mode_luma())
        };
        let left = neighbor_mode(pic.cu_left_corner(cu));
        let above = if cu.pos_y(YuvComponent::Y) % CTU_SIZE == 0 {
            IntraMode::DC
        } else {
            neighbor_mode(pic.cu_above_corner(cu))
        };
        let use_ext = mode_set == IntraModeSet::Modes67 && !self.restrictions.disable_ext2_intra_6_predictors;
        if !use_ext {
            return IntraPredictorLuma {
                modes: mpm_list_3(left, above, mode_set).to_vec(),
            };
        }
        let extra = [pic.cu_left_below(cu), pic.cu_above_right(cu), pic.cu_above_left(cu)].map(neighbor_mode);
        IntraPredictorLuma {
            modes: mpm_list_6(left, above, &extra, mode_set),
        }
    }

    /// Ordered chroma mode candidates for a given luma mode.
    pub fn predictors_chroma(&self, luma_mode: IntraMode, mode_set: IntraModeSet) -> Vec<IntraChromaMode> {
        if self.restrictions.disable_intra_chroma_predictor {
            return vec![IntraChromaMode::Dm];
        }
        let mut list = Vec::with_capacity(6);
        if !self.restrictions.disable_ext2_intra_chroma_from_luma {
            list.push(IntraChromaMode::Lm);
        }
        list.push(IntraChromaMode::Dm);
        for m in [IntraMode::PLANAR, mode_set.vertical(), mode_set.horizontal(), IntraMode::DC] {
            let m = if m == luma_mode { mode_set.vertical_plus_8() } else { m };
            list.push(IntraChromaMode::Mode(m));
        }
        list
    }

    /// Cross-component prediction of a chroma block from the co-located
    /// reconstructed luma.
    pub fn predict_lm(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        rec: &YuvPicture,
        out: &mut [Sample],
    ) {
        let w = cu.width(comp);
        let h = cu.height(comp);
        let x0 = cu.pos_x(comp);
        let y0 = cu.pos_y(comp);
        let sx = rec.shift_x(comp);
        let sy = rec.shift_y(comp);
        let luma_at = |x: i32, y: i32| -> i32 { downsampled_luma(rec, x, y, sx, sy) };

        let mut pairs: Vec<(i32, i32)> = Vec::with_capacity((w + h) as usize);
        if pic.cu_above(cu).is_some() {
            for x in 0..w {
                pairs.push((luma_at(x0 + x, y0 - 1), rec.sample(comp, x0 + x, y0 - 1) as i32));
            }
        }
        if pic.cu_left(cu).is_some() {
            for y in 0..h {
                pairs.push((luma_at(x0 - 1, y0 + y), rec.sample(comp, x0 - 1, y0 + y) as i32));
            }
        }
        let (alpha, beta) = derive_lm_params(&pairs, self.bitdepth);
        for y in 0..h {
            for x in 0..w {
                let l = luma_at(x0 + x, y0 + y) as i64;
                let v = ((alpha * l) >> LM_SHIFT) + beta;
                out[(y * w + x) as usize] = clip_bd(v as i32, self.bitdepth);
            }
        }
    }
}

fn downsampled_luma(rec: &YuvPicture, x: i32, y: i32, sx: i32, sy: i32) -> i32 {
    let (lx, ly) = (x << sx, y << sy);
    let s = |dx: i32, dy: i32| rec.sample(YuvComponent::Y, lx + dx, ly + dy) as i32;
    match (sx, sy) {
        (0, 0) => s(0, 0),
        (1, 0) => (s(0, 0) + s(1, 0) + 1) >> 1,
        _ => (s(0, 0) + s(1, 0) + s(0, 1) + s(1, 1) + 2) >> 2,
    }
}

/// Integer least-squares fit `chroma = (alpha * luma >> 13) + beta`.
fn derive_lm_params(pairs: &[(i32, i32)], bitdepth: u8) -> (i64, i64) {
    if pairs.is_empty() {
        return (0, 1 << (bitdepth - 1));
    }
    let n = pairs.len() as i64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0i64, 0i64, 0i64, 0i64);
    for &(l, c) in pairs {
        let (l, c) = (l as i64, c as i64);
        sx += l;
        sy += c;
        sxx += l * l;
        sxy += l * c;
    }
    let denom = n * sxx - sx * sx;
    let alpha = if denom == 0 {
        0
    } else {
        ((n * sxy - sx * sy) << LM_SHIFT) / denom
    };
    let beta = (sy - ((alpha * sx) >> LM_SHIFT)) / n;
    (alpha, beta)
}

fn substitute_unavailable(line: &mut [Sample], avail: &[bool], bitdepth: u8, no_padding: bool) {
    let mid = 1 << (bitdepth - 1);
    if no_padding {
        for (s, &a) in line.iter_mut().zip(avail) {
            if !a {
                *s = mid;
            }
        }
        return;
    }
    let Some(first) = avail.iter().position(|&a| a) else {
        line.fill(mid);
        return;
    };
    let fill = line[first];
    line[..first].fill(fill);
    for i in first + 1..line.len() {
        if !avail[i] {
            line[i] = line[i - 1];
        }
    }
}

fn filter_ref_line(line: &[Sample]) -> Vec<Sample> {
    let mut out = line.to_vec();
    for i in 1..line.len() - 1 {
        out[i] = ((line[i - 1] as u32 + 2 * line[i] as u32 + line[i + 1] as u32 + 2) >> 2) as Sample;
    }
    out
}

fn mpm_list_3(left: IntraMode, above: IntraMode, mode_set: IntraModeSet) -> [IntraMode; NUM_INTRA_MPM] {
    if left == above {
        if !left.is_angular() {
            return [IntraMode::PLANAR, IntraMode::DC, mode_set.vertical()];
        }
        let m = mode_set.num_angular() - 1;
        let a = left.0 as i32;
        return [
            left,
            IntraMode((2 + (a - 3 + m) % m) as u8),
            IntraMode((2 + (a - 2 + 1) % m) as u8),
        ];
    }
    let third = if left != IntraMode::PLANAR && above != IntraMode::PLANAR {
        IntraMode::PLANAR
    } else if left != IntraMode::DC && above != IntraMode::DC {
        IntraMode::DC
    } else {
        mode_set.vertical()
    };
    [left, above, third]
}

fn mpm_list_6(left: IntraMode, above: IntraMode, extra: &[IntraMode; 3], mode_set: IntraModeSet) -> Vec<IntraMode> {
    let mut list: Vec<IntraMode> = Vec::with_capacity(NUM_INTRA_MPM_EXT);
    let push = |list: &mut Vec<IntraMode>, m: IntraMode| {
        if list.len() < NUM_INTRA_MPM_EXT && !list.contains(&m) {
            list.push(m);
        }
    };
    push(&mut list, left);
    push(&mut list, above);
    push(&mut list, IntraMode::PLANAR);
    push(&mut list, IntraMode::DC);
    for &m in extra {
        push(&mut list, m);
    }
    let m = mode_set.num_angular() - 1;
    let angular: Vec<IntraMode> = list.iter().copied().filter(|m| m.is_angular()).collect();
    for a in angular {
        let a = a.0 as i32;
        push(&mut list, IntraMode((2 + (a - 3 + m) % m) as u8));
        push(&mut list, IntraMode((2 + (a - 2 + 1) % m) as u8));
    }
    for d in [mode_set.vertical(), mode_set.horizontal(), IntraMode::FIRST_ANGULAR, mode_set.diagonal()] {
        push(&mut list, d);
    }
    list
}

fn predict_planar(above: &[Sample], left: &[Sample], w: usize, h: usize, out: &mut [Sample]) {
    let log2w = size_to_log2(w as i32);
    let log2h = size_to_log2(h as i32);
    let top_right = above[w + 1] as i32;
    let bottom_left = left[h + 1] as i32;
    let shift = log2w + log2h + 1;
    for y in 0..h {
        for x in 0..w {
            let hor = (w - 1 - x) as i32 * left[y + 1] as i32 + (x + 1) as i32 * top_right;
            let ver = (h - 1 - y) as i32 * above[x + 1] as i32 + (y + 1) as i32 * bottom_left;
            out[y * w + x] = ((hor * h as i32 + ver * w as i32 + (w * h) as i32) >> shift) as Sample;
        }
    }
}

fn predict_dc(above: &[Sample], left: &[Sample], w: usize, h: usize, filter: bool, out: &mut [Sample]) {
    let sum: u32 = above[1..=w].iter().chain(&left[1..=h]).map(|&s| s as u32).sum();
    let n = (w + h) as u32;
    let dc = (sum + n / 2) / n;
    out[..w * h].fill(dc as Sample);
    if !filter {
        return;
    }
    out[0] = ((left[1] as u32 + 2 * dc + above[1] as u32 + 2) >> 2) as Sample;
    for x in 1..w {
        out[x] = ((above[x + 1] as u32 + 3 * dc + 2) >> 2) as Sample;
    }
    for y in 1..h {
        out[y * w] = ((left[y + 1] as u32 + 3 * dc + 2) >> 2) as Sample;
    }
}

/// Angular prediction. Horizontal modes are computed as the vertical case on
/// swapped references and transposed on output.
#[allow(clippy::too_many_arguments)]
fn predict_angular(
    above: &[Sample],
    left: &[Sample],
    w: usize,
    h: usize,
    angle: i32,
    vertical: bool,
    edge_filter: bool,
    bitdepth: u8,
    out: &mut [Sample],
) {
    let (main, side, bw, bh) = if vertical { (above, left, w, h) } else { (left, above, h, w) };
    // ref_main[OFF + k] for k in -bh..=bw+bh
    let off = bh;
    let mut ref_main = vec![0 as Sample; bw + 2 * bh + 1];
    ref_main[off..off + bw + bh + 1].copy_from_slice(&main[..bw + bh + 1]);
    if angle < 0 {
        let inv = inverse_angle(angle);
        let last = (bh as i32 * angle) >> 5;
        for k in last..0 {
            let idx = ((-k * inv + 128) >> 8) as usize;
            ref_main[(off as i32 + k) as usize] = side[idx.min(bw + bh)];
        }
    }
    let mut pred = vec![0 as Sample; bw * bh];
    for y in 0..bh {
        let pos = (y as i32 + 1) * angle;
        let idx = pos >> 5;
        let fract = (pos & 31) as u32;
        let row = &mut pred[y * bw..(y + 1) * bw];
        for (x, p) in row.iter_mut().enumerate() {
            let base = (off as i32 + x as i32 + idx + 1) as usize;
            *p = if fract == 0 {
                ref_main[base]
            } else {
                (((32 - fract) * ref_main[base] as u32 + fract * ref_main[base + 1] as u32 + 16) >> 5) as Sample
            };
        }
    }
    if angle == 0 && edge_filter {
        for y in 0..bh {
            let v = main[1] as i32 + ((side[y + 1] as i32 - side[0] as i32) >> 1);
            pred[y * bw] = clip_bd(v, bitdepth);
        }
    }
    if vertical {
        out[..w * h].copy_from_slice(&pred);
    } else {
        for y in 0..h {
            for x in 0..w {
                out[y * w + x] = pred[x * bw + y];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_refs(value: Sample) -> RefState {
        RefState {
            above: [value; REF_LEN],
            left: [value; REF_LEN],
            above_filtered: [value; REF_LEN],
            left_filtered: [value; REF_LEN],
        }
    }

    #[test]
    fn flat_neighbors_predict_flat_block() {
        let refs = flat_refs(77);
        for (w, h) in [(4, 4), (8, 4), (16, 32)] {
            let mut out = vec![0; w * h];
            predict_planar(&refs.above, &refs.left, w, h, &mut out);
            assert!(out.iter().all(|&s| s == 77));
            predict_dc(&refs.above, &refs.left, w, h, true, &mut out);
            assert!(out.iter().all(|&s| s == 77));
            for angle in [-32, -13, 0, 5, 32] {
                predict_angular(&refs.above, &refs.left, w, h, angle, true, true, 8, &mut out);
                assert!(out.iter().all(|&s| s == 77), "angle {angle}");
                predict_angular(&refs.above, &refs.left, w, h, angle, false, true, 8, &mut out);
                assert!(out.iter().all(|&s| s == 77), "angle {angle}");
            }
        }
    }

    #[test]
    fn pure_vertical_copies_above_row() {
        let mut refs = flat_refs(50);
        for i in 1..=8 {
            refs.above[i] = 10 * i as Sample;
        }
        let mut out = vec![0; 16];
        predict_angular(&refs.above, &refs.left, 4, 4, 0, true, false, 8, &mut out);
        for y in 0..4 {
            assert_eq!(&out[y * 4..y * 4 + 4], &[10, 20, 30, 40]);
        }
    }

    #[test]
    fn pure_horizontal_copies_left_column() {
        let mut refs = flat_refs(50);
        for i in 1..=8 {
            refs.left[i] = 7 * i as Sample;
        }
        let mut out = vec![0; 8 * 4];
        predict_angular(&refs.above, &refs.left, 8, 4, 0, false, false, 8, &mut out);
        for y in 0..4 {
            assert!(out[y * 8..y * 8 + 8].iter().all(|&s| s == 7 * (y as Sample + 1)));
        }
    }

    #[test]
    fn diagonal_down_left_shifts_by_one_per_row() {
        let mut refs = flat_refs(0);
        for i in 1..=16 {
            refs.above[i] = i as Sample;
        }
        let mut out = vec![0; 16];
        predict_angular(&refs.above, &refs.left, 4, 4, 32, true, false, 8, &mut out);
        assert_eq!(&out[0..4], &[2, 3, 4, 5]);
        assert_eq!(&out[12..16], &[5, 6, 7, 8]);
    }

    #[test]
    fn dc_averages_both_edges() {
        let mut refs = flat_refs(0);
        refs.above[1..=4].fill(100);
        refs.left[1..=4].fill(200);
        let mut out = vec![0; 16];
        predict_dc(&refs.above, &refs.left, 4, 4, false, &mut out);
        assert!(out.iter().all(|&s| s == 150));
    }

    #[test]
    fn substitution_fills_from_first_available() {
        let mut line = vec![0, 0, 9, 0, 4, 0];
        let avail = [false, false, true, false, true, false];
        substitute_unavailable(&mut line, &avail, 8, false);
        assert_eq!(line, vec![9, 9, 9, 9, 4, 4]);
        let mut none = vec![3; 4];
        substitute_unavailable(&mut none, &[false; 4], 10, false);
        assert_eq!(none, vec![512; 4]);
    }

    #[test]
    fn three_mpm_rules() {
        let set = IntraModeSet::Modes35;
        assert_eq!(
            mpm_list_3(IntraMode::DC, IntraMode::DC, set),
            [IntraMode::PLANAR, IntraMode::DC, IntraMode(26)]
        );
        assert_eq!(mpm_list_3(IntraMode(10), IntraMode(10), set), [IntraMode(10), IntraMode(9), IntraMode(11)]);
        assert_eq!(mpm_list_3(IntraMode(2), IntraMode(2), set), [IntraMode(2), IntraMode(33), IntraMode(3)]);
        assert_eq!(mpm_list_3(IntraMode(34), IntraMode(34), set)[2], IntraMode(3));
        assert_eq!(mpm_list_3(IntraMode::PLANAR, IntraMode(5), set)[2], IntraMode::DC);
        assert_eq!(mpm_list_3(IntraMode::PLANAR, IntraMode::DC, set)[2], IntraMode(26));
    }

    #[test]
    fn six_mpm_list_is_unique_and_full() {
        let set = IntraModeSet::Modes67;
        let list = mpm_list_6(IntraMode(20), IntraMode::DC, &[IntraMode::DC; 3], set);
        assert_eq!(list.len(), NUM_INTRA_MPM_EXT);
        assert_eq!(&list[..4], &[IntraMode(20), IntraMode::DC, IntraMode::PLANAR, IntraMode(19)]);
        let mut sorted = list.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), list.len());
    }

    #[test]
    fn chroma_list_replaces_luma_duplicate() {
        let ip = IntraPrediction::new(8, &Restrictions::default());
        let set = IntraModeSet::Modes35;
        let list = ip.predictors_chroma(IntraMode(26), set);
        assert_eq!(list[0], IntraChromaMode::Lm);
        assert_eq!(list[1], IntraChromaMode::Dm);
        assert_eq!(list[3], IntraChromaMode::Mode(IntraMode(34)));
        assert!(!list.contains(&IntraChromaMode::Mode(IntraMode(26))));
    }

    #[test]
    fn lm_fit_of_linear_relation() {
        let pairs: Vec<(i32, i32)> = (0..16).map(|l| (l * 8, l * 4 + 20)).collect();
        let (alpha, beta) = derive_lm_params(&pairs, 8);
        assert_eq!(alpha, 1 << (LM_SHIFT - 1));
        assert_eq!(beta, 20);
        assert_eq!(derive_lm_params(&[], 10), (0, 512));
    }

    #[test]
    fn inverse_angles() {
        assert_eq!(inverse_angle(-32), 256);
        assert_eq!(inverse_angle(-26), 315);
        assert_eq!(inverse_angle(-2), 4096);
    }
}
