//! Motion vector prediction, merge candidates and motion compensation.

use crate::coding_unit::{CodingUnit, CuId};
use crate::common::{
    MAX_BLOCK_SIZE, NUM_INTER_MERGE_CANDIDATES, NUM_INTER_MV_PREDICTORS, PICTURE_PADDING,
    PicNum, PicturePredictionType, Sample, YuvComponent, clip_bd, size_to_log2,
};
use crate::cu_types::{InterDir, MotionVector, MotionVector3, MvCorner, NeighborDir, RefPicList};
use crate::picture_data::PictureData;
use crate::reference_picture_lists::ReferencePictureLists;
use crate::restrictions::Restrictions;
use crate::yuv_pic::YuvPicture;

pub const NUM_TAPS_LUMA: usize = 8;
pub const NUM_TAPS_CHROMA: usize = 4;
pub const INTERNAL_PRECISION: i32 = 14;
pub const FILTER_PRECISION: i32 = 6;
pub const INTERNAL_OFFSET: i32 = 1 << (INTERNAL_PRECISION - 1);

const LIC_SHIFT: i32 = 5;
const AFFINE_SUBBLOCK: i32 = 4;
const AFFINE_HP_BITS: i32 = 4;
/// Samples of slack kept between a clipped motion vector and the end of the
/// padded reference area.
const MV_CLIP_MARGIN: i32 = 8;

pub const LUMA_FILTER: [[i16; NUM_TAPS_LUMA]; 4] = [
    [0, 0, 0, 64, 0, 0, 0, 0],
    [-1, 4, -10, 58, 17, -5, 1, 0],
    [-1, 4, -11, 40, 40, -11, 4, -1],
    [0, 1, -5, 17, 58, -10, 4, -1],
];

pub const CHROMA_FILTER: [[i16; NUM_TAPS_CHROMA]; 8] = [
    [0, 64, 0, 0],
    [-2, 58, 10, -2],
    [-4, 54, 16, -2],
    [-6, 46, 28, -4],
    [-4, 36, 36, -4],
    [-4, 28, 46, -6],
    [-2, 16, 54, -4],
    [-2, 10, 58, -2],
];

const COMBINED_BI_ORDER: [(usize, usize); 12] = [
    (0, 1),
    (1, 0),
    (0, 2),
    (2, 0),
    (1, 2),
    (2, 1),
    (0, 3),
    (3, 0),
    (1, 3),
    (3, 1),
    (2, 3),
    (3, 2),
];

pub type InterPredictorList = [MotionVector; NUM_INTER_MV_PREDICTORS];
pub type AffinePredictorList = [MotionVector3; NUM_INTER_MV_PREDICTORS];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeCandidate {
    pub inter_dir: InterDir,
    pub mv: [MotionVector; 2],
    pub ref_idx: [i32; 2],
    pub use_lic: bool,
}

impl MergeCandidate {
    fn uses(&self, list: RefPicList) -> bool {
        ReferencePictureLists::is_list_used(list, self.inter_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AffineMergeCandidate {
    pub inter_dir: InterDir,
    pub mv: [MotionVector3; 2],
    pub ref_idx: [i32; 2],
}

/// Rounding/shift pair of one filter stage. Intermediate buffers hold
/// `sample << (14 - bitdepth)` minus [`INTERNAL_OFFSET`] so they fit in 16
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStage {
    pub shift: i32,
    pub offset: i32,
}

impl FilterStage {
    pub fn sample_to_sample() -> Self {
        Self {
            shift: FILTER_PRECISION,
            offset: 1 << (FILTER_PRECISION - 1),
        }
    }

    pub fn sample_to_intermediate(bitdepth: u8) -> Self {
        let shift = FILTER_PRECISION - (INTERNAL_PRECISION - bitdepth as i32);
        Self {
            shift,
            offset: -(INTERNAL_OFFSET << shift),
        }
    }

    pub fn intermediate_to_sample(bitdepth: u8) -> Self {
        let shift = FILTER_PRECISION + (INTERNAL_PRECISION - bitdepth as i32);
        Self {
            shift,
            offset: (INTERNAL_OFFSET << FILTER_PRECISION) + (1 << (shift - 1)),
        }
    }

    pub fn intermediate_to_intermediate() -> Self {
        Self {
            shift: FILTER_PRECISION,
            offset: 0,
        }
    }
}

/// One separable filter pass. `step` is 1 for horizontal filtering and the
/// source stride for vertical filtering; `src` starts at the first tap of
/// the first output sample.
#[allow(clippy::too_many_arguments)]
pub fn filter_pass<S: Copy + Into<i32>, D: Copy>(
    src: &[S],
    src_stride: usize,
    step: usize,
    width: usize,
    height: usize,
    taps: &[i16],
    stage: FilterStage,
    dst: &mut [D],
    dst_stride: usize,
    convert: impl Fn(i32) -> D,
) {
    for y in 0..height {
        let row = y * src_stride;
        for x in 0..width {
            let base = row + x;
            let sum: i32 = taps
                .iter()
                .enumerate()
                .map(|(k, &t)| t as i32 * src[base + k * step].into())
                .sum();
            dst[y * dst_stride + x] = convert((sum + stage.offset) >> stage.shift);
        }
    }
}

/// Averages two intermediate predictions into final samples.
#[allow(clippy::too_many_arguments)]
pub fn add_avg(
    width: usize,
    height: usize,
    bitdepth: u8,
    src0: &[i16],
    src1: &[i16],
    src_stride: usize,
    dst: &mut [Sample],
    dst_stride: usize,
) {
    let shift = INTERNAL_PRECISION + 1 - bitdepth as i32;
    let offset = (1 << (shift - 1)) + 2 * INTERNAL_OFFSET;
    for y in 0..height {
        for x in 0..width {
            let v = src0[y * src_stride + x] as i32 + src1[y * src_stride + x] as i32;
            dst[y * dst_stride + x] = clip_bd((v + offset) >> shift, bitdepth);
        }
    }
}

/// Scales `mv` pointing `td` pictures away to a distance of `tb` pictures.
pub fn scale_mv(mv: MotionVector, poc_cur: PicNum, poc_ref: PicNum, poc_cur_target: PicNum, poc_ref_target: PicNum) -> MotionVector {
    let td = (poc_cur as i32 - poc_ref as i32).clamp(-128, 127);
    let tb = (poc_cur_target as i32 - poc_ref_target as i32).clamp(-128, 127);
    if td == tb || td == 0 {
        return mv;
    }
    let tx = (16384 + td.abs() / 2) / td;
    let scale = ((tb * tx + 32) >> 6).clamp(-4096, 4095);
    let scale_comp = |v: i32| {
        let p = scale * v;
        let mag = (p.abs() + 127) >> 8;
        (if p < 0 { -mag } else { mag }).clamp(-32768, 32767)
    };
    MotionVector::new(scale_comp(mv.x), scale_comp(mv.y))
}

/// Motion at luma offset (x, y) inside a block of width `w` described by
/// the top-left and top-right control points.
pub fn affine_mv_at(cp: &MotionVector3, w: i32, x: i32, y: i32, high_precision: bool) -> MotionVector {
    let log2w = size_to_log2(w);
    let dhx = cp[1].x - cp[0].x;
    let dhy = cp[1].y - cp[0].y;
    let ex = dhx * x - dhy * y;
    let ey = dhy * x + dhx * y;
    if high_precision {
        let s = log2w - AFFINE_HP_BITS;
        let (hx, hy) = if s >= 0 {
            ((ex + ((1 << s) >> 1)) >> s, (ey + ((1 << s) >> 1)) >> s)
        } else {
            (ex << -s, ey << -s)
        };
        let r = 1 << (AFFINE_HP_BITS - 1);
        MotionVector::new(
            cp[0].x + ((hx + r) >> AFFINE_HP_BITS),
            cp[0].y + ((hy + r) >> AFFINE_HP_BITS),
        )
    } else {
        let r = 1 << (log2w - 1);
        MotionVector::new(cp[0].x + ((ex + r) >> log2w), cp[0].y + ((ey + r) >> log2w))
    }
}

/// Bottom-left control point implied by a 4-parameter model.
pub fn derive_third_corner(v0: MotionVector, v1: MotionVector, w: i32, h: i32) -> MotionVector {
    let log2w = size_to_log2(w);
    let log2h = size_to_log2(h);
    let dx = v1.x - v0.x;
    let dy = v1.y - v0.y;
    let shift = log2w - log2h;
    let r = if shift > 0 { 1 << (shift - 1) } else { 0 };
    let scale = |v: i32| if shift >= 0 { (v + r) >> shift } else { v << -shift };
    MotionVector::new(v0.x - scale(dy), v0.y + scale(dx))
}

/// Clamps `mv` so a `w` x `h` block at luma (x, y) only reads the padded
/// area of a `pic_w` x `pic_h` picture.
pub fn clip_mv(mv: MotionVector, x: i32, y: i32, w: i32, h: i32, pic_w: i32, pic_h: i32) -> MotionVector {
    let reach = PICTURE_PADDING - MV_CLIP_MARGIN;
    let min_x = (-reach - x) * MotionVector::SCALE;
    let max_x = (pic_w + reach - w - x) * MotionVector::SCALE;
    let min_y = (-reach - y) * MotionVector::SCALE;
    let max_y = (pic_h + reach - h - y) * MotionVector::SCALE;
    MotionVector::new(mv.x.clamp(min_x, max_x), mv.y.clamp(min_y, max_y))
}

enum PredTarget<'a> {
    Final(&'a mut [Sample]),
    Intermediate(&'a mut [i16]),
}

#[derive(Debug, Clone)]
pub struct InterPrediction {
    bitdepth: u8,
    restrictions: Restrictions,
}

impl InterPrediction {
    pub fn new(bitdepth: u8, restrictions: &Restrictions) -> Self {
        Self {
            bitdepth,
            restrictions: *restrictions,
        }
    }

    fn neighbor_mv_same_poc(
        pic: &PictureData,
        n: &CodingUnit,
        corner: MvCorner,
        list: RefPicList,
        ref_poc: PicNum,
    ) -> Option<MotionVector> {
        if !n.is_inter() {
            return None;
        }
        [list, list.other()]
            .into_iter()
            .find(|&l| n.has_mv(l) && pic.ref_poc(n, l) == Some(ref_poc))
            .map(|l| n.mv(l, corner))
    }

    fn neighbor_mv_scaled(
        pic: &PictureData,
        n: &CodingUnit,
        corner: MvCorner,
        list: RefPicList,
        ref_poc: PicNum,
    ) -> Option<MotionVector> {
        if !n.is_inter() {
            return None;
        }
        let poc = pic.poc();
        [list, list.other()].into_iter().find_map(|l| {
            let n_ref = pic.ref_poc(n, l)?;
            Some(scale_mv(n.mv(l, corner), poc, n_ref, poc, ref_poc))
        })
    }

    fn collocated(pic: &PictureData) -> Option<(RefPicList, usize)> {
        let rpl = pic.ref_pic_lists();
        if pic.pic_type() == PicturePredictionType::Bi && rpl.num_ref_pics(RefPicList::L1) > 0 {
            Some((RefPicList::L1, 0))
        } else if rpl.num_ref_pics(RefPicList::L0) > 0 {
            Some((RefPicList::L0, 0))
        } else {
            None
        }
    }

    /// Co-located motion scaled towards `ref_poc`.
    pub fn temporal_mv(&self, pic: &PictureData, cu: &CodingUnit, list: RefPicList, ref_poc: PicNum) -> Option<MotionVector> {
        let (col_list, col_idx) = Self::collocated(pic)?;
        let field = pic.ref_pic_lists().motion_field(col_list, col_idx);
        let (x, y) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        let (w, h) = (cu.width(YuvComponent::Y), cu.height(YuvComponent::Y));
        let ctu_log2 = size_to_log2(crate::common::CTU_SIZE);
        let mut positions = Vec::with_capacity(2);
        if (y >> ctu_log2) == ((y + h) >> ctu_log2) {
            positions.push((x + w, y + h));
        }
        positions.push((x + w / 2, y + h / 2));
        for (px, py) in positions {
            let Some(info) = field.at(px, py) else {
                continue;
            };
            let l = if info.has_mv(list) { list } else { list.other() };
            let col_ref = info.ref_poc[l.index()];
            if field.poc() == col_ref {
                continue;
            }
            return Some(scale_mv(info.mv[l.index()], field.poc(), col_ref, pic.poc(), ref_poc));
        }
        None
    }

    pub fn mvp_list(&self, pic: &PictureData, cu: &CodingUnit, list: RefPicList, ref_idx: usize) -> InterPredictorList {
        let mut out = [MotionVector::default(); NUM_INTER_MV_PREDICTORS];
        if self.restrictions.disable_inter_mvp {
            return out;
        }
        let ref_poc = pic.ref_pic_lists().ref_poc(list, ref_idx);
        let scaling = !self.restrictions.disable_inter_scaling_mvp;
        let left_dirs = [NeighborDir::LeftBelow, NeighborDir::LeftCorner];
        let above_dirs = [NeighborDir::AboveRight, NeighborDir::AboveCorner, NeighborDir::AboveLeft];
        let lookup = |dirs: &[NeighborDir], scaled: bool| {
            dirs.iter().find_map(|&d| {
                let (n, corner) = pic.neighbor(cu, d)?;
                if scaled {
                    Self::neighbor_mv_scaled(pic, n, corner, list, ref_poc)
                } else {
                    Self::neighbor_mv_same_poc(pic, n, corner, list, ref_poc)
                }
            })
        };
        let mut cands: Vec<MotionVector> = Vec::with_capacity(NUM_INTER_MV_PREDICTORS + 1);
        let left = lookup(&left_dirs, false).or_else(|| if scaling { lookup(&left_dirs, true) } else { None });
        cands.extend(left);
        let mut above = lookup(&above_dirs, false);
        if above.is_none() && left.is_none() && scaling {
            above = lookup(&above_dirs, true);
        }
        cands.extend(above);
        let round = |mv: MotionVector| if cu.fullpel_mv() { mv.round_to_fullpel() } else { mv };
        for c in cands.iter_mut() {
            *c = round(*c);
        }
        cands.dedup();
        if cands.len() < NUM_INTER_MV_PREDICTORS && !self.restrictions.disable_inter_tmvp_mvp {
            if let Some(t) = self.temporal_mv(pic, cu, list, ref_poc) {
                cands.push(round(t));
            }
        }
        for (o, c) in out.iter_mut().zip(cands) {
            *o = c;
        }
        out
    }

    fn affine_from_neighbor(n: &CodingUnit, list: RefPicList, cu: &CodingUnit, high_precision: bool) -> MotionVector3 {
        let cp = n.mv_affine(list);
        let nx = n.pos_x(YuvComponent::Y);
        let ny = n.pos_y(YuvComponent::Y);
        let nw = n.width(YuvComponent::Y);
        let x = cu.pos_x(YuvComponent::Y) - nx;
        let y = cu.pos_y(YuvComponent::Y) - ny;
        let w = cu.width(YuvComponent::Y);
        let h = cu.height(YuvComponent::Y);
        let v0 = affine_mv_at(&cp, nw, x, y, high_precision);
        let v1 = affine_mv_at(&cp, nw, x + w, y, high_precision);
        [v0, v1, derive_third_corner(v0, v1, w, h)]
    }

    pub fn mvp_list_affine(&self, pic: &PictureData, cu: &CodingUnit, list: RefPicList, ref_idx: usize) -> AffinePredictorList {
        let ref_poc = pic.ref_pic_lists().ref_poc(list, ref_idx);
        let hp = !self.restrictions.disable_ext2_inter_high_precision_mv;
        let w = cu.width(YuvComponent::Y);
        let h = cu.height(YuvComponent::Y);
        let mut cands: Vec<MotionVector3> = Vec::with_capacity(NUM_INTER_MV_PREDICTORS);
        for dir in [
            NeighborDir::LeftCorner,
            NeighborDir::AboveCorner,
            NeighborDir::AboveRight,
            NeighborDir::LeftBelow,
            NeighborDir::AboveLeft,
        ] {
            let Some((n, _)) = pic.neighbor(cu, dir) else {
                continue;
            };
            if !n.is_inter() || !n.use_affine() {
                continue;
            }
            let Some(l) = [list, list.other()]
                .into_iter()
                .find(|&l| n.has_mv(l) && pic.ref_poc(n, l) == Some(ref_poc))
            else {
                continue;
            };
            let cand = Self::affine_from_neighbor(n, l, cu, hp);
            if !cands.contains(&cand) {
                cands.push(cand);
            }
            if cands.len() == NUM_INTER_MV_PREDICTORS {
                break;
            }
        }
        if cands.len() < NUM_INTER_MV_PREDICTORS {
            let first_of = |dirs: &[NeighborDir]| {
                dirs.iter().find_map(|&d| {
                    let (n, corner) = pic.neighbor(cu, d)?;
                    Self::neighbor_mv_same_poc(pic, n, corner, list, ref_poc)
                })
            };
            let v0 = first_of(&[NeighborDir::AboveLeft, NeighborDir::Above, NeighborDir::Left]);
            let v1 = first_of(&[NeighborDir::AboveCorner, NeighborDir::AboveRight]);
            if let (Some(v0), Some(v1)) = (v0, v1) {
                let cand = [v0, v1, derive_third_corner(v0, v1, w, h)];
                if !cands.contains(&cand) {
                    cands.push(cand);
                }
            }
        }
        let mvp = self.mvp_list(pic, cu, list, ref_idx);
        let mut i = 0;
        while cands.len() < NUM_INTER_MV_PREDICTORS {
            cands.push([mvp[i]; 3]);
            i += 1;
        }
        let mut out = [[MotionVector::default(); 3]; NUM_INTER_MV_PREDICTORS];
        for (o, c) in out.iter_mut().zip(cands) {
            *o = c;
        }
        out
    }

    fn merge_cand_from_cu(n: &CodingUnit, corner: MvCorner) -> MergeCandidate {
        let mut cand = MergeCandidate {
            inter_dir: n.inter_dir(),
            use_lic: n.use_lic(),
            ..MergeCandidate::default()
        };
        for list in RefPicList::ALL {
            if n.has_mv(list) {
                cand.mv[list.index()] = n.mv(list, corner);
                cand.ref_idx[list.index()] = n.ref_idx(list);
            }
        }
        cand
    }

    /// Merge list, always filled to [`NUM_INTER_MERGE_CANDIDATES`] entries.
    pub fn merge_candidates(&self, pic: &PictureData, cu: &CodingUnit) -> Vec<MergeCandidate> {
        let r = &self.restrictions;
        let rpl = pic.ref_pic_lists();
        let bi_pic = pic.pic_type() == PicturePredictionType::Bi;
        let mut list: Vec<MergeCandidate> = Vec::with_capacity(NUM_INTER_MERGE_CANDIDATES);

        if !r.disable_inter_merge_candidates {
            let spatial = [
                NeighborDir::LeftCorner,
                NeighborDir::AboveCorner,
                NeighborDir::AboveRight,
                NeighborDir::LeftBelow,
                NeighborDir::AboveLeft,
            ];
            for (i, dir) in spatial.into_iter().enumerate() {
                if i == 4 && list.len() == 4 {
                    break;
                }
                let Some((n, corner)) = pic.neighbor(cu, dir) else {
                    continue;
                };
                if !n.is_inter() {
                    continue;
                }
                let cand = Self::merge_cand_from_cu(n, corner);
                if !list.contains(&cand) {
                    list.push(cand);
                }
            }

            if !r.disable_inter_tmvp_merge
                && list.len() < NUM_INTER_MERGE_CANDIDATES
                && rpl.num_ref_pics(RefPicList::L0) > 0
            {
                let mut cand = MergeCandidate::default();
                let l0 = self.temporal_mv(pic, cu, RefPicList::L0, rpl.ref_poc(RefPicList::L0, 0));
                let l1 = if bi_pic && rpl.num_ref_pics(RefPicList::L1) > 0 {
                    self.temporal_mv(pic, cu, RefPicList::L1, rpl.ref_poc(RefPicList::L1, 0))
                } else {
                    None
                };
                let dir = match (l0, l1) {
                    (Some(_), Some(_)) => Some(InterDir::Bi),
                    (Some(_), None) => Some(InterDir::L0),
                    (None, Some(_)) => Some(InterDir::L1),
                    (None, None) => None,
                };
                if let Some(dir) = dir {
                    cand.inter_dir = dir;
                    cand.mv = [l0.unwrap_or_default(), l1.unwrap_or_default()];
                    if !list.contains(&cand) {
                        list.push(cand);
                    }
                }
            }

            if bi_pic && !r.disable_inter_merge_bipred && list.len() > 1 {
                let num_orig = list.len();
                for &(i0, i1) in COMBINED_BI_ORDER.iter() {
                    if list.len() >= NUM_INTER_MERGE_CANDIDATES {
                        break;
                    }
                    if i0 >= num_orig || i1 >= num_orig {
                        continue;
                    }
                    let (c0, c1) = (list[i0], list[i1]);
                    if !c0.uses(RefPicList::L0) || !c1.uses(RefPicList::L1) {
                        continue;
                    }
                    let poc0 = rpl.ref_poc(RefPicList::L0, c0.ref_idx[0] as usize);
                    let poc1 = rpl.ref_poc(RefPicList::L1, c1.ref_idx[1] as usize);
                    if poc0 == poc1 && c0.mv[0] == c1.mv[1] {
                        continue;
                    }
                    list.push(MergeCandidate {
                        inter_dir: InterDir::Bi,
                        mv: [c0.mv[0], c1.mv[1]],
                        ref_idx: [c0.ref_idx[0], c1.ref_idx[1]],
                        use_lic: false,
                    });
                }
            }
        }

        let num_l0 = rpl.num_ref_pics(RefPicList::L0);
        let num_ref = if bi_pic {
            num_l0.min(rpl.num_ref_pics(RefPicList::L1))
        } else {
            num_l0
        };
        let mut zero_idx = 0;
        while list.len() < NUM_INTER_MERGE_CANDIDATES {
            let ref_idx = if zero_idx < num_ref { zero_idx as i32 } else { 0 };
            let inter_dir = if bi_pic && !r.disable_inter_bipred { InterDir::Bi } else { InterDir::L0 };
            list.push(MergeCandidate {
                inter_dir,
                mv: [MotionVector::default(); 2],
                ref_idx: [ref_idx, if inter_dir == InterDir::Bi { ref_idx } else { 0 }],
                use_lic: false,
            });
            zero_idx += 1;
        }
        if r.disable_inter_bipred {
            for c in list.iter_mut().filter(|c| c.inter_dir == InterDir::Bi) {
                c.inter_dir = InterDir::L0;
                c.mv[1] = MotionVector::default();
                c.ref_idx[1] = 0;
            }
        }
        list
    }

    /// Model of the first affine neighbor, rebased onto `cu`.
    pub fn affine_merge_candidate(&self, pic: &PictureData, cu: &CodingUnit) -> Option<AffineMergeCandidate> {
        let hp = !self.restrictions.disable_ext2_inter_high_precision_mv;
        [
            NeighborDir::LeftCorner,
            NeighborDir::AboveCorner,
            NeighborDir::AboveRight,
            NeighborDir::LeftBelow,
            NeighborDir::AboveLeft,
        ]
        .into_iter()
        .filter_map(|d| pic.neighbor(cu, d))
        .find(|(n, _)| n.is_inter() && n.use_affine())
        .map(|(n, _)| {
            let mut cand = AffineMergeCandidate {
                inter_dir: n.inter_dir(),
                ..AffineMergeCandidate::default()
            };
            for list in RefPicList::ALL {
                if n.has_mv(list) {
                    cand.mv[list.index()] = Self::affine_from_neighbor(n, list, cu, hp);
                    cand.ref_idx[list.index()] = n.ref_idx(list);
                }
            }
            cand
        })
    }

    /// Derives the final motion vectors of a CU coded with explicit motion
    /// data (predictor index plus delta).
    pub fn calculate_mv(&self, pic: &mut PictureData, id: CuId) {
        let force_zero = pic.force_bipred_l1_mvd_zero();
        let cu = pic.cu(id);
        let mut mvs = [None; 2];
        let mut affine = [None; 2];
        for list in RefPicList::ALL {
            if !cu.has_mv(list) {
                continue;
            }
            let ref_idx = cu.ref_idx(list) as usize;
            let mvp_idx = cu.mvp_idx(list) as usize;
            let zero_mvd = cu.force_mvd_zero(list, force_zero);
            if cu.use_affine() {
                let mvp = self.mvp_list_affine(pic, cu, list, ref_idx)[mvp_idx];
                let (d0, d1) = if zero_mvd {
                    (MotionVector::default(), MotionVector::default())
                } else {
                    (cu.mvd_affine(0, list), cu.mvd_affine(1, list))
                };
                let v0 = mvp[0] + d0;
                let v1 = mvp[1] + d1;
                let (w, h) = (cu.width(YuvComponent::Y), cu.height(YuvComponent::Y));
                affine[list.index()] = Some([v0, v1, derive_third_corner(v0, v1, w, h)]);
            } else {
                let mvp = self.mvp_list(pic, cu, list, ref_idx)[mvp_idx];
                let mvd = if zero_mvd { MotionVector::default() } else { cu.mv_delta(list) };
                let mvd = if cu.fullpel_mv() {
                    MotionVector::new(mvd.x * MotionVector::SCALE, mvd.y * MotionVector::SCALE)
                } else {
                    mvd
                };
                mvs[list.index()] = Some(mvp + mvd);
            }
        }
        let cu = pic.cu_mut(id);
        for list in RefPicList::ALL {
            if let Some(mv) = mvs[list.index()] {
                cu.set_mv(mv, list);
            }
            if let Some(mv) = affine[list.index()] {
                cu.set_mv_affine(mv, list);
            }
        }
    }

    /// Predicts one component of an inter CU into `out` (stride = width).
    pub fn motion_compensation(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        rec: &YuvPicture,
        out: &mut [Sample],
    ) {
        let w = cu.width(comp) as usize;
        let h = cu.height(comp) as usize;
        let rpl = pic.ref_pic_lists();
        if cu.inter_dir() == InterDir::Bi {
            let mut bufs = [vec![0i16; w * h], vec![0i16; w * h]];
            for list in RefPicList::ALL {
                let ref_pic = rpl.ref_pic(list, cu.ref_idx(list) as usize);
                let target = PredTarget::Intermediate(&mut bufs[list.index()]);
                self.predict_list(cu, comp, ref_pic, list, target);
            }
            add_avg(w, h, self.bitdepth, &bufs[0], &bufs[1], w, out, w);
            return;
        }
        let list = if cu.inter_dir() == InterDir::L1 { RefPicList::L1 } else { RefPicList::L0 };
        let ref_pic = rpl.ref_pic(list, cu.ref_idx(list) as usize);
        self.predict_list(cu, comp, ref_pic, list, PredTarget::Final(&mut out[..w * h]));
        if cu.use_lic() && !self.restrictions.disable_ext2_inter_local_illumination_comp {
            let mv = clip_mv(
                cu.mv(list, MvCorner::UpLeft),
                cu.pos_x(YuvComponent::Y),
                cu.pos_y(YuvComponent::Y),
                cu.width(YuvComponent::Y),
                cu.height(YuvComponent::Y),
                ref_pic.width(YuvComponent::Y),
                ref_pic.height(YuvComponent::Y),
            );
            self.local_illumination_comp(pic, cu, comp, mv, ref_pic, rec, out);
        }
    }

    fn predict_list(&self, cu: &CodingUnit, comp: YuvComponent, ref_pic: &YuvPicture, list: RefPicList, target: PredTarget) {
        let w = cu.width(comp);
        let h = cu.height(comp);
        if !cu.use_affine() {
            let mv = clip_mv(
                cu.mv(list, MvCorner::UpLeft),
                cu.pos_x(YuvComponent::Y),
                cu.pos_y(YuvComponent::Y),
                cu.width(YuvComponent::Y),
                cu.height(YuvComponent::Y),
                ref_pic.width(YuvComponent::Y),
                ref_pic.height(YuvComponent::Y),
            );
            self.predict_block(ref_pic, comp, cu.pos_x(comp), cu.pos_y(comp), w, h, mv, target, w as usize);
            return;
        }
        let cp = cu.mv_affine(list);
        let hp = !self.restrictions.disable_ext2_inter_high_precision_mv;
        let lw = cu.width(YuvComponent::Y);
        let sx = ref_pic.shift_x(comp);
        let sy = ref_pic.shift_y(comp);
        let (sbw, sbh) = (AFFINE_SUBBLOCK >> sx, AFFINE_SUBBLOCK >> sy);
        let stride = w as usize;
        let mut target = target;
        for by in (0..cu.height(YuvComponent::Y)).step_by(AFFINE_SUBBLOCK as usize) {
            for bx in (0..lw).step_by(AFFINE_SUBBLOCK as usize) {
                let half = AFFINE_SUBBLOCK / 2;
                let mv = affine_mv_at(&cp, lw, bx + half, by + half, hp);
                let mv = clip_mv(
                    mv,
                    cu.pos_x(YuvComponent::Y) + bx,
                    cu.pos_y(YuvComponent::Y) + by,
                    AFFINE_SUBBLOCK,
                    AFFINE_SUBBLOCK,
                    ref_pic.width(YuvComponent::Y),
                    ref_pic.height(YuvComponent::Y),
                );
                let (cx, cy) = (bx >> sx, by >> sy);
                let off = cy as usize * stride + cx as usize;
                let sub = match &mut target {
                    PredTarget::Final(buf) => PredTarget::Final(&mut buf[off..]),
                    PredTarget::Intermediate(buf) => PredTarget::Intermediate(&mut buf[off..]),
                };
                self.predict_block(ref_pic, comp, cu.pos_x(comp) + cx, cu.pos_y(comp) + cy, sbw, sbh, mv, sub, stride);
            }
        }
    }

    /// Interpolates a `w` x `h` block of `comp` at component position
    /// (x, y) displaced by the luma quarter-sample vector `mv`.
    #[allow(clippy::too_many_arguments)]
    fn predict_block(
        &self,
        ref_pic: &YuvPicture,
        comp: YuvComponent,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        mv: MotionVector,
        target: PredTarget,
        dst_stride: usize,
    ) {
        let bd = self.bitdepth;
        let sx = ref_pic.shift_x(comp);
        let sy = ref_pic.shift_y(comp);
        let (mut int_x, mut frac_x, mut int_y, mut frac_y, taps) = if comp.is_luma() {
            (mv.x >> 2, (mv.x & 3) as usize, mv.y >> 2, (mv.y & 3) as usize, NUM_TAPS_LUMA)
        } else {
            (
                mv.x >> (2 + sx),
                ((mv.x & ((4 << sx) - 1)) << (1 - sx)) as usize,
                mv.y >> (2 + sy),
                ((mv.y & ((4 << sy) - 1)) << (1 - sy)) as usize,
                NUM_TAPS_CHROMA,
            )
        };
        if !comp.is_luma() && self.restrictions.disable_inter_chroma_subpel {
            int_x += i32::from(frac_x >= 4);
            int_y += i32::from(frac_y >= 4);
            frac_x = 0;
            frac_y = 0;
        }
        let filter = |frac: usize| -> &'static [i16] {
            if comp.is_luma() { &LUMA_FILTER[frac][..] } else { &CHROMA_FILTER[frac][..] }
        };
        let half = taps as i32 / 2 - 1;
        let stride = ref_pic.stride(comp);
        let plane = ref_pic.plane(comp);
        let (wu, hu) = (w as usize, h as usize);
        let (px, py) = (x + int_x, y + int_y);

        match (frac_x, frac_y, target) {
            (0, 0, PredTarget::Final(dst)) => {
                let mut src = ref_pic.offset(comp, px, py);
                for row in 0..hu {
                    dst[row * dst_stride..row * dst_stride + wu].copy_from_slice(&plane[src..src + wu]);
                    src += stride;
                }
            }
            (0, 0, PredTarget::Intermediate(dst)) => {
                let shift = INTERNAL_PRECISION - bd as i32;
                let mut src = ref_pic.offset(comp, px, py);
                for row in 0..hu {
                    for col in 0..wu {
                        dst[row * dst_stride + col] = (((plane[src + col] as i32) << shift) - INTERNAL_OFFSET) as i16;
                    }
                    src += stride;
                }
            }
            (fx, 0, target) => {
                let src = &plane[ref_pic.offset(comp, px - half, py)..];
                match target {
                    PredTarget::Final(dst) => {
                        filter_pass(src, stride, 1, wu, hu, filter(fx), FilterStage::sample_to_sample(), dst, dst_stride, |v| clip_bd(v, bd))
                    }
                    PredTarget::Intermediate(dst) => filter_pass(
                        src,
                        stride,
                        1,
                        wu,
                        hu,
                        filter(fx),
                        FilterStage::sample_to_intermediate(bd),
                        dst,
                        dst_stride,
                        |v| v as i16,
                    ),
                }
            }
            (0, fy, target) => {
                let src = &plane[ref_pic.offset(comp, px, py - half)..];
                match target {
                    PredTarget::Final(dst) => filter_pass(
                        src,
                        stride,
                        stride,
                        wu,
                        hu,
                        filter(fy),
                        FilterStage::sample_to_sample(),
                        dst,
                        dst_stride,
                        |v| clip_bd(v, bd),
                    ),
                    PredTarget::Intermediate(dst) => filter_pass(
                        src,
                        stride,
                        stride,
                        wu,
                        hu,
                        filter(fy),
                        FilterStage::sample_to_intermediate(bd),
                        dst,
                        dst_stride,
                        |v| v as i16,
                    ),
                }
            }
            (fx, fy, target) => {
                let rows = hu + taps - 1;
                let mut tmp = [0i16; (MAX_BLOCK_SIZE * (MAX_BLOCK_SIZE + NUM_TAPS_LUMA as i32 - 1)) as usize];
                let src = &plane[ref_pic.offset(comp, px - half, py - half)..];
                filter_pass(src, stride, 1, wu, rows, filter(fx), FilterStage::sample_to_intermediate(bd), &mut tmp, wu, |v| {
                    v as i16
                });
                match target {
                    PredTarget::Final(dst) => filter_pass(
                        &tmp,
                        wu,
                        wu,
                        wu,
                        hu,
                        filter(fy),
                        FilterStage::intermediate_to_sample(bd),
                        dst,
                        dst_stride,
                        |v| clip_bd(v, bd),
                    ),
                    PredTarget::Intermediate(dst) => filter_pass(
                        &tmp,
                        wu,
                        wu,
                        wu,
                        hu,
                        filter(fy),
                        FilterStage::intermediate_to_intermediate(),
                        dst,
                        dst_stride,
                        |v| v as i16,
                    ),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn local_illumination_comp(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        mv: MotionVector,
        ref_pic: &YuvPicture,
        rec: &YuvPicture,
        out: &mut [Sample],
    ) {
        let (a, b) = self.derive_lic_params(pic, cu, comp, mv, ref_pic, rec);
        let n = (cu.width(comp) * cu.height(comp)) as usize;
        for s in out[..n].iter_mut() {
            *s = clip_bd((((a * *s as i64) >> LIC_SHIFT) + b) as i32, self.bitdepth);
        }
    }

    fn derive_lic_params(
        &self,
        pic: &PictureData,
        cu: &CodingUnit,
        comp: YuvComponent,
        mv: MotionVector,
        ref_pic: &YuvPicture,
        rec: &YuvPicture,
    ) -> (i64, i64) {
        let full = mv.round_to_fullpel();
        let sx = ref_pic.shift_x(comp);
        let sy = ref_pic.shift_y(comp);
        let dx = (full.x >> MotionVector::PRECISION_BITS) >> sx;
        let dy = (full.y >> MotionVector::PRECISION_BITS) >> sy;
        let (x0, y0) = (cu.pos_x(comp), cu.pos_y(comp));
        let (w, h) = (cu.width(comp), cu.height(comp));
        let mut pairs: Vec<(i64, i64)> = Vec::with_capacity((w + h) as usize);
        if pic.cu_above(cu).is_some() {
            for x in 0..w {
                pairs.push((
                    ref_pic.sample(comp, x0 + x + dx, y0 - 1 + dy) as i64,
                    rec.sample(comp, x0 + x, y0 - 1) as i64,
                ));
            }
        }
        if pic.cu_left(cu).is_some() {
            for y in 0..h {
                pairs.push((
                    ref_pic.sample(comp, x0 - 1 + dx, y0 + y + dy) as i64,
                    rec.sample(comp, x0 - 1, y0 + y) as i64,
                ));
            }
        }
        if pairs.is_empty() {
            return (1 << LIC_SHIFT, 0);
        }
        let n = pairs.len() as i64;
        let (mut sum_r, mut sum_c, mut sum_rr, mut sum_rc) = (0i64, 0i64, 0i64, 0i64);
        for &(r, c) in &pairs {
            sum_r += r;
            sum_c += c;
            sum_rr += r * r;
            sum_rc += r * c;
        }
        let denom = n * sum_rr - sum_r * sum_r;
        let a = if denom == 0 {
            1 << LIC_SHIFT
        } else {
            (((n * sum_rc - sum_r * sum_c) << LIC_SHIFT) / denom).clamp(0, 4 << LIC_SHIFT)
        };
        let b = (sum_c - ((a * sum_r) >> LIC_SHIFT)) / n;
        (a, b)
    }
}

pub fn apply_merge_cand(cu: &mut CodingUnit, cand: &MergeCandidate) {
    cu.set_inter_dir(cand.inter_dir);
    cu.set_use_affine(false);
    cu.set_use_lic(cand.use_lic);
    cu.set_fullpel_mv(false);
    for list in RefPicList::ALL {
        let l = list.index();
        cu.set_mv(cand.mv[l], list);
        cu.set_ref_idx(cand.ref_idx[l], list);
        cu.set_mv_delta(MotionVector::default(), list);
        cu.set_mvp_idx(0, list);
    }
}

pub fn apply_affine_merge_cand(cu: &mut CodingUnit, cand: &AffineMergeCandidate) {
    cu.set_inter_dir(cand.inter_dir);
    cu.set_use_affine(true);
    cu.set_use_lic(false);
    cu.set_fullpel_mv(false);
    for list in RefPicList::ALL {
        let l = list.index();
        cu.set_mv_affine(cand.mv[l], list);
        cu.set_ref_idx(cand.ref_idx[l], list);
        cu.set_mvd_affine(0, MotionVector::default(), list);
        cu.set_mvd_affine(1, MotionVector::default(), list);
        cu.set_mvp_idx(0, list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ChromaFormat;
    use crate::cu_types::{PredictionMode, SplitType};
    use crate::picture_data::tests::params;
    use crate::picture_data::MotionField;
    use crate::reference_picture_lists::{RefEntry, ReferencePictureLists};
    use std::sync::Arc;

    fn gradient_picture(w: i32, h: i32) -> YuvPicture {
        let mut pic = YuvPicture::new(ChromaFormat::Yuv420, w, h, 8, true);
        for &comp in ChromaFormat::Yuv420.components() {
            for y in 0..pic.height(comp) {
                for x in 0..pic.width(comp) {
                    pic.set_sample(comp, x, y, ((x * 3 + y * 5) % 256) as Sample);
                }
            }
        }
        pic.pad_borders();
        pic
    }

    fn inter_picture(poc: PicNum, refs: &[PicNum]) -> PictureData {
        let mut rpl = ReferencePictureLists::default();
        rpl.reset(poc);
        for (i, &r) in refs.iter().enumerate() {
            rpl.set_ref_pic(
                RefPicList::L0,
                i,
                RefEntry {
                    poc: r,
                    pic_type: PicturePredictionType::Intra,
                    tid: 0,
                    rec: Arc::new(gradient_picture(64, 64)),
                    orig: None,
                    motion: Arc::new(MotionField::intra(r, 64, 64)),
                },
            );
        }
        let mut p = params(64, 64, PicturePredictionType::Uni);
        p.poc = poc;
        PictureData::new(p, rpl)
    }

    #[test]
    fn filters_sum_to_64() {
        for f in LUMA_FILTER.iter() {
            assert_eq!(f.iter().map(|&t| t as i32).sum::<i32>(), 64);
        }
        for f in CHROMA_FILTER.iter() {
            assert_eq!(f.iter().map(|&t| t as i32).sum::<i32>(), 64);
        }
    }

    #[test]
    fn intermediate_round_trip_is_exact() {
        for bd in [8u8, 10, 12] {
            let max = (1 << bd) - 1;
            for s in [0, 1, max / 2, max] {
                let to_i = FilterStage::sample_to_intermediate(bd);
                let inter = ((64 * s) + to_i.offset) >> to_i.shift;
                assert!(inter >= i16::MIN as i32 && inter <= i16::MAX as i32);
                let to_s = FilterStage::intermediate_to_sample(bd);
                assert_eq!((64 * inter + to_s.offset) >> to_s.shift, s, "bd {bd} s {s}");
            }
        }
    }

    #[test]
    fn bi_average_of_equal_predictions() {
        let bd = 10;
        let v = ((700i32 << (INTERNAL_PRECISION - bd)) - INTERNAL_OFFSET) as i16;
        let a = [v; 4];
        let mut out = [0; 4];
        add_avg(2, 2, bd as u8, &a, &a, 2, &mut out, 2);
        assert_eq!(out, [700; 4]);
    }

    #[test]
    fn mv_scaling() {
        let mv = MotionVector::new(16, -8);
        assert_eq!(scale_mv(mv, 8, 4, 8, 4), mv);
        assert_eq!(scale_mv(mv, 8, 6, 8, 4), MotionVector::new(32, -16));
        assert_eq!(scale_mv(mv, 8, 4, 8, 6), MotionVector::new(8, -4));
        assert_eq!(scale_mv(mv, 8, 4, 8, 12), MotionVector::new(-16, 8));
    }

    #[test]
    fn affine_model_translation_and_rotation() {
        let t = [MotionVector::new(8, 4); 3];
        assert_eq!(affine_mv_at(&t, 16, 10, 6, true), MotionVector::new(8, 4));
        assert_eq!(affine_mv_at(&t, 16, 10, 6, false), MotionVector::new(8, 4));
        let zoom = [MotionVector::new(0, 0), MotionVector::new(16, 0), MotionVector::default()];
        assert_eq!(affine_mv_at(&zoom, 16, 8, 0, false), MotionVector::new(8, 0));
        assert_eq!(affine_mv_at(&zoom, 16, 0, 8, false), MotionVector::new(0, 8));
        assert_eq!(derive_third_corner(zoom[0], zoom[1], 16, 16), MotionVector::new(0, 16));
        assert_eq!(derive_third_corner(zoom[0], zoom[1], 16, 8), MotionVector::new(0, 8));
    }

    #[test]
    fn clip_keeps_block_in_padding() {
        let mv = clip_mv(MotionVector::new(-10_000, 10_000), 0, 0, 16, 16, 64, 64);
        let reach = PICTURE_PADDING - MV_CLIP_MARGIN;
        assert_eq!(mv.x, -reach * 4);
        assert_eq!(mv.y, (64 + reach - 16) * 4);
    }

    #[test]
    fn fullpel_mc_copies_reference() {
        let ref_pic = gradient_picture(64, 64);
        let ip = InterPrediction::new(8, &Restrictions::default());
        let mut out = vec![0; 8 * 8];
        ip.predict_block(&ref_pic, YuvComponent::Y, 8, 8, 8, 8, MotionVector::new(8, -4), PredTarget::Final(&mut out), 8);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(out[y * 8 + x], ref_pic.sample(YuvComponent::Y, 10 + x as i32, 7 + y as i32));
            }
        }
    }

    #[test]
    fn subpel_mc_of_flat_area_is_flat() {
        let mut ref_pic = YuvPicture::new(ChromaFormat::Yuv420, 64, 64, 8, true);
        for &comp in ChromaFormat::Yuv420.components() {
            ref_pic.plane_mut(comp).fill(93);
        }
        let ip = InterPrediction::new(8, &Restrictions::default());
        for mv in [MotionVector::new(1, 0), MotionVector::new(0, 3), MotionVector::new(5, 7)] {
            for comp in [YuvComponent::Y, YuvComponent::U] {
                let mut out = vec![0; 16];
                ip.predict_block(&ref_pic, comp, 4, 4, 4, 4, mv, PredTarget::Final(&mut out), 4);
                assert!(out.iter().all(|&s| s == 93), "{comp:?} {mv:?}");
                let mut a = vec![0i16; 16];
                ip.predict_block(&ref_pic, comp, 4, 4, 4, 4, mv, PredTarget::Intermediate(&mut a), 4);
                let mut avg = vec![0; 16];
                add_avg(4, 4, 8, &a, &a, 4, &mut avg, 4);
                assert!(avg.iter().all(|&s| s == 93));
            }
        }
    }

    #[test]
    fn merge_list_is_always_full() {
        let pic = inter_picture(3, &[2, 1]);
        let ip = InterPrediction::new(8, &Restrictions::default());
        let cu = pic.cu(pic.ctu(0));
        let list = ip.merge_candidates(&pic, cu);
        assert_eq!(list.len(), NUM_INTER_MERGE_CANDIDATES);
        assert_eq!(list[0].ref_idx[0], 0);
        assert_eq!(list[1].ref_idx[0], 1);
        assert!(list.iter().all(|c| c.inter_dir == InterDir::L0));
    }

    #[test]
    fn merge_takes_left_neighbor_first() {
        let mut pic = inter_picture(3, &[2]);
        let ip = InterPrediction::new(8, &Restrictions::default());
        let root = pic.ctu(0);
        pic.split_cu(root, SplitType::Vertical);
        let left = pic.cu(root).sub_cu(0).unwrap();
        let right = pic.cu(root).sub_cu(1).unwrap();
        {
            let l = pic.cu_mut(left);
            l.set_pred_mode(PredictionMode::Inter);
            l.set_inter_dir(InterDir::L0);
            l.set_mv(MotionVector::new(12, -4), RefPicList::L0);
            l.set_ref_idx(0, RefPicList::L0);
        }
        pic.mark_used_in_pic(left);
        let list = ip.merge_candidates(&pic, pic.cu(right));
        assert_eq!(list.len(), NUM_INTER_MERGE_CANDIDATES);
        assert_eq!(list[0].mv[0], MotionVector::new(12, -4));
        let mvp = ip.mvp_list(&pic, pic.cu(right), RefPicList::L0, 0);
        assert_eq!(mvp[0], MotionVector::new(12, -4));
        assert_eq!(mvp[1], MotionVector::default());
    }

    #[test]
    fn calculate_mv_adds_delta_to_predictor() {
        let mut pic = inter_picture(3, &[2]);
        let ip = InterPrediction::new(8, &Restrictions::default());
        let id = pic.ctu(0);
        {
            let cu = pic.cu_mut(id);
            cu.set_pred_mode(PredictionMode::Inter);
            cu.set_inter_dir(InterDir::L0);
            cu.set_ref_idx(0, RefPicList::L0);
            cu.set_mvp_idx(0, RefPicList::L0);
            cu.set_mv_delta(MotionVector::new(3, -2), RefPicList::L0);
        }
        ip.calculate_mv(&mut pic, id);
        assert_eq!(pic.cu(id).mv(RefPicList::L0, MvCorner::UpLeft), MotionVector::new(3, -2));
        pic.cu_mut(id).set_fullpel_mv(true);
        ip.calculate_mv(&mut pic, id);
        assert_eq!(pic.cu(id).mv(RefPicList::L0, MvCorner::DownRight), MotionVector::new(12, -8));
    }
}
