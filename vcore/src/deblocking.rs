//! In-loop deblocking of a fully reconstructed picture.

use tracing::trace;

use crate::coding_unit::CodingUnit;
use crate::common::{CTU_SIZE, PicturePredictionType, Sample, YuvComponent, clip_bd};
use crate::cu_types::{CuTree, MotionVector, MvCorner, RefPicList};
use crate::picture_data::PictureData;
use crate::yuv_pic::YuvPicture;

const SUBBLOCK_SIZE: i32 = 8;
const SUBBLOCK_SIZE_EXT: i32 = 4;
const CHROMA_FILTER_RESOLUTION: i32 = 8;
const FILTER_GROUP_SIZE: usize = 4;
/// QP used when deblocking does not depend on the coded QP.
const FIXED_QP_LUMA: i32 = 32;
const FIXED_QP_CHROMA: i32 = 31;

const TC_TABLE: [u8; 54] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4,
    5, 5, 6, 6, 7, 8, 9, 10, 11, 13, 14, 16, 18, 20, 22, 24,
];

const BETA_TABLE: [u8; 64] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 20, 22, 24, 26,
    28, 30, 32, 34, 36, 38, 40, 42, 44, 46, 48, 50, 52, 54, 56, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82,
    84, 86, 88,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDir {
    /// Edge between a block and its left neighbor.
    Vertical,
    /// Edge between a block and its neighbor above.
    Horizontal,
}

fn tc_for(index: i32, bitdepth: u8) -> i32 {
    (TC_TABLE[index.clamp(0, TC_TABLE.len() as i32 - 1) as usize] as i32) << (bitdepth - 8)
}

fn beta_for(index: i32, bitdepth: u8) -> i32 {
    (BETA_TABLE[index.clamp(0, BETA_TABLE.len() as i32 - 1) as usize] as i32) << (bitdepth - 8)
}

/// Deblocks all vertical edges of the picture and then all horizontal ones.
/// Edges of a chroma tree only filter chroma, on the coarser grid.
pub fn deblock_picture(pic: &PictureData, rec: &mut YuvPicture) {
    let r = pic.restrictions();
    let subblock_size = if r.disable_ext_deblock_subblock_size_4 { SUBBLOCK_SIZE } else { SUBBLOCK_SIZE_EXT };
    let mut filtered = 0usize;
    for dir in [EdgeDir::Vertical, EdgeDir::Horizontal] {
        for rsaddr in 0..pic.num_ctus() {
            for &tree in pic.cu_trees() {
                let size = if tree == CuTree::Primary { subblock_size } else { SUBBLOCK_SIZE };
                filtered += deblock_ctu(pic, rec, rsaddr, tree, dir, size);
            }
        }
    }
    trace!(poc = pic.poc(), filtered, "deblocked picture");
}

fn deblock_ctu(
    pic: &PictureData,
    rec: &mut YuvPicture,
    rsaddr: usize,
    tree: CuTree,
    dir: EdgeDir,
    subblock_size: i32,
) -> usize {
    let r = pic.restrictions();
    let ctu = pic.cu(pic.ctu(rsaddr));
    let (ctu_x, ctu_y) = (ctu.pos_x(YuvComponent::Y), ctu.pos_y(YuvComponent::Y));
    let has_luma = tree == CuTree::Primary;
    let has_chroma = pic.components(tree).len() > 1 && !r.disable_deblock_chroma_filter;
    let (chroma_shift_x, chroma_shift_y) = (rec.shift_x(YuvComponent::U), rec.shift_y(YuvComponent::U));
    let params = pic.params();
    let mut edges = 0;

    for dy in (0..CTU_SIZE).step_by(subblock_size as usize) {
        for dx in (0..CTU_SIZE).step_by(subblock_size as usize) {
            let (x, y) = (ctu_x + dx, ctu_y + dy);
            let Some(q_id) = pic.cu_in_tree_at(tree, x, y) else {
                continue;
            };
            let p_id = match dir {
                EdgeDir::Vertical => pic.cu_in_tree_at(tree, x - 1, y),
                EdgeDir::Horizontal => pic.cu_in_tree_at(tree, x, y - 1),
            };
            let Some(p_id) = p_id.filter(|&p| p != q_id) else {
                continue;
            };
            let (cu_p, cu_q) = (pic.cu(p_id), pic.cu(q_id));
            let bs = boundary_strength(pic, cu_p, cu_q, x, y, dir);
            if bs == 0 {
                continue;
            }
            edges += 1;

            let qp = if r.disable_deblock_depending_on_qp {
                FIXED_QP_LUMA
            } else {
                (cu_p.qp().qp_raw(YuvComponent::Y) + cu_q.qp().qp_raw(YuvComponent::Y) + 1) >> 1
            };
            let luma = EdgeParams {
                bitdepth: pic.bitdepth(),
                beta_offset: params.beta_offset,
                tc_offset: params.tc_offset,
                boundary_strength: bs,
                qp,
            };
            if has_luma {
                filter_edge_luma(pic, rec, x, y, dir, subblock_size, &luma);
            }

            if !has_chroma || bs != 2 {
                continue;
            }
            let (cx, cy) = (x >> chroma_shift_x, y >> chroma_shift_y);
            let on_grid = match dir {
                EdgeDir::Vertical => cx & (CHROMA_FILTER_RESOLUTION - 1) == 0,
                EdgeDir::Horizontal => cy & (CHROMA_FILTER_RESOLUTION - 1) == 0,
            };
            if !on_grid {
                continue;
            }
            let chroma_qp = if r.disable_deblock_depending_on_qp {
                FIXED_QP_CHROMA
            } else {
                (cu_p.qp().qp_raw(YuvComponent::U) + cu_q.qp().qp_raw(YuvComponent::U) + 1) >> 1
            };
            let len = match dir {
                EdgeDir::Vertical => subblock_size >> chroma_shift_y,
                EdgeDir::Horizontal => subblock_size >> chroma_shift_x,
            };
            let tc = tc_for(chroma_qp + params.tc_offset + 2, pic.bitdepth());
            for comp in [YuvComponent::U, YuvComponent::V] {
                filter_chroma(rec, comp, cx, cy, dir, len as usize, tc);
            }
        }
    }
    edges
}

fn differs_by_one_sample(a: MotionVector, b: MotionVector) -> bool {
    (a.x - b.x).abs() >= MotionVector::SCALE || (a.y - b.y).abs() >= MotionVector::SCALE
}

/// Boundary strength between `cu_p` (left of or above the edge) and `cu_q`
/// at luma position (x, y): 2 for intra, 1 for coded residual or motion
/// discontinuity, 0 otherwise.
pub fn boundary_strength(pic: &PictureData, cu_p: &CodingUnit, cu_q: &CodingUnit, x: i32, y: i32, dir: EdgeDir) -> u8 {
    let r = pic.restrictions();
    let luma = YuvComponent::Y;
    let (corner_p, corner_q) = match dir {
        EdgeDir::Vertical => {
            let upper_p = y - cu_p.pos_y(luma) < cu_p.height(luma) >> 1;
            let upper_q = y - cu_q.pos_y(luma) < cu_q.height(luma) >> 1;
            (
                if upper_p { MvCorner::UpRight } else { MvCorner::DownRight },
                if upper_q { MvCorner::UpLeft } else { MvCorner::DownLeft },
            )
        }
        EdgeDir::Horizontal => {
            let left_p = x - cu_p.pos_x(luma) < cu_p.width(luma) >> 1;
            let left_q = x - cu_q.pos_x(luma) < cu_q.width(luma) >> 1;
            (
                if left_p { MvCorner::DownLeft } else { MvCorner::DownRight },
                if left_q { MvCorner::UpLeft } else { MvCorner::UpRight },
            )
        }
    };

    let mut bs = if r.disable_deblock_boundary_strength_zero { 1 } else { 0 };
    if cu_p.is_intra() || cu_q.is_intra() {
        bs = 2;
    } else if cu_p.cbf(luma) || cu_q.cbf(luma) {
        bs = 1;
    } else if pic.pic_type() == PicturePredictionType::Bi {
        let ref_p = [pic.ref_poc(cu_p, RefPicList::L0), pic.ref_poc(cu_p, RefPicList::L1)];
        let ref_q = [pic.ref_poc(cu_q, RefPicList::L0), pic.ref_poc(cu_q, RefPicList::L1)];
        if (ref_p[0] == ref_q[0] && ref_p[1] == ref_q[1]) || (ref_p[0] == ref_q[1] && ref_p[1] == ref_q[0]) {
            let mv_p = [cu_p.mv(RefPicList::L0, corner_p), cu_p.mv(RefPicList::L1, corner_p)];
            let mv_q = [cu_q.mv(RefPicList::L0, corner_q), cu_q.mv(RefPicList::L1, corner_q)];
            let straight = differs_by_one_sample(mv_p[0], mv_q[0]) || differs_by_one_sample(mv_p[1], mv_q[1]);
            let crossed = differs_by_one_sample(mv_p[0], mv_q[1]) || differs_by_one_sample(mv_p[1], mv_q[0]);
            let discontinuous = if ref_p[0] != ref_p[1] {
                if ref_p[0] == ref_q[0] { straight } else { crossed }
            } else {
                straight && crossed
            };
            if discontinuous {
                bs = 1;
            }
        } else {
            bs = 1;
        }
    } else if cu_p.ref_idx(RefPicList::L0) != cu_q.ref_idx(RefPicList::L0)
        || differs_by_one_sample(cu_p.mv(RefPicList::L0, corner_p), cu_q.mv(RefPicList::L0, corner_q))
    {
        bs = 1;
    }
    if bs == 1 && r.disable_deblock_boundary_strength_one {
        bs = 2;
    }
    bs
}

struct EdgeParams {
    bitdepth: u8,
    beta_offset: i32,
    tc_offset: i32,
    boundary_strength: u8,
    qp: i32,
}

/// Plane index of sample (x, y) plus the distance between samples across
/// (`across`) and along (`along`) the edge.
fn edge_layout(rec: &YuvPicture, comp: YuvComponent, x: i32, y: i32, dir: EdgeDir) -> (usize, usize, usize) {
    let stride = rec.stride(comp);
    let base = rec.offset(comp, x, y);
    match dir {
        EdgeDir::Vertical => (base, 1, stride),
        EdgeDir::Horizontal => (base, stride, 1),
    }
}

fn filter_edge_luma(
    pic: &PictureData,
    rec: &mut YuvPicture,
    x: i32,
    y: i32,
    dir: EdgeDir,
    subblock_size: i32,
    e: &EdgeParams,
) {
    let r = pic.restrictions();
    let (base, across, along) = edge_layout(rec, YuvComponent::Y, x, y, dir);
    let plane = rec.plane_mut(YuvComponent::Y);
    let at = |plane: &[Sample], i: usize| plane[i] as i32;
    let dp = |plane: &[Sample], i: usize| (at(plane, i - 3 * across) - 2 * at(plane, i - 2 * across) + at(plane, i - across)).abs();
    let dq = |plane: &[Sample], i: usize| (at(plane, i) - 2 * at(plane, i + across) + at(plane, i + 2 * across)).abs();
    let beta = beta_for(e.qp + e.beta_offset, e.bitdepth);
    let tc = tc_for(e.qp + e.tc_offset + 2 * (e.boundary_strength as i32 - 1), e.bitdepth);

    for group in 0..(subblock_size as usize / FILTER_GROUP_SIZE) {
        let start = base + group * FILTER_GROUP_SIZE * along;
        let last = start + 3 * along;
        let (dp0, dq0) = (dp(plane, start), dq(plane, start));
        let (dp3, dq3) = (dp(plane, last), dq(plane, last));
        let d0 = dp0 + dq0;
        let d3 = dp3 + dq3;
        if d0 + d3 >= beta && !r.disable_deblock_initial_sample_decision {
            continue;
        }
        let strong = (d0 << 1) < (beta >> 2)
            && (d3 << 1) < (beta >> 2)
            && check_strong_filter(plane, start, across, beta, tc)
            && check_strong_filter(plane, last, across, beta, tc);
        if strong && !r.disable_deblock_strong_filter {
            filter_luma_strong(plane, start, along, across, 2 * tc);
        } else if !r.disable_deblock_weak_filter {
            let side_threshold = (beta + (beta >> 1)) >> 3;
            let weak = WeakFilter {
                tc,
                filter_p1: dp0 + dp3 < side_threshold,
                filter_q1: dq0 + dq3 < side_threshold,
                sample_decision: !r.disable_deblock_weak_sample_decision,
                two_samples: !r.disable_deblock_two_samples_weak_filter,
                bitdepth: e.bitdepth,
            };
            filter_luma_weak(plane, start, along, across, &weak);
        }
    }
}

fn check_strong_filter(plane: &[Sample], i: usize, across: usize, beta: i32, tc: i32) -> bool {
    let p3 = plane[i - 4 * across] as i32;
    let p0 = plane[i - across] as i32;
    let q0 = plane[i] as i32;
    let q3 = plane[i + 3 * across] as i32;
    (p3 - p0).abs() + (q0 - q3).abs() < (beta >> 3) && (p0 - q0).abs() < ((tc * 5 + 1) >> 1)
}

fn filter_luma_strong(plane: &mut [Sample], start: usize, along: usize, across: usize, tc2: i32) {
    for line in 0..FILTER_GROUP_SIZE {
        let i = start + line * along;
        let s = |k: isize| plane[(i as isize + k * across as isize) as usize] as i32;
        let (p3, p2, p1, p0) = (s(-4), s(-3), s(-2), s(-1));
        let (q0, q1, q2, q3) = (s(0), s(1), s(2), s(3));
        let filtered = [
            (p2, (2 * p3 + 3 * p2 + p1 + p0 + q0 + 4) >> 3),
            (p1, (p2 + p1 + p0 + q0 + 2) >> 2),
            (p0, (p2 + 2 * p1 + 2 * p0 + 2 * q0 + q1 + 4) >> 3),
            (q0, (p1 + 2 * p0 + 2 * q0 + 2 * q1 + q2 + 4) >> 3),
            (q1, (p0 + q0 + q1 + q2 + 2) >> 2),
            (q2, (p0 + q0 + q1 + 3 * q2 + 2 * q3 + 4) >> 3),
        ];
        for (k, (orig, new)) in (-3isize..3).zip(filtered) {
            let idx = (i as isize + k * across as isize) as usize;
            plane[idx] = (orig + (new - orig).clamp(-tc2, tc2)) as Sample;
        }
    }
}

struct WeakFilter {
    tc: i32,
    filter_p1: bool,
    filter_q1: bool,
    sample_decision: bool,
    two_samples: bool,
    bitdepth: u8,
}

fn filter_luma_weak(plane: &mut [Sample], start: usize, along: usize, across: usize, f: &WeakFilter) {
    let threshold = f.tc * 10;
    let half_tc = f.tc >> 1;
    for line in 0..FILTER_GROUP_SIZE {
        let i = start + line * along;
        let p2 = plane[i - 3 * across] as i32;
        let p1 = plane[i - 2 * across] as i32;
        let p0 = plane[i - across] as i32;
        let q0 = plane[i] as i32;
        let q1 = plane[i + across] as i32;
        let q2 = plane[i + 2 * across] as i32;
        let delta = (9 * (q0 - p0) - 3 * (q1 - p1) + 8) >> 4;
        if delta.abs() >= threshold && f.sample_decision {
            continue;
        }
        let delta = delta.clamp(-f.tc, f.tc);
        plane[i - across] = clip_bd(p0 + delta, f.bitdepth);
        plane[i] = clip_bd(q0 - delta, f.bitdepth);
        if !f.two_samples {
            continue;
        }
        if f.filter_p1 {
            let d = ((((p2 + p0 + 1) >> 1) - p1 + delta) >> 1).clamp(-half_tc, half_tc);
            plane[i - 2 * across] = clip_bd(p1 + d, f.bitdepth);
        }
        if f.filter_q1 {
            let d = ((((q2 + q0 + 1) >> 1) - q1 - delta) >> 1).clamp(-half_tc, half_tc);
            plane[i + across] = clip_bd(q1 + d, f.bitdepth);
        }
    }
}

fn filter_chroma(rec: &mut YuvPicture, comp: YuvComponent, x: i32, y: i32, dir: EdgeDir, len: usize, tc: i32) {
    let bitdepth = rec.bitdepth();
    let (base, across, along) = edge_layout(rec, comp, x, y, dir);
    let plane = rec.plane_mut(comp);
    for line in 0..len {
        let i = base + line * along;
        let p1 = plane[i - 2 * across] as i32;
        let p0 = plane[i - across] as i32;
        let q0 = plane[i] as i32;
        let q1 = plane[i + across] as i32;
        let delta = ((((q0 - p0) * 4) + p1 - q1 + 4) >> 3).clamp(-tc, tc);
        plane[i - across] = clip_bd(p0 + delta, bitdepth);
        plane[i] = clip_bd(q0 - delta, bitdepth);
    }
}
