//! Per-picture coding tree storage.
//!
//! Coding units live in an arena addressed by [`CuId`]. A grid at
//! [`MIN_BLOCK_SIZE`] granularity maps every luma position of the picture to
//! the leaf that currently covers it, which turns neighbor lookups into plain
//! index arithmetic.

use crate::coding_unit::{CodingUnit, CuId};
use crate::common::{
    ChromaFormat, CTU_SIZE, MAX_CU_DEPTH, MIN_BINARY_SPLIT_SIZE, MIN_BLOCK_SIZE, PicNum, PicturePredictionType,
    YuvComponent,
};
use crate::cu_types::{
    CuTree, InterDir, IntraMode, IntraModeSet, MotionVector, MvCorner, NeighborDir, RefPicList, SplitRestriction,
    SplitType,
};
use crate::qp::Qp;
use crate::reference_picture_lists::ReferencePictureLists;
use crate::restrictions::Restrictions;

/// Parameters fixed for the lifetime of one picture.
#[derive(Debug, Clone)]
pub struct PictureParams {
    pub width: i32,
    pub height: i32,
    pub chroma_format: ChromaFormat,
    pub bitdepth: u8,
    pub poc: PicNum,
    pub pic_type: PicturePredictionType,
    pub tid: u32,
    pub qp: Qp,
    pub restrictions: Restrictions,
    pub max_binary_split_depth: i32,
    pub max_binary_split_size: i32,
    pub beta_offset: i32,
    pub tc_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionInfo {
    pub inter_dir: InterDir,
    pub mv: [MotionVector; 2],
    pub ref_poc: [PicNum; 2],
}

impl MotionInfo {
    pub fn has_mv(&self, list: RefPicList) -> bool {
        matches!(
            (self.inter_dir, list),
            (InterDir::Bi, _) | (InterDir::L0, RefPicList::L0) | (InterDir::L1, RefPicList::L1)
        )
    }
}

/// Motion of a decoded picture kept for temporal prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionField {
    poc: PicNum,
    width: i32,
    height: i32,
    log2_unit: u32,
    entries: Vec<Option<MotionInfo>>,
}

impl MotionField {
    /// Field of a picture without any inter-coded block.
    pub fn intra(poc: PicNum, width: i32, height: i32) -> Self {
        Self {
            poc,
            width,
            height,
            log2_unit: 6,
            entries: vec![None; (((width + 63) >> 6) * ((height + 63) >> 6)) as usize],
        }
    }

    pub fn poc(&self) -> PicNum {
        self.poc
    }

    /// Motion covering luma position (x, y); `None` for intra blocks or
    /// positions outside the picture.
    pub fn at(&self, x: i32, y: i32) -> Option<&MotionInfo> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let stride = ((self.width + (1 << self.log2_unit) - 1) >> self.log2_unit) as usize;
        let idx = (y >> self.log2_unit) as usize * stride + (x >> self.log2_unit) as usize;
        self.entries[idx].as_ref()
    }
}

/// Partitions a node may take. Shared by the encoder search and both syntax
/// walkers so that all three agree on which flags exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOptions {
    pub no_split: bool,
    pub quad: bool,
    pub horizontal: bool,
    pub vertical: bool,
}

impl SplitOptions {
    /// Nodes crossing the picture edge or larger than the biggest transform
    /// are quad split without signalling.
    pub fn implicit_quad(&self) -> bool {
        !self.no_split
    }

    pub fn quad_flag_coded(&self) -> bool {
        self.quad && self.no_split
    }

    pub fn any_binary(&self) -> bool {
        self.horizontal || self.vertical
    }
}

#[derive(Debug, Clone)]
pub struct PictureData {
    params: PictureParams,
    ref_pic_lists: ReferencePictureLists,
    cus: Vec<CodingUnit>,
    free: Vec<CuId>,
    /// One leaf map per coding tree.
    grids: [Vec<Option<CuId>>; 2],
    grid_stride: usize,
    ctus: [Vec<CuId>; 2],
    ctu_cols: i32,
    has_secondary_cu_tree: bool,
    force_bipred_l1_mvd_zero: bool,
}

const PRIMARY_ONLY: [CuTree; 1] = [CuTree::Primary];
const BOTH_TREES: [CuTree; 2] = [CuTree::Primary, CuTree::Secondary];

impl PictureData {
    pub fn new(params: PictureParams, ref_pic_lists: ReferencePictureLists) -> Self {
        let grid_w = ((params.width + MIN_BLOCK_SIZE - 1) / MIN_BLOCK_SIZE) as usize;
        let grid_h = ((params.height + MIN_BLOCK_SIZE - 1) / MIN_BLOCK_SIZE) as usize;
        let ctu_cols = (params.width + CTU_SIZE - 1) / CTU_SIZE;
        let ctu_rows = (params.height + CTU_SIZE - 1) / CTU_SIZE;
        let force_bipred_l1_mvd_zero = params.pic_type == PicturePredictionType::Bi
            && !params.restrictions.disable_ext2_inter_bipred_l1_mvd_zero
            && !ref_pic_lists.has_only_back_references();
        let has_secondary_cu_tree = params.pic_type == PicturePredictionType::Intra
            && !params.restrictions.disable_ext_two_cu_trees
            && params.chroma_format.num_components() > 1;
        let mut pic = Self {
            params,
            ref_pic_lists,
            cus: Vec::new(),
            free: Vec::new(),
            grids: [vec![None; grid_w * grid_h], Vec::new()],
            grid_stride: grid_w,
            ctus: [Vec::with_capacity((ctu_cols * ctu_rows) as usize), Vec::new()],
            ctu_cols,
            has_secondary_cu_tree,
            force_bipred_l1_mvd_zero,
        };
        if has_secondary_cu_tree {
            pic.grids[CuTree::Secondary.index()] = vec![None; grid_w * grid_h];
        }
        for &tree in pic.cu_trees() {
            for row in 0..ctu_rows {
                for col in 0..ctu_cols {
                    let id = pic.create_cu_in(tree, 0, col * CTU_SIZE, row * CTU_SIZE, CTU_SIZE, CTU_SIZE);
                    pic.ctus[tree.index()].push(id);
                }
            }
        }
        pic
    }

    pub fn params(&self) -> &PictureParams {
        &self.params
    }

    pub fn width(&self, comp: YuvComponent) -> i32 {
        if comp.is_luma() {
            self.params.width
        } else {
            self.params.width >> self.params.chroma_format.shift_x()
        }
    }

    pub fn height(&self, comp: YuvComponent) -> i32 {
        if comp.is_luma() {
            self.params.height
        } else {
            self.params.height >> self.params.chroma_format.shift_y()
        }
    }

    pub fn chroma_format(&self) -> ChromaFormat {
        self.params.chroma_format
    }

    pub fn bitdepth(&self) -> u8 {
        self.params.bitdepth
    }

    pub fn poc(&self) -> PicNum {
        self.params.poc
    }

    pub fn pic_type(&self) -> PicturePredictionType {
        self.params.pic_type
    }

    pub fn is_intra_pic(&self) -> bool {
        self.params.pic_type == PicturePredictionType::Intra
    }

    pub fn pic_qp(&self) -> &Qp {
        &self.params.qp
    }

    pub fn restrictions(&self) -> &Restrictions {
        &self.params.restrictions
    }

    /// Chroma of intra pictures is coded in a tree of its own.
    pub fn has_secondary_cu_tree(&self) -> bool {
        self.has_secondary_cu_tree
    }

    /// Trees in coding order.
    pub fn cu_trees(&self) -> &'static [CuTree] {
        if self.has_secondary_cu_tree { &BOTH_TREES } else { &PRIMARY_ONLY }
    }

    pub fn components(&self, tree: CuTree) -> &'static [YuvComponent] {
        let all = self.params.chroma_format.components();
        match (tree, self.has_secondary_cu_tree) {
            (_, false) => all,
            (CuTree::Primary, true) => &all[..1],
            (CuTree::Secondary, true) => &all[1..],
        }
    }

    pub fn intra_mode_set(&self) -> IntraModeSet {
        if self.params.restrictions.disable_ext2_intra_67_modes {
            IntraModeSet::Modes35
        } else {
            IntraModeSet::Modes67
        }
    }

    pub fn max_binary_split_depth(&self) -> i32 {
        self.params.max_binary_split_depth
    }

    pub fn max_binary_split_size(&self) -> i32 {
        self.params.max_binary_split_size
    }

    pub fn force_bipred_l1_mvd_zero(&self) -> bool {
        self.force_bipred_l1_mvd_zero
    }

    pub fn ref_pic_lists(&self) -> &ReferencePictureLists {
        &self.ref_pic_lists
    }

    pub fn num_ctus(&self) -> usize {
        self.ctus[CuTree::Primary.index()].len()
    }

    pub fn ctu_cols(&self) -> i32 {
        self.ctu_cols
    }

    pub fn ctu(&self, rsaddr: usize) -> CuId {
        self.ctus[CuTree::Primary.index()][rsaddr]
    }

    pub fn ctu_in(&self, tree: CuTree, rsaddr: usize) -> CuId {
        self.ctus[tree.index()][rsaddr]
    }

    pub(crate) fn set_ctu(&mut self, tree: CuTree, rsaddr: usize, id: CuId) {
        self.ctus[tree.index()][rsaddr] = id;
    }

    #[inline]
    pub fn cu(&self, id: CuId) -> &CodingUnit {
        &self.cus[id.index()]
    }

    #[inline]
    pub fn cu_mut(&mut self, id: CuId) -> &mut CodingUnit {
        &mut self.cus[id.index()]
    }

    /// Two distinct nodes borrowed mutably at once.
    pub fn cu_pair_mut(&mut self, a: CuId, b: CuId) -> (&mut CodingUnit, &mut CodingUnit) {
        assert_ne!(a, b);
        if a.index() < b.index() {
            let (lo, hi) = self.cus.split_at_mut(b.index());
            (&mut lo[a.index()], &mut hi[0])
        } else {
            let (lo, hi) = self.cus.split_at_mut(a.index());
            (&mut hi[0], &mut lo[b.index()])
        }
    }

    pub fn create_cu(&mut self, depth: i32, x: i32, y: i32, width: i32, height: i32) -> CuId {
        self.create_cu_in(CuTree::Primary, depth, x, y, width, height)
    }

    pub fn create_cu_in(&mut self, tree: CuTree, depth: i32, x: i32, y: i32, width: i32, height: i32) -> CuId {
        let qp = self.params.qp;
        let components = self.components(tree);
        let id = match self.free.pop() {
            Some(id) => {
                self.cus[id.index()].reinit(qp, depth, x, y, width, height);
                id
            }
            None => {
                self.cus
                    .push(CodingUnit::new(self.params.chroma_format, qp, depth, x, y, width, height));
                CuId(self.cus.len() as u32 - 1)
            }
        };
        self.cus[id.index()].assign_tree(tree, components);
        id
    }

    /// Returns a node and all of its descendants to the pool.
    pub fn release_cu(&mut self, id: CuId) {
        let subs = self.cus[id.index()].sub_cu;
        for sub in subs.into_iter().flatten() {
            self.release_cu(sub);
        }
        let cu = &mut self.cus[id.index()];
        cu.sub_cu = [None; 4];
        cu.set_split(SplitType::None);
        self.free.push(id);
    }

    pub fn split_cu(&mut self, id: CuId, split: SplitType) {
        let cu = &self.cus[id.index()];
        assert!(split != SplitType::None, "split type none");
        assert!(cu.split() == SplitType::None, "cu already split");
        let (x, y) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        let (w, h) = (cu.width(YuvComponent::Y), cu.height(YuvComponent::Y));
        let (depth, tree) = (cu.depth(), cu.cu_tree());
        let (sw, sh) = (w >> 1, h >> 1);
        let mut subs = [None; 4];
        match split {
            SplitType::Quad => {
                subs[0] = Some(self.create_cu_in(tree, depth + 1, x, y, sw, sh));
                subs[1] = Some(self.create_cu_in(tree, depth + 1, x + sw, y, sw, sh));
                subs[2] = Some(self.create_cu_in(tree, depth + 1, x, y + sh, sw, sh));
                subs[3] = Some(self.create_cu_in(tree, depth + 1, x + sw, y + sh, sw, sh));
            }
            SplitType::Horizontal => {
                subs[0] = Some(self.create_cu_in(tree, depth, x, y, w, sh));
                subs[1] = Some(self.create_cu_in(tree, depth, x, y + sh, w, sh));
            }
            SplitType::Vertical => {
                subs[0] = Some(self.create_cu_in(tree, depth, x, y, sw, h));
                subs[1] = Some(self.create_cu_in(tree, depth, x + sw, y, sw, h));
            }
            SplitType::None => unreachable!(),
        }
        let cu = &mut self.cus[id.index()];
        cu.sub_cu = subs;
        cu.set_split(split);
    }

    pub fn unsplit_cu(&mut self, id: CuId) {
        let cu = &self.cus[id.index()];
        assert!(cu.split() != SplitType::None, "unsplit of a leaf");
        let subs = cu.sub_cu;
        for sub in subs.into_iter().flatten() {
            self.release_cu(sub);
        }
        let cu = &mut self.cus[id.index()];
        cu.sub_cu = [None; 4];
        cu.set_split(SplitType::None);
    }

    pub(crate) fn set_sub_cu(&mut self, parent: CuId, idx: usize, id: CuId) {
        self.cus[parent.index()].sub_cu[idx] = Some(id);
    }

    /// True when a child of a split lies at least partly inside the picture.
    pub fn is_inside_picture(&self, id: CuId) -> bool {
        let cu = self.cu(id);
        cu.pos_x(YuvComponent::Y) < self.params.width && cu.pos_y(YuvComponent::Y) < self.params.height
    }

    pub fn is_fully_within_picture(&self, cu: &CodingUnit) -> bool {
        cu.is_fully_within_picture(self.params.width, self.params.height)
    }

    pub fn is_binary_split_valid(&self, cu: &CodingUnit) -> bool {
        cu.is_binary_split_valid(self.params.max_binary_split_depth, self.params.max_binary_split_size)
    }

    pub fn split_options(&self, cu: &CodingUnit, restriction: SplitRestriction) -> SplitOptions {
        let max_tr = self.params.restrictions.max_transform_size();
        let (w, h) = (cu.width(YuvComponent::Y), cu.height(YuvComponent::Y));
        let no_split = self.is_fully_within_picture(cu) && w <= max_tr && h <= max_tr;
        let quad = cu.binary_depth() == 0 && cu.depth() < MAX_CU_DEPTH;
        debug_assert!(no_split || quad, "cu at ({}, {}) can neither stay nor split", cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        let binary = no_split && self.is_binary_split_valid(cu);
        SplitOptions {
            no_split,
            quad,
            horizontal: binary && restriction != SplitRestriction::NoHorizontal && h > MIN_BINARY_SPLIT_SIZE,
            vertical: binary && restriction != SplitRestriction::NoVertical && w > MIN_BINARY_SPLIT_SIZE,
        }
    }

    fn fill_grid(&mut self, tree: CuTree, cu_area: (i32, i32, i32, i32), value: Option<CuId>) {
        let (x, y, w, h) = cu_area;
        let x0 = x / MIN_BLOCK_SIZE;
        let y0 = y / MIN_BLOCK_SIZE;
        let x1 = ((x + w).min(self.params.width) + MIN_BLOCK_SIZE - 1) / MIN_BLOCK_SIZE;
        let y1 = ((y + h).min(self.params.height) + MIN_BLOCK_SIZE - 1) / MIN_BLOCK_SIZE;
        let grid = &mut self.grids[tree.index()];
        for gy in y0..y1 {
            let row = gy as usize * self.grid_stride;
            for gx in x0..x1 {
                grid[row + gx as usize] = value;
            }
        }
    }

    fn area(cu: &CodingUnit) -> (i32, i32, i32, i32) {
        (
            cu.pos_x(YuvComponent::Y),
            cu.pos_y(YuvComponent::Y),
            cu.width(YuvComponent::Y),
            cu.height(YuvComponent::Y),
        )
    }

    /// Makes the leaves of `id` visible to neighbor lookups.
    pub fn mark_used_in_pic(&mut self, id: CuId) {
        let cu = &self.cus[id.index()];
        if cu.split() != SplitType::None {
            let subs = cu.sub_cu;
            for sub in subs.into_iter().flatten() {
                if self.is_inside_picture(sub) {
                    self.mark_used_in_pic(sub);
                }
            }
            return;
        }
        let (tree, area) = (cu.cu_tree(), Self::area(cu));
        self.fill_grid(tree, area, Some(id));
    }

    pub fn clear_mark_cu_in_pic(&mut self, id: CuId) {
        let cu = &self.cus[id.index()];
        let (tree, area) = (cu.cu_tree(), Self::area(cu));
        self.fill_grid(tree, area, None);
    }

    /// Leaf of the primary tree covering luma position (x, y), if any has
    /// been marked there.
    pub fn cu_at(&self, x: i32, y: i32) -> Option<CuId> {
        self.cu_in_tree_at(CuTree::Primary, x, y)
    }

    pub fn cu_in_tree_at(&self, tree: CuTree, x: i32, y: i32) -> Option<CuId> {
        if x < 0 || y < 0 || x >= self.params.width || y >= self.params.height {
            return None;
        }
        let idx = (y / MIN_BLOCK_SIZE) as usize * self.grid_stride + (x / MIN_BLOCK_SIZE) as usize;
        self.grids[tree.index()].get(idx).copied().flatten()
    }

    /// Neighbor lookups stay inside the tree of `cu`.
    fn cu_ref_at(&self, cu: &CodingUnit, x: i32, y: i32) -> Option<&CodingUnit> {
        self.cu_in_tree_at(cu.cu_tree(), x, y).map(|id| self.cu(id))
    }

    /// Luma mode that the derived chroma mode of a chroma-tree node
    /// follows: the mode of the luma leaf at the node's top-left sample.
    pub fn co_located_luma_mode(&self, cu: &CodingUnit) -> IntraMode {
        self.cu_at(cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y))
            .map(|id| self.cu(id))
            .filter(|luma| luma.is_intra())
            .map_or(IntraMode::DC, |luma| luma.intra_mode_luma())
    }

    pub fn cu_above(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let (x, y) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        if y == 0 {
            return None;
        }
        self.cu_ref_at(cu, x, y - MIN_BLOCK_SIZE)
    }

    pub fn cu_above_if_same_ctu(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let (x, y) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        if y % CTU_SIZE == 0 {
            return None;
        }
        self.cu_ref_at(cu, x, y - MIN_BLOCK_SIZE)
    }

    pub fn cu_above_left(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let (x, y) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        if x == 0 || y == 0 {
            return None;
        }
        self.cu_ref_at(cu, x - MIN_BLOCK_SIZE, y - MIN_BLOCK_SIZE)
    }

    pub fn cu_above_corner(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let right = cu.pos_x(YuvComponent::Y) + cu.width(YuvComponent::Y);
        let y = cu.pos_y(YuvComponent::Y);
        if y == 0 {
            return None;
        }
        self.cu_ref_at(cu, right - MIN_BLOCK_SIZE, y - MIN_BLOCK_SIZE)
    }

    pub fn cu_above_right(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let right = cu.pos_x(YuvComponent::Y) + cu.width(YuvComponent::Y);
        let y = cu.pos_y(YuvComponent::Y);
        if y == 0 {
            return None;
        }
        self.cu_ref_at(cu, right, y - MIN_BLOCK_SIZE)
    }

    pub fn cu_left(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let (x, y) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        if x == 0 {
            return None;
        }
        self.cu_ref_at(cu, x - MIN_BLOCK_SIZE, y)
    }

    pub fn cu_left_corner(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let x = cu.pos_x(YuvComponent::Y);
        let bottom = cu.pos_y(YuvComponent::Y) + cu.height(YuvComponent::Y);
        if x == 0 {
            return None;
        }
        self.cu_ref_at(cu, x - MIN_BLOCK_SIZE, bottom - MIN_BLOCK_SIZE)
    }

    pub fn cu_left_below(&self, cu: &CodingUnit) -> Option<&CodingUnit> {
        let x = cu.pos_x(YuvComponent::Y);
        let bottom = cu.pos_y(YuvComponent::Y) + cu.height(YuvComponent::Y);
        if x == 0 {
            return None;
        }
        self.cu_ref_at(cu, x - MIN_BLOCK_SIZE, bottom)
    }

    /// Neighbor in direction `dir` together with the corner of that neighbor
    /// touching this CU.
    pub fn neighbor(&self, cu: &CodingUnit, dir: NeighborDir) -> Option<(&CodingUnit, MvCorner)> {
        let (px, py) = (cu.pos_x(YuvComponent::Y), cu.pos_y(YuvComponent::Y));
        let (w, h) = (cu.width(YuvComponent::Y), cu.height(YuvComponent::Y));
        let (found, x, y) = match dir {
            NeighborDir::AboveLeft => (self.cu_above_left(cu), px - MIN_BLOCK_SIZE, py - MIN_BLOCK_SIZE),
            NeighborDir::Above => (self.cu_above(cu), px, py - MIN_BLOCK_SIZE),
            NeighborDir::AboveCorner => (self.cu_above_corner(cu), px + w - MIN_BLOCK_SIZE, py - MIN_BLOCK_SIZE),
            NeighborDir::AboveRight => (self.cu_above_right(cu), px + w, py - MIN_BLOCK_SIZE),
            NeighborDir::Left => (self.cu_left(cu), px - MIN_BLOCK_SIZE, py),
            NeighborDir::LeftCorner => (self.cu_left_corner(cu), px - MIN_BLOCK_SIZE, py + h - MIN_BLOCK_SIZE),
            NeighborDir::LeftBelow => (self.cu_left_below(cu), px - MIN_BLOCK_SIZE, py + h),
        };
        found.map(|n| (n, n.mv_corner(x, y)))
    }

    /// Number of luma (or chroma) samples above-right of `cu` that are
    /// already reconstructed.
    pub fn cu_size_above_right(&self, cu: &CodingUnit, comp: YuvComponent) -> i32 {
        let shift = self.params.chroma_format.shift_x().max(self.params.chroma_format.shift_y());
        let x = cu.pos_x(YuvComponent::Y) + cu.width(YuvComponent::Y) - MIN_BLOCK_SIZE;
        let y = cu.pos_y(YuvComponent::Y) - MIN_BLOCK_SIZE;
        if y < 0 {
            return 0;
        }
        let mut i = cu.height(YuvComponent::Y);
        while i >= 0 {
            if self.cu_in_tree_at(cu.cu_tree(), x + i, y).is_some() {
                return if comp.is_luma() { i } else { i >> shift };
            }
            i -= MIN_BLOCK_SIZE;
        }
        0
    }

    pub fn cu_size_below_left(&self, cu: &CodingUnit, comp: YuvComponent) -> i32 {
        let shift = self.params.chroma_format.shift_x().max(self.params.chroma_format.shift_y());
        let x = cu.pos_x(YuvComponent::Y) - MIN_BLOCK_SIZE;
        let y = cu.pos_y(YuvComponent::Y) + cu.height(YuvComponent::Y) - MIN_BLOCK_SIZE;
        if x < 0 {
            return 0;
        }
        let mut i = cu.width(YuvComponent::Y);
        while i >= 0 {
            if self.cu_in_tree_at(cu.cu_tree(), x, y + i).is_some() {
                return if comp.is_luma() { i } else { i >> shift };
            }
            i -= MIN_BLOCK_SIZE;
        }
        0
    }

    pub fn can_affine_merge(&self, cu: &CodingUnit) -> bool {
        if cu.width(YuvComponent::Y) * cu.height(YuvComponent::Y) < 64 {
            return false;
        }
        [
            self.cu_left_corner(cu),
            self.cu_above_corner(cu),
            self.cu_above_right(cu),
            self.cu_left_below(cu),
            self.cu_above_left(cu),
        ]
        .into_iter()
        .flatten()
        .any(|n| n.use_affine())
    }

    pub fn ref_poc(&self, cu: &CodingUnit, list: RefPicList) -> Option<PicNum> {
        if !cu.has_mv(list) {
            return None;
        }
        Some(self.ref_pic_lists.ref_poc(list, cu.ref_idx(list) as usize))
    }

    /// Leaves of the tree below `id` in coding order.
    pub fn leaves(&self, id: CuId) -> Vec<CuId> {
        let mut out = Vec::new();
        self.collect_leaves(id, &mut out);
        out
    }

    fn collect_leaves(&self, id: CuId, out: &mut Vec<CuId>) {
        let cu = self.cu(id);
        if cu.split() == SplitType::None {
            out.push(id);
            return;
        }
        for sub in cu.sub_cus() {
            if self.is_inside_picture(sub) {
                self.collect_leaves(sub, out);
            }
        }
    }

    /// Snapshot of the picture's motion for use as a temporal predictor.
    pub fn build_motion_field(&self) -> MotionField {
        let log2_unit = if self.params.restrictions.disable_ext_tmvp_full_resolution { 4 } else { 2 };
        let unit = 1 << log2_unit;
        let cols = (self.params.width + unit - 1) >> log2_unit;
        let rows = (self.params.height + unit - 1) >> log2_unit;
        let mut entries = Vec::with_capacity((cols * rows) as usize);
        for uy in 0..rows {
            for ux in 0..cols {
                let (x, y) = (ux << log2_unit, uy << log2_unit);
                let info = self.cu_at(x, y).map(|id| self.cu(id)).filter(|cu| cu.is_inter()).map(|cu| {
                    let corner = cu.mv_corner(x, y);
                    let mut info = MotionInfo {
                        inter_dir: cu.inter_dir(),
                        ..MotionInfo::default()
                    };
                    for list in RefPicList::ALL {
                        if cu.has_mv(list) {
                            info.mv[list.index()] = cu.mv(list, corner);
                            info.ref_poc[list.index()] = self.ref_poc(cu, list).unwrap_or(0);
                        }
                    }
                    info
                });
                entries.push(info);
            }
        }
        MotionField {
            poc: self.params.poc,
            width: self.params.width,
            height: self.params.height,
            log2_unit: log2_unit as u32,
            entries,
        }
    }
}
