use crate::common::{
    ChromaFormat, Coeff, CTU_SIZE, MIN_BINARY_SPLIT_SIZE, MIN_CU_SIZE, PicturePredictionType, Sample,
    YuvComponent, size_to_log2, TRANSFORM_SKIP_MAX_AREA,
};
use crate::cu_types::{
    CuTree, InterDir, IntraChromaMode, IntraMode, IntraModeSet, MotionVector, MotionVector3, MvCorner,
    MvDelta, PredictionMode, RefPicList, SplitRestriction, SplitType, TransformType,
};
use crate::qp::Qp;
use crate::restrictions::Restrictions;
use crate::yuv_pic::YuvPicture;

/// Handle of a coding unit inside the owning picture's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CuId(pub u32);

impl CuId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformState {
    pub root_cbf: bool,
    pub cbf: [bool; 3],
    pub transform_skip: [bool; 3],
    /// `[plane][vertical, horizontal]`
    pub transform_type: [[TransformType; 2]; 2],
    pub transform_select_idx: i32,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            root_cbf: false,
            cbf: [false; 3],
            transform_skip: [false; 3],
            transform_type: [[TransformType::Default; 2]; 2],
            transform_select_idx: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntraState {
    /// In the chroma tree, the mode of the co-located luma leaf.
    pub mode_luma: IntraMode,
    pub mode_chroma: IntraChromaMode,
}

impl Default for IntraState {
    fn default() -> Self {
        Self {
            mode_luma: IntraMode::DC,
            mode_chroma: IntraChromaMode::Dm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterState {
    pub inter_dir: InterDir,
    pub skip_flag: bool,
    pub merge_flag: bool,
    pub merge_idx: i32,
    pub fullpel_mv: bool,
    pub use_affine: bool,
    pub use_lic: bool,
    /// Per list, one motion vector per corner.
    pub mv: [[MotionVector; 4]; 2],
    pub mvd: [[MvDelta; 2]; 2],
    pub ref_idx: [i32; 2],
    pub mvp_idx: [i32; 2],
}

impl Default for InterState {
    fn default() -> Self {
        Self {
            inter_dir: InterDir::L0,
            skip_flag: false,
            merge_flag: false,
            merge_idx: -1,
            fullpel_mv: false,
            use_affine: false,
            use_lic: false,
            mv: [[MotionVector::default(); 4]; 2],
            mvd: [[MvDelta::default(); 2]; 2],
            ref_idx: [0; 2],
            mvp_idx: [0; 2],
        }
    }
}

/// Reconstructed samples and coefficients of one CU, per component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionState {
    pub reco: [Vec<Sample>; 3],
    pub coeff: [Vec<Coeff>; 3],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualState {
    pub reco: ReconstructionState,
    pub tx: TransformState,
}

const INTRA_TX_MAP: [[TransformType; 2]; 3] = [
    [TransformType::Dst7, TransformType::Dct8],
    [TransformType::Dst7, TransformType::Dst1],
    [TransformType::Dst7, TransformType::Dct5],
];
const INTER_TX_MAP: [TransformType; 2] = [TransformType::Dct8, TransformType::Dst7];

const INTRA_VER_MAP_35: [u8; 35] = [
    2, 1, 0, 1, 0, 1, 0, 1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 2, 2, 2, 2, 2, 1, 0, 1,
    0, 1, 0,
];
const INTRA_HOR_MAP_35: [u8; 35] = [
    2, 1, 0, 1, 0, 1, 0, 1, 2, 2, 2, 2, 2, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 0, 0, 0, 0, 1, 0, 1,
    0, 1, 0,
];
const INTRA_VER_MAP_67: [u8; 67] = [
    2, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0,
];
const INTRA_HOR_MAP_67: [u8; 67] = [
    2, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0,
];

/// One node of the coding tree. Nodes live in the arena of
/// [`PictureData`](crate::picture_data::PictureData) and refer to their
/// children by [`CuId`].
#[derive(Debug, Clone)]
pub struct CodingUnit {
    pos_x: i32,
    pos_y: i32,
    width: i32,
    height: i32,
    depth: i32,
    chroma_format: ChromaFormat,
    cu_tree: CuTree,
    components: &'static [YuvComponent],
    split: SplitType,
    pred_mode: PredictionMode,
    pub(crate) sub_cu: [Option<CuId>; 4],
    qp: Qp,
    tx: TransformState,
    intra: IntraState,
    inter: InterState,
    coeff: [Vec<Coeff>; 3],
}

impl CodingUnit {
    pub fn new(chroma_format: ChromaFormat, qp: Qp, depth: i32, x: i32, y: i32, width: i32, height: i32) -> Self {
        let mut cu = Self {
            pos_x: x,
            pos_y: y,
            width,
            height,
            depth,
            chroma_format,
            cu_tree: CuTree::Primary,
            components: chroma_format.components(),
            split: SplitType::None,
            pred_mode: PredictionMode::Intra,
            sub_cu: [None; 4],
            qp,
            tx: TransformState::default(),
            intra: IntraState::default(),
            inter: InterState::default(),
            coeff: [Vec::new(), Vec::new(), Vec::new()],
        };
        cu.resize_coeff();
        cu
    }

    /// Reuses a recycled node for a new position.
    pub(crate) fn reinit(&mut self, qp: Qp, depth: i32, x: i32, y: i32, width: i32, height: i32) {
        self.pos_x = x;
        self.pos_y = y;
        self.width = width;
        self.height = height;
        self.depth = depth;
        self.split = SplitType::None;
        self.pred_mode = PredictionMode::Intra;
        self.sub_cu = [None; 4];
        self.qp = qp;
        self.reset_prediction_state();
        self.resize_coeff();
    }

    /// Moves the node into `tree`, coding only `components`.
    pub(crate) fn assign_tree(&mut self, tree: CuTree, components: &'static [YuvComponent]) {
        self.cu_tree = tree;
        self.components = components;
    }

    fn resize_coeff(&mut self) {
        for &comp in self.chroma_format.components() {
            let n = (self.width(comp) * self.height(comp)) as usize;
            let buf = &mut self.coeff[comp.index()];
            buf.clear();
            buf.resize(n, 0);
        }
    }

    pub fn reset_prediction_state(&mut self) {
        self.tx = TransformState::default();
        self.intra = IntraState::default();
        self.inter = InterState::default();
    }

    pub fn copy_position_and_size_from(&mut self, other: &CodingUnit) {
        self.pos_x = other.pos_x;
        self.pos_y = other.pos_y;
        self.width = other.width;
        self.height = other.height;
        self.depth = other.depth;
        self.qp = other.qp;
        self.resize_coeff();
    }

    pub fn copy_prediction_data_from(&mut self, other: &CodingUnit) {
        self.pred_mode = other.pred_mode;
        self.qp = other.qp;
        self.tx = other.tx;
        self.intra = other.intra;
        self.inter = other.inter;
    }

    pub fn chroma_format(&self) -> ChromaFormat {
        self.chroma_format
    }

    pub fn cu_tree(&self) -> CuTree {
        self.cu_tree
    }

    pub fn components(&self) -> &'static [YuvComponent] {
        self.components
    }

    fn shift_x(&self, comp: YuvComponent) -> i32 {
        if comp.is_luma() { 0 } else { self.chroma_format.shift_x() }
    }

    fn shift_y(&self, comp: YuvComponent) -> i32 {
        if comp.is_luma() { 0 } else { self.chroma_format.shift_y() }
    }

    #[inline]
    pub fn pos_x(&self, comp: YuvComponent) -> i32 {
        self.pos_x >> self.shift_x(comp)
    }

    #[inline]
    pub fn pos_y(&self, comp: YuvComponent) -> i32 {
        self.pos_y >> self.shift_y(comp)
    }

    #[inline]
    pub fn width(&self, comp: YuvComponent) -> i32 {
        self.width >> self.shift_x(comp)
    }

    #[inline]
    pub fn height(&self, comp: YuvComponent) -> i32 {
        self.height >> self.shift_y(comp)
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Sum of log2 size deficits from the enclosing quad node in both
    /// dimensions.
    pub fn binary_depth(&self) -> i32 {
        let quad_log2 = size_to_log2(CTU_SIZE >> self.depth);
        (quad_log2 - size_to_log2(self.width)) + (quad_log2 - size_to_log2(self.height))
    }

    pub fn is_binary_split_valid(&self, max_depth: i32, max_size: i32) -> bool {
        self.binary_depth() < max_depth
            && self.width <= max_size
            && self.height <= max_size
            && (self.width > MIN_BINARY_SPLIT_SIZE || self.height > MIN_BINARY_SPLIT_SIZE)
    }

    pub fn is_fully_within_picture(&self, pic_width: i32, pic_height: i32) -> bool {
        self.pos_x + self.width <= pic_width && self.pos_y + self.height <= pic_height
    }

    pub fn split(&self) -> SplitType {
        self.split
    }

    pub(crate) fn set_split(&mut self, split: SplitType) {
        self.split = split;
    }

    pub fn sub_cu(&self, idx: usize) -> Option<CuId> {
        self.sub_cu[idx]
    }

    pub fn sub_cus(&self) -> impl Iterator<Item = CuId> + '_ {
        self.sub_cu.iter().flatten().copied()
    }

    pub fn is_first_cu_in_quad(&self, depth: i32) -> bool {
        let size = CTU_SIZE >> depth;
        (self.pos_x & (size - 1)) == 0 && (self.pos_y & (size - 1)) == 0
    }

    /// Restriction for the second sibling of a binary split, derived from
    /// how the first sibling was split.
    pub fn derive_sibling_split_restriction(
        &self,
        parent_split: SplitType,
        pic_type: PicturePredictionType,
    ) -> SplitRestriction {
        if pic_type == PicturePredictionType::Intra {
            return SplitRestriction::None;
        }
        match (parent_split, self.split) {
            (SplitType::Vertical, SplitType::Horizontal) => {
                if self.width >= MIN_CU_SIZE && self.binary_depth() == 1 {
                    SplitRestriction::NoHorizontal
                } else {
                    SplitRestriction::None
                }
            }
            (SplitType::Horizontal, SplitType::Vertical) => SplitRestriction::NoVertical,
            _ => SplitRestriction::None,
        }
    }

    /// Corner of this CU that contains luma position (x, y).
    pub fn mv_corner(&self, x: i32, y: i32) -> MvCorner {
        let idx = 2 * i32::from((y - self.pos_y) >= (self.height >> 1))
            + i32::from((x - self.pos_x) >= (self.width >> 1));
        MvCorner::from_index(idx)
    }

    pub fn qp(&self) -> &Qp {
        &self.qp
    }

    pub fn set_qp(&mut self, qp: Qp) {
        self.qp = qp;
    }

    pub fn root_cbf(&self) -> bool {
        self.tx.root_cbf
    }

    pub fn set_root_cbf(&mut self, root_cbf: bool) {
        self.tx.root_cbf = root_cbf;
    }

    pub fn cbf(&self, comp: YuvComponent) -> bool {
        self.tx.cbf[comp.index()]
    }

    pub fn set_cbf(&mut self, comp: YuvComponent, cbf: bool) {
        self.tx.cbf[comp.index()] = cbf;
    }

    pub fn has_any_cbf(&self) -> bool {
        self.tx.cbf.iter().any(|&c| c)
    }

    /// Drops the residual of one component.
    pub fn clear_cbf(&mut self, comp: YuvComponent, restrictions: &Restrictions, mode_set: IntraModeSet) {
        self.tx.cbf[comp.index()] = if restrictions.disable_transform_cbf {
            self.tx.root_cbf
        } else {
            false
        };
        self.tx.transform_skip[comp.index()] = false;
        self.set_transform_from_select_idx(comp, -1, restrictions, mode_set);
        self.coeff[comp.index()].fill(0);
    }

    /// Sets the root and per-component coded block flags to the values the
    /// syntax carries: the root flag is only coded for non-skipped inter
    /// blocks, and component flags follow the root when they are not coded.
    pub fn derive_cbf_flags(&mut self, restrictions: &Restrictions) {
        let comps = self.components;
        let mut coded = [false; 3];
        for &comp in comps {
            coded[comp.index()] = self.coeff[comp.index()].iter().any(|&c| c != 0);
        }
        let root = if self.inter.skip_flag {
            false
        } else if self.is_inter() && !restrictions.disable_transform_root_cbf {
            coded.iter().any(|&c| c)
        } else {
            true
        };
        self.tx.root_cbf = root;
        for &comp in comps {
            self.tx.cbf[comp.index()] = if restrictions.disable_transform_cbf {
                root
            } else {
                root && coded[comp.index()]
            };
        }
    }

    pub fn transform_skip(&self, comp: YuvComponent) -> bool {
        self.tx.transform_skip[comp.index()]
    }

    pub fn set_transform_skip(&mut self, comp: YuvComponent, skip: bool) {
        self.tx.transform_skip[comp.index()] = skip;
    }

    pub fn can_transform_skip(&self, comp: YuvComponent) -> bool {
        self.width(comp) * self.height(comp) <= TRANSFORM_SKIP_MAX_AREA
    }

    pub fn transform_types(&self, comp: YuvComponent) -> [TransformType; 2] {
        self.tx.transform_type[comp.plane()]
    }

    pub fn set_transform_type(&mut self, comp: YuvComponent, ver: TransformType, hor: TransformType) {
        self.tx.transform_type[comp.plane()] = [ver, hor];
    }

    pub fn has_transform_select_idx(&self) -> bool {
        self.tx.transform_select_idx >= 0
    }

    pub fn transform_select_idx(&self) -> i32 {
        self.tx.transform_select_idx
    }

    /// Maps a transform select index onto a (vertical, horizontal) pair of
    /// transform types. Only luma carries an index; chroma always follows.
    pub fn set_transform_from_select_idx(
        &mut self,
        comp: YuvComponent,
        select_idx: i32,
        restrictions: &Restrictions,
        mode_set: IntraModeSet,
    ) {
        if !comp.is_luma() {
            return;
        }
        debug_assert!(select_idx < crate::common::MAX_TRANSFORM_SELECT_IDX);
        self.tx.transform_select_idx = select_idx;
        if restrictions.disable_ext2_transform_select {
            self.tx.transform_type = [[TransformType::Default; 2]; 2];
        } else if select_idx < 0 {
            self.tx.transform_type = [[TransformType::Dct2; 2]; 2];
        } else {
            let idx = select_idx as usize;
            self.tx.transform_type[0] = if self.is_intra() {
                let mode = self.intra.mode_luma.0 as usize;
                let (ver_map, hor_map): (&[u8], &[u8]) = match mode_set {
                    IntraModeSet::Modes67 => (&INTRA_VER_MAP_67, &INTRA_HOR_MAP_67),
                    IntraModeSet::Modes35 => (&INTRA_VER_MAP_35, &INTRA_HOR_MAP_35),
                };
                [
                    INTRA_TX_MAP[ver_map[mode] as usize][idx >> 1],
                    INTRA_TX_MAP[hor_map[mode] as usize][idx & 1],
                ]
            } else {
                [INTER_TX_MAP[idx >> 1], INTER_TX_MAP[idx & 1]]
            };
            self.tx.transform_type[1] = [TransformType::Dct2; 2];
        }
    }

    /// Coefficients of one component, stride equal to the component width.
    pub fn coeff(&self, comp: YuvComponent) -> &[Coeff] {
        &self.coeff[comp.index()]
    }

    pub fn coeff_mut(&mut self, comp: YuvComponent) -> &mut [Coeff] {
        &mut self.coeff[comp.index()]
    }

    pub fn pred_mode(&self) -> PredictionMode {
        self.pred_mode
    }

    pub fn set_pred_mode(&mut self, mode: PredictionMode) {
        self.pred_mode = mode;
    }

    pub fn is_intra(&self) -> bool {
        self.pred_mode == PredictionMode::Intra
    }

    pub fn is_inter(&self) -> bool {
        self.pred_mode == PredictionMode::Inter
    }

    pub fn intra_mode_luma(&self) -> IntraMode {
        self.intra.mode_luma
    }

    pub fn set_intra_mode_luma(&mut self, mode: IntraMode) {
        self.intra.mode_luma = mode;
    }

    pub fn intra_mode_chroma(&self) -> IntraChromaMode {
        self.intra.mode_chroma
    }

    pub fn set_intra_mode_chroma(&mut self, mode: IntraChromaMode) {
        self.intra.mode_chroma = mode;
    }

    /// Directional mode used for `comp`; `None` for the linear-model
    /// chroma predictor.
    pub fn intra_mode(&self, comp: YuvComponent) -> Option<IntraMode> {
        if comp.is_luma() {
            return Some(self.intra.mode_luma);
        }
        match self.intra.mode_chroma {
            IntraChromaMode::Dm => Some(self.intra.mode_luma),
            IntraChromaMode::Mode(m) => Some(m),
            IntraChromaMode::Lm => None,
        }
    }

    pub fn inter_dir(&self) -> InterDir {
        self.inter.inter_dir
    }

    pub fn set_inter_dir(&mut self, dir: InterDir) {
        self.inter.inter_dir = dir;
    }

    pub fn skip_flag(&self) -> bool {
        self.inter.skip_flag
    }

    pub fn set_skip_flag(&mut self, skip: bool) {
        self.inter.skip_flag = skip;
    }

    pub fn merge_flag(&self) -> bool {
        self.inter.merge_flag
    }

    pub fn set_merge_flag(&mut self, merge: bool) {
        self.inter.merge_flag = merge;
    }

    pub fn merge_idx(&self) -> i32 {
        self.inter.merge_idx
    }

    pub fn set_merge_idx(&mut self, idx: i32) {
        self.inter.merge_idx = idx;
    }

    pub fn has_mv(&self, list: RefPicList) -> bool {
        matches!(
            (self.inter.inter_dir, list),
            (InterDir::Bi, _) | (InterDir::L0, RefPicList::L0) | (InterDir::L1, RefPicList::L1)
        )
    }

    /// True when the L1 motion vector delta of a bi-predicted block is not
    /// coded.
    pub fn force_mvd_zero(&self, list: RefPicList, force_bipred_l1_mvd_zero: bool) -> bool {
        force_bipred_l1_mvd_zero && self.inter.inter_dir == InterDir::Bi && list == RefPicList::L1
    }

    pub fn has_zero_mvd(&self) -> bool {
        match self.inter.inter_dir {
            InterDir::Bi => self.inter.mvd[0][0].is_zero() && self.inter.mvd[1][0].is_zero(),
            InterDir::L0 => self.inter.mvd[0][0].is_zero(),
            InterDir::L1 => self.inter.mvd[1][0].is_zero(),
        }
    }

    pub fn ref_idx(&self, list: RefPicList) -> i32 {
        self.inter.ref_idx[list.index()]
    }

    pub fn set_ref_idx(&mut self, ref_idx: i32, list: RefPicList) {
        self.inter.ref_idx[list.index()] = ref_idx;
    }

    pub fn mv(&self, list: RefPicList, corner: MvCorner) -> MotionVector {
        self.inter.mv[list.index()][corner as usize]
    }

    /// Translational motion: every corner carries the same vector.
    pub fn set_mv(&mut self, mv: MotionVector, list: RefPicList) {
        self.inter.mv[list.index()] = [mv; 4];
    }

    /// Affine motion given by three corners; the fourth is extrapolated.
    pub fn set_mv_affine(&mut self, mv: MotionVector3, list: RefPicList) {
        let l = list.index();
        self.inter.mv[l][0] = mv[0];
        self.inter.mv[l][1] = mv[1];
        self.inter.mv[l][2] = mv[2];
        self.inter.mv[l][3] = MotionVector::new(mv[1].x + mv[2].x - mv[0].x, mv[1].y + mv[2].y - mv[0].y);
    }

    pub fn mv_affine(&self, list: RefPicList) -> MotionVector3 {
        let l = list.index();
        [self.inter.mv[l][0], self.inter.mv[l][1], self.inter.mv[l][2]]
    }

    pub fn mv_delta(&self, list: RefPicList) -> MvDelta {
        self.inter.mvd[list.index()][0]
    }

    pub fn set_mv_delta(&mut self, mvd: MvDelta, list: RefPicList) {
        self.inter.mvd[list.index()][0] = mvd;
    }

    pub fn mvd_affine(&self, idx: usize, list: RefPicList) -> MvDelta {
        self.inter.mvd[list.index()][idx]
    }

    pub fn set_mvd_affine(&mut self, idx: usize, mvd: MvDelta, list: RefPicList) {
        self.inter.mvd[list.index()][idx] = mvd;
    }

    pub fn mvp_idx(&self, list: RefPicList) -> i32 {
        self.inter.mvp_idx[list.index()]
    }

    pub fn set_mvp_idx(&mut self, idx: i32, list: RefPicList) {
        self.inter.mvp_idx[list.index()] = idx;
    }

    pub fn fullpel_mv(&self) -> bool {
        self.inter.fullpel_mv
    }

    pub fn set_fullpel_mv(&mut self, fullpel: bool) {
        self.inter.fullpel_mv = fullpel;
    }

    pub fn can_use_affine(&self) -> bool {
        self.width > 8 && self.height > 8
    }

    pub fn use_affine(&self) -> bool {
        self.inter.use_affine
    }

    pub fn set_use_affine(&mut self, use_affine: bool) {
        self.inter.use_affine = use_affine;
    }

    pub fn use_lic(&self) -> bool {
        self.inter.use_lic
    }

    pub fn set_use_lic(&mut self, use_lic: bool) {
        self.inter.use_lic = use_lic;
    }

    pub fn transform_state(&self) -> TransformState {
        self.tx
    }

    pub fn load_transform_state(&mut self, state: &TransformState) {
        self.tx = *state;
    }

    pub fn inter_state(&self) -> InterState {
        self.inter
    }

    pub fn load_inter_state(&mut self, state: &InterState) {
        self.inter = *state;
    }

    pub fn load_inter_state_for_list(&mut self, state: &InterState, list: RefPicList) {
        let l = list.index();
        self.inter.mv[l] = state.mv[l];
        self.inter.ref_idx[l] = state.ref_idx[l];
        self.inter.mvd[l] = state.mvd[l];
        self.inter.mvp_idx[l] = state.mvp_idx[l];
    }

    pub fn intra_state(&self) -> IntraState {
        self.intra
    }

    pub fn save_reconstruction_comp(&self, state: &mut ReconstructionState, rec: &YuvPicture, comp: YuvComponent) {
        let (w, h) = (self.width(comp), self.height(comp));
        let c = comp.index();
        state.reco[c].resize((w * h) as usize, 0);
        rec.read_block(comp, self.pos_x(comp), self.pos_y(comp), w, h, &mut state.reco[c]);
        state.coeff[c].clear();
        state.coeff[c].extend_from_slice(&self.coeff[c]);
    }

    pub fn save_reconstruction(&self, rec: &YuvPicture) -> ReconstructionState {
        let mut state = ReconstructionState::default();
        for &comp in self.components {
            self.save_reconstruction_comp(&mut state, rec, comp);
        }
        state
    }

    pub fn load_reconstruction_comp(&mut self, state: &ReconstructionState, rec: &mut YuvPicture, comp: YuvComponent) {
        let (w, h) = (self.width(comp), self.height(comp));
        let c = comp.index();
        rec.write_block(comp, self.pos_x(comp), self.pos_y(comp), w, h, &state.reco[c]);
        self.coeff[c].copy_from_slice(&state.coeff[c]);
    }

    pub fn load_reconstruction(&mut self, state: &ReconstructionState, rec: &mut YuvPicture) {
        for &comp in self.components {
            self.load_reconstruction_comp(state, rec, comp);
        }
    }

    pub fn save_residual_comp(&self, state: &mut ResidualState, rec: &YuvPicture, comp: YuvComponent) {
        self.save_reconstruction_comp(&mut state.reco, rec, comp);
        let c = comp.index();
        state.tx.cbf[c] = self.tx.cbf[c];
        state.tx.transform_skip[c] = self.tx.transform_skip[c];
        state.tx.transform_type[comp.plane()] = self.tx.transform_type[comp.plane()];
        if comp.is_luma() {
            state.tx.transform_select_idx = self.tx.transform_select_idx;
        }
    }

    pub fn save_residual(&self, rec: &YuvPicture) -> ResidualState {
        ResidualState {
            reco: self.save_reconstruction(rec),
            tx: self.tx,
        }
    }

    pub fn load_residual_comp(&mut self, state: &ResidualState, rec: &mut YuvPicture, comp: YuvComponent) {
        self.load_reconstruction_comp(&state.reco, rec, comp);
        let c = comp.index();
        self.tx.cbf[c] = state.tx.cbf[c];
        self.tx.transform_skip[c] = state.tx.transform_skip[c];
        self.tx.transform_type[comp.plane()] = state.tx.transform_type[comp.plane()];
        if comp.is_luma() {
            self.tx.transform_select_idx = state.tx.transform_select_idx;
        }
    }

    pub fn load_residual(&mut self, state: &ResidualState, rec: &mut YuvPicture) {
        self.load_reconstruction(&state.reco, rec);
        self.tx = state.tx;
    }
}
