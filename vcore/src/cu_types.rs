use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitType {
    #[default]
    None,
    Quad,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitRestriction {
    #[default]
    None,
    NoHorizontal,
    NoVertical,
}

/// Intra pictures may code chroma in a coding tree of its own; every other
/// picture has only the primary tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CuTree {
    #[default]
    Primary,
    Secondary,
}

impl CuTree {
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionMode {
    #[default]
    Intra,
    Inter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformType {
    #[default]
    Default,
    Dct2,
    Dct5,
    Dct8,
    Dst1,
    Dst7,
}

/// Luma intra prediction mode: 0 planar, 1 DC, 2.. angular.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntraMode(pub u8);

impl IntraMode {
    pub const PLANAR: IntraMode = IntraMode(0);
    pub const DC: IntraMode = IntraMode(1);
    pub const FIRST_ANGULAR: IntraMode = IntraMode(2);

    pub fn is_angular(self) -> bool {
        self.0 >= 2
    }
}

/// Mode set in use for the current picture, 35 or 67 modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraModeSet {
    Modes35,
    Modes67,
}

impl IntraModeSet {
    pub fn num_modes(self) -> u8 {
        match self {
            IntraModeSet::Modes35 => 35,
            IntraModeSet::Modes67 => 67,
        }
    }

    pub fn horizontal(self) -> IntraMode {
        match self {
            IntraModeSet::Modes35 => IntraMode(10),
            IntraModeSet::Modes67 => IntraMode(18),
        }
    }

    pub fn diagonal(self) -> IntraMode {
        match self {
            IntraModeSet::Modes35 => IntraMode(18),
            IntraModeSet::Modes67 => IntraMode(34),
        }
    }

    pub fn vertical(self) -> IntraMode {
        match self {
            IntraModeSet::Modes35 => IntraMode(26),
            IntraModeSet::Modes67 => IntraMode(50),
        }
    }

    pub fn vertical_plus_8(self) -> IntraMode {
        match self {
            IntraModeSet::Modes35 => IntraMode(34),
            IntraModeSet::Modes67 => IntraMode(66),
        }
    }

    pub fn num_angular(self) -> i32 {
        self.num_modes() as i32 - 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntraChromaMode {
    /// Cross-component linear model from reconstructed luma.
    Lm,
    /// Derived from the co-located luma mode.
    #[default]
    Dm,
    Mode(IntraMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum InterDir {
    #[default]
    L0,
    L1,
    Bi,
}

impl InterDir {
    pub fn to_u8(self) -> u8 {
        match self {
            InterDir::L0 => 0,
            InterDir::L1 => 1,
            InterDir::Bi => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefPicList {
    L0 = 0,
    L1 = 1,
}

impl RefPicList {
    pub const ALL: [RefPicList; 2] = [RefPicList::L0, RefPicList::L1];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> RefPicList {
        match self {
            RefPicList::L0 => RefPicList::L1,
            RefPicList::L1 => RefPicList::L0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MotionVector {
    pub x: i32,
    pub y: i32,
}

impl MotionVector {
    /// Number of motion vector units per integer sample.
    pub const SCALE: i32 = 4;
    pub const PRECISION_BITS: i32 = 2;

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn is_fullpel(self) -> bool {
        self.x & (Self::SCALE - 1) == 0 && self.y & (Self::SCALE - 1) == 0
    }

    /// Rounds to the nearest integer sample position.
    pub fn round_to_fullpel(self) -> Self {
        let half = Self::SCALE >> 1;
        Self {
            x: ((self.x + half) >> Self::PRECISION_BITS) << Self::PRECISION_BITS,
            y: ((self.y + half) >> Self::PRECISION_BITS) << Self::PRECISION_BITS,
        }
    }
}

impl Add for MotionVector {
    type Output = MotionVector;
    fn add(self, rhs: MotionVector) -> MotionVector {
        MotionVector::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for MotionVector {
    type Output = MotionVector;
    fn sub(self, rhs: MotionVector) -> MotionVector {
        MotionVector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

pub type MvDelta = MotionVector;

/// Three control-point motion vectors: top-left, top-right, bottom-left.
pub type MotionVector3 = [MotionVector; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MvCorner {
    #[default]
    UpLeft = 0,
    UpRight = 1,
    DownLeft = 2,
    DownRight = 3,
}

impl MvCorner {
    pub fn from_index(idx: i32) -> Self {
        match idx {
            0 => MvCorner::UpLeft,
            1 => MvCorner::UpRight,
            2 => MvCorner::DownLeft,
            _ => MvCorner::DownRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborDir {
    AboveLeft,
    Above,
    AboveCorner,
    AboveRight,
    Left,
    LeftCorner,
    LeftBelow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mv_arithmetic() {
        let a = MotionVector::new(5, -3);
        let b = MotionVector::new(1, 1);
        assert_eq!(a + b, MotionVector::new(6, -2));
        assert_eq!(a - b, MotionVector::new(4, -4));
    }

    #[test]
    fn mv_fullpel_rounding() {
        assert_eq!(MotionVector::new(5, -6).round_to_fullpel(), MotionVector::new(4, -4));
        assert_eq!(MotionVector::new(6, 2).round_to_fullpel(), MotionVector::new(8, 4));
        assert!(MotionVector::new(8, -4).is_fullpel());
        assert!(!MotionVector::new(9, 0).is_fullpel());
    }

    #[test]
    fn mode_set_anchors() {
        assert_eq!(IntraModeSet::Modes35.vertical(), IntraMode(26));
        assert_eq!(IntraModeSet::Modes67.horizontal(), IntraMode(18));
        assert_eq!(IntraModeSet::Modes67.num_angular(), 65);
    }

    #[test]
    fn other_list() {
        assert_eq!(RefPicList::L0.other(), RefPicList::L1);
        assert_eq!(RefPicList::L1.other(), RefPicList::L0);
    }
}
