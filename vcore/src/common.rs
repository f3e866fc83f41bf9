pub type Sample = u16;
pub type Coeff = i16;
pub type Residual = i16;
pub type Distortion = u64;
pub type Cost = u64;
pub type Bits = u32;
pub type PicNum = u32;

pub const CTU_SIZE: i32 = 64;
pub const MAX_BLOCK_SIZE: i32 = 64;
pub const MAX_BLOCK_SAMPLES: usize = (MAX_BLOCK_SIZE * MAX_BLOCK_SIZE) as usize;
pub const MIN_BLOCK_SIZE: i32 = 4;
pub const MIN_CU_SIZE: i32 = 8;
pub const MIN_BINARY_SPLIT_SIZE: i32 = 4;
pub const MAX_CU_DEPTH: i32 = 3;
pub const QUAD_SPLIT: usize = 4;
pub const TRANSFORM_SKIP_MAX_AREA: i32 = 16;
pub const MAX_TRANSFORM_SELECT_IDX: i32 = 4;
pub const MAX_TRANSFORM_SELECT_SIZE: i32 = 32;
pub const NUM_INTER_MV_PREDICTORS: usize = 2;
pub const NUM_INTER_MERGE_CANDIDATES: usize = 5;
pub const NUM_INTRA_MPM: usize = 3;
pub const NUM_INTRA_MPM_EXT: usize = 6;
pub const MAX_YUV_COMPONENTS: usize = 3;
pub const MIN_QP: i32 = 0;
pub const MAX_QP: i32 = 63;
pub const MIN_BIT_DEPTH: u8 = 8;
pub const MAX_BIT_DEPTH: u8 = 12;

/// Luma border added around every picture so motion vectors may point
/// outside of the visible area.
pub const PICTURE_PADDING: i32 = MAX_BLOCK_SIZE + 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YuvComponent {
    Y = 0,
    U = 1,
    V = 2,
}

impl YuvComponent {
    pub const ALL: [YuvComponent; 3] = [YuvComponent::Y, YuvComponent::U, YuvComponent::V];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_luma(self) -> bool {
        self == YuvComponent::Y
    }

    /// Index of the transform/prediction plane: 0 for luma, 1 for both chroma
    /// components.
    #[inline]
    pub fn plane(self) -> usize {
        usize::from(!self.is_luma())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaFormat {
    Monochrome,
    #[default]
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    pub fn shift_x(self) -> i32 {
        match self {
            ChromaFormat::Monochrome | ChromaFormat::Yuv420 | ChromaFormat::Yuv422 => 1,
            ChromaFormat::Yuv444 => 0,
        }
    }

    pub fn shift_y(self) -> i32 {
        match self {
            ChromaFormat::Monochrome | ChromaFormat::Yuv420 => 1,
            ChromaFormat::Yuv422 | ChromaFormat::Yuv444 => 0,
        }
    }

    pub fn num_components(self) -> usize {
        if self == ChromaFormat::Monochrome { 1 } else { 3 }
    }

    pub fn components(self) -> &'static [YuvComponent] {
        &YuvComponent::ALL[..self.num_components()]
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ChromaFormat::Monochrome => 0,
            ChromaFormat::Yuv420 => 1,
            ChromaFormat::Yuv422 => 2,
            ChromaFormat::Yuv444 => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChromaFormat::Monochrome),
            1 => Some(ChromaFormat::Yuv420),
            2 => Some(ChromaFormat::Yuv422),
            3 => Some(ChromaFormat::Yuv444),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicturePredictionType {
    Intra,
    Uni,
    Bi,
}

impl PicturePredictionType {
    pub fn to_u8(self) -> u8 {
        match self {
            PicturePredictionType::Intra => 0,
            PicturePredictionType::Uni => 1,
            PicturePredictionType::Bi => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PicturePredictionType::Intra),
            1 => Some(PicturePredictionType::Uni),
            2 => Some(PicturePredictionType::Bi),
            _ => None,
        }
    }
}

#[inline]
pub fn size_to_log2(size: i32) -> i32 {
    debug_assert!(size > 0 && (size & (size - 1)) == 0, "size {size} is not a power of two");
    size.trailing_zeros() as i32
}

#[inline]
pub fn clip_bd(value: i32, bitdepth: u8) -> Sample {
    value.clamp(0, (1 << bitdepth) - 1) as Sample
}

#[inline]
pub fn clip16(value: i64) -> i16 {
    value.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}
