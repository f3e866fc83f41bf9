use thiserror::Error;

use crate::common::ChromaFormat;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid dimensions {width}x{height}: width must be 1..=8192, height must be 1..=4320")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("frame dimension mismatch: expected {expected_w}x{expected_h}, got {got_w}x{got_h}")]
    DimensionMismatch {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
    },

    #[error("unsupported bit depth {0}, expected 8..=12")]
    UnsupportedBitDepth(u8),

    #[error("chroma format mismatch: expected {expected:?}, got {got:?}")]
    ChromaFormatMismatch {
        expected: ChromaFormat,
        got: ChromaFormat,
    },

    #[error("qp {0} outside of 0..=63")]
    InvalidQp(i32),

    #[error("sample plane {plane} has {got} samples, expected {expected}")]
    PlaneSize {
        plane: usize,
        expected: usize,
        got: usize,
    },

    #[error("bitstream truncated while reading {0}")]
    Truncated(&'static str),

    #[error("malformed bitstream: {0}")]
    Malformed(String),

    #[error("unsupported stream version {0}")]
    UnsupportedVersion(u8),

    #[error("sub-GOP length {0} must be a power of two up to 16 that divides the intra period")]
    InvalidSubGopLength(u32),

    #[error("missing reference picture with poc {0}")]
    MissingReference(u32),

    #[error("unknown encoder setting '{0}'")]
    UnknownSetting(String),

    #[error("invalid value '{value}' for encoder setting '{key}'")]
    InvalidSettingValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_dimensions() {
        let err = CodecError::InvalidDimensions {
            width: 0,
            height: 16,
        };
        assert!(err.to_string().contains("0x16"));
    }

    #[test]
    fn display_mismatch() {
        let err = CodecError::DimensionMismatch {
            expected_w: 16,
            expected_h: 8,
            got_w: 32,
            got_h: 8,
        };
        assert_eq!(
            err.to_string(),
            "frame dimension mismatch: expected 16x8, got 32x8"
        );
    }
}
