//! Stream packet headers: the sequence parameters repeated in every packet
//! and the per-picture header.

use crate::bitreader::BitReader;
use crate::bitwriter::{BitSink, BitWriter};
use crate::common::{ChromaFormat, MAX_BIT_DEPTH, MAX_QP, MIN_BIT_DEPTH, MIN_CU_SIZE, PicNum, PicturePredictionType};
use crate::cu_types::RefPicList;
use crate::error::{CodecError, Result};
use crate::picture_data::PictureParams;
use crate::qp::Qp;
use crate::restrictions::Restrictions;

pub const STREAM_MAGIC: [u8; 4] = *b"VCOR";
pub const STREAM_VERSION: u8 = 1;

pub const MAX_WIDTH: u32 = 8192;
pub const MAX_HEIGHT: u32 = 4320;
/// Upper bound of the number of pictures one list may reference.
pub const MAX_REF_PICS: usize = 8;
/// Longest hierarchical group; its deepest layer still fits the 3-bit
/// temporal id.
pub const MAX_SUB_GOP_LENGTH: u32 = 16;

pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if !(1..=MAX_WIDTH).contains(&width) || !(1..=MAX_HEIGHT).contains(&height) {
        return Err(CodecError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Coded pictures are a whole number of minimum CUs.
fn coded_size(size: i32) -> i32 {
    (size + MIN_CU_SIZE - 1) / MIN_CU_SIZE * MIN_CU_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceParams {
    /// Display size in luma samples.
    pub width: i32,
    pub height: i32,
    pub bitdepth: u8,
    pub chroma_format: ChromaFormat,
    pub restrictions: Restrictions,
    pub max_binary_split_depth: i32,
    pub beta_offset: i32,
    pub tc_offset: i32,
}

impl SequenceParams {
    pub fn coded_width(&self) -> i32 {
        coded_size(self.width)
    }

    pub fn coded_height(&self) -> i32 {
        coded_size(self.height)
    }

    pub fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(self.width as u64, 16);
        bw.write_bits(self.height as u64, 16);
        bw.write_bits(self.bitdepth as u64, 4);
        bw.write_bits(self.chroma_format.to_u8() as u64, 2);
        bw.write_bits(self.max_binary_split_depth as u64, 2);
        bw.write_signed_exp_golomb(self.beta_offset, 0);
        bw.write_signed_exp_golomb(self.tc_offset, 0);
        let flags = self.restrictions.flags();
        bw.write_bits(flags.len() as u64, 8);
        for flag in flags {
            bw.write_bit(flag);
        }
    }

    pub fn read(br: &mut BitReader) -> Result<Self> {
        let width = br.read_bits(16)? as u32;
        let height = br.read_bits(16)? as u32;
        validate_dimensions(width, height)?;
        let bitdepth = br.read_bits(4)? as u8;
        if !(MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&bitdepth) {
            return Err(CodecError::UnsupportedBitDepth(bitdepth));
        }
        let chroma_format = ChromaFormat::from_u8(br.read_bits(2)? as u8)
            .ok_or_else(|| CodecError::Malformed("chroma format".into()))?;
        let max_binary_split_depth = br.read_bits(2)? as i32;
        let beta_offset = br.read_signed_exp_golomb(0)?;
        let tc_offset = br.read_signed_exp_golomb(0)?;
        let num_flags = br.read_bits(8)? as usize;
        if num_flags > Restrictions::FLAG_NAMES.len() {
            return Err(CodecError::Malformed(format!("{num_flags} restriction flags")));
        }
        let mut flags = Vec::with_capacity(num_flags);
        for _ in 0..num_flags {
            flags.push(br.read_bit()?);
        }
        Ok(Self {
            width: width as i32,
            height: height as i32,
            bitdepth,
            chroma_format,
            restrictions: Restrictions::from_flags(&flags),
            max_binary_split_depth,
            beta_offset,
            tc_offset,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureHeader {
    pub poc: PicNum,
    pub pic_type: PicturePredictionType,
    pub tid: u32,
    pub qp: i32,
    /// Picture order counts of the references, per list.
    pub ref_pocs: [Vec<PicNum>; 2],
}

impl PictureHeader {
    pub fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(self.poc as u64, 32);
        bw.write_bits(self.pic_type.to_u8() as u64, 2);
        bw.write_bits(self.tid as u64, 3);
        bw.write_bits(self.qp as u64, 6);
        for list in RefPicList::ALL {
            let pocs = &self.ref_pocs[list.index()];
            bw.write_bits(pocs.len() as u64, 4);
            for &poc in pocs {
                bw.write_bits(poc as u64, 32);
            }
        }
    }

    pub fn read(br: &mut BitReader) -> Result<Self> {
        let poc = br.read_bits(32)? as PicNum;
        let pic_type = PicturePredictionType::from_u8(br.read_bits(2)? as u8)
            .ok_or_else(|| CodecError::Malformed("picture type".into()))?;
        let tid = br.read_bits(3)? as u32;
        let qp = br.read_bits(6)? as i32;
        if qp > MAX_QP {
            return Err(CodecError::InvalidQp(qp));
        }
        let mut ref_pocs = [Vec::new(), Vec::new()];
        for list in RefPicList::ALL {
            let n = br.read_bits(4)? as usize;
            if n > MAX_REF_PICS {
                return Err(CodecError::Malformed(format!("{n} references in {list:?}")));
            }
            for _ in 0..n {
                ref_pocs[list.index()].push(br.read_bits(32)? as PicNum);
            }
        }
        let header = Self {
            poc,
            pic_type,
            tid,
            qp,
            ref_pocs,
        };
        let has_l0 = !header.ref_pocs[0].is_empty();
        let has_l1 = !header.ref_pocs[1].is_empty();
        match pic_type {
            PicturePredictionType::Intra if has_l0 || has_l1 => {
                Err(CodecError::Malformed("intra picture with references".into()))
            }
            PicturePredictionType::Uni | PicturePredictionType::Bi if !has_l0 => {
                Err(CodecError::Malformed("inter picture without references".into()))
            }
            _ => Ok(header),
        }
    }

    /// Parameters of the picture both the encoder and the decoder build
    /// their coding tree on.
    pub fn picture_params(&self, seq: &SequenceParams) -> PictureParams {
        let lambda = Qp::calculate_lambda(self.qp, self.pic_type, self.tid);
        PictureParams {
            width: seq.coded_width(),
            height: seq.coded_height(),
            chroma_format: seq.chroma_format,
            bitdepth: seq.bitdepth,
            poc: self.poc,
            pic_type: self.pic_type,
            tid: self.tid,
            qp: Qp::new(self.qp, seq.chroma_format, seq.bitdepth, lambda, 0),
            restrictions: seq.restrictions,
            max_binary_split_depth: seq.max_binary_split_depth,
            max_binary_split_size: seq.restrictions.max_transform_size(),
            beta_offset: seq.beta_offset,
            tc_offset: seq.tc_offset,
        }
    }
}

/// Writes the packet prefix: magic, version, sequence and picture header.
pub fn write_packet_headers(bw: &mut BitWriter, seq: &SequenceParams, header: &PictureHeader) {
    bw.write_bytes(&STREAM_MAGIC);
    bw.write_bits(STREAM_VERSION as u64, 8);
    seq.write(bw);
    header.write(bw);
    bw.byte_align();
}

pub fn read_packet_headers(br: &mut BitReader) -> Result<(SequenceParams, PictureHeader)> {
    let magic = br
        .read_bytes(STREAM_MAGIC.len())
        .map_err(|_| CodecError::Truncated("stream magic"))?;
    if magic != STREAM_MAGIC {
        return Err(CodecError::Malformed("bad stream magic".into()));
    }
    let version = br.read_bits(8)? as u8;
    if version != STREAM_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let seq = SequenceParams::read(br)?;
    let header = PictureHeader::read(br)?;
    br.byte_align();
    Ok((seq, header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restrictions::RestrictedMode;

    fn seq() -> SequenceParams {
        SequenceParams {
            width: 100,
            height: 36,
            bitdepth: 10,
            chroma_format: ChromaFormat::Yuv422,
            restrictions: Restrictions::new(RestrictedMode::ModeB),
            max_binary_split_depth: 2,
            beta_offset: -3,
            tc_offset: 2,
        }
    }

    #[test]
    fn headers_survive_the_stream() {
        let header = PictureHeader {
            poc: 7,
            pic_type: PicturePredictionType::Bi,
            tid: 1,
            qp: 37,
            ref_pocs: [vec![6, 4], vec![6]],
        };
        let mut bw = BitWriter::new();
        write_packet_headers(&mut bw, &seq(), &header);
        let data = bw.finalize();
        assert_eq!(&data[..4], b"VCOR");
        let mut br = BitReader::new(&data);
        let (s, h) = read_packet_headers(&mut br).unwrap();
        assert_eq!(s, seq());
        assert_eq!(h, header);
    }

    #[test]
    fn coded_size_rounds_to_min_cu() {
        let s = seq();
        assert_eq!((s.coded_width(), s.coded_height()), (104, 40));
    }

    #[test]
    fn rejects_foreign_data() {
        let mut br = BitReader::new(b"RIFF\x01\x02");
        assert_eq!(
            read_packet_headers(&mut br).unwrap_err(),
            CodecError::Malformed("bad stream magic".into())
        );
        let mut br = BitReader::new(b"VC");
        assert!(read_packet_headers(&mut br).is_err());
    }

    #[test]
    fn dimension_limits() {
        assert!(validate_dimensions(1, 1).is_ok());
        assert!(validate_dimensions(8192, 4320).is_ok());
        assert!(validate_dimensions(0, 16).is_err());
        assert!(validate_dimensions(16, 4321).is_err());
    }
}
