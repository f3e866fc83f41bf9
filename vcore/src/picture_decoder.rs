//! Reconstructs one picture from its CTU payload and checks conformance.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bitreader::BitReader;
use crate::checksum::Checksum;
use crate::cu_decoder::CuDecoder;
use crate::deblocking::deblock_picture;
use crate::error::Result;
use crate::picture_data::{MotionField, PictureData};
use crate::picture_encoder::checksum_method;
use crate::reference_picture_lists::ReferencePictureLists;
use crate::sequence::{PictureHeader, SequenceParams};
use crate::syntax::SyntaxReader;
use crate::yuv_pic::YuvPicture;

#[derive(Debug)]
pub struct ReconstructedPicture {
    /// Deblocked reconstruction at coded size, with padded borders.
    pub rec: Arc<YuvPicture>,
    pub motion: Arc<MotionField>,
    /// The checksum carried by the packet matches the reconstruction.
    pub conforming: bool,
}

pub struct PictureDecoder {
    seq: SequenceParams,
    cu_decoder: CuDecoder,
}

impl PictureDecoder {
    pub fn new(seq: SequenceParams) -> Self {
        let cu_decoder = CuDecoder::new(seq.bitdepth, &seq.restrictions);
        Self { seq, cu_decoder }
    }

    pub fn sequence(&self) -> &SequenceParams {
        &self.seq
    }

    /// Decodes the payload following the packet headers. Syntax errors are
    /// returned; a checksum mismatch only clears `conforming`.
    pub fn decode(
        &mut self,
        header: &PictureHeader,
        lists: ReferencePictureLists,
        reader: BitReader<'_>,
    ) -> Result<ReconstructedPicture> {
        let mut pic = PictureData::new(header.picture_params(&self.seq), lists);
        let mut rec = YuvPicture::new(
            self.seq.chroma_format,
            self.seq.coded_width(),
            self.seq.coded_height(),
            self.seq.bitdepth,
            true,
        );

        let mut reader = SyntaxReader::new(reader, &self.seq.restrictions);
        for rsaddr in 0..pic.num_ctus() {
            self.cu_decoder.decode_ctu(&mut pic, &mut rec, rsaddr, &mut reader)?;
        }
        let mut br = reader.into_bit_reader();
        br.byte_align();
        deblock_picture(&pic, &mut rec);

        let expected = Checksum::read(&mut br)?;
        let actual = Checksum::compute(checksum_method(&self.seq), &rec);
        let conforming = if expected.method != actual.method {
            warn!(poc = header.poc, method = ?expected.method, "unexpected checksum method");
            false
        } else if expected != actual {
            warn!(poc = header.poc, "checksum mismatch");
            false
        } else {
            true
        };
        rec.pad_borders();
        debug!(poc = header.poc, pic_type = ?header.pic_type, qp = header.qp, conforming, "picture decoded");

        Ok(ReconstructedPicture {
            motion: Arc::new(pic.build_motion_field()),
            rec: Arc::new(rec),
            conforming,
        })
    }
}
