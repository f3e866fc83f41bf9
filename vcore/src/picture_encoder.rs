//! Codes one picture: CTUs in raster order, deblocking and checksum.

use std::sync::Arc;

use tracing::debug;

use crate::bitwriter::BitWriter;
use crate::checksum::{Checksum, ChecksumMethod};
use crate::common::{Cost, Distortion, YuvComponent};
use crate::cu_encoder::CuEncoder;
use crate::deblocking::deblock_picture;
use crate::encoder_settings::EncoderSettings;
use crate::packet::Packet;
use crate::picture_data::{MotionField, PictureData};
use crate::reference_picture_lists::ReferencePictureLists;
use crate::sequence::{PictureHeader, SequenceParams, write_packet_headers};
use crate::syntax::SyntaxWriter;
use crate::yuv_pic::YuvPicture;

pub(crate) fn checksum_method(seq: &SequenceParams) -> ChecksumMethod {
    if seq.restrictions.disable_high_level_default_checksum_method {
        ChecksumMethod::PlaneSum
    } else {
        ChecksumMethod::Sha256
    }
}

#[derive(Debug)]
pub struct EncodedPicture {
    pub packet: Packet,
    /// Deblocked reconstruction with padded borders.
    pub rec: Arc<YuvPicture>,
    pub motion: Arc<MotionField>,
    /// Summed rate-distortion cost of the CTU decisions, before deblocking.
    pub rdo_cost: Cost,
    pub rdo_dist: Distortion,
}

pub struct PictureEncoder {
    seq: SequenceParams,
    cu_encoder: CuEncoder,
}

impl PictureEncoder {
    pub fn new(seq: SequenceParams, settings: &EncoderSettings) -> Self {
        let cu_encoder = CuEncoder::new(seq.bitdepth, &seq.restrictions, settings);
        Self { seq, cu_encoder }
    }

    pub fn sequence(&self) -> &SequenceParams {
        &self.seq
    }

    /// `orig` must already have the coded size of the sequence and `lists`
    /// must hold the pictures named by `header.ref_pocs`.
    pub fn encode(&mut self, header: &PictureHeader, orig: &YuvPicture, lists: ReferencePictureLists) -> EncodedPicture {
        debug_assert_eq!(orig.width(YuvComponent::Y), self.seq.coded_width());
        let mut pic = PictureData::new(header.picture_params(&self.seq), lists);
        let mut rec = YuvPicture::new(
            self.seq.chroma_format,
            self.seq.coded_width(),
            self.seq.coded_height(),
            self.seq.bitdepth,
            true,
        );

        let mut bw = BitWriter::new();
        write_packet_headers(&mut bw, &self.seq, header);
        let mut writer = SyntaxWriter::new(bw, &self.seq.restrictions);
        let (mut rdo_cost, mut rdo_dist) = (0, 0);
        for rsaddr in 0..pic.num_ctus() {
            let result = self.cu_encoder.encode_ctu(&mut pic, orig, &mut rec, rsaddr, &mut writer);
            rdo_cost += result.cost;
            rdo_dist += result.dist;
        }
        let mut bw = writer.into_sink();
        bw.byte_align();

        deblock_picture(&pic, &mut rec);
        Checksum::compute(checksum_method(&self.seq), &rec).write(&mut bw);
        rec.pad_borders();
        let data = bw.finalize();
        debug!(
            poc = header.poc,
            pic_type = ?header.pic_type,
            qp = header.qp,
            bytes = data.len(),
            rdo_cost,
            "picture encoded"
        );

        EncodedPicture {
            packet: Packet {
                data,
                pic_type: header.pic_type,
                poc: header.poc,
            },
            motion: Arc::new(pic.build_motion_field()),
            rec: Arc::new(rec),
            rdo_cost,
            rdo_dist,
        }
    }
}
