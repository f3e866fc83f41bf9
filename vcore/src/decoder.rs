use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::bitreader::BitReader;
use crate::common::{PicNum, PicturePredictionType};
use crate::cu_types::RefPicList;
use crate::error::{CodecError, Result};
use crate::picture_decoder::PictureDecoder;
use crate::reference_picture_lists::{RefEntry, ReferencePictureLists};
use crate::sequence::{MAX_REF_PICS, MAX_SUB_GOP_LENGTH, read_packet_headers};
use crate::yuv_pic::YuvPicture;

/// Decoded pictures kept for reference: a whole hierarchical group plus the
/// references of its first picture.
const DPB_CAPACITY: usize = MAX_REF_PICS + MAX_SUB_GOP_LENGTH as usize;

#[derive(Debug)]
pub struct DecodedPicture {
    /// Cropped to the display size.
    pub picture: YuvPicture,
    pub poc: PicNum,
    pub pic_type: PicturePredictionType,
    pub tid: u32,
    /// The reconstruction matches the checksum of the packet.
    pub conforming: bool,
}

#[derive(Default)]
pub struct Decoder {
    pic_decoder: Option<PictureDecoder>,
    dpb: VecDeque<RefEntry>,
    num_decoded: u64,
    num_corrupted: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one packet. Pictures come back in coding order, which differs
    /// from display order once groups are coded hierarchically. Pictures
    /// that parse but fail the checksum are returned with `conforming`
    /// cleared and counted as corrupted.
    pub fn decode(&mut self, data: &[u8]) -> Result<DecodedPicture> {
        let mut br = BitReader::new(data);
        let (seq, header) = read_packet_headers(&mut br)?;

        if self.pic_decoder.as_ref().is_none_or(|d| *d.sequence() != seq) {
            debug!(?seq, "new sequence parameters");
            self.pic_decoder = Some(PictureDecoder::new(seq));
            self.dpb.clear();
        }
        let mut lists = ReferencePictureLists::default();
        lists.reset(header.poc);
        for list in RefPicList::ALL {
            for (idx, &poc) in header.ref_pocs[list.index()].iter().enumerate() {
                let entry = self
                    .dpb
                    .iter()
                    .find(|e| e.poc == poc)
                    .ok_or(CodecError::MissingReference(poc))?;
                if entry.tid > header.tid {
                    return Err(CodecError::Malformed(format!(
                        "poc {} on layer {} references poc {poc} on layer {}",
                        header.poc, header.tid, entry.tid
                    )));
                }
                lists.set_ref_pic(list, idx, entry.clone());
            }
        }

        let Some(pic_decoder) = self.pic_decoder.as_mut() else {
            return Err(CodecError::Malformed("no sequence parameters".into()));
        };
        let out = pic_decoder.decode(&header, lists, br)?;
        self.num_decoded += 1;
        if !out.conforming {
            self.num_corrupted += 1;
            warn!(poc = header.poc, corrupted = self.num_corrupted, "non-conforming picture");
        }

        let seq = pic_decoder.sequence();
        let picture = out.rec.cropped(seq.width, seq.height);
        self.dpb.retain(|e| e.poc != header.poc);
        self.dpb.push_front(RefEntry {
            poc: header.poc,
            pic_type: header.pic_type,
            tid: header.tid,
            rec: out.rec,
            orig: None,
            motion: out.motion,
        });
        self.dpb.truncate(DPB_CAPACITY);

        Ok(DecodedPicture {
            picture,
            poc: header.poc,
            pic_type: header.pic_type,
            tid: header.tid,
            conforming: out.conforming,
        })
    }

    pub fn num_decoded(&self) -> u64 {
        self.num_decoded
    }

    /// Pictures whose reconstruction did not match their checksum.
    pub fn num_corrupted(&self) -> u64 {
        self.num_corrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChromaFormat, YuvComponent};
    use crate::encoder::{Encoder, EncoderConfig};
    use crate::encoder_settings::SpeedMode;

    fn frame(shift: i32) -> YuvPicture {
        let mut pic = YuvPicture::new(ChromaFormat::Yuv420, 24, 16, 8, false);
        for &comp in ChromaFormat::Yuv420.components() {
            for y in 0..pic.height(comp) {
                for x in 0..pic.width(comp) {
                    pic.set_sample(comp, x, y, (40 + (x + shift) * 6 + y * 2) as u16);
                }
            }
        }
        pic
    }

    fn encode_groups(n: i32, sub_gop_length: u32) -> Vec<Vec<u8>> {
        let config = EncoderConfig {
            speed_mode: SpeedMode::Fast,
            sub_gop_length,
            ..EncoderConfig::default()
        };
        let mut enc = Encoder::new(24, 16, config).unwrap();
        let mut packets = Vec::new();
        for i in 0..n {
            enc.send_frame(&frame(i)).unwrap();
            while let Some(packet) = enc.receive_packet() {
                packets.push(packet.data);
            }
        }
        enc.flush();
        while let Some(packet) = enc.receive_packet() {
            packets.push(packet.data);
        }
        packets
    }

    fn encode(n: i32) -> Vec<Vec<u8>> {
        encode_groups(n, 1)
    }

    #[test]
    fn decodes_encoder_output() {
        let mut dec = Decoder::new();
        for (i, packet) in encode(3).iter().enumerate() {
            let out = dec.decode(packet).unwrap();
            assert!(out.conforming);
            assert_eq!(out.poc, i as u32);
            assert_eq!(out.picture.width(YuvComponent::Y), 24);
        }
        assert_eq!(dec.num_decoded(), 3);
        assert_eq!(dec.num_corrupted(), 0);
    }

    #[test]
    fn inter_picture_needs_its_reference() {
        let packets = encode(2);
        let mut dec = Decoder::new();
        assert_eq!(dec.decode(&packets[1]).unwrap_err(), CodecError::MissingReference(0));
    }

    #[test]
    fn corrupted_checksum_is_counted() {
        let mut packets = encode(1);
        let last = packets[0].len() - 1;
        packets[0][last] ^= 0x40;
        let mut dec = Decoder::new();
        let out = dec.decode(&packets[0]).unwrap();
        assert!(!out.conforming);
        assert_eq!(dec.num_corrupted(), 1);
    }

    #[test]
    fn garbage_is_rejected() {
        let mut dec = Decoder::new();
        assert!(dec.decode(&[0u8; 3]).is_err());
        assert!(dec.decode(b"VCOR\x07").is_err());
    }

    #[test]
    fn decodes_hierarchical_groups_in_coding_order() {
        let mut dec = Decoder::new();
        let decoded: Vec<_> = encode_groups(5, 4)
            .iter()
            .map(|p| {
                let out = dec.decode(p).unwrap();
                assert!(out.conforming);
                (out.poc, out.tid)
            })
            .collect();
        assert_eq!(decoded, vec![(0, 0), (4, 0), (2, 1), (1, 2), (3, 2)]);
    }

    #[test]
    fn reference_on_a_higher_layer_is_rejected() {
        let packets = encode_groups(3, 2);
        let mut dec = Decoder::new();
        dec.decode(&packets[0]).unwrap();
        dec.decode(&packets[1]).unwrap();
        // pretend poc 2 sits above the picture that references it
        dec.dpb[0].tid = 3;
        assert!(matches!(dec.decode(&packets[2]), Err(CodecError::Malformed(_))));
    }
}
