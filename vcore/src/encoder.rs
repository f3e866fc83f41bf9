use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info};

use crate::common::{
    ChromaFormat, MAX_BIT_DEPTH, MAX_QP, MIN_BIT_DEPTH, MIN_QP, PicNum, PicturePredictionType, YuvComponent,
};
use crate::cu_types::RefPicList;
use crate::encoder_settings::{EncoderSettings, SpeedMode};
use crate::error::{CodecError, Result};
use crate::packet::Packet;
use crate::picture_encoder::PictureEncoder;
use crate::reference_picture_lists::{RefEntry, ReferencePictureLists};
use crate::restrictions::{RestrictedMode, Restrictions};
use crate::sample_metric::{MetricType, SampleMetric, psnr};
use crate::sequence::{MAX_REF_PICS, MAX_SUB_GOP_LENGTH, PictureHeader, SequenceParams, validate_dimensions};
use crate::yuv_pic::YuvPicture;

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub qp: i32,
    pub bitdepth: u8,
    pub chroma_format: ChromaFormat,
    /// Distance between intra pictures; 0 codes only the first picture as
    /// intra.
    pub intra_period: u32,
    /// Pictures per hierarchical group. 1 codes pictures in input order;
    /// a larger power of two codes the last picture of each group first and
    /// the pictures in between on higher temporal layers.
    pub sub_gop_length: u32,
    /// Pictures kept as references. `None` takes the speed preset default.
    pub num_ref_pics: Option<usize>,
    /// Inter pictures without future references are coded as B pictures
    /// with both lists pointing to past pictures.
    pub low_delay_bipred: bool,
    pub restricted_mode: RestrictedMode,
    /// Individual restriction flags to raise on top of `restricted_mode`.
    pub disabled_tools: Vec<String>,
    pub beta_offset: i32,
    pub tc_offset: i32,
    pub speed_mode: SpeedMode,
    /// `key=value` overrides applied after the presets.
    pub explicit_settings: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            qp: crate::DEFAULT_QP,
            bitdepth: 8,
            chroma_format: ChromaFormat::Yuv420,
            intra_period: 0,
            sub_gop_length: 1,
            num_ref_pics: None,
            low_delay_bipred: false,
            restricted_mode: RestrictedMode::Unrestricted,
            disabled_tools: Vec::new(),
            beta_offset: 0,
            tc_offset: 0,
            speed_mode: SpeedMode::default(),
            explicit_settings: None,
        }
    }
}

/// Outcome of one coded picture.
#[derive(Debug, Clone, PartialEq)]
pub struct PictureStats {
    pub poc: PicNum,
    pub pic_type: PicturePredictionType,
    pub tid: u32,
    pub bytes: usize,
    /// Per present component, measured on the displayed area.
    pub psnr: Vec<f64>,
}

/// Coding order of a group ending at `last` whose first picture is
/// `first`: the last picture on layer 0, then the midpoints of each
/// remaining interval, one layer deeper per halving.
fn coding_order(first: PicNum, last: PicNum) -> Vec<(PicNum, u32)> {
    fn fill(lo: PicNum, hi: PicNum, tid: u32, out: &mut Vec<(PicNum, u32)>) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        out.push((mid, tid));
        fill(lo, mid, tid + 1, out);
        fill(mid + 1, hi, tid + 1, out);
    }
    let mut order = vec![(last, 0)];
    fill(first, last, 1, &mut order);
    order
}

pub struct Encoder {
    width: u32,
    height: u32,
    qp: i32,
    intra_period: u32,
    sub_gop_length: u32,
    num_ref_pics: usize,
    low_delay_bipred: bool,
    pic_encoder: PictureEncoder,
    dpb: VecDeque<RefEntry>,
    /// Input pictures of the group being collected.
    pending: Vec<(PicNum, YuvPicture)>,
    next_poc: PicNum,
    last_intra_poc: PicNum,
    coded: VecDeque<(Packet, PictureStats)>,
    last_stats: Option<PictureStats>,
}

impl Encoder {
    pub fn new(width: u32, height: u32, config: EncoderConfig) -> Result<Self> {
        validate_dimensions(width, height)?;
        if !(MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&config.bitdepth) {
            return Err(CodecError::UnsupportedBitDepth(config.bitdepth));
        }
        if !(MIN_QP..=MAX_QP).contains(&config.qp) {
            return Err(CodecError::InvalidQp(config.qp));
        }
        let sub_gop_length = config.sub_gop_length;
        if !sub_gop_length.is_power_of_two()
            || sub_gop_length > MAX_SUB_GOP_LENGTH
            || config.intra_period % sub_gop_length != 0
        {
            return Err(CodecError::InvalidSubGopLength(sub_gop_length));
        }

        let mut restrictions = Restrictions::new(config.restricted_mode);
        for tool in &config.disabled_tools {
            if !restrictions.set_by_name(tool, true) {
                return Err(CodecError::UnknownSetting(tool.clone()));
            }
        }
        let mut settings = EncoderSettings::new(config.speed_mode);
        settings.apply_restricted_mode(config.restricted_mode);
        if let Some(explicit) = &config.explicit_settings {
            settings.parse_explicit(explicit)?;
        }
        let num_ref_pics = config
            .num_ref_pics
            .unwrap_or(settings.default_num_ref_pics.max(1) as usize)
            .clamp(1, MAX_REF_PICS);

        let seq = SequenceParams {
            width: width as i32,
            height: height as i32,
            bitdepth: config.bitdepth,
            chroma_format: config.chroma_format,
            restrictions,
            max_binary_split_depth: settings.max_binary_split_depth.clamp(0, 3),
            beta_offset: config.beta_offset,
            tc_offset: config.tc_offset,
        };
        debug!(?seq, ?settings, num_ref_pics, sub_gop_length, "encoder configured");

        Ok(Self {
            width,
            height,
            qp: config.qp,
            intra_period: config.intra_period,
            sub_gop_length,
            num_ref_pics,
            low_delay_bipred: config.low_delay_bipred,
            pic_encoder: PictureEncoder::new(seq, &settings),
            dpb: VecDeque::new(),
            pending: Vec::new(),
            next_poc: 0,
            last_intra_poc: 0,
            coded: VecDeque::new(),
            last_stats: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sequence(&self) -> &SequenceParams {
        self.pic_encoder.sequence()
    }

    fn is_intra(&self, poc: PicNum) -> bool {
        poc == 0 || (self.intra_period > 0 && poc % self.intra_period == 0)
    }

    /// Queues `frame` for coding. Pictures are coded once their group is
    /// complete, so a packet may only become available several frames later.
    pub fn send_frame(&mut self, frame: &YuvPicture) -> Result<()> {
        let seq = self.pic_encoder.sequence();
        let (got_w, got_h) = (frame.width(YuvComponent::Y) as u32, frame.height(YuvComponent::Y) as u32);
        if got_w != self.width || got_h != self.height {
            return Err(CodecError::DimensionMismatch {
                expected_w: self.width,
                expected_h: self.height,
                got_w,
                got_h,
            });
        }
        if frame.chroma_format() != seq.chroma_format {
            return Err(CodecError::ChromaFormatMismatch {
                expected: seq.chroma_format,
                got: frame.chroma_format(),
            });
        }
        if frame.bitdepth() != seq.bitdepth {
            return Err(CodecError::UnsupportedBitDepth(frame.bitdepth()));
        }

        let poc = self.next_poc;
        self.next_poc += 1;
        self.pending.push((poc, frame.clone()));
        // the first picture forms a group on its own
        if poc == 0 || self.pending.len() as u32 == self.sub_gop_length {
            self.encode_pending();
        }
        Ok(())
    }

    fn encode_pending(&mut self) {
        let mut pending = std::mem::take(&mut self.pending);
        let (Some(&(first, _)), Some(&(last, _))) = (pending.first(), pending.last()) else {
            return;
        };
        for (poc, tid) in coding_order(first, last) {
            if let Some(idx) = pending.iter().position(|(p, _)| *p == poc) {
                let (_, frame) = pending.swap_remove(idx);
                self.encode_picture(&frame, poc, tid);
            }
        }
    }

    /// References of picture `poc`: the closest past pictures in L0 and the
    /// closest future pictures in L1, never from a higher temporal layer
    /// and never from before the last intra picture that precedes `poc`.
    fn select_references(&self, poc: PicNum, tid: u32) -> [Vec<&RefEntry>; 2] {
        let usable = |e: &&RefEntry| e.tid <= tid && (e.poc >= self.last_intra_poc || poc < self.last_intra_poc);
        let mut past: Vec<_> = self.dpb.iter().filter(|e| e.poc < poc).filter(usable).collect();
        past.sort_by_key(|e| Reverse(e.poc));
        past.truncate(self.num_ref_pics);
        let mut future: Vec<_> = self.dpb.iter().filter(|e| e.poc > poc).filter(usable).collect();
        future.sort_by_key(|e| e.poc);
        future.truncate(self.num_ref_pics);
        [past, future]
    }

    fn encode_picture(&mut self, frame: &YuvPicture, poc: PicNum, tid: u32) {
        let pic_type = if self.is_intra(poc) {
            if self.sub_gop_length > 1 {
                // pictures of the open group before this one still use the
                // previous key picture
                let prev_key = poc.saturating_sub(self.sub_gop_length);
                self.dpb.retain(|e| e.poc >= prev_key);
            } else {
                self.dpb.clear();
            }
            self.last_intra_poc = poc;
            PicturePredictionType::Intra
        } else if self.low_delay_bipred || self.dpb.iter().any(|e| e.poc > poc) {
            PicturePredictionType::Bi
        } else {
            PicturePredictionType::Uni
        };

        let mut lists = ReferencePictureLists::default();
        lists.reset(poc);
        let mut ref_pocs = [Vec::new(), Vec::new()];
        if pic_type != PicturePredictionType::Intra {
            let [past, future] = self.select_references(poc, tid);
            let (l0, l1) = match (past.is_empty(), future.is_empty()) {
                (true, _) => (future.clone(), future),
                (false, true) if pic_type == PicturePredictionType::Bi => (past.clone(), past),
                _ => (past, future),
            };
            for (list, entries) in RefPicList::ALL.into_iter().zip([l0, l1]) {
                for (idx, entry) in entries.into_iter().enumerate() {
                    lists.set_ref_pic(list, idx, entry.clone());
                    ref_pocs[list.index()].push(entry.poc);
                }
            }
        }
        let header = PictureHeader {
            poc,
            pic_type,
            tid,
            qp: self.qp,
            ref_pocs,
        };

        let seq = self.pic_encoder.sequence();
        let orig = YuvPicture::padded_to(frame, seq.coded_width(), seq.coded_height(), true);
        let encoded = self.pic_encoder.encode(&header, &orig, lists);

        let stats = PictureStats {
            poc,
            pic_type,
            tid,
            bytes: encoded.packet.data.len(),
            psnr: display_psnr(frame, &encoded.rec),
        };
        info!(poc, tid, ?pic_type, bytes = stats.bytes, psnr = ?stats.psnr, "frame coded");

        self.dpb.push_front(RefEntry {
            poc,
            pic_type,
            tid,
            rec: encoded.rec,
            orig: Some(Arc::new(orig)),
            motion: encoded.motion,
        });
        // a whole group plus the references of its first picture
        self.dpb.truncate(self.num_ref_pics + self.sub_gop_length as usize - 1);
        self.coded.push_back((encoded.packet, stats));
    }

    /// Next packet in coding order. Its statistics become `last_stats`.
    pub fn receive_packet(&mut self) -> Option<Packet> {
        let (packet, stats) = self.coded.pop_front()?;
        self.last_stats = Some(stats);
        Some(packet)
    }

    /// Codes the pictures of an incomplete final group.
    pub fn flush(&mut self) {
        self.encode_pending();
    }

    /// Statistics of the picture most recently returned by
    /// `receive_packet`.
    pub fn last_stats(&self) -> Option<&PictureStats> {
        self.last_stats.as_ref()
    }
}

/// PSNR of `rec` against `frame` over the area of `frame`.
pub(crate) fn display_psnr(frame: &YuvPicture, rec: &YuvPicture) -> Vec<f64> {
    let metric = SampleMetric::new(MetricType::Sse);
    frame
        .chroma_format()
        .components()
        .iter()
        .map(|&comp| {
            let (w, h) = (frame.width(comp) as usize, frame.height(comp) as usize);
            let sse = metric.compare(
                w,
                h,
                &frame.plane(comp)[frame.offset(comp, 0, 0)..],
                frame.stride(comp),
                &rec.plane(comp)[rec.offset(comp, 0, 0)..],
                rec.stride(comp),
            );
            psnr(sse, (w * h) as u64, frame.bitdepth())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: i32, height: i32, shift: i32) -> YuvPicture {
        let mut pic = YuvPicture::new(ChromaFormat::Yuv420, width, height, 8, false);
        for &comp in ChromaFormat::Yuv420.components() {
            for y in 0..pic.height(comp) {
                for x in 0..pic.width(comp) {
                    pic.set_sample(comp, x, y, (60 + ((x + shift) * 5 + y * 3) % 120) as u16);
                }
            }
        }
        pic
    }

    fn fast() -> EncoderConfig {
        EncoderConfig {
            speed_mode: SpeedMode::Fast,
            ..EncoderConfig::default()
        }
    }

    #[test]
    fn new_valid_dimensions() {
        let enc = Encoder::new(64, 64, EncoderConfig::default()).unwrap();
        assert_eq!(enc.width(), 64);
        assert_eq!(enc.height(), 64);
    }

    #[test]
    fn new_rejects_out_of_range_parameters() {
        assert!(matches!(
            Encoder::new(0, 64, EncoderConfig::default()),
            Err(CodecError::InvalidDimensions { .. })
        ));
        let config = EncoderConfig {
            qp: 64,
            ..EncoderConfig::default()
        };
        assert!(matches!(Encoder::new(64, 64, config), Err(CodecError::InvalidQp(64))));
        let config = EncoderConfig {
            bitdepth: 16,
            ..EncoderConfig::default()
        };
        assert!(matches!(Encoder::new(64, 64, config), Err(CodecError::UnsupportedBitDepth(16))));
        let config = EncoderConfig {
            disabled_tools: vec!["disable_everything".into()],
            ..EncoderConfig::default()
        };
        assert!(matches!(Encoder::new(64, 64, config), Err(CodecError::UnknownSetting(_))));
    }

    #[test]
    fn send_frame_checks_dimensions() {
        let mut enc = Encoder::new(16, 16, fast()).unwrap();
        let err = enc.send_frame(&frame(32, 16, 0)).unwrap_err();
        assert_eq!(
            err,
            CodecError::DimensionMismatch {
                expected_w: 16,
                expected_h: 16,
                got_w: 32,
                got_h: 16,
            }
        );
        assert!(enc.receive_packet().is_none());
    }

    #[test]
    fn send_frame_checks_chroma_format() {
        let mut enc = Encoder::new(16, 16, fast()).unwrap();
        let pic = YuvPicture::new(ChromaFormat::Yuv444, 16, 16, 8, false);
        assert!(matches!(enc.send_frame(&pic), Err(CodecError::ChromaFormatMismatch { .. })));
    }

    #[test]
    fn picture_types_follow_intra_period() {
        let config = EncoderConfig {
            intra_period: 3,
            low_delay_bipred: true,
            ..fast()
        };
        let mut enc = Encoder::new(16, 16, config).unwrap();
        let mut types = Vec::new();
        for i in 0..5 {
            enc.send_frame(&frame(16, 16, i)).unwrap();
            let packet = enc.receive_packet().unwrap();
            assert_eq!(packet.poc, i as u32);
            types.push(packet.pic_type);
        }
        use PicturePredictionType::*;
        assert_eq!(types, vec![Intra, Bi, Bi, Intra, Bi]);
        assert!(enc.receive_packet().is_none());
    }

    #[test]
    fn reference_count_is_capped() {
        let config = EncoderConfig {
            num_ref_pics: Some(2),
            ..fast()
        };
        let mut enc = Encoder::new(16, 16, config).unwrap();
        for i in 0..4 {
            enc.send_frame(&frame(16, 16, i)).unwrap();
        }
        assert_eq!(enc.dpb.len(), 2);
        assert_eq!(enc.dpb[0].poc, 3);
    }

    #[test]
    fn odd_sizes_are_padded() {
        let mut enc = Encoder::new(18, 10, fast()).unwrap();
        enc.send_frame(&frame(18, 10, 0)).unwrap();
        assert!(enc.receive_packet().is_some());
        assert_eq!(enc.dpb[0].rec.width(YuvComponent::Y), 24);
        assert_eq!(enc.dpb[0].rec.height(YuvComponent::Y), 16);
        let stats = enc.last_stats().unwrap();
        assert_eq!(stats.psnr.len(), 3);
        assert!(stats.psnr.iter().all(|&p| p > 25.0), "{stats:?}");
    }

    #[test]
    fn group_coding_order() {
        assert_eq!(coding_order(0, 0), vec![(0, 0)]);
        assert_eq!(
            coding_order(1, 8),
            vec![(8, 0), (4, 1), (2, 2), (1, 3), (3, 3), (6, 2), (5, 3), (7, 3)]
        );
        // a short final group
        assert_eq!(coding_order(9, 11), vec![(11, 0), (10, 1), (9, 2)]);
    }

    #[test]
    fn sub_gop_length_is_validated() {
        for (sub_gop_length, intra_period) in [(3, 0), (32, 0), (4, 6)] {
            let config = EncoderConfig {
                sub_gop_length,
                intra_period,
                ..fast()
            };
            assert_eq!(
                Encoder::new(16, 16, config).err(),
                Some(CodecError::InvalidSubGopLength(sub_gop_length))
            );
        }
    }

    #[test]
    fn groups_are_coded_hierarchically() {
        let config = EncoderConfig {
            sub_gop_length: 4,
            ..fast()
        };
        let mut enc = Encoder::new(16, 16, config).unwrap();
        let mut coded = Vec::new();
        for i in 0..7 {
            enc.send_frame(&frame(16, 16, i)).unwrap();
            while let Some(packet) = enc.receive_packet() {
                let stats = enc.last_stats().unwrap();
                assert_eq!(stats.poc, packet.poc);
                coded.push((packet.poc, stats.tid, packet.pic_type));
            }
            if i == 2 {
                // 1..=3 wait for 4
                assert_eq!(coded.len(), 1);
            }
        }
        enc.flush();
        while let Some(packet) = enc.receive_packet() {
            coded.push((packet.poc, enc.last_stats().unwrap().tid, packet.pic_type));
        }
        use PicturePredictionType::*;
        assert_eq!(
            coded,
            vec![
                (0, 0, Intra),
                (4, 0, Uni),
                (2, 1, Bi),
                (1, 2, Bi),
                (3, 2, Bi),
                (6, 0, Uni),
                (5, 1, Bi),
            ]
        );
    }

    #[test]
    fn references_come_from_both_sides_and_lower_layers() {
        let config = EncoderConfig {
            sub_gop_length: 4,
            num_ref_pics: Some(4),
            ..fast()
        };
        let mut enc = Encoder::new(16, 16, config).unwrap();
        for i in 0..5 {
            enc.send_frame(&frame(16, 16, i)).unwrap();
        }
        // state after coding 0, 4, 2, 1, 3
        let [past, future] = enc.select_references(3, 2);
        let pocs = |v: &[&RefEntry]| v.iter().map(|e| e.poc).collect::<Vec<_>>();
        assert_eq!(pocs(&past), vec![2, 1, 0]);
        assert_eq!(pocs(&future), vec![4]);
        let [past, future] = enc.select_references(2, 1);
        assert_eq!(pocs(&past), vec![0]);
        assert_eq!(pocs(&future), vec![4]);
    }

    #[test]
    fn intra_key_picture_keeps_open_group_references() {
        let config = EncoderConfig {
            sub_gop_length: 2,
            intra_period: 4,
            ..fast()
        };
        let mut enc = Encoder::new(16, 16, config).unwrap();
        for i in 0..5 {
            enc.send_frame(&frame(16, 16, i)).unwrap();
        }
        let mut coded = Vec::new();
        while let Some(packet) = enc.receive_packet() {
            coded.push((packet.poc, packet.pic_type));
        }
        use PicturePredictionType::*;
        assert_eq!(coded, vec![(0, Intra), (2, Uni), (1, Bi), (4, Intra), (3, Bi)]);
        // 3 still predicts from 2, while later pictures stop at 4
        assert_eq!(enc.select_references(3, 1)[0][0].poc, 2);
        assert!(enc.select_references(5, 1)[0].iter().all(|e| e.poc >= 4));
    }
}
