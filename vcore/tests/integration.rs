use vcore::sample_metric::psnr;
use vcore::{
    ChromaFormat, CodecError, Decoder, Encoder, EncoderConfig, PicturePredictionType, RestrictedMode, SpeedMode,
    YuvComponent, YuvPicture,
};

fn solid(format: ChromaFormat, width: i32, height: i32, bitdepth: u8, value: u16) -> YuvPicture {
    let mut pic = YuvPicture::new(format, width, height, bitdepth, false);
    for &comp in format.components() {
        pic.plane_mut(comp).fill(value);
    }
    pic
}

/// Moving diagonal ramp with some texture on top.
fn moving(format: ChromaFormat, width: i32, height: i32, bitdepth: u8, t: i32) -> YuvPicture {
    let mut pic = YuvPicture::new(format, width, height, bitdepth, false);
    let max = (1i32 << bitdepth) - 1;
    let scale = 1 << (bitdepth - 8);
    for &comp in format.components() {
        for y in 0..pic.height(comp) {
            for x in 0..pic.width(comp) {
                let xs = x + t * 2;
                let v = 50 + (xs * 3 + y * 2) % 140 + ((xs / 4 + y / 4) % 2) * 12;
                pic.set_sample(comp, x, y, (v * scale).clamp(0, max) as u16);
            }
        }
    }
    pic
}

fn sse(a: &YuvPicture, b: &YuvPicture, comp: YuvComponent) -> u64 {
    let mut sum = 0u64;
    for y in 0..a.height(comp) {
        for x in 0..a.width(comp) {
            let d = a.sample(comp, x, y) as i64 - b.sample(comp, x, y) as i64;
            sum += (d * d) as u64;
        }
    }
    sum
}

fn luma_psnr(a: &YuvPicture, b: &YuvPicture) -> f64 {
    let n = (a.width(YuvComponent::Y) * a.height(YuvComponent::Y)) as u64;
    psnr(sse(a, b, YuvComponent::Y), n, a.bitdepth())
}

/// Encodes `frames` and decodes every packet, checking conformance and that
/// the decoder output matches the PSNR the encoder measured. The result is
/// in display order.
fn round_trip(width: u32, height: u32, config: EncoderConfig, frames: &[YuvPicture]) -> Vec<YuvPicture> {
    let mut enc = Encoder::new(width, height, config).unwrap();
    let mut dec = Decoder::new();
    let mut out: Vec<Option<YuvPicture>> = vec![None; frames.len()];
    let mut decode_available = |enc: &mut Encoder| {
        while let Some(packet) = enc.receive_packet() {
            let decoded = dec.decode(&packet.data).unwrap();
            assert!(decoded.conforming, "poc {} is not conforming", packet.poc);
            assert_eq!(decoded.poc, packet.poc);
            assert_eq!(decoded.pic_type, packet.pic_type);
            let stats = enc.last_stats().unwrap();
            assert_eq!(decoded.tid, stats.tid);
            let frame = &frames[packet.poc as usize];
            let got = luma_psnr(frame, &decoded.picture);
            assert!((stats.psnr[0] - got).abs() < 1e-9, "encoder {} decoder {got}", stats.psnr[0]);
            out[packet.poc as usize] = Some(decoded.picture);
        }
    };
    for frame in frames {
        enc.send_frame(frame).unwrap();
        decode_available(&mut enc);
    }
    enc.flush();
    decode_available(&mut enc);
    assert_eq!(dec.num_corrupted(), 0);
    out.into_iter()
        .enumerate()
        .map(|(poc, pic)| pic.unwrap_or_else(|| panic!("poc {poc} was never coded")))
        .collect()
}

fn fast(config: EncoderConfig) -> EncoderConfig {
    EncoderConfig {
        speed_mode: SpeedMode::Fast,
        ..config
    }
}

#[test]
fn all_intra_flat_gray_16x8_qp20() {
    let frame = solid(ChromaFormat::Yuv420, 16, 8, 8, 128);
    let config = EncoderConfig {
        qp: 20,
        intra_period: 1,
        ..EncoderConfig::default()
    };
    let decoded = round_trip(16, 8, config, std::slice::from_ref(&frame));
    assert_eq!(decoded[0].width(YuvComponent::Y), 16);
    assert_eq!(decoded[0].height(YuvComponent::Y), 8);
    assert!(luma_psnr(&frame, &decoded[0]) >= 41.0);
}

#[test]
fn intra_textured_picture_round_trips() {
    let frame = moving(ChromaFormat::Yuv420, 72, 40, 8, 0);
    let decoded = round_trip(72, 40, EncoderConfig::default(), std::slice::from_ref(&frame));
    assert!(luma_psnr(&frame, &decoded[0]) > 30.0);
}

#[test]
fn low_delay_p_sequence_round_trips() {
    let frames: Vec<_> = (0..4).map(|t| moving(ChromaFormat::Yuv420, 48, 32, 8, t)).collect();
    let config = fast(EncoderConfig {
        num_ref_pics: Some(2),
        ..EncoderConfig::default()
    });
    let decoded = round_trip(48, 32, config, &frames);
    for (f, d) in frames.iter().zip(&decoded) {
        assert!(luma_psnr(f, d) > 28.0);
    }
}

#[test]
fn low_delay_b_sequence_round_trips() {
    let frames: Vec<_> = (0..3).map(|t| moving(ChromaFormat::Yuv420, 32, 32, 8, t)).collect();
    let config = fast(EncoderConfig {
        low_delay_bipred: true,
        num_ref_pics: Some(2),
        ..EncoderConfig::default()
    });
    round_trip(32, 32, config, &frames);
}

#[test]
fn chroma_formats_and_bit_depths_round_trip() {
    for (format, bitdepth) in [
        (ChromaFormat::Monochrome, 8),
        (ChromaFormat::Yuv422, 8),
        (ChromaFormat::Yuv444, 10),
        (ChromaFormat::Yuv420, 12),
    ] {
        let frames: Vec<_> = (0..2).map(|t| moving(format, 24, 16, bitdepth, t)).collect();
        let config = fast(EncoderConfig {
            chroma_format: format,
            bitdepth,
            ..EncoderConfig::default()
        });
        round_trip(24, 16, config, &frames);
    }
}

#[test]
fn restricted_modes_round_trip() {
    for mode in [
        RestrictedMode::ModeA,
        RestrictedMode::ModeB,
        RestrictedMode::ModeC,
        RestrictedMode::ModeD,
    ] {
        let frames: Vec<_> = (0..2).map(|t| moving(ChromaFormat::Yuv420, 32, 16, 8, t)).collect();
        let config = fast(EncoderConfig {
            restricted_mode: mode,
            ..EncoderConfig::default()
        });
        round_trip(32, 16, config, &frames);
    }
}

#[test]
fn plane_sum_checksum_round_trips() {
    let frame = moving(ChromaFormat::Yuv420, 16, 16, 8, 0);
    let config = fast(EncoderConfig {
        disabled_tools: vec!["disable_high_level_default_checksum_method".into()],
        ..EncoderConfig::default()
    });
    round_trip(16, 16, config, &[frame]);
}

#[test]
fn odd_display_size_is_cropped() {
    let frame = moving(ChromaFormat::Yuv444, 13, 7, 8, 0);
    let config = fast(EncoderConfig {
        chroma_format: ChromaFormat::Yuv444,
        ..EncoderConfig::default()
    });
    let decoded = round_trip(13, 7, config, std::slice::from_ref(&frame));
    assert_eq!(decoded[0].width(YuvComponent::Y), 13);
    assert_eq!(decoded[0].height(YuvComponent::Y), 7);
}

#[test]
fn deblocking_offsets_are_carried() {
    let frames: Vec<_> = (0..2).map(|t| moving(ChromaFormat::Yuv420, 32, 32, 8, t)).collect();
    let config = fast(EncoderConfig {
        qp: 45,
        beta_offset: 6,
        tc_offset: -4,
        ..EncoderConfig::default()
    });
    round_trip(32, 32, config, &frames);
}

#[test]
fn lower_qp_gives_higher_quality() {
    let frame = moving(ChromaFormat::Yuv420, 32, 32, 8, 0);
    let quality = |qp| {
        let config = fast(EncoderConfig {
            qp,
            ..EncoderConfig::default()
        });
        let decoded = round_trip(32, 32, config, std::slice::from_ref(&frame));
        luma_psnr(&frame, &decoded[0])
    };
    assert!(quality(16) > quality(44));
}

#[test]
fn encoding_is_deterministic() {
    let frames: Vec<_> = (0..2).map(|t| moving(ChromaFormat::Yuv420, 32, 16, 8, t)).collect();
    let run = || {
        let mut enc = Encoder::new(32, 16, fast(EncoderConfig::default())).unwrap();
        frames
            .iter()
            .map(|f| {
                enc.send_frame(f).unwrap();
                enc.receive_packet().unwrap().data
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn intra_period_resets_references() {
    let frames: Vec<_> = (0..4).map(|t| moving(ChromaFormat::Yuv420, 16, 16, 8, t)).collect();
    let config = fast(EncoderConfig {
        intra_period: 2,
        ..EncoderConfig::default()
    });
    let mut enc = Encoder::new(16, 16, config).unwrap();
    let packets: Vec<_> = frames
        .iter()
        .map(|f| {
            enc.send_frame(f).unwrap();
            enc.receive_packet().unwrap()
        })
        .collect();
    assert_eq!(packets[2].pic_type, PicturePredictionType::Intra);

    // Decoding can start at the second intra picture.
    let mut dec = Decoder::new();
    for packet in &packets[2..] {
        assert!(dec.decode(&packet.data).unwrap().conforming);
    }
    assert_eq!(
        Decoder::new().decode(&packets[3].data).unwrap_err(),
        CodecError::MissingReference(2)
    );
}

#[test]
fn random_access_groups_round_trip() {
    let frames: Vec<_> = (0..11).map(|t| moving(ChromaFormat::Yuv420, 32, 16, 8, t)).collect();
    let config = fast(EncoderConfig {
        sub_gop_length: 4,
        intra_period: 8,
        num_ref_pics: Some(2),
        ..EncoderConfig::default()
    });
    let decoded = round_trip(32, 16, config, &frames);
    assert_eq!(decoded.len(), frames.len());
    for (frame, pic) in frames.iter().zip(&decoded) {
        assert!(luma_psnr(frame, pic) > 25.0);
    }
}
