#![forbid(unsafe_code)]

mod container;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vcore::y4m::{self, Y4mHeader};
use vcore::{
    ChromaFormat, DEFAULT_INTRA_PERIOD, DEFAULT_QP, Decoder, Encoder, EncoderConfig, RestrictedMode, SpeedMode,
    YuvPicture,
};

use crate::container::ContainerHeader;

#[derive(Parser)]
#[command(name = "vcore", version, about = "Block-based hybrid video encoder and decoder")]
struct Cli {
    /// Log every picture instead of only the summary.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a Y4M file (or a synthetic solid clip) into a vcore stream.
    Encode(EncodeArgs),
    /// Decode a vcore stream into a Y4M file.
    Decode(DecodeArgs),
}

#[derive(Args)]
struct EncodeArgs {
    /// Input Y4M file. Omit when using --solid.
    input: Option<PathBuf>,

    #[arg(short, long)]
    output: PathBuf,

    /// Generate a solid clip of the given size instead of reading input, e.g. 64x48.
    #[arg(long, value_parser = parse_size, conflicts_with = "input")]
    solid: Option<(u32, u32)>,

    /// Y,U,V sample values of the solid clip.
    #[arg(long, value_parser = parse_color, default_value = "128,128,128")]
    color: [u16; 3],

    /// Number of pictures in the solid clip.
    #[arg(long, default_value_t = 1)]
    frames: usize,

    #[arg(short, long, default_value_t = DEFAULT_QP)]
    qp: i32,

    /// Distance between intra pictures; 0 codes only the first picture as intra.
    #[arg(long, default_value_t = DEFAULT_INTRA_PERIOD)]
    intra_period: u32,

    /// Pictures per hierarchical group; 1 codes pictures in input order.
    #[arg(long, default_value_t = 1)]
    sub_gop_length: u32,

    #[arg(long)]
    num_ref_pics: Option<usize>,

    /// Code inter pictures as bi-predicted pictures referencing past pictures only.
    #[arg(long)]
    low_delay_bipred: bool,

    /// Restricted profile: none, a, b, c or d.
    #[arg(long, value_parser = parse_restricted_mode, default_value = "none")]
    restricted_mode: RestrictedMode,

    /// Disable a coding tool by flag name. May be repeated.
    #[arg(long = "disable", value_name = "TOOL")]
    disabled_tools: Vec<String>,

    #[arg(long, default_value = "slow")]
    speed: SpeedMode,

    /// Explicit encoder settings, e.g. "fast_merge_eval=1;max_binary_split_depth=2".
    #[arg(long)]
    settings: Option<String>,

    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    beta_offset: i32,

    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    tc_offset: i32,
}

#[derive(Args)]
struct DecodeArgs {
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s.split_once('x').ok_or_else(|| format!("invalid size {s}, expected WxH"))?;
    let w = w.parse().map_err(|_| format!("invalid width in {s}"))?;
    let h = h.parse().map_err(|_| format!("invalid height in {s}"))?;
    Ok((w, h))
}

fn parse_color(s: &str) -> Result<[u16; 3], String> {
    let values: Vec<&str> = s.split(',').collect();
    if values.len() != 3 {
        return Err("expected three comma-separated values".to_owned());
    }
    let mut out = [0u16; 3];
    for (dst, v) in out.iter_mut().zip(values) {
        *dst = v.parse().map_err(|_| format!("invalid sample value: {v}"))?;
    }
    Ok(out)
}

fn parse_restricted_mode(s: &str) -> Result<RestrictedMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" | "0" => Ok(RestrictedMode::Unrestricted),
        "a" | "1" => Ok(RestrictedMode::ModeA),
        "b" | "2" => Ok(RestrictedMode::ModeB),
        "c" | "3" => Ok(RestrictedMode::ModeC),
        "d" | "4" => Ok(RestrictedMode::ModeD),
        _ => Err(format!("invalid restricted mode: {s}")),
    }
}

fn parse_frame_rate(rate: &str) -> (u32, u32) {
    rate.split_once(':')
        .and_then(|(n, d)| Some((n.parse().ok()?, d.parse().ok()?)))
        .filter(|&(_, d)| d != 0)
        .unwrap_or((25, 1))
}

fn load_input(args: &EncodeArgs) -> Result<(Y4mHeader, Vec<YuvPicture>)> {
    if let Some((width, height)) = args.solid {
        let header = Y4mHeader {
            width,
            height,
            chroma_format: ChromaFormat::Yuv420,
            bitdepth: 8,
            frame_rate: "25:1".into(),
        };
        let frame = y4m::solid(&header, args.color);
        return Ok((header, vec![frame; args.frames]));
    }
    let Some(path) = &args.input else {
        bail!("an input file or --solid is required");
    };
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    y4m::read_y4m(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn encode(args: EncodeArgs) -> Result<()> {
    let (header, frames) = load_input(&args)?;
    if frames.is_empty() {
        bail!("input has no frames");
    }

    let config = EncoderConfig {
        qp: args.qp,
        bitdepth: header.bitdepth,
        chroma_format: header.chroma_format,
        intra_period: args.intra_period,
        sub_gop_length: args.sub_gop_length,
        num_ref_pics: args.num_ref_pics,
        low_delay_bipred: args.low_delay_bipred,
        restricted_mode: args.restricted_mode,
        disabled_tools: args.disabled_tools,
        beta_offset: args.beta_offset,
        tc_offset: args.tc_offset,
        speed_mode: args.speed,
        explicit_settings: args.settings,
    };
    let mut encoder = Encoder::new(header.width, header.height, config).context("failed to create encoder")?;

    let file = File::create(&args.output).with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    let (fps_num, fps_den) = parse_frame_rate(&header.frame_rate);
    container::write_header(
        &mut out,
        &ContainerHeader {
            width: header.width,
            height: header.height,
            fps_num,
            fps_den,
            num_frames: u32::try_from(frames.len()).context("too many frames")?,
        },
    )?;

    let mut total_bytes = 0usize;
    let mut psnr_sum = 0.0;
    let mut drain = |encoder: &mut Encoder, out: &mut BufWriter<File>| -> Result<()> {
        while let Some(packet) = encoder.receive_packet() {
            container::write_packet(out, packet.poc, &packet.data)?;
            total_bytes += packet.data.len();
            if let Some(stats) = encoder.last_stats() {
                psnr_sum += stats.psnr[0];
            }
        }
        Ok(())
    };
    for (i, frame) in frames.iter().enumerate() {
        encoder
            .send_frame(frame)
            .with_context(|| format!("failed to encode frame {i}"))?;
        drain(&mut encoder, &mut out)?;
    }
    encoder.flush();
    drain(&mut encoder, &mut out)?;
    out.flush()?;

    info!(
        frames = frames.len(),
        bytes = total_bytes,
        avg_psnr_y = psnr_sum / frames.len() as f64,
        "wrote {}",
        args.output.display()
    );
    Ok(())
}

fn decode(args: DecodeArgs) -> Result<()> {
    let file = File::open(&args.input).with_context(|| format!("failed to open {}", args.input.display()))?;
    let mut reader = BufReader::new(file);
    let header = container::read_header(&mut reader).context("failed to read stream header")?;

    let mut decoder = Decoder::new();
    // packets arrive in coding order, the output is written in display order
    let mut pictures = BTreeMap::new();
    while let Some((poc, data)) = container::read_packet(&mut reader)? {
        let decoded = decoder
            .decode(&data)
            .with_context(|| format!("failed to decode packet for poc {poc}"))?;
        if !decoded.conforming {
            warn!(poc = decoded.poc, "decoded picture does not match its checksum");
        }
        pictures.insert(decoded.poc, decoded.picture);
    }

    let Some(first) = pictures.values().next() else {
        bail!("stream contains no pictures");
    };
    let mut data = Y4mHeader {
        width: header.width,
        height: header.height,
        chroma_format: first.chroma_format(),
        bitdepth: first.bitdepth(),
        frame_rate: format!("{}:{}", header.fps_num, header.fps_den),
    }
    .to_line()
    .into_bytes();
    for picture in pictures.values() {
        y4m::write_y4m_frame(&mut data, picture);
    }
    fs::write(&args.output, data).with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        pictures = decoder.num_decoded(),
        corrupted = decoder.num_corrupted(),
        "wrote {}",
        args.output.display()
    );
    if decoder.num_corrupted() > 0 {
        bail!("{} pictures failed checksum verification", decoder.num_corrupted());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Encode(args) => encode(args),
        Command::Decode(args) => decode(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_arguments() {
        assert_eq!(parse_size("64x48"), Ok((64, 48)));
        assert!(parse_size("64").is_err());
        assert!(parse_size("ax4").is_err());
    }

    #[test]
    fn color_arguments() {
        assert_eq!(parse_color("16,128,240"), Ok([16, 128, 240]));
        assert!(parse_color("1,2").is_err());
    }

    #[test]
    fn restricted_mode_names() {
        assert_eq!(parse_restricted_mode("C"), Ok(RestrictedMode::ModeC));
        assert_eq!(parse_restricted_mode("none"), Ok(RestrictedMode::Unrestricted));
        assert!(parse_restricted_mode("e").is_err());
    }

    #[test]
    fn frame_rate_falls_back_on_garbage() {
        assert_eq!(parse_frame_rate("30000:1001"), (30000, 1001));
        assert_eq!(parse_frame_rate("30:0"), (25, 1));
        assert_eq!(parse_frame_rate("x"), (25, 1));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn sub_gop_length_argument() {
        let cli = Cli::try_parse_from(["vcore", "encode", "--solid", "16x16", "-o", "out.vcr", "--sub-gop-length", "4"])
            .unwrap();
        let Command::Encode(args) = cli.command else {
            panic!("expected the encode command");
        };
        assert_eq!(args.sub_gop_length, 4);
        assert_eq!(args.intra_period, DEFAULT_INTRA_PERIOD);
    }
}
