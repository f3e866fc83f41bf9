//! YUV4MPEG2 reading and writing.

use crate::common::{ChromaFormat, Sample};
use crate::error::{CodecError, Result};
use crate::yuv_pic::YuvPicture;

const FRAME_MARKER: &[u8] = b"FRAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub chroma_format: ChromaFormat,
    pub bitdepth: u8,
    /// Frame rate as written in the `F` token, e.g. `30:1`.
    pub frame_rate: String,
}

impl Y4mHeader {
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("YUV4MPEG2") {
            return Err(CodecError::Malformed("not a YUV4MPEG2 stream".into()));
        }
        let mut header = Self {
            width: 0,
            height: 0,
            chroma_format: ChromaFormat::Yuv420,
            bitdepth: 8,
            frame_rate: "25:1".into(),
        };
        let bad = |token: &str| CodecError::Malformed(format!("bad y4m token {token}"));
        for token in tokens {
            let (key, val) = token.split_at(token.chars().next().map_or(0, char::len_utf8));
            match key {
                "W" => header.width = val.parse().map_err(|_| bad(token))?,
                "H" => header.height = val.parse().map_err(|_| bad(token))?,
                "F" => header.frame_rate = val.to_string(),
                "C" => {
                    let (format, depth) = parse_colorspace(val).ok_or_else(|| bad(token))?;
                    header.chroma_format = format;
                    header.bitdepth = depth;
                }
                _ => {}
            }
        }
        if header.width == 0 || header.height == 0 {
            return Err(CodecError::Malformed("missing W/H in y4m header".into()));
        }
        let (sx, sy) = subsampling(header.chroma_format);
        if header.width % (1 << sx) != 0 || header.height % (1 << sy) != 0 {
            return Err(CodecError::Malformed(format!(
                "{}x{} is not a whole number of {:?} chroma samples",
                header.width, header.height, header.chroma_format
            )));
        }
        Ok(header)
    }

    pub fn to_line(&self) -> String {
        let colorspace = match self.chroma_format {
            ChromaFormat::Monochrome if self.bitdepth > 8 => format!("mono{}", self.bitdepth),
            ChromaFormat::Monochrome => "mono".to_string(),
            ChromaFormat::Yuv420 if self.bitdepth == 8 => "420jpeg".to_string(),
            ChromaFormat::Yuv420 => "420".to_string(),
            ChromaFormat::Yuv422 => "422".to_string(),
            ChromaFormat::Yuv444 => "444".to_string(),
        };
        let depth = if self.bitdepth > 8 && self.chroma_format != ChromaFormat::Monochrome {
            format!("p{}", self.bitdepth)
        } else {
            String::new()
        };
        format!(
            "YUV4MPEG2 W{} H{} F{} Ip A1:1 C{colorspace}{depth}\n",
            self.width, self.height, self.frame_rate
        )
    }

    fn bytes_per_sample(&self) -> usize {
        if self.bitdepth > 8 { 2 } else { 1 }
    }

    fn plane_sizes(&self) -> Vec<usize> {
        let (sx, sy) = subsampling(self.chroma_format);
        let (w, h) = (self.width as usize, self.height as usize);
        self.chroma_format
            .components()
            .iter()
            .map(|c| if c.is_luma() { w * h } else { (w >> sx) * (h >> sy) })
            .collect()
    }

    pub fn frame_size(&self) -> usize {
        self.plane_sizes().iter().sum::<usize>() * self.bytes_per_sample()
    }
}

fn subsampling(format: ChromaFormat) -> (i32, i32) {
    match format {
        ChromaFormat::Monochrome | ChromaFormat::Yuv444 => (0, 0),
        _ => (format.shift_x(), format.shift_y()),
    }
}

fn parse_colorspace(val: &str) -> Option<(ChromaFormat, u8)> {
    if let Some(rest) = val.strip_prefix("mono") {
        let depth = rest.parse().unwrap_or(8);
        return Some((ChromaFormat::Monochrome, depth));
    }
    let (format, rest) = if let Some(rest) = val.strip_prefix("420") {
        (ChromaFormat::Yuv420, rest)
    } else if let Some(rest) = val.strip_prefix("422") {
        (ChromaFormat::Yuv422, rest)
    } else if let Some(rest) = val.strip_prefix("444") {
        (ChromaFormat::Yuv444, rest)
    } else {
        return None;
    };
    // `p10` style suffixes carry the depth; `jpeg`, `paldv` and friends only
    // describe chroma siting.
    let depth = rest.strip_prefix('p').and_then(|d| d.parse().ok()).unwrap_or(8);
    Some((format, depth))
}

/// Parses a whole YUV4MPEG2 stream. A trailing partial frame is an error.
pub fn read_y4m(data: &[u8]) -> Result<(Y4mHeader, Vec<YuvPicture>)> {
    let header_end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(CodecError::Truncated("y4m header"))?;
    let line = std::str::from_utf8(&data[..header_end]).map_err(|_| CodecError::Malformed("y4m header".into()))?;
    let header = Y4mHeader::parse(line)?;
    let frame_size = header.frame_size();

    let mut frames = Vec::new();
    let mut pos = header_end + 1;
    while pos < data.len() {
        if !data[pos..].starts_with(FRAME_MARKER) {
            return Err(CodecError::Malformed(format!("expected FRAME at byte {pos}")));
        }
        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(CodecError::Truncated("y4m frame header"))?;
        let start = pos + line_end + 1;
        let payload = data
            .get(start..start + frame_size)
            .ok_or(CodecError::Truncated("y4m frame"))?;
        frames.push(frame_from_bytes(&header, payload)?);
        pos = start + frame_size;
    }
    Ok((header, frames))
}

fn frame_from_bytes(header: &Y4mHeader, payload: &[u8]) -> Result<YuvPicture> {
    let bps = header.bytes_per_sample();
    let mut planes = Vec::new();
    let mut offset = 0;
    for size in header.plane_sizes() {
        let bytes = &payload[offset..offset + size * bps];
        let plane: Vec<Sample> = if bps == 2 {
            bytes.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect()
        } else {
            bytes.iter().map(|&b| b as Sample).collect()
        };
        planes.push(plane);
        offset += size * bps;
    }
    let refs: Vec<&[Sample]> = planes.iter().map(Vec::as_slice).collect();
    YuvPicture::from_planes(
        header.chroma_format,
        header.width as i32,
        header.height as i32,
        header.bitdepth,
        &refs,
    )
}

/// Appends one `FRAME` record holding `pic` to `out`.
pub fn write_y4m_frame(out: &mut Vec<u8>, pic: &YuvPicture) {
    out.extend_from_slice(FRAME_MARKER);
    out.push(b'\n');
    let wide = pic.bitdepth() > 8;
    for &comp in pic.chroma_format().components() {
        for y in 0..pic.height(comp) {
            for x in 0..pic.width(comp) {
                let v = pic.sample(comp, x, y);
                if wide {
                    out.extend_from_slice(&v.to_le_bytes());
                } else {
                    out.push(v as u8);
                }
            }
        }
    }
}

pub fn solid(header: &Y4mHeader, values: [Sample; 3]) -> YuvPicture {
    let mut pic = YuvPicture::new(
        header.chroma_format,
        header.width as i32,
        header.height as i32,
        header.bitdepth,
        false,
    );
    for &comp in header.chroma_format.components() {
        pic.plane_mut(comp).fill(values[comp.index()]);
    }
    pic
}
