//! Reconstructed-picture checksum carried at the end of every packet.

use sha2::{Digest, Sha256};

use crate::bitreader::BitReader;
use crate::bitwriter::{BitSink, BitWriter};
use crate::error::{CodecError, Result};
use crate::yuv_pic::YuvPicture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMethod {
    Sha256,
    /// Per-plane wrapping sum of the samples.
    PlaneSum,
}

impl ChecksumMethod {
    pub fn to_u8(self) -> u8 {
        match self {
            ChecksumMethod::Sha256 => 0,
            ChecksumMethod::PlaneSum => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChecksumMethod::Sha256),
            1 => Some(ChecksumMethod::PlaneSum),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub method: ChecksumMethod,
    pub digest: Vec<u8>,
}

impl Checksum {
    /// Hashes the coded area of every plane, samples as little-endian u16.
    pub fn compute(method: ChecksumMethod, pic: &YuvPicture) -> Self {
        let digest = match method {
            ChecksumMethod::Sha256 => {
                let mut hasher = Sha256::new();
                for &comp in pic.chroma_format().components() {
                    for y in 0..pic.height(comp) {
                        for x in 0..pic.width(comp) {
                            hasher.update(pic.sample(comp, x, y).to_le_bytes());
                        }
                    }
                }
                hasher.finalize().to_vec()
            }
            ChecksumMethod::PlaneSum => {
                let mut digest = Vec::new();
                for &comp in pic.chroma_format().components() {
                    let mut sum = 0u32;
                    for y in 0..pic.height(comp) {
                        for x in 0..pic.width(comp) {
                            sum = sum.wrapping_add(pic.sample(comp, x, y) as u32);
                        }
                    }
                    digest.extend_from_slice(&sum.to_be_bytes());
                }
                digest
            }
        };
        Self { method, digest }
    }

    pub fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(self.method.to_u8() as u64, 8);
        bw.write_bits(self.digest.len() as u64, 8);
        bw.write_bytes(&self.digest);
    }

    pub fn read(br: &mut BitReader) -> Result<Self> {
        let method = br.read_bits(8).map_err(|_| CodecError::Truncated("checksum"))?;
        let method = ChecksumMethod::from_u8(method as u8)
            .ok_or_else(|| CodecError::Malformed(format!("checksum method {method}")))?;
        let len = br.read_bits(8).map_err(|_| CodecError::Truncated("checksum"))? as usize;
        let digest = br
            .read_bytes(len)
            .map_err(|_| CodecError::Truncated("checksum"))?
            .to_vec();
        Ok(Self { method, digest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChromaFormat, YuvComponent};

    fn picture() -> YuvPicture {
        let mut pic = YuvPicture::new(ChromaFormat::Yuv420, 16, 8, 8, true);
        for y in 0..8 {
            for x in 0..16 {
                pic.set_sample(YuvComponent::Y, x, y, (x * 7 + y) as u16);
            }
        }
        pic
    }

    #[test]
    fn sha256_digest_is_32_bytes() {
        let c = Checksum::compute(ChecksumMethod::Sha256, &picture());
        assert_eq!(c.digest.len(), 32);
    }

    #[test]
    fn single_sample_change_is_detected() {
        let a = picture();
        let mut b = a.clone();
        b.set_sample(YuvComponent::V, 3, 2, 1);
        for method in [ChecksumMethod::Sha256, ChecksumMethod::PlaneSum] {
            assert_ne!(Checksum::compute(method, &a), Checksum::compute(method, &b));
        }
    }

    #[test]
    fn padding_is_not_hashed() {
        let a = picture();
        let mut b = a.clone();
        b.pad_borders();
        assert_eq!(
            Checksum::compute(ChecksumMethod::Sha256, &a),
            Checksum::compute(ChecksumMethod::Sha256, &b)
        );
    }

    #[test]
    fn plane_sum_layout() {
        let c = Checksum::compute(ChecksumMethod::PlaneSum, &picture());
        assert_eq!(c.digest.len(), 12);
        let luma: u32 = (0..8).flat_map(|y| (0..16).map(move |x| x * 7 + y)).sum();
        assert_eq!(&c.digest[..4], &luma.to_be_bytes());
    }

    #[test]
    fn stream_round_trip() {
        let c = Checksum::compute(ChecksumMethod::PlaneSum, &picture());
        let mut bw = BitWriter::new();
        c.write(&mut bw);
        let data = bw.finalize();
        assert_eq!(Checksum::read(&mut BitReader::new(&data)).unwrap(), c);
    }
}
