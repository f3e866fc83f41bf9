//! Minimal file container: a fixed header followed by length-prefixed packets.

use std::io::{self, Read, Write};

const MAGIC: &[u8; 4] = b"VCST";
const HEADER_LEN: u16 = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub num_frames: u32,
}

pub fn write_header<W: Write>(writer: &mut W, header: &ContainerHeader) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&0u16.to_le_bytes())?;
    writer.write_all(&HEADER_LEN.to_le_bytes())?;
    writer.write_all(&header.width.to_le_bytes())?;
    writer.write_all(&header.height.to_le_bytes())?;
    writer.write_all(&header.fps_num.to_le_bytes())?;
    writer.write_all(&header.fps_den.to_le_bytes())?;
    writer.write_all(&header.num_frames.to_le_bytes())?;
    Ok(())
}

pub fn write_packet<W: Write>(writer: &mut W, poc: u32, data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("packet of {} bytes exceeds the 32-bit length field", data.len()),
        )
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&poc.to_le_bytes())?;
    writer.write_all(data)?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_header<R: Read>(reader: &mut R) -> io::Result<ContainerHeader> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a vcore stream"));
    }
    let mut fixed = [0u8; 4];
    reader.read_exact(&mut fixed)?;
    let header_len = u16::from_le_bytes([fixed[2], fixed[3]]);
    if header_len != HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected header length {header_len}"),
        ));
    }
    Ok(ContainerHeader {
        width: read_u32(reader)?,
        height: read_u32(reader)?,
        fps_num: read_u32(reader)?,
        fps_den: read_u32(reader)?,
        num_frames: read_u32(reader)?,
    })
}

/// Reads the next packet, or `None` at a clean end of stream.
pub fn read_packet<R: Read>(reader: &mut R) -> io::Result<Option<(u32, Vec<u8>)>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let poc = read_u32(reader)?;
    let mut data = vec![0u8; u32::from_le_bytes(len) as usize];
    reader.read_exact(&mut data)?;
    Ok(Some((poc, data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ContainerHeader {
        ContainerHeader {
            width: 352,
            height: 288,
            fps_num: 30,
            fps_den: 1,
            num_frames: 2,
        }
    }

    #[test]
    fn header_is_28_bytes() {
        let mut out = Vec::new();
        write_header(&mut out, &header()).unwrap();
        assert_eq!(out.len(), 28);
        assert_eq!(&out[..4], b"VCST");
    }

    #[test]
    fn packets_read_back_in_order() {
        let mut out = Vec::new();
        write_header(&mut out, &header()).unwrap();
        write_packet(&mut out, 0, &[1, 2, 3]).unwrap();
        write_packet(&mut out, 1, &[]).unwrap();
        let mut reader = out.as_slice();
        assert_eq!(read_header(&mut reader).unwrap(), header());
        assert_eq!(read_packet(&mut reader).unwrap(), Some((0, vec![1, 2, 3])));
        assert_eq!(read_packet(&mut reader).unwrap(), Some((1, vec![])));
        assert_eq!(read_packet(&mut reader).unwrap(), None);
    }

    #[test]
    fn rejects_foreign_files() {
        let mut reader: &[u8] = b"DKIF\0\0\x20\0AV01";
        let err = read_header(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let mut out = Vec::new();
        write_packet(&mut out, 0, &[9; 10]).unwrap();
        out.truncate(12);
        assert!(read_packet(&mut out.as_slice()).is_err());
    }
}
