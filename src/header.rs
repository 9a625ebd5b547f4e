//! Fixed-title header records that open every typed buffer this crate
//! produces. Each title is a constant-length ASCII tag with no terminator;
//! readers must reject a mismatched title before interpreting the payload
//! that follows.
use crate::error::{Error, Result};

const COMPRESSED_TITLE: &[u8; 17] = b"nSuite compressed";
const PACKAGE_TITLE: &[u8; 14] = b"nSuite package";
const PATCH_TITLE: &[u8; 12] = b"nSuite patch";

fn take<'a>(buf: &'a [u8], at: usize, len: usize, reason: &'static str) -> Result<&'a [u8]> {
    buf.get(at..at + len).ok_or(Error::CorruptFrame { reason })
}

fn read_u64(buf: &[u8], at: usize, reason: &'static str) -> Result<u64> {
    let bytes = take(buf, at, 8, reason)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

/// Header for a compressed frame: `title, uncompressed_size`.
pub struct CompressedHeader {
    pub uncompressed_size: u64,
}

impl CompressedHeader {
    pub const SIZE: usize = COMPRESSED_TITLE.len() + 8;

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(COMPRESSED_TITLE);
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
    }

    pub fn read(buf: &[u8]) -> Result<Self> {
        let title = take(buf, 0, COMPRESSED_TITLE.len(), "compressed frame truncated before title")?;
        if title != COMPRESSED_TITLE {
            return Err(Error::CorruptFrame { reason: "compressed frame title mismatch" });
        }
        let uncompressed_size =
            read_u64(buf, COMPRESSED_TITLE.len(), "compressed frame truncated before size")?;
        Ok(Self { uncompressed_size })
    }
}

/// Header for a package buffer: `title, folder_name_length, folder_name`.
pub struct PackageHeader {
    pub folder_name: String,
}

impl PackageHeader {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(PACKAGE_TITLE);
        out.extend_from_slice(&(self.folder_name.len() as u64).to_le_bytes());
        out.extend_from_slice(self.folder_name.as_bytes());
    }

    /// Returns the header and the offset of the first byte past it.
    pub fn read(buf: &[u8]) -> Result<(Self, usize)> {
        let title = take(buf, 0, PACKAGE_TITLE.len(), "package truncated before title")?;
        if title != PACKAGE_TITLE {
            return Err(Error::CorruptFrame { reason: "package title mismatch" });
        }
        let mut offset = PACKAGE_TITLE.len();
        let name_len = read_u64(buf, offset, "package truncated before folder name length")? as usize;
        offset += 8;
        let name_bytes = take(buf, offset, name_len, "package truncated before folder name bytes")?;
        let folder_name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| Error::CorruptFrame { reason: "package folder name is not valid UTF-8" })?;
        offset += name_len;
        Ok((Self { folder_name }, offset))
    }
}

/// Header for a delta buffer: `title, file_record_count`.
pub struct PatchHeader {
    pub file_record_count: u64,
}

impl PatchHeader {
    pub const SIZE: usize = PATCH_TITLE.len() + 8;

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(PATCH_TITLE);
        out.extend_from_slice(&self.file_record_count.to_le_bytes());
    }

    pub fn read(buf: &[u8]) -> Result<Self> {
        let title = take(buf, 0, PATCH_TITLE.len(), "patch truncated before title")?;
        if title != PATCH_TITLE {
            return Err(Error::CorruptFrame { reason: "patch title mismatch" });
        }
        let file_record_count = read_u64(buf, PATCH_TITLE.len(), "patch truncated before record count")?;
        Ok(Self { file_record_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_header_round_trips() {
        let mut buf = Vec::new();
        CompressedHeader { uncompressed_size: 12345 }.write(&mut buf);
        let header = CompressedHeader::read(&buf).unwrap();
        assert_eq!(header.uncompressed_size, 12345);
    }

    #[test]
    fn package_header_round_trips() {
        let mut buf = Vec::new();
        PackageHeader { folder_name: "assets".into() }.write(&mut buf);
        buf.extend_from_slice(b"trailing payload");
        let (header, offset) = PackageHeader::read(&buf).unwrap();
        assert_eq!(header.folder_name, "assets");
        assert_eq!(&buf[offset..], b"trailing payload");
    }

    #[test]
    fn rejects_wrong_title() {
        let mut buf = Vec::new();
        PatchHeader { file_record_count: 1 }.write(&mut buf);
        assert!(matches!(CompressedHeader::read(&buf), Err(Error::CorruptFrame { .. })));
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert!(matches!(PatchHeader::read(b"short"), Err(Error::CorruptFrame { .. })));
    }
}
