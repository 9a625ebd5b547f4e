//! Package codec: frames a virtual directory's entries into a single
//! compressed buffer and back.
use tracing::debug;

use crate::buffer::Buffer;
use crate::compressor;
use crate::directory::Entry;
use crate::error::{Error, Result};
use crate::header::PackageHeader;
use crate::path::RelativePath;

/// Serialize each entry's path-length/path/size/bytes tuple on a worker
/// thread (§5: independent, isolated byte ranges) and concatenate the
/// per-chunk fragments in the entries' original order, so the result does
/// not depend on how many threads produced it.
fn write_entry_stream(entries: &[Entry]) -> Vec<u8> {
    if entries.is_empty() {
        return Vec::new();
    }

    let worker_count = num_cpus::get().max(1).min(entries.len());
    let chunk_size = (entries.len() + worker_count - 1) / worker_count.max(1);
    let chunks: Vec<&[Entry]> =
        if chunk_size == 0 { vec![&entries[..]] } else { entries.chunks(chunk_size.max(1)).collect() };

    let fragments: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = chunks.into_iter().map(|chunk| scope.spawn(move || write_entry_chunk(chunk))).collect();
        handles.into_iter().map(|h| h.join().expect("package worker panicked")).collect()
    });

    let payload_size: usize = fragments.iter().map(Vec::len).sum();
    let mut payload = Vec::with_capacity(payload_size);
    for fragment in fragments {
        payload.extend_from_slice(&fragment);
    }
    payload
}

fn write_entry_chunk(entries: &[Entry]) -> Vec<u8> {
    let chunk_size: usize = entries.iter().map(|e| 16 + e.relative_path.as_str().len() + e.bytes.len()).sum();
    let mut out = Vec::with_capacity(chunk_size);
    for entry in entries {
        let path_bytes = entry.relative_path.as_str().as_bytes();
        out.extend_from_slice(&(path_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(path_bytes);
        out.extend_from_slice(&(entry.bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(entry.bytes.as_slice());
    }
    out
}

fn read_entry_stream(mut payload: &[u8]) -> Result<Vec<Entry>> {
    let reason = "package entry stream truncated";
    let mut entries = Vec::new();
    while !payload.is_empty() {
        let path_len = read_u64(payload, reason)? as usize;
        payload = &payload[8..];
        let path_bytes = payload.get(..path_len).ok_or(Error::CorruptFrame { reason })?;
        let relative_path_str = String::from_utf8(path_bytes.to_vec())
            .map_err(|_| Error::CorruptFrame { reason: "package entry path is not valid UTF-8" })?;
        let relative_path =
            RelativePath::new(relative_path_str).ok_or(Error::CorruptFrame { reason: "package entry path is not a valid relative path" })?;
        payload = &payload[path_len..];

        let file_size = read_u64(payload, reason)? as usize;
        payload = &payload[8..];
        let bytes = payload.get(..file_size).ok_or(Error::CorruptFrame { reason })?;
        let entry = Entry { relative_path, bytes: Buffer::from_bytes(bytes) };
        payload = &payload[file_size..];
        entries.push(entry);
    }
    Ok(entries)
}

fn read_u64(buf: &[u8], reason: &'static str) -> Result<u64> {
    let bytes = buf.get(..8).ok_or(Error::CorruptFrame { reason })?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

/// Serialize `entries` (assumed path-sorted) into a Package buffer.
pub fn pack(folder_name: &str, entries: &[Entry]) -> Result<Vec<u8>> {
    let entry_stream = write_entry_stream(entries);
    let compressed = compressor::compress(&entry_stream);

    let mut out = Vec::new();
    PackageHeader { folder_name: folder_name.to_string() }.write(&mut out);
    out.extend_from_slice(&compressed);
    debug!(folder_name, file_count = entries.len(), packed_size = out.len(), "packed virtual directory");
    Ok(out)
}

/// Inverse of [`pack`]: returns the folder name and entries in written
/// (sorted) order.
pub fn unpack(package: &[u8]) -> Result<(String, Vec<Entry>)> {
    let (header, payload_offset) = PackageHeader::read(package)?;
    let entry_stream = compressor::decompress(&package[payload_offset..])?;
    let entries = read_entry_stream(&entry_stream)?;
    Ok((header.folder_name, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, bytes: &[u8]) -> Entry {
        Entry { relative_path: RelativePath::new(path).unwrap(), bytes: Buffer::from_bytes(bytes) }
    }

    #[test]
    fn pack_unpack_round_trips_entries_and_name() {
        let entries = vec![entry("a.txt", b"hello"), entry("nested/b.bin", b"world!!")];
        let packed = pack("demo", &entries).unwrap();
        let (name, restored) = unpack(&packed).unwrap();
        assert_eq!(name, "demo");
        assert_eq!(restored, entries);
    }

    #[test]
    fn unpack_rejects_corrupt_buffer() {
        assert!(matches!(unpack(b"garbage"), Err(Error::CorruptFrame { .. })));
    }
}
