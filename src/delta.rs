//! Delta codec: diffs two virtual directories into a compact, path-sorted
//! sequence of per-file Add/Remove/Modify records.
use tracing::debug;

use crate::compressor;
use crate::directory::{Entry, VirtualDirectory};
use crate::error::{Error, Result};
use crate::header::PatchHeader;
use crate::instruction::{self, Instruction};
use crate::path::RelativePath;

/// A single file's worth of delta: addition, removal, or modification,
/// distinguished by `old_size`/`new_size` being zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRecord {
    pub relative_path: RelativePath,
    pub old_hash: u64,
    pub new_hash: u64,
    pub old_size: u64,
    pub new_size: u64,
    pub instructions: Vec<Instruction>,
}

impl DeltaRecord {
    pub fn is_removal(&self) -> bool {
        self.new_size == 0
    }

    pub fn is_addition(&self) -> bool {
        self.old_size == 0
    }

    fn write(&self, out: &mut Vec<u8>) {
        let path_bytes = self.relative_path.as_str().as_bytes();
        out.extend_from_slice(&(path_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(path_bytes);
        out.extend_from_slice(&self.old_hash.to_le_bytes());
        out.extend_from_slice(&self.new_hash.to_le_bytes());
        out.extend_from_slice(&self.old_size.to_le_bytes());
        out.extend_from_slice(&self.new_size.to_le_bytes());
        let instr_bytes = instruction::encode_stream(&self.instructions);
        out.extend_from_slice(&(instr_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&instr_bytes);
    }

    fn read(buf: &[u8]) -> Result<(Self, usize)> {
        let reason = "delta record truncated";
        let read_u64 = |at: usize| -> Result<u64> {
            let bytes = buf.get(at..at + 8).ok_or(Error::CorruptFrame { reason })?;
            Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
        };

        let path_len = read_u64(0)? as usize;
        let mut offset = 8;
        let path_bytes = buf.get(offset..offset + path_len).ok_or(Error::CorruptFrame { reason })?;
        let relative_path_str = String::from_utf8(path_bytes.to_vec())
            .map_err(|_| Error::CorruptFrame { reason: "delta record path is not valid UTF-8" })?;
        let relative_path = RelativePath::new(relative_path_str)
            .ok_or(Error::CorruptFrame { reason: "delta record path is not a valid relative path" })?;
        offset += path_len;

        let old_hash = read_u64(offset)?;
        offset += 8;
        let new_hash = read_u64(offset)?;
        offset += 8;
        let old_size = read_u64(offset)?;
        offset += 8;
        let new_size = read_u64(offset)?;
        offset += 8;
        let instr_bytes_len = read_u64(offset)? as usize;
        offset += 8;
        let instr_bytes = buf.get(offset..offset + instr_bytes_len).ok_or(Error::CorruptFrame { reason })?;
        let instructions = instruction::decode_stream(instr_bytes)?;
        offset += instr_bytes_len;

        Ok((Self { relative_path, old_hash, new_hash, old_size, new_size, instructions }, offset))
    }
}

/// One path's worth of outstanding work, referencing the entries that
/// produced it. Carrying borrowed entries (rather than eagerly running the
/// matcher) lets the outer path-merge stay a cheap sequential pass while
/// the actual instruction-stream computation — the expensive part — fans
/// out across worker threads in [`diff_records`].
enum Pending<'a> {
    Removal(&'a Entry),
    Addition(&'a Entry),
    Modification(&'a Entry, &'a Entry),
}

impl<'a> Pending<'a> {
    fn resolve(&self) -> DeltaRecord {
        match self {
            Pending::Removal(old) => removal_record(old),
            Pending::Addition(new) => addition_record(new),
            Pending::Modification(old, new) => modification_record(old, new),
        }
    }
}

/// Path-sorted merge of `old` and `new`, producing one [`Pending`] per
/// changed path (common paths with equal fingerprints are skipped
/// entirely). Both directories are assumed path-sorted, which
/// [`VirtualDirectory`] guarantees by construction.
fn merge_pending<'a>(old: &'a VirtualDirectory, new: &'a VirtualDirectory) -> Vec<Pending<'a>> {
    let (mut i, mut j) = (0, 0);
    let old_entries = old.entries();
    let new_entries = new.entries();
    let mut pending = Vec::new();

    while i < old_entries.len() || j < new_entries.len() {
        let old_entry = old_entries.get(i);
        let new_entry = new_entries.get(j);
        match (old_entry, new_entry) {
            (Some(o), Some(n)) if o.relative_path == n.relative_path => {
                if o.bytes.fingerprint() != n.bytes.fingerprint() {
                    pending.push(Pending::Modification(o, n));
                }
                i += 1;
                j += 1;
            }
            (Some(o), Some(n)) if o.relative_path < n.relative_path => {
                pending.push(Pending::Removal(o));
                i += 1;
            }
            (Some(_), Some(n)) => {
                pending.push(Pending::Addition(n));
                j += 1;
            }
            (Some(o), None) => {
                pending.push(Pending::Removal(o));
                i += 1;
            }
            (None, Some(n)) => {
                pending.push(Pending::Addition(n));
                j += 1;
            }
            (None, None) => unreachable!(),
        }
    }
    pending
}

/// Compute the Add/Remove/Modify records transforming `old` into `new`.
/// The outer path-merge is sequential (§5: it determines record order),
/// but each pending record's instruction stream is independent of every
/// other, so resolution fans out across worker threads sized by
/// `num_cpus::get()`, matching the fan-out `VirtualDirectory::import_folder`
/// already uses. Chunks preserve the merge's path order, so the
/// concatenated result is identical regardless of how many threads ran it.
pub fn diff_records(old: &VirtualDirectory, new: &VirtualDirectory) -> Vec<DeltaRecord> {
    let pending = merge_pending(old, new);
    if pending.is_empty() {
        return Vec::new();
    }

    let worker_count = num_cpus::get().max(1).min(pending.len());
    let chunk_size = (pending.len() + worker_count - 1) / worker_count.max(1);
    let chunks: Vec<&[Pending]> =
        if chunk_size == 0 { vec![&pending[..]] } else { pending.chunks(chunk_size.max(1)).collect() };

    std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| scope.spawn(move || chunk.iter().map(Pending::resolve).collect::<Vec<_>>()))
            .collect();
        handles.into_iter().flat_map(|h| h.join().expect("delta worker panicked")).collect()
    })
}

fn removal_record(old: &Entry) -> DeltaRecord {
    DeltaRecord {
        relative_path: old.relative_path.clone(),
        old_hash: old.bytes.fingerprint(),
        new_hash: 0,
        old_size: old.bytes.len() as u64,
        new_size: 0,
        instructions: Vec::new(),
    }
}

fn addition_record(new: &Entry) -> DeltaRecord {
    let instructions = compressor::find_instructions(&[], new.bytes.as_slice());
    DeltaRecord {
        relative_path: new.relative_path.clone(),
        old_hash: 0,
        new_hash: new.bytes.fingerprint(),
        old_size: 0,
        new_size: new.bytes.len() as u64,
        instructions,
    }
}

fn modification_record(old: &Entry, new: &Entry) -> DeltaRecord {
    let instructions = compressor::find_instructions(old.bytes.as_slice(), new.bytes.as_slice());
    DeltaRecord {
        relative_path: old.relative_path.clone(),
        old_hash: old.bytes.fingerprint(),
        new_hash: new.bytes.fingerprint(),
        old_size: old.bytes.len() as u64,
        new_size: new.bytes.len() as u64,
        instructions,
    }
}

/// Serialize the diff between `old` and `new` into a Delta buffer.
pub fn make_delta(old: &VirtualDirectory, new: &VirtualDirectory) -> Result<Vec<u8>> {
    let records = diff_records(old, new);
    let mut payload = Vec::new();
    for record in &records {
        record.write(&mut payload);
    }
    let compressed = compressor::compress(&payload);

    let mut out = Vec::new();
    PatchHeader { file_record_count: records.len() as u64 }.write(&mut out);
    out.extend_from_slice(&compressed);
    debug!(record_count = records.len(), delta_size = out.len(), "computed delta");
    old.observer().notify(&format!("computed delta with {} records ({} bytes)", records.len(), out.len()));
    Ok(out)
}

/// Validate the header and decode the record stream of a Delta buffer.
pub fn decode_delta(delta: &[u8]) -> Result<Vec<DeltaRecord>> {
    let header = PatchHeader::read(delta)?;
    let payload = compressor::decompress(&delta[PatchHeader::SIZE..])?;

    let mut records = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let (record, consumed) = DeltaRecord::read(&payload[offset..])?;
        records.push(record);
        offset += consumed;
    }
    if records.len() as u64 != header.file_record_count {
        return Err(Error::CorruptFrame { reason: "delta record count doesn't match header" });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Entry, VirtualDirectory};
    use crate::path::RelativePath;
    use crate::buffer::Buffer;

    fn directory(entries: &[(&str, &[u8])]) -> VirtualDirectory {
        let mut vd = VirtualDirectory::new("root");
        for (path, bytes) in entries {
            vd.insert_or_replace(Entry { relative_path: RelativePath::new(*path).unwrap(), bytes: Buffer::from_bytes(bytes) });
        }
        vd
    }

    #[test]
    fn diff_detects_add_remove_and_modify() {
        let old = directory(&[("a.txt", b"one"), ("b.txt", b"same"), ("c.txt", b"gone")]);
        let new = directory(&[("a.txt", b"ONE!"), ("b.txt", b"same"), ("d.txt", b"new")]);

        let records = diff_records(&old, &new);
        let by_path: std::collections::HashMap<_, _> =
            records.iter().map(|r| (r.relative_path.as_str().to_string(), r)).collect();

        assert!(!by_path.contains_key("b.txt"));
        assert!(by_path["a.txt"].old_size > 0 && by_path["a.txt"].new_size > 0);
        assert!(by_path["c.txt"].is_removal());
        assert!(by_path["d.txt"].is_addition());
    }

    #[test]
    fn make_delta_round_trips_through_decode() {
        let old = directory(&[("a.txt", b"hello world")]);
        let new = directory(&[("a.txt", b"hello brave world")]);
        let delta = make_delta(&old, &new).unwrap();
        let records = decode_delta(&delta).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path.as_str(), "a.txt");
    }
}
