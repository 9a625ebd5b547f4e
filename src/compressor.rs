//! Sliding-window LZ-style byte compressor.
//!
//! Shares its matcher shape with the delta codec (`delta.rs`): both walk a
//! target buffer looking for Copy/Insert/Repeat opportunities, differing
//! only in where Copy reads from (`instruction::CopySource`).
use tracing::debug;

use crate::error::Result;
use crate::header::CompressedHeader;
use crate::instruction::{self, CopySource, Instruction};

/// Matches shorter than this are not worth a Copy instruction's 25 bytes
/// of overhead.
const MIN_MATCH: usize = 4;
/// Number of bytes hashed together to seed the match-position table.
const NGRAM: usize = 4;
/// How many candidate positions to examine per n-gram bucket before
/// settling for the best one found so far.
const MAX_CHAIN: usize = 32;

/// Find Copy/Insert/Repeat instructions that reconstruct `target` when
/// replayed with `source` as the Copy source. `source` is the same slice
/// as `target` for self-referential compression, or an independent old
/// file's bytes for delta encoding.
pub fn find_instructions(source: &[u8], target: &[u8]) -> Vec<Instruction> {
    let self_referential = std::ptr::eq(source, target);
    let mut table: std::collections::HashMap<[u8; NGRAM], Vec<usize>> = std::collections::HashMap::new();
    if !self_referential {
        for (i, window) in source.windows(NGRAM).enumerate() {
            let key: [u8; NGRAM] = window.try_into().unwrap();
            table.entry(key).or_default().push(i);
        }
    }

    let mut instructions = Vec::new();
    let mut pos = 0usize;
    let mut literal_start = 0usize;
    // For self-referential compression the source grows alongside the
    // target; track how far the table has been seeded so a position is
    // never used as a match candidate before it has actually been produced.
    let mut seeded_up_to = 0usize;

    let flush_literals = |instructions: &mut Vec<Instruction>, from: usize, to: usize| {
        if to > from {
            instructions.push(Instruction::Insert { dst: from as u64, bytes: target[from..to].to_vec() });
        }
    };

    while pos < target.len() {
        if self_referential {
            while seeded_up_to < pos && seeded_up_to + NGRAM <= target.len() {
                let key: [u8; NGRAM] = target[seeded_up_to..seeded_up_to + NGRAM].try_into().unwrap();
                table.entry(key).or_default().push(seeded_up_to);
                seeded_up_to += 1;
            }
        }

        let repeat_len = {
            let value = target[pos];
            let mut len = 1usize;
            while pos + len < target.len() && target[pos + len] == value {
                len += 1;
            }
            len
        };

        let copy_match = if pos + NGRAM <= target.len() {
            let key: [u8; NGRAM] = target[pos..pos + NGRAM].try_into().unwrap();
            table.get(&key).map(|candidates| best_match(source, target, pos, candidates))
        } else {
            None
        };
        let copy_len = copy_match.map(|(_, len)| len).unwrap_or(0);

        if repeat_len >= MIN_MATCH && repeat_len >= copy_len {
            flush_literals(&mut instructions, literal_start, pos);
            instructions.push(Instruction::Repeat { dst: pos as u64, len: repeat_len as u64, value: target[pos] });
            pos += repeat_len;
            literal_start = pos;
        } else if copy_len >= MIN_MATCH {
            let (src_begin, _) = copy_match.unwrap();
            flush_literals(&mut instructions, literal_start, pos);
            instructions.push(Instruction::Copy {
                dst: pos as u64,
                src_begin: src_begin as u64,
                src_end: (src_begin + copy_len) as u64,
            });
            pos += copy_len;
            literal_start = pos;
        } else {
            pos += 1;
        }
    }
    flush_literals(&mut instructions, literal_start, target.len());
    instructions
}

/// Among `candidates` (recent positions sharing the seed n-gram), find the
/// longest match against `target[pos..]`, preferring the nearest (largest)
/// candidate on ties.
fn best_match(source: &[u8], target: &[u8], pos: usize, candidates: &[usize]) -> (usize, usize) {
    let mut best = (0usize, 0usize);
    for &candidate in candidates.iter().rev().take(MAX_CHAIN) {
        if candidate >= pos && std::ptr::eq(source, target) {
            // Self-referential matches must not read ahead of what has
            // already been produced; only overlap with already-written
            // output (candidate < pos) is valid.
            continue;
        }
        let max_len = target.len() - pos;
        let mut len = 0usize;
        while len < max_len {
            let source_index = candidate + len;
            // A self-referential match may read bytes at or beyond `pos`
            // once its own emission has started overlapping forward; since
            // source == target here, indexing `target` directly handles
            // that without a bounds panic as long as we cap at max_len.
            let source_byte = if source_index < source.len() { source[source_index] } else { break };
            if source_byte != target[pos + len] {
                break;
            }
            len += 1;
        }
        if len > best.1 || (len == best.1 && candidate > best.0) {
            best = (candidate, len);
        }
    }
    best
}

/// Compress `data` into a framed buffer: header followed by the
/// instruction stream.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let instructions = find_instructions(data, data);
    debug!(input_len = data.len(), instruction_count = instructions.len(), "compressed buffer");
    let mut out = Vec::new();
    CompressedHeader { uncompressed_size: data.len() as u64 }.write(&mut out);
    out.extend_from_slice(&instruction::encode_stream(&instructions));
    out
}

/// Decompress a framed buffer produced by [`compress`].
pub fn decompress(framed: &[u8]) -> Result<Vec<u8>> {
    let header = CompressedHeader::read(framed)?;
    let instructions = instruction::decode_stream(&framed[CompressedHeader::SIZE..])?;
    instruction::apply_stream(&instructions, header.uncompressed_size as usize, CopySource::SelfBuffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let data = b"the quick brown fox the quick brown fox jumps over the lazy dog dog dog dog dog";
        let framed = compress(data);
        let restored = decompress(&framed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn round_trips_empty_input() {
        let framed = compress(b"");
        let restored = decompress(&framed).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn collapses_long_runs_into_repeat() {
        let data = vec![b'a'; 256];
        let instructions = find_instructions(&data, &data);
        assert!(instructions.iter().any(|i| matches!(i, Instruction::Repeat { len, .. } if *len >= 200)));
    }

    #[test]
    fn rejects_foreign_title() {
        assert!(matches!(decompress(b"not a valid frame at all"), Err(Error::CorruptFrame { .. })));
    }
}
