//! The Copy/Insert/Repeat instruction alphabet shared by the byte
//! compressor and the delta codec.
//!
//! Modeled as a tagged variant rather than virtual dispatch, so encode,
//! decode, and apply are each one function with one branch per variant.
use crate::error::{Error, Result};

const TAG_COPY: u8 = 0x00;
const TAG_INSERT: u8 = 0x01;
const TAG_REPEAT: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `src_end - src_begin` bytes from the copy source into the
    /// output at `dst`.
    Copy { dst: u64, src_begin: u64, src_end: u64 },
    /// Write `bytes` verbatim into the output at `dst`.
    Insert { dst: u64, bytes: Vec<u8> },
    /// Write `len` copies of `value` into the output at `dst`.
    Repeat { dst: u64, len: u64, value: u8 },
}

impl Instruction {
    pub fn dst(&self) -> u64 {
        match self {
            Instruction::Copy { dst, .. } => *dst,
            Instruction::Insert { dst, .. } => *dst,
            Instruction::Repeat { dst, .. } => *dst,
        }
    }

    /// Number of output bytes this instruction produces.
    pub fn len(&self) -> u64 {
        match self {
            Instruction::Copy { src_begin, src_end, .. } => src_end - src_begin,
            Instruction::Insert { bytes, .. } => bytes.len() as u64,
            Instruction::Repeat { len, .. } => *len,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Instruction::Copy { dst, src_begin, src_end } => {
                out.push(TAG_COPY);
                out.extend_from_slice(&dst.to_le_bytes());
                out.extend_from_slice(&src_begin.to_le_bytes());
                out.extend_from_slice(&src_end.to_le_bytes());
            }
            Instruction::Insert { dst, bytes } => {
                out.push(TAG_INSERT);
                out.extend_from_slice(&dst.to_le_bytes());
                out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            Instruction::Repeat { dst, len, value } => {
                out.push(TAG_REPEAT);
                out.extend_from_slice(&dst.to_le_bytes());
                out.extend_from_slice(&len.to_le_bytes());
                out.push(*value);
            }
        }
    }

    /// Decode a single instruction from the front of `buf`, returning it
    /// along with the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let reason = "instruction stream truncated";
        let tag = *buf.first().ok_or(Error::CorruptFrame { reason })?;
        let read_u64 = |at: usize| -> Result<u64> {
            let bytes = buf.get(at..at + 8).ok_or(Error::CorruptFrame { reason })?;
            Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
        };
        match tag {
            TAG_COPY => {
                let dst = read_u64(1)?;
                let src_begin = read_u64(9)?;
                let src_end = read_u64(17)?;
                if src_end < src_begin {
                    return Err(Error::CorruptFrame { reason: "copy instruction has src_end < src_begin" });
                }
                Ok((Instruction::Copy { dst, src_begin, src_end }, 25))
            }
            TAG_INSERT => {
                let dst = read_u64(1)?;
                let len = read_u64(9)? as usize;
                let bytes = buf.get(17..17 + len).ok_or(Error::CorruptFrame { reason })?.to_vec();
                Ok((Instruction::Insert { dst, bytes }, 17 + len))
            }
            TAG_REPEAT => {
                let dst = read_u64(1)?;
                let len = read_u64(9)?;
                let value = *buf.get(17).ok_or(Error::CorruptFrame { reason })?;
                Ok((Instruction::Repeat { dst, len, value }, 18))
            }
            _ => Err(Error::CorruptFrame { reason: "unknown instruction tag" }),
        }
    }

    /// Execute this instruction against `out`, reading Copy sources from
    /// `source`. `out` must already be sized to its final length.
    pub fn apply(&self, out: &mut [u8], source: CopySource<'_>) -> Result<()> {
        let reason = "instruction range escapes output buffer";
        match self {
            Instruction::Copy { dst, src_begin, src_end } => {
                let (dst, src_begin, src_end) = (*dst as usize, *src_begin as usize, *src_end as usize);
                let len = src_end - src_begin;
                match source {
                    CopySource::SelfBuffer => {
                        if dst + len > out.len() || src_end > out.len() {
                            return Err(Error::CorruptFrame { reason });
                        }
                        // Source and destination ranges may overlap (the
                        // sliding-window case), so copy one byte at a
                        // time instead of via a single slice copy.
                        for i in 0..len {
                            out[dst + i] = out[src_begin + i];
                        }
                    }
                    CopySource::OldFile(old) => {
                        let region = old.get(src_begin..src_end).ok_or(Error::CorruptFrame { reason })?;
                        out.get_mut(dst..dst + len).ok_or(Error::CorruptFrame { reason })?.copy_from_slice(region);
                    }
                }
            }
            Instruction::Insert { dst, bytes } => {
                let dst = *dst as usize;
                out.get_mut(dst..dst + bytes.len()).ok_or(Error::CorruptFrame { reason })?.copy_from_slice(bytes);
            }
            Instruction::Repeat { dst, len, value } => {
                let (dst, len) = (*dst as usize, *len as usize);
                let region = out.get_mut(dst..dst + len).ok_or(Error::CorruptFrame { reason })?;
                region.fill(*value);
            }
        }
        Ok(())
    }
}

/// Where a `Copy` instruction reads its source bytes from. The compressor
/// always copies from the buffer it is itself producing (the sliding
/// window); the delta codec copies from the old file's contents.
pub enum CopySource<'a> {
    SelfBuffer,
    OldFile(&'a [u8]),
}

/// Decode an entire instruction stream occupying exactly `buf`.
pub fn decode_stream(mut buf: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    while !buf.is_empty() {
        let (instruction, consumed) = Instruction::decode(buf)?;
        instructions.push(instruction);
        buf = &buf[consumed..];
    }
    Ok(instructions)
}

/// Encode a full instruction stream.
pub fn encode_stream(instructions: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::new();
    for instruction in instructions {
        instruction.encode(&mut out);
    }
    out
}

/// Replay a full instruction stream into an output buffer of `out_len`
/// bytes, using `source` for every `Copy`.
pub fn apply_stream(instructions: &[Instruction], out_len: usize, source: CopySource<'_>) -> Result<Vec<u8>> {
    let mut out = vec![0u8; out_len];
    for instruction in instructions {
        match source {
            CopySource::SelfBuffer => instruction.apply(&mut out, CopySource::SelfBuffer)?,
            CopySource::OldFile(old) => instruction.apply(&mut out, CopySource::OldFile(old))?,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_insert_repeat_round_trip_through_wire_bytes() {
        let instructions = vec![
            Instruction::Insert { dst: 0, bytes: b"abc".to_vec() },
            Instruction::Repeat { dst: 3, len: 4, value: b'x' },
            Instruction::Copy { dst: 7, src_begin: 0, src_end: 3 },
        ];
        let bytes = encode_stream(&instructions);
        let decoded = decode_stream(&bytes).unwrap();
        assert_eq!(instructions, decoded);
    }

    #[test]
    fn self_referential_copy_supports_overlap() {
        let instructions = vec![
            Instruction::Insert { dst: 0, bytes: b"ab".to_vec() },
            Instruction::Copy { dst: 2, src_begin: 0, src_end: 5 },
        ];
        let out = apply_stream(&instructions, 5, CopySource::SelfBuffer).unwrap();
        assert_eq!(&out, b"ababa");
    }

    #[test]
    fn old_file_copy_reads_from_independent_buffer() {
        let old = b"hello world";
        let instructions = vec![Instruction::Copy { dst: 0, src_begin: 6, src_end: 11 }];
        let out = apply_stream(&instructions, 5, CopySource::OldFile(old)).unwrap();
        assert_eq!(&out, b"world");
    }

    #[test]
    fn rejects_out_of_range_copy() {
        let instructions = vec![Instruction::Copy { dst: 0, src_begin: 0, src_end: 100 }];
        assert!(matches!(
            apply_stream(&instructions, 5, CopySource::SelfBuffer),
            Err(Error::CorruptFrame { .. })
        ));
    }
}
