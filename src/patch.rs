//! Patch executor: applies a decoded delta to a virtual directory,
//! all-or-nothing.
use tracing::debug;

use crate::buffer::Buffer;
use crate::delta::{self, DeltaRecord};
use crate::directory::{Entry, VirtualDirectory};
use crate::error::{Error, Result};
use crate::instruction::{self, CopySource};
use crate::path::RelativePath;

/// The resolved effect of one record, computed against a read-only
/// snapshot so record resolution (precondition check + instruction
/// replay + fingerprint verification) can run across worker threads; the
/// resulting outcomes are then applied to the staged directory one at a
/// time, which is cheap compared to the replay it follows.
enum RecordOutcome {
    Remove(RelativePath),
    Upsert(Entry),
}

/// Apply a delta buffer to `directory` in place. On any failure the
/// directory is left untouched: every record is validated and replayed
/// against a read-only snapshot first, and only applied to a staged copy
/// — which is swapped in once the whole delta has resolved cleanly.
pub fn apply_delta(directory: &mut VirtualDirectory, delta: &[u8]) -> Result<()> {
    let records = delta::decode_delta(delta)?;
    let snapshot = directory.clone();

    let worker_count = num_cpus::get().max(1).min(records.len().max(1));
    let chunk_size = (records.len() + worker_count - 1) / worker_count.max(1);
    let chunks: Vec<&[DeltaRecord]> =
        if chunk_size == 0 { vec![&records[..]] } else { records.chunks(chunk_size.max(1)).collect() };

    let chunk_outcomes: Result<Vec<Vec<RecordOutcome>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let snapshot = &snapshot;
                scope.spawn(move || -> Result<Vec<RecordOutcome>> {
                    chunk.iter().map(|record| resolve_record(snapshot, record)).collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("patch worker panicked")).collect()
    });

    let mut staged = directory.clone();
    for outcome in chunk_outcomes?.into_iter().flatten() {
        match outcome {
            RecordOutcome::Remove(path) => staged.remove_path(path.as_str()),
            RecordOutcome::Upsert(entry) => staged.insert_or_replace(entry),
        }
    }

    debug!(record_count = records.len(), "applied delta");
    directory.observer().notify(&format!("applied delta with {} records", records.len()));
    *directory = staged;
    Ok(())
}

/// Resolve one record against `snapshot` without mutating anything.
/// `old_size == 0` is checked (and handled as create-regardless-of-new-size)
/// before falling back to the removal branch, so an added file that is
/// itself empty (`old_size == 0 && new_size == 0`) is still created rather
/// than mistaken for a no-op removal.
fn resolve_record(snapshot: &VirtualDirectory, record: &DeltaRecord) -> Result<RecordOutcome> {
    let existing = snapshot.get(record.relative_path.as_str());

    if record.old_size > 0 {
        let existing =
            existing.ok_or_else(|| Error::PreconditionMismatch { path: record.relative_path.clone() })?;
        if existing.bytes.fingerprint() != record.old_hash {
            return Err(Error::PreconditionMismatch { path: record.relative_path.clone() });
        }
    }

    if record.is_addition() {
        let reconstructed =
            instruction::apply_stream(&record.instructions, record.new_size as usize, CopySource::OldFile(&[]))?;
        let buffer = Buffer::from_vec(reconstructed);
        if buffer.fingerprint() != record.new_hash {
            return Err(Error::CorruptPatch { path: record.relative_path.clone() });
        }
        return Ok(RecordOutcome::Upsert(Entry { relative_path: record.relative_path.clone(), bytes: buffer }));
    }

    if record.is_removal() {
        return Ok(RecordOutcome::Remove(record.relative_path.clone()));
    }

    let old_bytes: &[u8] = existing.map(|e| e.bytes.as_slice()).unwrap_or(&[]);
    let reconstructed =
        instruction::apply_stream(&record.instructions, record.new_size as usize, CopySource::OldFile(old_bytes))?;
    let buffer = Buffer::from_vec(reconstructed);
    if buffer.fingerprint() != record.new_hash {
        return Err(Error::CorruptPatch { path: record.relative_path.clone() });
    }

    Ok(RecordOutcome::Upsert(Entry { relative_path: record.relative_path.clone(), bytes: buffer }))
}
