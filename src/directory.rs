//! The in-memory virtual directory: an owning, path-sorted collection of
//! (relative path, bytes) entries.
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::observer::ObserverRegistry;
use crate::path::RelativePath;

/// A single file entry: a validated relative path and its owned bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    pub relative_path: RelativePath,
    pub bytes: Buffer,
}

/// An exclusion rule: skip an exact relative path, or any path whose
/// extension (a trailing `.ext` suffix) matches.
#[derive(Debug, Clone)]
pub enum Exclusion {
    ExactPath(String),
    Extension(String),
}

impl Exclusion {
    fn matches(&self, relative_path: &str) -> bool {
        match self {
            Exclusion::ExactPath(p) => p == relative_path,
            Exclusion::Extension(ext) => relative_path.ends_with(ext.as_str()),
        }
    }
}

/// Build an exclusion from one of the spec's two textual forms: a string
/// starting with `.` is an extension suffix, anything else an exact path.
pub fn exclusion_from_str(spec: &str) -> Exclusion {
    if let Some(stripped) = spec.strip_prefix('.') {
        Exclusion::Extension(format!(".{}", stripped))
    } else {
        Exclusion::ExactPath(spec.to_string())
    }
}

fn is_excluded(relative_path: &str, exclusions: &[Exclusion]) -> bool {
    exclusions.iter().any(|e| e.matches(relative_path))
}

/// An in-memory, owning collection of path-sorted entries.
///
/// No two entries share a relative path; entries are kept sorted by path
/// at all times so that codec output is deterministic regardless of
/// filesystem walk order or import parallelism.
#[derive(Debug, Clone, Default)]
pub struct VirtualDirectory {
    name: String,
    entries: Vec<Entry>,
    observer: ObserverRegistry,
}

impl VirtualDirectory {
    /// An empty virtual directory with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: Vec::new(), observer: ObserverRegistry::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The progress/log observer attached to this directory. Empty (no
    /// subscribers) unless [`VirtualDirectory::set_observer`] was called;
    /// notifying an empty registry is a no-op.
    pub fn observer(&self) -> &ObserverRegistry {
        &self.observer
    }

    /// Attach an observer registry, e.g. one shared with other directories
    /// so their events interleave on a single subscriber.
    pub fn set_observer(&mut self, observer: ObserverRegistry) {
        self.observer = observer;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    pub fn byte_count(&self) -> usize {
        self.entries.iter().map(|e| e.bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, relative_path: &str) -> Option<&Entry> {
        self.entries.binary_search_by(|e| e.relative_path.as_str().cmp(relative_path)).ok().map(|i| &self.entries[i])
    }

    /// Fold (path-hash, content-fingerprint) over sorted entries. Fixed
    /// zero for an empty directory.
    pub fn hash(&self) -> u64 {
        fingerprint::fold(
            self.entries.iter().map(|e| (fingerprint::fingerprint(e.relative_path.as_str().as_bytes()), e.bytes.fingerprint())),
        )
    }

    fn insert_sorted(&mut self, entry: Entry) {
        match self.entries.binary_search_by(|e| e.relative_path.cmp(&entry.relative_path)) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    fn remove(&mut self, relative_path: &str) {
        if let Ok(i) = self.entries.binary_search_by(|e| e.relative_path.as_str().cmp(relative_path)) {
            self.entries.remove(i);
        }
    }

    /// Recursively walk `root`, adding every non-excluded file as an entry.
    /// Symlinks are resolved as files; an unreadable file aborts the whole
    /// import. Entries collected from independent subtrees are read on a
    /// short-lived worker pool and merged in sorted order, so import
    /// parallelism never affects the resulting directory.
    pub fn import_folder(&mut self, root: &Path, exclusions: &[Exclusion]) -> Result<()> {
        let mut paths = Vec::new();
        collect_files(root, root, exclusions, &mut paths, &self.observer)?;

        let worker_count = num_cpus::get().max(1).min(paths.len().max(1));
        let chunks: Vec<&[std::path::PathBuf]> = {
            let chunk_size = (paths.len() + worker_count - 1) / worker_count.max(1);
            if chunk_size == 0 { vec![&paths[..]] } else { paths.chunks(chunk_size.max(1)).collect() }
        };

        let results: Result<Vec<Vec<Entry>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|chunk| {
                    scope.spawn(move || -> Result<Vec<Entry>> {
                        let mut entries = Vec::with_capacity(chunk.len());
                        for path in chunk {
                            let relative = path.strip_prefix(root).unwrap();
                            let relative_path = RelativePath::from_host_relative(relative)
                                .ok_or(Error::CorruptFrame { reason: "path escapes import root" })?;
                            let bytes = fs::read(path)
                                .map_err(|cause| Error::IoFailure { path: Some(relative_path.clone()), cause })?;
                            entries.push(Entry { relative_path, bytes: Buffer::from_vec(bytes) });
                        }
                        Ok(entries)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("import worker panicked")).collect()
        });

        for chunk_entries in results? {
            for entry in chunk_entries {
                self.insert_sorted(entry);
            }
        }
        debug!(root = %root.display(), file_count = self.entries.len(), "imported folder");
        self.observer.notify(&format!("imported {} files from {}", self.entries.len(), root.display()));
        Ok(())
    }

    /// Write every entry to `root / relative_path`, creating intermediate
    /// directories and overwriting existing files. Each file is written to
    /// a sibling `.tmp` path and renamed into place, so a crash mid-write
    /// never leaves a truncated file at the destination.
    pub fn export_folder(&self, root: &Path) -> Result<()> {
        for entry in &self.entries {
            let dest = root.join(entry.relative_path.to_host_path());
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|cause| Error::IoFailure { path: Some(entry.relative_path.clone()), cause })?;
            }
            atomic_write(&dest, entry.bytes.as_slice())
                .map_err(|cause| Error::IoFailure { path: Some(entry.relative_path.clone()), cause })?;
        }
        self.observer.notify(&format!("exported {} files to {}", self.entries.len(), root.display()));
        Ok(())
    }

    /// Replace this directory's contents with the decoded entries from a
    /// package buffer, per [`crate::package::unpack`].
    pub fn import_package(&mut self, package: &[u8]) -> Result<()> {
        let (name, entries) = crate::package::unpack(package)?;
        self.observer.notify(&format!("unpacked {} files into '{}'", entries.len(), name));
        self.name = name;
        self.entries = entries;
        Ok(())
    }

    /// Serialize this directory into a Package buffer (§4.F of the wire
    /// format). Fails with [`Error::EmptyInput`] if there are no entries.
    pub fn export_package(&self) -> Result<Vec<u8>> {
        if self.entries.is_empty() {
            return Err(Error::EmptyInput);
        }
        let package = crate::package::pack(&self.name, &self.entries)?;
        self.observer.notify(&format!("packed {} files ({} bytes)", self.entries.len(), package.len()));
        Ok(package)
    }

    /// Apply a delta buffer produced by [`crate::delta::make_delta`]
    /// against an older snapshot of this directory.
    pub fn apply_delta(&mut self, delta: &[u8]) -> Result<()> {
        crate::patch::apply_delta(self, delta)
    }

    pub(crate) fn insert_or_replace(&mut self, entry: Entry) {
        self.insert_sorted(entry);
    }

    pub(crate) fn remove_path(&mut self, relative_path: &str) {
        self.remove(relative_path);
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    exclusions: &[Exclusion],
    out: &mut Vec<std::path::PathBuf>,
    observer: &ObserverRegistry,
) -> Result<()> {
    let read_dir = fs::read_dir(dir).map_err(|cause| Error::IoFailure { path: None, cause })?;
    for entry in read_dir {
        let entry = entry.map_err(|cause| Error::IoFailure { path: None, cause })?;
        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|cause| Error::IoFailure { path: None, cause })?;
        if metadata.is_dir() {
            collect_files(root, &path, exclusions, out, observer)?;
        } else {
            let relative = path.strip_prefix(root).unwrap();
            let relative_str = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            if is_excluded(&relative_str, exclusions) {
                // Exclusion is a non-fatal, caller-loggable event (never an
                // `Error`), so the only signal it produces is this line.
                observer.notify(&format!("excluding {}", relative_str));
                continue;
            }
            out.push(path);
        }
    }
    Ok(())
}

/// Write `bytes` to `path` via a sibling `.tmp` file plus rename, cleaning
/// up the temporary file if either step fails.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let result = fs::write(&tmp_path, bytes).and_then(|_| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
