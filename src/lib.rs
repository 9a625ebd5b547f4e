//! In-memory virtual directory packaging, diffing, and patching core.
//!
//! Data flow: obtain a [`VirtualDirectory`] from disk or from a package
//! buffer, then emit a package, diff it against another directory, or
//! apply a previously-computed delta to it in place.
mod buffer;
mod compressor;
mod delta;
mod directory;
mod error;
mod fingerprint;
mod header;
mod instruction;
mod observer;
mod package;
mod patch;
mod path;

pub use buffer::Buffer;
pub use delta::{make_delta, DeltaRecord};
pub use directory::{exclusion_from_str, Entry, Exclusion, VirtualDirectory};
pub use error::{Error, Result};
pub use instruction::Instruction;
pub use observer::{ObserverRegistry, ObserverToken};
pub use path::RelativePath;

/// Byte-level compress/decompress, exposed for callers that want the
/// sliding-window codec without going through a virtual directory.
pub mod compress {
    pub use crate::compressor::{compress, decompress};
}

#[cfg(test)]
pub mod tests {
    use std::{
        collections::BTreeSet,
        fmt, fs,
        path::{Path, PathBuf},
    };

    use tracing::log;

    pub fn init() {
        let _ =
            env_logger::builder().filter_level(log::LevelFilter::Debug).is_test(true).try_init();
    }

    #[derive(Eq, PartialEq)]
    pub struct Bytes<'a>(pub &'a [u8]);

    impl<'a> fmt::Debug for Bytes<'a> {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            fmt::Display::fmt(self, f)
        }
    }

    impl<'a> fmt::Display for Bytes<'a> {
        fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
            write!(fmt, "b\"")?;
            for &byte in self.0.iter() {
                if byte == b'\\' {
                    write!(fmt, r"\\")?;
                } else if !byte.is_ascii_control() {
                    write!(fmt, "{}", byte as char)?;
                } else {
                    write!(fmt, "\\x{:02x}", byte)?;
                }
            }
            write!(fmt, "\"")
        }
    }

    #[track_caller]
    pub fn assert_fs_eq(path0: &Path, path1: &Path) {
        let m0 = fs::metadata(path0).unwrap();
        let m1 = fs::metadata(path1).unwrap();
        if m0.is_file() && m1.is_file() {
            assert_eq!(
                Bytes(&fs::read(path0).unwrap()),
                Bytes(&fs::read(path1).unwrap()),
                "{:?} and {:?} content differ",
                path0,
                path1
            );
        } else if m0.is_dir() && m1.is_dir() {
            let dir0 = fs::read_dir(path0)
                .unwrap()
                .map(|res| res.map(|e| e.file_name()))
                .collect::<Result<BTreeSet<_>, _>>()
                .unwrap();
            let dir1 = fs::read_dir(path1)
                .unwrap()
                .map(|res| res.map(|e| e.file_name()))
                .collect::<Result<BTreeSet<_>, _>>()
                .unwrap();
            for e in dir0.difference(&dir1) {
                panic!("{:?} is not present in {:?}", e, path1);
            }
            for e in dir1.difference(&dir0) {
                panic!("{:?} is not present in {:?}", e, path0);
            }
            for (filename0, filename1) in dir0.iter().zip(dir1.iter()) {
                assert_fs_eq(&path0.join(filename0), &path1.join(filename1));
            }
        } else {
            panic!(
                "{:?} ({:?}) and {:?} ({:?}) aren't the same file types",
                path0,
                m0.file_type(),
                path1,
                m1.file_type()
            );
        }
    }

    /// A scratch directory that is removed when dropped, standing in for
    /// the crate's former baked-in `tests/data` fixture tree.
    pub fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }
}

#[cfg(test)]
mod integration_tests {
    use super::tests::*;
    use super::*;

    #[test]
    fn package_round_trip_preserves_file_and_byte_counts() {
        init();
        let root = tmp_dir();
        write_file(root.path(), "a.txt", &[1u8; 40_000]);
        write_file(root.path(), "b.txt", b"small file");
        write_file(root.path(), "nested/c.bin", &[7u8; 7_777]);

        let mut original = VirtualDirectory::new("demo");
        original.import_folder(root.path(), &[]).unwrap();
        let file_count = original.file_count();
        let byte_count = original.byte_count();

        let packed = original.export_package().unwrap();

        let mut restored = VirtualDirectory::new("demo");
        restored.import_package(&packed).unwrap();

        assert_eq!(restored.file_count(), file_count);
        assert_eq!(restored.byte_count(), byte_count);
        assert_eq!(restored.hash(), original.hash());
    }

    #[test]
    fn delta_round_trip_reaches_new_hash() {
        let old_root = tmp_dir();
        write_file(old_root.path(), "a.txt", b"version one of the file");
        write_file(old_root.path(), "keep.txt", b"never changes");
        let mut old = VirtualDirectory::new("demo");
        old.import_folder(old_root.path(), &[]).unwrap();

        let new_root = tmp_dir();
        write_file(new_root.path(), "a.txt", b"version two of the file, a bit longer");
        write_file(new_root.path(), "keep.txt", b"never changes");
        write_file(new_root.path(), "added.txt", b"brand new");
        let mut new = VirtualDirectory::new("demo");
        new.import_folder(new_root.path(), &[]).unwrap();

        let delta = make_delta(&old, &new).unwrap();
        let mut patched = old.clone();
        patched.apply_delta(&delta).unwrap();

        assert_eq!(patched.hash(), new.hash());
    }

    #[test]
    fn export_package_on_empty_directory_is_empty_input() {
        let directory = VirtualDirectory::new("demo");
        assert!(matches!(directory.export_package(), Err(Error::EmptyInput)));
    }

    #[test]
    fn import_package_rejects_empty_buffer() {
        let mut directory = VirtualDirectory::new("demo");
        assert!(matches!(directory.import_package(&[]), Err(Error::CorruptFrame { .. })));
    }

    #[test]
    fn empty_directory_has_zero_hash_nonempty_never_does() {
        let empty = VirtualDirectory::new("demo");
        assert_eq!(empty.hash(), 0);

        let root = tmp_dir();
        write_file(root.path(), "a.txt", b"anything");
        let mut nonempty = VirtualDirectory::new("demo");
        nonempty.import_folder(root.path(), &[]).unwrap();
        assert_ne!(nonempty.hash(), 0);
    }

    #[test]
    fn pack_is_deterministic_across_independent_runs() {
        let root = tmp_dir();
        write_file(root.path(), "a.txt", b"one");
        write_file(root.path(), "b.txt", b"two");
        write_file(root.path(), "c.txt", b"three");

        let mut first = VirtualDirectory::new("demo");
        first.import_folder(root.path(), &[]).unwrap();
        let mut second = VirtualDirectory::new("demo");
        second.import_folder(root.path(), &[]).unwrap();

        assert_eq!(first.export_package().unwrap(), second.export_package().unwrap());
    }
}
