//! Single, uniform fast non-cryptographic 64-bit hash.
//!
//! Used for `Buffer::fingerprint`, per-entry content hashes, and the
//! directory hash fold. One algorithm, one seed, used everywhere a
//! "fingerprint" is called for: no adversarial resistance is required,
//! only that equal bytes fingerprint equally.
use xxhash_rust::xxh64::xxh64;

const SEED: u64 = 0;

/// Fingerprint an arbitrary byte slice.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    xxh64(bytes, SEED)
}

/// Fold a sequence of (path, content fingerprint) pairs into a single
/// directory-level hash. Empty input folds to the fixed zero identity.
pub fn fold(entries: impl Iterator<Item = (u64, u64)>) -> u64 {
    entries.fold(0u64, |acc, (path_hash, content_hash)| {
        // Callers always fold in path-sorted order, so directories with
        // the same entries in different on-disk order hash identically.
        let mut acc = acc ^ path_hash.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        acc ^= content_hash.wrapping_add(0xC2B2_AE3D_27D4_EB4F);
        acc = acc.rotate_left(29);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fold_is_zero() {
        assert_eq!(fold(std::iter::empty()), 0);
    }

    #[test]
    fn equal_bytes_fingerprint_equally() {
        assert_eq!(fingerprint(b"hello world"), fingerprint(b"hello world"));
        assert_ne!(fingerprint(b"hello world"), fingerprint(b"hello worlD"));
    }

    #[test]
    fn nonempty_fold_never_zero_for_distinct_seed() {
        let v = fold(std::iter::once((fingerprint(b"a"), fingerprint(b"b"))));
        assert_ne!(v, 0);
    }
}
