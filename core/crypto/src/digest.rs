//! Content digests for backup artifacts.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use subtle::ConstantTimeEq;

/// BLAKE2b-256 digest of `data`, as lowercase hex.
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Blake2b::<U32>::digest(data))
}

/// Check `data` against a digest produced by [`content_digest`].
pub fn verify_digest(data: &[u8], expected: &str) -> bool {
    let actual = content_digest(data);
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}
