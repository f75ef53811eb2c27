//! Record identifier derivation.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a record identifier.
const ID_BYTES: usize = 16;

/// Derive the record identifier for a normalized manifest URL.
///
/// The identifier is the hex encoding of the first 16 bytes of the SHA-256
/// digest of the URL, so resubmitting the same URL always addresses the same
/// record.
pub fn compute_pwa_id(manifest_url: &str) -> String {
    let digest = Sha256::digest(manifest_url.as_bytes());
    hex::encode(&digest[..ID_BYTES])
}
