//! Content fingerprints for skills and dependent files.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::metadata::canonical_json;
use crate::skill::Frontmatter;

const HASH_PREFIX: &str = "sha256-";

/// Fingerprint of a skill's full state.
///
/// Folds the canonical JSON of the core frontmatter, the body and the
/// dependent files (sorted by path) into one SHA-256 digest. Every segment is
/// length-prefixed, so no body can pose as a file entry.
pub fn fingerprint(core: &Frontmatter, body: &str, files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    update_segment(&mut hasher, canonical_json(core).as_bytes());
    update_segment(&mut hasher, body.as_bytes());
    hasher.update((files.len() as u64).to_be_bytes());
    for (path, file_hash) in files {
        update_segment(&mut hasher, path.as_bytes());
        update_segment(&mut hasher, file_hash.as_bytes());
    }
    tagged(&hasher.finalize())
}

fn update_segment(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Fingerprint of raw file content.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    tagged(&hasher.finalize())
}

pub fn hash_matches(a: &str, b: &str) -> bool {
    a == b
}

fn tagged(digest: &[u8]) -> String {
    format!("{HASH_PREFIX}{}", hex::encode(digest))
}
