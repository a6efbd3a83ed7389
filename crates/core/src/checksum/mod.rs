//! Content digests and checksum manifests.
//!
//! Every submission directory carries one `*.md5sum` manifest listing the
//! expected MD5 digest of each data file, in `md5sum` output format:
//!
//! ```text
//! 0cc175b9c0f1b6a831c399e269772661  a.txt
//! 92eb5ffee6ae2fec3ad71c777531578f  seq.fasta
//! ```
//!
//! MD5 is kept for compatibility with manifests produced upstream. The check
//! guards against transfer corruption, not tampering.

mod digest;
mod error;
mod manifest;

pub use digest::{digest_file, digest_reader, digests_match, verify, CHUNK_SIZE};
pub use error::ChecksumError;
pub use manifest::{
    find_manifest, is_manifest_file, load_manifest, ChecksumManifest, MANIFEST_EXTENSION,
};
