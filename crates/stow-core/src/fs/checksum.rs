//! Content checksums for artifact integrity verification.
//!
//! Checksums are lowercase hex blake3 digests, the format stored in the
//! `download.checksum.blake3` descriptor property.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::Context;

/// Hex blake3 digest of `bytes`.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hex blake3 digest of a file, streamed rather than read into memory.
pub fn checksum_file(path: &Path) -> anyhow::Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compare a computed digest against an expected one (case-insensitive hex).
pub fn verify_checksum(expected: &str, actual: &str) -> anyhow::Result<()> {
    if !expected.eq_ignore_ascii_case(actual) {
        anyhow::bail!("Checksum mismatch: expected {}, got {}", expected, actual);
    }
    Ok(())
}
