use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn verify_sha256(bytes: &[u8], expected_hex: &str) -> bool {
    sha256_hex(bytes).eq_ignore_ascii_case(expected_hex.trim())
}

/// Streams the reader through SHA-256 and returns the lowercase hex digest when it
/// matches, or an error naming both digests when it does not.
pub fn verify_sha256_reader<R: Read>(reader: R, expected_hex: &str) -> Result<String> {
    let mut reader = BufReader::new(reader);
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buf).context("failed to read payload for hashing")?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected_hex.trim()) {
        anyhow::bail!(
            "sha256 mismatch: expected {}, got {}",
            expected_hex.trim(),
            actual
        );
    }
    Ok(actual)
}

pub fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    verify_sha256_reader(file, expected_hex)
        .with_context(|| format!("checksum verification failed for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(sha256_hex(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn verify_sha256_is_case_insensitive() {
        assert!(verify_sha256(b"hello", &HELLO_SHA256.to_ascii_uppercase()));
        assert!(!verify_sha256(b"hello!", HELLO_SHA256));
    }

    #[test]
    fn verify_sha256_reader_reports_mismatch() {
        let ok = verify_sha256_reader(&b"hello"[..], HELLO_SHA256).expect("digest must match");
        assert_eq!(ok, HELLO_SHA256);

        let err = verify_sha256_reader(&b"tampered"[..], HELLO_SHA256)
            .expect_err("tampered payload must fail");
        assert!(err.to_string().contains("sha256 mismatch"));
    }
}
