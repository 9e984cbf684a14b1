//! SHA256 content digests
//!
//! Digests identify blobs by the hash of their exact bytes. A [`Digest`] is either
//! computed from data with [`Digest::of`] or parsed from a string found in an archive;
//! it is never attached to a blob by hand.

use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Read};

/// Digest of zero bytes
pub const EMPTY_DIGEST: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const SHA256_PREFIX: &str = "sha256:";

/// A `sha256:<hex>` content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Compute the digest of a byte slice
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(format!("{}{}", SHA256_PREFIX, hex::encode(hasher.finalize())))
    }

    /// Compute the digest of everything a reader yields
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Self(format!(
            "{}{}",
            SHA256_PREFIX,
            hex::encode(hasher.finalize())
        )))
    }

    /// Validate a full `sha256:<64 hex>` digest string
    pub fn parse(digest: &str) -> Option<Self> {
        let hex_part = digest.strip_prefix(SHA256_PREFIX)?;
        Self::from_hex(hex_part)
    }

    /// Build a digest from its bare hex part
    pub fn from_hex(hex_part: &str) -> Option<Self> {
        if is_valid_sha256_hex(hex_part) {
            Some(Self(format!(
                "{}{}",
                SHA256_PREFIX,
                hex_part.to_ascii_lowercase()
            )))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex part without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.0[SHA256_PREFIX.len()..]
    }

    /// Path of the blob in an OCI image layout
    pub fn blob_path(&self) -> String {
        format!("blobs/sha256/{}", self.hex())
    }

    /// Truncated form for display
    pub fn short(&self) -> &str {
        &self.0[..SHA256_PREFIX.len() + 12]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate SHA256 hex string (64 characters, all hex)
pub fn is_valid_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
}

/// Extract the content digest a blob's archive path is named after.
///
/// Recognized forms:
/// - `blobs/sha256/<hex>` (OCI layout, recent `docker save`)
/// - `<hex>.json`, `<hex>.tar`, `<hex>.tar.gz` (digest-named files)
/// - `sha256:<hex>`
///
/// Legacy `<id>/layer.tar` paths are named after a layer ID, not a content
/// digest, and yield `None`.
pub fn digest_from_path(path: &str) -> Option<Digest> {
    if let Some(hex_part) = path.strip_prefix("blobs/sha256/") {
        return Digest::from_hex(hex_part);
    }
    if let Some(digest) = Digest::parse(path) {
        return Some(digest);
    }
    if path.contains('/') {
        return None;
    }
    [".json", ".tar.gz", ".tar"]
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .and_then(Digest::from_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

    #[test]
    fn test_known_digests() {
        assert_eq!(Digest::of(b"").as_str(), EMPTY_DIGEST);
        assert_eq!(Digest::of(b"foo").hex(), HEX);
        assert_eq!(
            Digest::of_reader(&b"foo"[..]).unwrap(),
            Digest::of(b"foo")
        );
    }

    #[test]
    fn test_gzip_digest_is_over_compressed_bytes() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let tar_data = b"dummy tar layer content for test";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(tar_data).unwrap();
        let gzipped = encoder.finish().unwrap();

        assert_ne!(Digest::of(&gzipped), Digest::of(tar_data));
    }

    #[test]
    fn test_parse_rejects_bad_digests() {
        assert!(Digest::parse(&format!("sha256:{}", HEX)).is_some());
        assert!(Digest::parse(HEX).is_none());
        assert!(Digest::parse("sha256:abc").is_none());
        assert!(Digest::parse(&format!("sha512:{}", HEX)).is_none());
    }

    #[test]
    fn test_digest_from_path() {
        let expected = Digest::from_hex(HEX).unwrap();
        for path in [
            format!("blobs/sha256/{}", HEX),
            format!("{}.json", HEX),
            format!("{}.tar", HEX),
            format!("{}.tar.gz", HEX),
            format!("sha256:{}", HEX),
        ] {
            assert_eq!(digest_from_path(&path), Some(expected.clone()), "{}", path);
        }
        assert_eq!(digest_from_path(&format!("{}/layer.tar", HEX)), None);
        assert_eq!(digest_from_path("manifest.json"), None);
    }

    #[test]
    fn test_blob_path_and_short() {
        let digest = Digest::of(b"foo");
        assert_eq!(digest.blob_path(), format!("blobs/sha256/{}", HEX));
        assert_eq!(digest.short(), "sha256:2c26b46b68ff");
    }
}
