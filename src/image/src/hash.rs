//! Content-addressing digests.
//!
//! A [`Hash`] names a blob by algorithm and hex digest, rendered as
//! `sha256:<64 hex chars>` on the wire.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use strata_core::error::{Result, StrataError};

/// The only supported hash algorithm.
pub const SHA256: &str = "sha256";

const SHA256_HEX_LEN: usize = 64;

/// An algorithm-tagged digest identifying a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash {
    algorithm: String,
    hex: String,
}

impl Hash {
    /// Hash an in-memory buffer with SHA256.
    pub fn sha256_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_sha256(hasher)
    }

    /// Hash everything `reader` yields, returning the digest and byte count.
    pub fn sha256_reader(mut reader: impl Read) -> std::io::Result<(Self, u64)> {
        let mut writer = HashingWriter::new(std::io::sink());
        std::io::copy(&mut reader, &mut writer)?;
        Ok(writer.finish())
    }

    fn from_sha256(hasher: Sha256) -> Self {
        Self {
            algorithm: SHA256.to_string(),
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Hash algorithm name (e.g. `sha256`).
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Lower-case hex digest.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Hash {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| StrataError::InvalidDigest(format!("missing algorithm in '{}'", s)))?;

        if algorithm != SHA256 {
            return Err(StrataError::InvalidDigest(format!(
                "unsupported algorithm '{}' in '{}'",
                algorithm, s
            )));
        }
        if hex.len() != SHA256_HEX_LEN {
            return Err(StrataError::InvalidDigest(format!(
                "expected {} hex characters, got {} in '{}'",
                SHA256_HEX_LEN,
                hex.len(),
                s
            )));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StrataError::InvalidDigest(format!(
                "non-hex characters in '{}'",
                s
            )));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_ascii_lowercase(),
        })
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A `Write` adapter that hashes and counts the bytes passed to the inner writer.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Digest and byte count of everything written so far.
    pub fn finish(self) -> (Hash, u64) {
        (Hash::from_sha256(self.hasher), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str =
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_sha256_bytes_empty() {
        assert_eq!(Hash::sha256_bytes(b"").to_string(), EMPTY_SHA256);
    }

    #[test]
    fn test_sha256_reader_matches_bytes() {
        let data = b"hello layers";
        let (hash, size) = Hash::sha256_reader(&data[..]).unwrap();
        assert_eq!(hash, Hash::sha256_bytes(data));
        assert_eq!(size, data.len() as u64);
    }

    #[test]
    fn test_parse_round_trip() {
        let hash: Hash = EMPTY_SHA256.parse().unwrap();
        assert_eq!(hash.algorithm(), "sha256");
        assert_eq!(hash.to_string(), EMPTY_SHA256);
    }

    #[test]
    fn test_parse_normalizes_case() {
        let upper = EMPTY_SHA256.replace("e3b0", "E3B0");
        let hash: Hash = upper.parse().unwrap();
        assert_eq!(hash, Hash::sha256_bytes(b""));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("e3b0c442".parse::<Hash>().is_err());
        assert!("md5:e3b0c44298fc1c149afbf4c8996fb924".parse::<Hash>().is_err());
        assert!("sha256:abc".parse::<Hash>().is_err());

        let err = format!("sha256:{}", "z".repeat(64)).parse::<Hash>().unwrap_err();
        assert!(matches!(err, StrataError::InvalidDigest(_)));
    }

    #[test]
    fn test_serde_as_string() {
        let hash = Hash::sha256_bytes(b"");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", EMPTY_SHA256));

        let parsed: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);

        assert!(serde_json::from_str::<Hash>("\"sha256:nothex\"").is_err());
    }

    #[test]
    fn test_hashing_writer_passes_bytes_through() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"def").unwrap();
        let inner = writer.inner.clone();
        let (hash, written) = writer.finish();

        assert_eq!(inner, b"abcdef");
        assert_eq!(written, 6);
        assert_eq!(hash, Hash::sha256_bytes(b"abcdef"));
    }
}
