//! `Upload-Checksum` support: `<algorithm> <base64 digest>` of one PATCH body.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256, Sha512};
use std::str::FromStr;

pub const SUPPORTED_ALGORITHMS: &str = "sha256,sha512";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(ChecksumError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("malformed Upload-Checksum header")]
    Malformed,
}

/// Checksum a client declared for a single chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkChecksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: Vec<u8>,
}

impl ChunkChecksum {
    pub fn parse(header: &str) -> Result<Self, ChecksumError> {
        let (algorithm, encoded) = header
            .trim()
            .split_once(' ')
            .ok_or(ChecksumError::Malformed)?;
        let algorithm = algorithm.parse()?;
        let digest = STANDARD
            .decode(encoded.trim())
            .map_err(|_| ChecksumError::Malformed)?;
        Ok(Self { algorithm, digest })
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        match self.algorithm {
            ChecksumAlgorithm::Sha256 => Sha256::digest(data).as_slice() == self.digest.as_slice(),
            ChecksumAlgorithm::Sha512 => Sha512::digest(data).as_slice() == self.digest.as_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(algorithm: &str, digest: &[u8]) -> String {
        format!("{} {}", algorithm, STANDARD.encode(digest))
    }

    #[test]
    fn sha256_checksum_matches_its_data() {
        let data = b"chunk of an x-ray";
        let checksum = ChunkChecksum::parse(&header_for("sha256", &Sha256::digest(data))).unwrap();
        assert_eq!(checksum.algorithm, ChecksumAlgorithm::Sha256);
        assert!(checksum.matches(data));
        assert!(!checksum.matches(b"different bytes"));
    }

    #[test]
    fn sha512_is_supported() {
        let data = b"lab report";
        let checksum = ChunkChecksum::parse(&header_for("SHA512", &Sha512::digest(data))).unwrap();
        assert!(checksum.matches(data));
    }

    #[test]
    fn rejects_unknown_algorithm_and_garbage() {
        assert_eq!(
            ChunkChecksum::parse("md5 AAAA"),
            Err(ChecksumError::UnsupportedAlgorithm("md5".to_string()))
        );
        assert_eq!(ChunkChecksum::parse("sha256"), Err(ChecksumError::Malformed));
        assert_eq!(
            ChunkChecksum::parse("sha256 ***"),
            Err(ChecksumError::Malformed)
        );
    }
}
