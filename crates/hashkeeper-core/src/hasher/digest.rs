use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use twox_hash::XxHash64;

use crate::error::Error;

/// Bytes read per `read` call while streaming a file into an accumulator.
const CHUNK_SIZE: usize = 64 * 1024;

/// Longest hex digest any supported algorithm produces.
pub const MAX_HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Xxh64,
    Md5,
    Sha1,
    Sha256,
    Blake3,
}

/// Coarse algorithm choice exposed to front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmProfile {
    Fast,
    Default,
    Strong,
}

impl From<AlgorithmProfile> for HashAlgorithm {
    fn from(profile: AlgorithmProfile) -> Self {
        match profile {
            AlgorithmProfile::Fast => HashAlgorithm::Xxh64,
            AlgorithmProfile::Default => HashAlgorithm::Sha256,
            AlgorithmProfile::Strong => HashAlgorithm::Blake3,
        }
    }
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Xxh64,
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Blake3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Xxh64 => "xxh64",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn digest_size(self) -> usize {
        match self {
            HashAlgorithm::Xxh64 => 8,
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 | HashAlgorithm::Blake3 => 32,
        }
    }

    pub fn hex_len(self) -> usize {
        self.digest_size() * 2
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown hash algorithm '{0}' (expected one of xxh64, md5, sha1, sha256, blake3, fast, default, strong)")]
pub struct ParseAlgorithmError(String);

impl FromStr for HashAlgorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "xxh64" | "xxhash" | "fast" => Ok(AlgorithmProfile::Fast.into()),
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" | "default" => Ok(AlgorithmProfile::Default.into()),
            "blake3" | "strong" => Ok(AlgorithmProfile::Strong.into()),
            _ => Err(ParseAlgorithmError(s.to_string())),
        }
    }
}

/// Incremental digest state for one of the supported algorithms.
enum Accumulator {
    Xxh64(XxHash64),
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Accumulator {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh64 => Accumulator::Xxh64(XxHash64::with_seed(0)),
            HashAlgorithm::Md5 => Accumulator::Md5(Md5::new()),
            HashAlgorithm::Sha1 => Accumulator::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Accumulator::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Accumulator::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Accumulator::Xxh64(h) => h.write(data),
            Accumulator::Md5(h) => h.update(data),
            Accumulator::Sha1(h) => h.update(data),
            Accumulator::Sha256(h) => h.update(data),
            Accumulator::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            // Big-endian so the hex reads the same as `xxhsum` output.
            Accumulator::Xxh64(h) => hex::encode(h.finish().to_be_bytes()),
            Accumulator::Md5(h) => hex::encode(h.finalize()),
            Accumulator::Sha1(h) => hex::encode(h.finalize()),
            Accumulator::Sha256(h) => hex::encode(h.finalize()),
            Accumulator::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Stream `path` through `algorithm` and return the lowercase hex digest.
///
/// Any open or read failure is reported as [`Error::Unreadable`]; there is no
/// retry.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, Error> {
    let unreadable = |source| Error::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(unreadable)?;
    let mut acc = Accumulator::new(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(unreadable(e)),
        };
        acc.update(&buffer[..bytes_read]);
    }
    Ok(acc.finalize_hex())
}

/// Digest an in-memory buffer.
pub fn digest_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut acc = Accumulator::new(algorithm);
    acc.update(data);
    acc.finalize_hex()
}
