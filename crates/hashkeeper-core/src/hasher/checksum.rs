use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::hasher::HashAlgorithm;

/// Outcome of checking a file against a stored checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub path: PathBuf,
    pub algorithm: HashAlgorithm,
    pub expected: String,
    pub actual: String,
    pub matched: bool,
}

/// Write a bare hex digest followed by a newline.
pub fn write_checksum(dest: &Path, hash: &str) -> Result<(), Error> {
    fs::write(dest, format!("{hash}\n"))?;
    Ok(())
}

/// Extract the expected digest from a checksum file.
///
/// Only the first line is considered and only its first whitespace-separated
/// token, so both bare digests and `sha256sum`-style `<hash>  <name>` lines
/// are accepted.
pub fn read_expected_digest(checksum_file: &Path) -> Result<String, Error> {
    let content = fs::read_to_string(checksum_file).map_err(|source| Error::Unreadable {
        path: checksum_file.to_path_buf(),
        source,
    })?;
    parse_expected_digest(&content)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidChecksumFile(checksum_file.to_path_buf()))
}

fn parse_expected_digest(content: &str) -> Option<&str> {
    content.lines().next()?.split_whitespace().next()
}

pub(crate) fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

/// Pick the algorithm that produced `digest`. `preferred` wins whenever its
/// output length fits, which also settles the sha256/blake3 tie.
pub fn algorithm_for_digest(digest: &str, preferred: HashAlgorithm) -> HashAlgorithm {
    if digest.len() == preferred.hex_len() {
        return preferred;
    }
    HashAlgorithm::ALL
        .into_iter()
        .find(|a| a.hex_len() == digest.len())
        .unwrap_or(preferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_digest_with_crlf() {
        assert_eq!(parse_expected_digest("ABCDEF\r\n"), Some("ABCDEF"));
    }

    #[test]
    fn test_parse_sha256sum_line() {
        assert_eq!(
            parse_expected_digest("deadbeef  report.pdf\nsecond line\n"),
            Some("deadbeef")
        );
    }

    #[test]
    fn test_parse_empty_and_blank_first_line() {
        assert_eq!(parse_expected_digest(""), None);
        assert_eq!(parse_expected_digest("   \nabc\n"), None);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        assert!(digests_match("ABCdef01", "abcdef01"));
        assert!(!digests_match("abcdef01", "abcdef02"));
    }

    #[test]
    fn test_algorithm_inferred_from_length() {
        let md5 = "900150983cd24fb0d6963f7d28e17f72";
        assert_eq!(algorithm_for_digest(md5, HashAlgorithm::Sha256), HashAlgorithm::Md5);
        let sha256 = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(algorithm_for_digest(sha256, HashAlgorithm::Blake3), HashAlgorithm::Blake3);
        assert_eq!(algorithm_for_digest(sha256, HashAlgorithm::Xxh64), HashAlgorithm::Sha256);
        assert_eq!(algorithm_for_digest("zz", HashAlgorithm::Sha1), HashAlgorithm::Sha1);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.sha256");
        write_checksum(&dest, "0123abcd").unwrap();
        assert_eq!(read_expected_digest(&dest).unwrap(), "0123abcd");
    }

    #[test]
    fn test_empty_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.sha256");
        fs::write(&dest, "").unwrap();
        assert!(matches!(
            read_expected_digest(&dest),
            Err(Error::InvalidChecksumFile(_))
        ));
    }
}
