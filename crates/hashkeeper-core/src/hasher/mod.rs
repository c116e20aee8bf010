pub mod checksum;
pub mod digest;

pub use checksum::{read_expected_digest, write_checksum, Verification};
pub use digest::{
    digest_bytes, digest_file, AlgorithmProfile, HashAlgorithm, ParseAlgorithmError,
    MAX_HEX_LEN,
};
