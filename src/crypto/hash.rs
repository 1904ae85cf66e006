//! Hashing and encoding helpers
//!
//! SHA-256 based digests used for identifiers, signing data and execution
//! references, plus the Base58Check encoding shared by member and wallet
//! addresses.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes double SHA-256 hash and returns it as a hex string
pub fn double_sha256_hex(data: &[u8]) -> String {
    hex::encode(double_sha256(data))
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    ripemd.finalize().to_vec()
}

/// Base58Check encoding: `version || payload || checksum[..4]`
///
/// The checksum is the first four bytes of the double SHA-256 of
/// `version || payload`.
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(payload.len() + 5);
    bytes.push(version);
    bytes.extend_from_slice(payload);

    let checksum = double_sha256(&bytes);
    bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(bytes).into_string()
}

/// Short random-salted identifier (32 hex chars) derived from `seed`
pub fn unique_id(seed: &str) -> String {
    let nonce: u64 = rand::random();
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    let data = format!("{}:{}:{}", seed, nanos, nonce);
    hex::encode(&sha256(data.as_bytes())[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_double_sha256() {
        let data = b"hello world";
        assert_eq!(double_sha256(data).len(), 32);
        assert_eq!(double_sha256_hex(data).len(), 64);
    }

    #[test]
    fn test_hash160_length() {
        assert_eq!(hash160(b"member").len(), 20);
    }

    #[test]
    fn test_base58check_version_prefix() {
        // Version 0x05 over a 20-byte payload always encodes with a leading '3'
        let encoded = base58check_encode(0x05, &[0u8; 20]);
        assert!(encoded.starts_with('3'));

        let decoded = bs58::decode(&encoded).into_vec().unwrap();
        assert_eq!(decoded.len(), 25);
        assert_eq!(decoded[0], 0x05);
    }

    #[test]
    fn test_unique_id_differs() {
        let a = unique_id("same");
        let b = unique_id("same");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
