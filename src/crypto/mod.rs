//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing and Base58Check encoding
//! - secp256k1 member key management

pub mod hash;
pub mod keys;

pub use hash::{
    base58check_encode, double_sha256, double_sha256_hex, hash160, sha256, sha256_hex, unique_id,
};
pub use keys::{public_key_to_address, sign_message, verify_signature, KeyError, KeyPair};
