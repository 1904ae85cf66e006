//! Storage module for multisig state persistence

pub mod persistence;

pub use persistence::{DirLock, Storage, StorageConfig, StorageError};
