//! Multisig state persistence
//!
//! Saves and loads the wallet, proposal and signature collections as one
//! JSON document.
//!
//! Within a process, saves are serialized and each one snapshots the manager
//! while holding the write lock, so the file never goes back to older state.
//! Across processes, a [`DirLock`] gives one process at a time ownership of
//! the data directory.

use crate::multisig::{ActionExecutor, MultisigManager, MultisigSnapshot};
use fs2::FileExt;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;

/// Delay between attempts to take the directory lock
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Data directory {0:?} is locked by another process")]
    Locked(PathBuf),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub state_file: String,
    pub lock_file: String,
    /// How long [`Storage::lock`] waits for another holder
    pub lock_timeout: Duration,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".multisig_data"),
            state_file: "multisig.json".to_string(),
            lock_file: "multisig.lock".to_string(),
            lock_timeout: Duration::from_secs(5),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// Exclusive hold on a data directory, released on drop
#[derive(Debug)]
pub struct DirLock {
    file: fs::File,
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release data directory lock: {}", e);
        }
    }
}

/// Multisig state storage
#[derive(Debug)]
pub struct Storage {
    config: StorageConfig,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Create storage rooted at `data_dir` with default settings
    pub fn in_dir(data_dir: &Path) -> Result<Self, StorageError> {
        Self::new(StorageConfig {
            data_dir: data_dir.to_path_buf(),
            ..Default::default()
        })
    }

    fn state_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.state_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.state_file, index))
    }

    /// Take the data directory lock without waiting
    ///
    /// # Errors
    /// `Locked` if another holder (in this or any other process) has it
    pub fn try_lock(&self) -> Result<DirLock, StorageError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.config.data_dir.join(&self.config.lock_file))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(DirLock { file }),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(StorageError::Locked(self.config.data_dir.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take the data directory lock, waiting up to the configured timeout
    pub async fn lock(&self) -> Result<DirLock, StorageError> {
        let deadline = Instant::now() + self.config.lock_timeout;
        loop {
            match self.try_lock() {
                Err(StorageError::Locked(_)) if Instant::now() < deadline => {
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                result => return result,
            }
        }
    }

    /// Save a snapshot to disk
    pub async fn save(&self, snapshot: &MultisigSnapshot) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(snapshot)
    }

    /// Save the manager's current state
    pub async fn save_manager(&self, manager: &MultisigManager) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        // Snapshot under the lock: a save that writes later also read later
        let snapshot = manager.snapshot().await;
        self.write_snapshot(&snapshot)
    }

    fn write_snapshot(&self, snapshot: &MultisigSnapshot) -> Result<(), StorageError> {
        let path = self.state_path();

        if self.config.backup_enabled && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        // Write to a uniquely named temporary file first
        let mut temp = NamedTempFile::new_in(&self.config.data_dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }

        // Atomic rename
        temp.persist(&path).map_err(|e| e.error)?;

        log::debug!(
            "Saved {} wallets, {} proposals, {} signatures to {:?}",
            snapshot.wallets.len(),
            snapshot.proposals.len(),
            snapshot.signatures.len(),
            path
        );

        Ok(())
    }

    /// Load the saved snapshot
    pub fn load(&self) -> Result<MultisigSnapshot, StorageError> {
        let path = self.state_path();

        if !path.exists() {
            return Err(StorageError::InvalidData(format!(
                "State file not found: {:?}",
                path
            )));
        }

        read_snapshot(&path)
    }

    /// Load a manager, or start an empty one if nothing is saved yet
    pub fn load_manager(
        &self,
        executor: Arc<dyn ActionExecutor>,
    ) -> Result<MultisigManager, StorageError> {
        if self.exists() {
            Ok(MultisigManager::from_snapshot(self.load()?, executor))
        } else {
            Ok(MultisigManager::new(executor))
        }
    }

    /// Check if saved state exists
    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    fn rotate_backups(&self) -> Result<(), StorageError> {
        if self.config.max_backups == 0 {
            return Ok(());
        }

        // Delete oldest backup
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        // Shift existing backups
        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        Ok(())
    }

    /// Load a snapshot from a backup
    pub fn restore_backup(&self, backup_index: usize) -> Result<MultisigSnapshot, StorageError> {
        let backup_path = self.backup_path(backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }

        read_snapshot(&backup_path)
    }

    /// List available backups
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }
}

fn read_snapshot(path: &Path) -> Result<MultisigSnapshot, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
