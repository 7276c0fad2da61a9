// Persistent storage region
// Byte-addressable read/write with an explicit commit, EEPROM-emulation style:
// writes land in a RAM cache and only reach flash on `commit`.

use log::debug;

/// Errors raised by a storage region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    ReadFailed(String),
    WriteFailed(String),
    CommitFailed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::OutOfBounds {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "Access of {} bytes at offset {} exceeds storage capacity {}",
                len, offset, capacity
            ),
            StorageError::ReadFailed(msg) => write!(f, "Storage read failed: {}", msg),
            StorageError::WriteFailed(msg) => write!(f, "Storage write failed: {}", msg),
            StorageError::CommitFailed(msg) => write!(f, "Storage commit failed: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// A fixed-size, byte-addressable persistent region
pub trait Storage {
    /// Size of the addressable region in bytes
    fn capacity(&self) -> usize;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Stage bytes; they are not durable until `commit`
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Flush staged bytes to the backing medium
    fn commit(&mut self) -> Result<(), StorageError>;
}

pub(crate) fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<(), StorageError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StorageError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// RAM-backed storage region used by the simulation platform and tests.
///
/// Keeps the staged cache and the committed image apart so callers can
/// observe exactly what would survive a power cycle.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    staged: Vec<u8>,
    committed: Vec<u8>,
    commit_count: u32,
    fail_commits: bool,
}

impl MemoryStorage {
    /// Fresh region, as shipped from the factory (all 0xFF like erased flash)
    pub fn new(capacity: usize) -> Self {
        Self::from_image(vec![0xFF; capacity])
    }

    /// Region pre-loaded with a committed image
    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            staged: image.clone(),
            committed: image,
            commit_count: 0,
            fail_commits: false,
        }
    }

    /// Place bytes directly into the committed image, as a flashing tool would
    pub fn preload(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, bytes.len(), self.committed.len())?;
        self.committed[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.staged[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Bytes that survived the last commit
    pub fn committed(&self) -> &[u8] {
        &self.committed
    }

    pub fn commit_count(&self) -> u32 {
        self.commit_count
    }

    /// Make every following commit fail (simulates a worn or locked flash)
    pub fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Drop staged changes, as a power cycle would
    pub fn power_cycle(&mut self) {
        self.staged = self.committed.clone();
    }
}

impl Storage for MemoryStorage {
    fn capacity(&self) -> usize {
        self.staged.len()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), self.staged.len())?;
        buf.copy_from_slice(&self.staged[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), self.staged.len())?;
        self.staged[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.fail_commits {
            return Err(StorageError::CommitFailed("simulated flash failure".to_string()));
        }
        self.committed.copy_from_slice(&self.staged);
        self.commit_count += 1;
        debug!("💾 Memory storage committed ({} bytes)", self.committed.len());
        Ok(())
    }
}
