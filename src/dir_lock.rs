//! Advisory, whole-file, blocking exclusive lock on a queue directory's
//! `dir.lock` sentinel, plus the 16-byte fingerprint header it carries.
//!
//! Unlike a cross-process lock with a timeout, acquisition here blocks
//! indefinitely: there is no cancellation concept at this layer, matching a
//! queue handle's synchronous, non-async contract.

use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{QueueError, Result};

pub const SENTINEL_NAME: &str = "dir.lock";
pub const FINGERPRINT_LEN: usize = 16;

/// A fingerprint is never equal to a real one found on disk until the
/// sentinel has actually been written at least once, so the first
/// acquisition in a process always sees a mismatch and reloads.
pub const SENTINEL_FINGERPRINT: (u64, u64) = (u64::MAX, u64::MAX);

pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Opens (creating if necessary) and exclusively locks `dir`'s sentinel
    /// file. Blocks until the lock is available.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(SENTINEL_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| QueueError::io(e, &path))?;
        file.lock_exclusive().map_err(|e| QueueError::io(e, &path))?;
        Ok(Self { file, path })
    }

    /// Reads the fingerprint header, treating a missing or short-written
    /// sentinel as the sentinel fingerprint that never matches a real one.
    pub fn read_fingerprint(&mut self) -> Result<(u64, u64)> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| QueueError::io(e, &self.path))?;
        let mut buf = [0u8; FINGERPRINT_LEN];
        let mut filled = 0;
        loop {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(QueueError::io(e, &self.path)),
            }
        }
        if filled < FINGERPRINT_LEN {
            return Ok(SENTINEL_FINGERPRINT);
        }
        let count = u64::from_ne_bytes(buf[0..8].try_into().unwrap());
        let hash = u64::from_ne_bytes(buf[8..16].try_into().unwrap());
        Ok((count, hash))
    }

    pub fn write_fingerprint(&mut self, fingerprint: (u64, u64)) -> Result<()> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| QueueError::io(e, &self.path))?;
        let mut buf = [0u8; FINGERPRINT_LEN];
        buf[0..8].copy_from_slice(&fingerprint.0.to_ne_bytes());
        buf[8..16].copy_from_slice(&fingerprint.1.to_ne_bytes());
        self.file.write_all(&buf).map_err(|e| QueueError::io(e, &self.path))?;
        self.file.flush().map_err(|e| QueueError::io(e, &self.path))?;
        Ok(())
    }

    /// Computes the fingerprint for a directory snapshot: the segment count,
    /// plus a hash folding in the oldest and newest (head) segment numbers
    /// and the head segment's current on-disk size. The head size matters
    /// because two snapshots can share the same segment count and oldest
    /// number while the head has simply grown from an append that never
    /// rotated — without it, that growth would be invisible to a refresh
    /// comparing only segment-set topology. This is still not a content
    /// checksum (explicitly out of scope), only enough to notice that
    /// something rotated, was trimmed, or grew externally.
    pub fn compute_fingerprint(
        segment_count: u64,
        oldest_segment_number: u64,
        head_segment_number: u64,
        head_size: u64,
    ) -> (u64, u64) {
        let mut hasher = DefaultHasher::new();
        oldest_segment_number.hash(&mut hasher);
        head_segment_number.hash(&mut hasher);
        head_size.hash(&mut hasher);
        (segment_count, hasher.finish())
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_sentinel_reads_as_sentinel_fingerprint() {
        let dir = tempdir().unwrap();
        let mut lock = DirLock::acquire(dir.path()).unwrap();
        assert_eq!(lock.read_fingerprint().unwrap(), SENTINEL_FINGERPRINT);
    }

    #[test]
    fn fingerprint_round_trips() {
        let dir = tempdir().unwrap();
        let mut lock = DirLock::acquire(dir.path()).unwrap();
        lock.write_fingerprint((3, 7)).unwrap();
        assert_eq!(lock.read_fingerprint().unwrap(), (3, 7));
    }

    #[test]
    fn second_acquire_blocks_until_first_drops() {
        let dir = tempdir().unwrap();
        let guard = DirLock::acquire(dir.path()).unwrap();
        let second = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let second_clone = second.clone();
        let path = dir.path().to_path_buf();
        let handle = std::thread::spawn(move || {
            let _g = DirLock::acquire(&path).unwrap();
            second_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!second.load(std::sync::atomic::Ordering::SeqCst));
        drop(guard);
        handle.join().unwrap();
        assert!(second.load(std::sync::atomic::Ordering::SeqCst));
    }
}
