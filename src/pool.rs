//! Pool façade: dispatches to per-identifier sub-queue directories.
//!
//! A pool's sub-queues live at `<base_dir>/<percent-encoded-id>.q`. A nested
//! pool (a pool of pools) needs no separate type — `Pool::sub_queue_path`
//! exposes the sub-directory a given identifier resolves to, and opening
//! another `Pool` rooted there composes naturally.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{QueueError, Result};
use crate::options::QueueOptions;
use crate::path_encode;
use crate::queue::Queue;

pub struct Pool {
    base_dir: PathBuf,
    options: QueueOptions,
    queues: Mutex<HashMap<String, Queue>>,
}

impl Pool {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(base_dir, QueueOptions::default())
    }

    pub fn open_with_options(base_dir: impl AsRef<Path>, options: QueueOptions) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).map_err(|e| QueueError::io(e, &base_dir))?;
        Ok(Self {
            base_dir,
            options,
            queues: Mutex::new(HashMap::new()),
        })
    }

    /// The on-disk sub-queue directory for `id`, whether or not it exists
    /// yet. Useful for composing a nested pool: `Pool::open(parent.sub_queue_path(id))`.
    pub fn sub_queue_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(path_encode::sub_queue_dir_name(id))
    }

    fn queue_for(&self, id: &str) -> Result<Queue> {
        let mut queues = self.queues.lock();
        if let Some(q) = queues.get(id) {
            return Ok(q.clone());
        }
        let dir = self.sub_queue_path(id);
        fs::create_dir_all(&dir).map_err(|e| QueueError::io(e, &dir))?;
        let q = Queue::open_with_options(dir, self.options)?;
        queues.insert(id.to_string(), q.clone());
        Ok(q)
    }

    pub fn push(&self, id: &str, payload: &[u8]) -> Result<()> {
        self.queue_for(id)?.push(payload)
    }

    pub fn pop(&self, id: &str) -> Result<Vec<u8>> {
        if !self.sub_queue_path(id).is_dir() {
            return Err(QueueError::Underflow);
        }
        let q = self.queue_for(id)?;
        let value = q.pop()?;
        if q.is_empty()? {
            self.remove(id)?;
        }
        Ok(value)
    }

    pub fn size(&self, id: &str) -> Result<u64> {
        if !self.sub_queue_path(id).is_dir() {
            return Ok(0);
        }
        self.queue_for(id)?.size()
    }

    pub fn is_empty(&self, id: &str) -> Result<bool> {
        Ok(self.size(id)? == 0)
    }

    /// Deletes a sub-queue entirely, including its directory.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.queues.lock().remove(id);
        let dir = self.sub_queue_path(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::io(e, &dir)),
        }
    }

    /// Identifiers of every sub-queue directory currently on disk.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_dir).map_err(|e| QueueError::io(e, &self.base_dir))? {
            let entry = entry.map_err(|e| QueueError::io(e, &self.base_dir))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Some(encoded) = name.strip_suffix(".q") {
                    ids.push(path_encode::decode(encoded)?);
                }
            }
        }
        Ok(ids)
    }

    /// Sum of every sub-queue's `size()`.
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for id in self.ids()? {
            total += self.size(&id)?;
        }
        Ok(total)
    }

    pub fn is_empty_pool(&self) -> Result<bool> {
        Ok(self.total_size()? == 0)
    }

    /// Deletes every sub-queue, leaving the pool's base directory empty.
    pub fn clear(&self) -> Result<()> {
        for id in self.ids()? {
            self.remove(&id)?;
        }
        Ok(())
    }
}
