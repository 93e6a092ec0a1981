//! Process-wide per-path singleton registry.
//!
//! Two calls that open "the same" queue directory — whether by identical
//! path, a relative versus absolute spelling, or a symlink — must resolve
//! to one shared `Arc<StorageEngine>` so in-process callers serialize
//! through the same mutexes rather than racing two independent views of the
//! same files.

use std::path::Path;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use same_file::Handle;

use crate::error::{QueueError, Result};
use crate::options::QueueOptions;
use crate::storage::StorageEngine;

struct Entry {
    handle: Handle,
    weak: Weak<StorageEngine>,
}

static REGISTRY: Lazy<Mutex<Vec<Entry>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Returns the shared storage engine for `dir`, opening it if this is the
/// first reference in this process, or reusing an existing one if another
/// handle already has it open.
pub fn acquire(dir: &Path, options: QueueOptions) -> Result<Arc<StorageEngine>> {
    if !dir.is_dir() {
        return Err(QueueError::Domain {
            reason: "queue directory does not exist",
        });
    }
    let handle = Handle::from_path(dir).map_err(|e| QueueError::io(e, dir))?;

    let mut entries = REGISTRY.lock();
    entries.retain(|e| e.weak.strong_count() > 0);

    for entry in entries.iter() {
        if entry.handle == handle {
            if let Some(engine) = entry.weak.upgrade() {
                return Ok(engine);
            }
        }
    }

    let engine = Arc::new(StorageEngine::open(dir, options)?);
    entries.push(Entry {
        handle,
        weak: Arc::downgrade(&engine),
    });
    Ok(engine)
}
