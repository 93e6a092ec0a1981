//! Priority façade: a 256-level pool keyed by `u8`, with `pop` always
//! draining the highest non-empty priority level first.

use std::path::Path;

use crate::error::{QueueError, Result};
use crate::options::QueueOptions;
use crate::pool::Pool;

pub struct PriorityQueue {
    pool: Pool,
}

fn level_id(priority: u8) -> String {
    format!("{priority:03}")
}

impl PriorityQueue {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(base_dir, QueueOptions::default())
    }

    pub fn open_with_options(base_dir: impl AsRef<Path>, options: QueueOptions) -> Result<Self> {
        Ok(Self {
            pool: Pool::open_with_options(base_dir, options)?,
        })
    }

    pub fn push(&self, priority: u8, payload: &[u8]) -> Result<()> {
        self.pool.push(&level_id(priority), payload)
    }

    /// Pops from the highest priority level that currently holds anything.
    pub fn pop(&self) -> Result<Vec<u8>> {
        for priority in (0..=255u8).rev() {
            let id = level_id(priority);
            if !self.pool.is_empty(&id)? {
                return self.pool.pop(&id);
            }
        }
        Err(QueueError::Underflow)
    }

    pub fn size(&self) -> Result<u64> {
        let mut total = 0;
        for priority in 0..=255u8 {
            total += self.pool.size(&level_id(priority))?;
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Deletes every priority level's sub-queue.
    pub fn clear(&self) -> Result<()> {
        self.pool.clear()
    }
}
