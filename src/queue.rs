//! Typed façade over a single queue directory: a byte-buffer `Queue` and a
//! generic `TypedQueue<T>` for fixed-width, trivially-copyable elements.
//! Neither performs endianness conversion — elements are moved in and out
//! exactly as their in-memory representation, matching the record codec's
//! own host-byte-order, non-portable contract.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::options::QueueOptions;
use crate::registry;
use crate::storage::StorageEngine;

/// A FIFO queue of opaque byte buffers, backed by a directory of segment
/// files.
#[derive(Clone)]
pub struct Queue {
    engine: Arc<StorageEngine>,
}

impl Queue {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(dir, QueueOptions::default())
    }

    pub fn open_with_options(dir: impl AsRef<Path>, options: QueueOptions) -> Result<Self> {
        let engine = registry::acquire(dir.as_ref(), options)?;
        Ok(Self { engine })
    }

    pub fn push(&self, payload: &[u8]) -> Result<()> {
        self.engine.write_size(payload.len() as u64)?;
        self.engine.write_content(payload)
    }

    pub fn pop(&self) -> Result<Vec<u8>> {
        self.engine.read_size()?;
        self.engine.read_content()
    }

    pub fn size(&self) -> Result<u64> {
        self.engine.size()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.engine.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.engine.clear()
    }

    pub fn refresh(&self) -> Result<()> {
        self.engine.refresh()
    }

    pub fn path(&self) -> &Path {
        self.engine.dir()
    }
}

/// A FIFO queue of fixed-width, trivially-copyable elements (for example a
/// wide-character buffer type).
#[derive(Clone)]
pub struct TypedQueue<T: bytemuck::Pod> {
    inner: Queue,
    _element: PhantomData<T>,
}

impl<T: bytemuck::Pod> TypedQueue<T> {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(dir, QueueOptions::default())
    }

    pub fn open_with_options(dir: impl AsRef<Path>, options: QueueOptions) -> Result<Self> {
        Ok(Self {
            inner: Queue::open_with_options(dir, options)?,
            _element: PhantomData,
        })
    }

    pub fn push(&self, elements: &[T]) -> Result<()> {
        self.inner.push(bytemuck::cast_slice(elements))
    }

    pub fn pop(&self) -> Result<Vec<T>> {
        let bytes = self.inner.pop()?;
        if bytes.len() % std::mem::size_of::<T>() != 0 {
            return Err(crate::error::QueueError::invalid(
                "stored payload length is not a multiple of the element size",
            ));
        }
        // `bytes` is a freshly allocated Vec<u8> with no particular
        // alignment for T, so reinterpret via a copy rather than
        // `cast_slice`, which would panic on misaligned input.
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn size(&self) -> Result<u64> {
        self.inner.size()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.inner.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    pub fn refresh(&self) -> Result<()> {
        self.inner.refresh()
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn push_then_pop_round_trips() {
        let dir = tempdir().unwrap();
        let q = Queue::open(dir.path()).unwrap();
        q.push(b"hello").unwrap();
        q.push(b"world").unwrap();
        assert_eq!(q.size().unwrap(), 2);
        assert_eq!(q.pop().unwrap(), b"hello");
        assert_eq!(q.pop().unwrap(), b"world");
        assert!(q.is_empty().unwrap());
    }

    #[test]
    fn pop_on_empty_queue_is_underflow() {
        let dir = tempdir().unwrap();
        let q = Queue::open(dir.path()).unwrap();
        assert!(matches!(q.pop(), Err(crate::error::QueueError::Underflow)));
    }

    #[test]
    fn empty_payload_is_valid() {
        let dir = tempdir().unwrap();
        let q = Queue::open(dir.path()).unwrap();
        q.push(b"").unwrap();
        assert_eq!(q.pop().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn typed_queue_round_trips_u32_elements() {
        let dir = tempdir().unwrap();
        let q: TypedQueue<u32> = TypedQueue::open(dir.path()).unwrap();
        q.push(&[1, 2, 3]).unwrap();
        assert_eq!(q.pop().unwrap(), vec![1u32, 2, 3]);
    }

    #[test]
    fn survives_rotation_across_many_segments() {
        let dir = tempdir().unwrap();
        let options = QueueOptions {
            max_file_size: 64,
            max_files: 64,
        };
        let q = Queue::open_with_options(dir.path(), options).unwrap();
        let payload = vec![b'x'; 20];
        for _ in 0..50 {
            q.push(&payload).unwrap();
        }
        for _ in 0..50 {
            assert_eq!(q.pop().unwrap(), payload);
        }
        assert!(q.is_empty().unwrap());
    }
}
