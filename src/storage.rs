// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage engine core: segment rotation, the two-phase write and read
//! protocols, cold-start recovery, and the directory-lock-guarded refresh
//! that detects external mutation.
//!
//! Every segment, from the moment it is created, opens with two fixed
//! bookkeeping records: a `QueueSize` baseline (a snapshot, taken when the
//! segment was created, of how many items were then alive in older
//! segments) and a `ReadPointer`/`ReadConfirm` resume offset (where, within
//! *this* segment, the reader should resume — meaningful once this segment
//! becomes the read tail). Both live at fixed offsets (`0` and
//! `HEADER_LEN`). Every tail retirement re-stamps both fields on the
//! segment that becomes the new tail, but cold-start recovery never trusts
//! the baseline it finds on disk: once an older segment the baseline
//! counted has itself been drained and removed, that count no longer
//! corresponds to anything recoverable, so the live total is always
//! recomputed by scanning every surviving segment's actual payload records
//! instead.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dir_lock::DirLock;
use crate::error::{QueueError, Result};
use crate::options::QueueOptions;
use crate::record::{self, Record, Tag, HEADER_LEN};
use crate::segment_pool::SegmentPool;

/// Offset at which a segment's sequence of payload records begins.
const HEADERS_LEN: u64 = HEADER_LEN * 2;

struct WriteHalf {
    in_progress: bool,
    pending_len: Option<u64>,
    file: Option<File>,
    segment_number: Option<u64>,
}

struct ReadHalf {
    in_progress: bool,
    pending_len: Option<u64>,
    file: Option<File>,
    segment_number: Option<u64>,
    offset: u64,
}

pub struct StorageEngine {
    dir: PathBuf,
    options: QueueOptions,
    pool: Mutex<SegmentPool>,
    write: Mutex<WriteHalf>,
    read: Mutex<ReadHalf>,
    queue_size: AtomicU64,
    known_fingerprint: Mutex<(u64, u64)>,
}

impl StorageEngine {
    pub fn open(dir: &Path, options: QueueOptions) -> Result<Self> {
        options.validate()?;
        let mut lock = DirLock::acquire(dir)?;
        let mut pool = SegmentPool::open(dir, options.max_file_size, options.max_files)?;
        let (queue_size, read_segment_number, read_offset) = recover(&mut pool)?;
        let fingerprint = current_fingerprint(&pool)?;
        lock.write_fingerprint(fingerprint)?;
        drop(lock);

        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            pool: Mutex::new(pool),
            write: Mutex::new(WriteHalf {
                in_progress: false,
                pending_len: None,
                file: None,
                segment_number: None,
            }),
            read: Mutex::new(ReadHalf {
                in_progress: false,
                pending_len: None,
                file: None,
                segment_number: read_segment_number,
                offset: read_offset,
            }),
            queue_size: AtomicU64::new(queue_size),
            known_fingerprint: Mutex::new(fingerprint),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> QueueOptions {
        self.options
    }

    pub fn size(&self) -> Result<u64> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let mut pool = self.pool.lock();
        self.refresh_locked(&mut pool, &mut lock)?;
        Ok(self.queue_size.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Empties the queue entirely: deletes every segment and resets all
    /// in-memory cursors. Unlike ordinary tail rotation, this removes the
    /// very last segment too.
    pub fn clear(&self) -> Result<()> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let mut pool = self.pool.lock();
        let mut write = self.write.lock();
        let mut read = self.read.lock();
        pool.clear()?;
        write.in_progress = false;
        write.pending_len = None;
        write.file = None;
        write.segment_number = None;
        read.in_progress = false;
        read.pending_len = None;
        read.file = None;
        read.segment_number = None;
        read.offset = 0;
        self.queue_size.store(0, Ordering::Release);
        self.persist_fingerprint_with(&mut lock, &pool)?;
        Ok(())
    }

    /// Re-checks the directory's fingerprint and, if it has changed since
    /// this engine last observed it, reloads the segment pool and recovers
    /// cursors from scratch.
    pub fn refresh(&self) -> Result<()> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let mut pool = self.pool.lock();
        self.refresh_locked(&mut pool, &mut lock)
    }

    /// Runs the fingerprint comparison and, on mismatch, the full reload —
    /// using a directory lock the caller already holds for the duration of
    /// its own public operation, rather than acquiring a second one (which
    /// would self-deadlock against an advisory whole-file lock held by the
    /// same process on a different file handle).
    fn refresh_locked(&self, pool: &mut SegmentPool, lock: &mut DirLock) -> Result<()> {
        let on_disk = lock.read_fingerprint()?;
        let known = *self.known_fingerprint.lock();
        if on_disk == known {
            return Ok(());
        }
        warn!(dir = %self.dir.display(), "fingerprint mismatch, reloading queue directory");
        let mut reloaded = SegmentPool::open(&self.dir, self.options.max_file_size, self.options.max_files)?;
        let (queue_size, read_segment_number, read_offset) = recover(&mut reloaded)?;
        *pool = reloaded;
        self.queue_size.store(queue_size, Ordering::Release);
        {
            let mut read = self.read.lock();
            read.file = None;
            read.segment_number = read_segment_number;
            read.offset = read_offset;
            read.in_progress = false;
            read.pending_len = None;
        }
        {
            let mut write = self.write.lock();
            write.file = None;
            write.segment_number = None;
            write.in_progress = false;
            write.pending_len = None;
        }
        self.persist_fingerprint_with(lock, pool)
    }

    /// First half of the write protocol: declares the length of the next
    /// payload. Must be followed by exactly one `write_content` call before
    /// any further `write_size` call.
    pub fn write_size(&self, len: u64) -> Result<()> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let mut pool = self.pool.lock();
        self.refresh_locked(&mut pool, &mut lock)?;
        let mut write = self.write.lock();
        if write.in_progress {
            return Err(QueueError::Domain {
                reason: "write_size called while a write is already in progress",
            });
        }
        self.ensure_head(&mut pool, &mut write, &mut lock)?;
        let file = write.file.as_mut().expect("head just ensured");
        file.seek(SeekFrom::End(0))?;
        record::write_record(file, &Record::new(Tag::PayloadSize, len))?;
        file.flush()?;
        write.in_progress = true;
        write.pending_len = Some(len);
        Ok(())
    }

    /// Second half of the write protocol: appends the payload body declared
    /// by the preceding `write_size` call. Holds the directory lock for its
    /// own whole duration, so no other handle can observe or mutate the
    /// segment set mid-append, and persists a fresh fingerprint afterward so
    /// other handles notice the head segment grew even though the segment
    /// set's topology (count, oldest number) didn't change.
    pub fn write_content(&self, data: &[u8]) -> Result<()> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let pool = self.pool.lock();
        let mut write = self.write.lock();
        if !write.in_progress {
            return Err(QueueError::Domain {
                reason: "write_content called before write_size",
            });
        }
        let expected = write.pending_len.expect("set by write_size");
        if expected != data.len() as u64 {
            return Err(QueueError::invalid(format!(
                "write_content length {} does not match declared size {}",
                data.len(),
                expected
            )));
        }
        let file = write.file.as_mut().expect("head open for in-progress write");
        file.write_all(data)?;
        file.flush()?;
        write.in_progress = false;
        write.pending_len = None;
        self.queue_size.fetch_add(1, Ordering::AcqRel);
        self.persist_fingerprint_with(&mut lock, &pool)?;
        debug!(len = data.len(), "enqueued record");
        Ok(())
    }

    /// First half of the read protocol: returns the length of the next
    /// unread payload, or `Underflow` if the queue is empty.
    pub fn read_size(&self) -> Result<u64> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let mut pool = self.pool.lock();
        self.refresh_locked(&mut pool, &mut lock)?;
        let mut read = self.read.lock();
        if read.in_progress {
            return Err(QueueError::Domain {
                reason: "read_size called while a read is already in progress",
            });
        }
        if self.queue_size.load(Ordering::Acquire) == 0 {
            return Err(QueueError::Underflow);
        }
        loop {
            self.ensure_read_file(&mut pool, &mut read)?;
            let file = read.file.as_mut().expect("ensured above");
            file.seek(SeekFrom::Start(read.offset))?;
            match record::read_record(file)? {
                Some(rec) if rec.tag == Some(Tag::PayloadSize) => {
                    read.in_progress = true;
                    read.pending_len = Some(rec.data);
                    return Ok(rec.data);
                }
                Some(_) => {
                    // Stray bookkeeping record past the fixed header slots;
                    // it carries no body, so just step past it.
                    read.offset += HEADER_LEN;
                    continue;
                }
                None => {
                    // This segment is exhausted. Move to the next one if it
                    // exists; otherwise the atomic count was wrong, which
                    // should not happen under correct recovery.
                    if pool.len() > 1 {
                        pool.pop_back()?;
                        self.stamp_tail_headers(&pool, self.queue_size.load(Ordering::Acquire))?;
                        self.persist_fingerprint_with(&mut lock, &pool)?;
                        read.file = None;
                        read.segment_number = pool.tail_number();
                        read.offset = HEADERS_LEN;
                        continue;
                    }
                    return Err(QueueError::Underflow);
                }
            }
        }
    }

    /// Second half of the read protocol: consumes the payload body declared
    /// by the preceding `read_size` call, persists the new resume offset,
    /// and retires the tail segment if it has been fully drained.
    pub fn read_content(&self) -> Result<Vec<u8>> {
        let mut lock = DirLock::acquire(&self.dir)?;
        let mut pool = self.pool.lock();
        let mut read = self.read.lock();
        if !read.in_progress {
            return Err(QueueError::Domain {
                reason: "read_content called before read_size",
            });
        }
        let len = read.pending_len.expect("set by read_size");
        let header_offset = read.offset;
        let content_offset = header_offset + HEADER_LEN;
        let mut buf = vec![0u8; len as usize];
        {
            let file = read.file.as_mut().expect("open for in-progress read");
            file.seek(SeekFrom::Start(content_offset))?;
            std::io::Read::read_exact(file, &mut buf)?;
        }
        let new_offset = content_offset + len;
        self.persist_read_pointer(&mut read, new_offset)?;
        read.offset = new_offset;
        read.in_progress = false;
        read.pending_len = None;
        self.queue_size.fetch_sub(1, Ordering::AcqRel);

        // Retire the tail once fully drained, provided a newer segment
        // exists; the last remaining segment is never auto-deleted.
        let tail_len = read
            .file
            .as_ref()
            .expect("open for in-progress read")
            .metadata()?
            .len();
        if new_offset >= tail_len && pool.len() > 1 {
            pool.pop_back()?;
            self.stamp_tail_headers(&pool, self.queue_size.load(Ordering::Acquire))?;
            self.persist_fingerprint_with(&mut lock, &pool)?;
            read.file = None;
            read.segment_number = pool.tail_number();
            read.offset = HEADERS_LEN;
        }
        debug!(len, "dequeued record");
        Ok(buf)
    }

    /// Writes the directory's current fingerprint (topology plus head size)
    /// to the lock sentinel, using a directory lock the caller already
    /// holds, so other handles notice the mutation on their next refresh.
    /// Must be called after any operation that changes the segment set or
    /// grows the head segment (rotation, tail retirement, clear, append).
    fn persist_fingerprint_with(&self, lock: &mut DirLock, pool: &SegmentPool) -> Result<()> {
        let fingerprint = current_fingerprint(pool)?;
        lock.write_fingerprint(fingerprint)?;
        *self.known_fingerprint.lock() = fingerprint;
        Ok(())
    }

    /// Re-stamps the new tail's fixed bookkeeping pair right after it takes
    /// over from a retired predecessor: `QueueSize` gets the live count as
    /// of this moment, `ReadPointer` gets reset to this segment's own start
    /// (it has not been read from yet). Keeps the on-disk header honest
    /// even though cold-start recovery no longer trusts `QueueSize` for its
    /// own total — other tooling that inspects a single segment's header in
    /// isolation still sees an accurate snapshot.
    fn stamp_tail_headers(&self, pool: &SegmentPool, queue_size: u64) -> Result<()> {
        let path = match pool.tail_path() {
            Some(path) => path,
            None => return Ok(()),
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| QueueError::io(e, &path))?;
        file.seek(SeekFrom::Start(0))?;
        record::write_record(&mut file, &Record::new(Tag::QueueSize, queue_size))?;
        file.seek(SeekFrom::Start(HEADER_LEN))?;
        record::write_record(&mut file, &Record::new(Tag::ReadPointer, HEADERS_LEN))?;
        file.flush()?;
        Ok(())
    }

    fn persist_read_pointer(&self, read: &mut ReadHalf, new_offset: u64) -> Result<()> {
        let file = read.file.as_mut().expect("open for in-progress read");
        file.seek(SeekFrom::Start(HEADER_LEN))?;
        record::write_record(file, &Record::new(Tag::ReadConfirm, new_offset))?;
        file.flush()?;
        Ok(())
    }

    fn ensure_head(&self, pool: &mut SegmentPool, write: &mut WriteHalf, lock: &mut DirLock) -> Result<()> {
        let needs_rotation = match pool.head_number() {
            None => true,
            Some(_) => pool.current_head_size()? > pool.max_file_size(),
        };
        if needs_rotation || write.file.is_none() || write.segment_number != pool.head_number() {
            if needs_rotation {
                self.rotate(pool, lock)?;
            }
            let path = pool.head_path().expect("rotation guarantees a head");
            let file = OpenOptions::new()
                .write(true)
                .read(true)
                .open(&path)
                .map_err(|e| QueueError::io(e, &path))?;
            write.file = Some(file);
            write.segment_number = pool.head_number();
        }
        Ok(())
    }

    fn rotate(&self, pool: &mut SegmentPool, lock: &mut DirLock) -> Result<()> {
        let (path, mut file) = pool.push_front()?;
        let baseline = self.queue_size.load(Ordering::Acquire);
        record::write_record(&mut file, &Record::new(Tag::QueueSize, baseline))?;
        record::write_record(&mut file, &Record::new(Tag::ReadPointer, HEADERS_LEN))?;
        file.flush()?;
        self.persist_fingerprint_with(lock, pool)?;
        debug!(path = %path.display(), baseline, "rotated to new head segment");
        Ok(())
    }

    fn ensure_read_file(&self, pool: &mut SegmentPool, read: &mut ReadHalf) -> Result<()> {
        if read.file.is_some() && read.segment_number == pool.tail_number() {
            return Ok(());
        }
        if read.segment_number.is_none() {
            read.segment_number = pool.tail_number();
            read.offset = HEADERS_LEN;
        }
        let path = pool.tail_path().ok_or(QueueError::Underflow)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| QueueError::io(e, &path))?;
        read.file = Some(file);
        read.segment_number = pool.tail_number();
        Ok(())
    }
}

/// Computes the snapshot other handles compare to decide whether to reload.
/// Beyond segment-set topology (count, oldest number), this folds in the
/// current head segment's on-disk size so that a push which appends to the
/// existing head without rotating is still visible — topology alone would
/// miss exactly that case, since neither the count nor the oldest number
/// changes when a segment merely grows.
fn current_fingerprint(pool: &SegmentPool) -> Result<(u64, u64)> {
    let head_size = pool.current_head_size()?;
    Ok(DirLock::compute_fingerprint(
        pool.len() as u64,
        pool.tail_number().unwrap_or(0),
        pool.head_number().unwrap_or(0),
        head_size,
    ))
}

/// Scans a segment from `start_offset` to the end, counting complete
/// payload records and returning `(count, valid_end)`. `valid_end` is the
/// offset immediately after the last record whose declared body is fully
/// present — a dangling trailing header with a short or missing body stops
/// the scan without being counted.
fn scan_segment(file: &mut File, start_offset: u64) -> Result<(u64, u64)> {
    let file_len = file.metadata()?.len();
    let mut pos = start_offset;
    let mut count = 0u64;
    while pos + HEADER_LEN <= file_len {
        file.seek(SeekFrom::Start(pos))?;
        let rec = match record::read_record(file)? {
            Some(rec) => rec,
            None => break,
        };
        let mut next_pos = pos + HEADER_LEN;
        if rec.tag == Some(Tag::PayloadSize) {
            if next_pos + rec.data > file_len {
                break;
            }
            count += 1;
            next_pos += rec.data;
        }
        pos = next_pos;
    }
    Ok((count, pos))
}

/// Reads a segment's two fixed bookkeeping records, defaulting to the
/// never-rotated baseline (`0`, `HEADERS_LEN`) if they are absent or short —
/// the case for a segment that predates this engine ever rotating at all.
fn read_segment_headers(file: &mut File) -> Result<(u64, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let baseline = match record::read_record(file)? {
        Some(rec) if rec.tag == Some(Tag::QueueSize) => rec.data,
        _ => 0,
    };
    file.seek(SeekFrom::Start(HEADER_LEN))?;
    let resume_offset = match record::read_record(file)? {
        Some(rec) if matches!(rec.tag, Some(Tag::ReadPointer) | Some(Tag::ReadConfirm)) => rec.data,
        _ => HEADERS_LEN,
    };
    Ok((baseline, resume_offset))
}

/// Cold-start recovery: recomputes the live queue size and the read
/// cursor's resting place by scanning the oldest surviving segment forward
/// from its persisted resume offset, then fully scanning every newer
/// segment. Also repairs the current head if it ends in a dangling,
/// partially-written trailing record.
///
/// The live count is the sum of payload records actually found on disk —
/// never the `QueueSize` baseline a segment was stamped with at rotation
/// time. That baseline only ever held the count of items alive in *older*
/// segments at the moment this one was created; once those older segments
/// are drained and retired, the baseline no longer corresponds to anything
/// still on disk, so trusting it would over-count every item that was
/// already consumed out of a segment that no longer exists.
fn recover(pool: &mut SegmentPool) -> Result<(u64, Option<u64>, u64)> {
    if pool.is_empty() {
        return Ok((0, None, 0));
    }
    let len = pool.len();

    let oldest_path = pool.path_at(len - 1)?;
    let mut oldest_file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&oldest_path)
        .map_err(|e| QueueError::io(e, &oldest_path))?;
    let (_baseline, resume_offset) = read_segment_headers(&mut oldest_file)?;
    let (n0, valid_end0) = scan_segment(&mut oldest_file, resume_offset)?;
    let mut total = n0;

    let is_single_segment = len == 1;
    if is_single_segment {
        let file_len = oldest_file.metadata()?.len();
        if valid_end0 < file_len {
            warn!(path = %oldest_path.display(), "truncating dangling trailing record");
            oldest_file.set_len(valid_end0)?;
        }
    }

    for idx in (0..len - 1).rev() {
        let path = pool.path_at(idx)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| QueueError::io(e, &path))?;
        let (count, valid_end) = scan_segment(&mut file, HEADERS_LEN)?;
        total += count;
        if idx == 0 {
            let file_len = file.metadata()?.len();
            if valid_end < file_len {
                warn!(path = %path.display(), "truncating dangling trailing record");
                file.set_len(valid_end)?;
            }
        }
    }

    Ok((total, pool.tail_number(), resume_offset))
}
