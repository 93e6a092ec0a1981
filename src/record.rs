//! Fixed-width record header codec.
//!
//! A record is a 1-byte tag followed by an 8-byte native-endian word. Bodies
//! (payload bytes) are written separately by the caller; the header only
//! ever carries the tag and one `u64` of associated data. Byte order and word
//! width are fixed to the host platform's: this format is not portable
//! across machines of differing endianness, by design.

use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

pub const HEADER_LEN: u64 = 9;

/// The four record kinds a segment's header stream can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    PayloadSize = 1,
    ReadPointer = 2,
    ReadConfirm = 3,
    QueueSize = 4,
}

impl Tag {
    fn from_byte(b: u8) -> Option<Tag> {
        match b {
            1 => Some(Tag::PayloadSize),
            2 => Some(Tag::ReadPointer),
            3 => Some(Tag::ReadConfirm),
            4 => Some(Tag::QueueSize),
            _ => None,
        }
    }
}

/// A decoded record header. `tag` is `None` for a tag byte this crate does
/// not recognize; the codec still advances past it since the header format
/// itself (tag + word) is fixed regardless of the tag's meaning.
#[derive(Debug, Clone, Copy)]
pub struct Record {
    pub tag: Option<Tag>,
    pub data: u64,
}

impl Record {
    pub fn new(tag: Tag, data: u64) -> Self {
        Self {
            tag: Some(tag),
            data,
        }
    }
}

/// Writes a record header. The caller is responsible for writing any body
/// bytes a `PayloadSize` record implies immediately afterwards.
pub fn write_record(w: &mut impl Write, record: &Record) -> io::Result<()> {
    let tag_byte = match record.tag {
        Some(tag) => tag as u8,
        None => 0,
    };
    w.write_u8(tag_byte)?;
    w.write_u64::<NativeEndian>(record.data)?;
    Ok(())
}

/// Reads a record header. Returns `Ok(None)` on a clean EOF (no bytes at
/// all) or on a short/partial header — the crash-truncated tail of a
/// segment that was being written when the process died. This is treated
/// as EOF, not as a malformed-stream error, per this crate's recovery
/// contract.
pub fn read_record(r: &mut impl Read) -> io::Result<Option<Record>> {
    let mut tag_byte = [0u8; 1];
    match read_exact_or_eof(r, &mut tag_byte)? {
        None => return Ok(None),
        Some(0) => return Ok(None),
        Some(_) => {}
    }
    let mut data_bytes = [0u8; 8];
    match read_exact_or_eof(r, &mut data_bytes)? {
        None | Some(0..=7) => return Ok(None),
        Some(_) => {}
    }
    let data = u64::from_ne_bytes(data_bytes);
    Ok(Some(Record {
        tag: Tag::from_byte(tag_byte[0]),
        data,
    }))
}

/// Like `Read::read_exact`, but a short read (including zero bytes) yields
/// `Ok(Some(n))` with the number of bytes actually read instead of an error.
fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<usize>> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        Ok(None)
    } else {
        Ok(Some(filled))
    }
}
