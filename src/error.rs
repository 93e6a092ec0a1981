// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Canonical error surface for `filequeue`.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A dequeue was attempted on a queue with nothing left to read.
    #[error("queue is empty")]
    Underflow,

    /// The segment pool has reached its configured file-count ceiling.
    #[error("segment pool is full (max_files = {max_files})")]
    Overflow { max_files: usize },

    /// A caller violated the write or read half's two-phase protocol order.
    #[error("protocol violation: {reason}")]
    Domain { reason: &'static str },

    /// A caller passed a value this crate cannot act on.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: Cow<'static, str> },

    /// An index or offset fell outside the range it must lie within.
    #[error("index {index} out of range (len = {len})")]
    OutOfRange { index: usize, len: usize },

    /// An unexpected I/O failure, propagated without retry.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
}

impl From<std::io::Error> for QueueError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl QueueError {
    pub(crate) fn io(source: std::io::Error, path: &std::path::Path) -> Self {
        Self::Io {
            source,
            path: Some(path.to_path_buf()),
        }
    }

    pub(crate) fn invalid(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}
