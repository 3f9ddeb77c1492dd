//! Error taxonomy for SimpleFS: precondition violations, I/O failures from
//! the block device, and allocation exhaustion.
//!
//! Exhaustion is not represented here: `create` and `write` surface it as
//! the documented sentinel values (`-1`, or a short byte count) at the
//! public API boundary, same as the C source this was distilled from.

use thiserror::Error;

/// Everything that can go wrong below the "exhaustion" sentinel layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("disk I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("file system already mounted")]
    AlreadyMounted,

    #[error("file system not mounted")]
    NotMounted,

    #[error("superblock has invalid magic number")]
    InvalidMagic,

    #[error("superblock layout does not match the device's block count")]
    SuperblockMismatch,

    #[error("inode number {0} is out of range")]
    InvalidInodeNumber(u64),

    #[error("inode {0} is not allocated")]
    InodeNotValid(u64),

    #[error("offset {offset} is at or past end of file (size {size})")]
    OffsetPastEnd { offset: u64, size: u64 },

    #[error("block index {0} is out of range for this device")]
    InvalidBlockIndex(u64),

    /// No free inode was available for `create`. Never surfaced on its
    /// own — `FileSystem::create` collapses it (and every other error
    /// here) to a plain `-1`.
    #[error("no free inode available")]
    InodesExhausted,
}

pub type Result<T> = std::result::Result<T, Error>;
