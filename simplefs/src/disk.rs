//! Block device emulator: byte-addressed file providing uniform fixed-size
//! block reads/writes with I/O accounting. Every other module only ever
//! goes through its `read_block`/`write_block`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::layout::{zeroed_block, BlockBuf, BLOCK_SIZE};

/// A fixed-size emulated block device backed by a regular file.
#[derive(Debug)]
pub struct Disk {
    file: File,
    blocks: u64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Disk {
    /// Opens (creating if absent) the file at `path` and truncates it to
    /// `blocks * BLOCK_SIZE` bytes.
    pub fn open(path: impl AsRef<Path>, blocks: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(blocks * BLOCK_SIZE as u64)?;
        Ok(Disk {
            file,
            blocks,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    /// Total number of blocks this device was opened with.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Number of blocks read since this handle was opened.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of blocks written since this handle was opened.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_block(&self, block: u64) -> io::Result<()> {
        if block >= self.blocks {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block {block} is out of range (device has {} blocks)", self.blocks),
            ));
        }
        Ok(())
    }

    /// Reads exactly `BLOCK_SIZE` bytes from the given block index.
    pub fn read_block(&mut self, block: u64) -> io::Result<BlockBuf> {
        self.check_block(block)?;
        let mut buf = zeroed_block();
        self.file.seek(SeekFrom::Start(block * BLOCK_SIZE as u64))?;
        self.file.read_exact(&mut buf)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(buf)
    }

    /// Writes exactly `BLOCK_SIZE` bytes to the given block index.
    pub fn write_block(&mut self, block: u64, buf: &BlockBuf) -> io::Result<()> {
        self.check_block(block)?;
        self.file.seek(SeekFrom::Start(block * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for Disk {
    fn drop(&mut self) {
        log::info!(
            "closing disk: {} block reads, {} block writes",
            self.reads(),
            self.writes()
        );
    }
}
