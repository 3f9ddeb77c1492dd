//! File operations: create, remove, stat, read, write, plus format/mount/
//! unmount. This module owns the two-level indexing (direct pointers plus a
//! single indirect block) and is responsible for keeping every inode's
//! pointers, the free-block bitmap, and the on-disk image consistent with
//! each other.

use std::path::Path;

use crate::bitmap::FreeBitmap;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::inode_table;
use crate::layout::{
    zeroed_block, IndirectBlock, InodeRecord, Superblock, BLOCK_SIZE, INODES_PER_BLOCK,
    MAGIC_NUMBER, POINTERS_PER_BLOCK, POINTERS_PER_INODE,
};

/// An owning handle to one mounted (or not-yet-mounted) SimpleFS instance.
///
/// `mount`/`unmount` act as the constructor/destructor of the in-memory
/// state (cached superblock, free-block bitmap); there is exactly one
/// logical mount at a time per `FileSystem` value, and operations are not
/// internally synchronized — the caller must serialize concurrent use.
pub struct FileSystem {
    disk: Option<Disk>,
    superblock: Option<Superblock>,
    bitmap: Option<FreeBitmap>,
}

/// A logical byte position resolves to one of these addressing slots.
enum Slot {
    Direct(usize),
    Indirect(usize),
}

fn slot_for(logical_block: u64) -> Option<Slot> {
    let logical_block = logical_block as usize;
    if logical_block < POINTERS_PER_INODE {
        Some(Slot::Direct(logical_block))
    } else if logical_block < POINTERS_PER_INODE + POINTERS_PER_BLOCK {
        Some(Slot::Indirect(logical_block - POINTERS_PER_INODE))
    } else {
        None
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem {
    /// Creates an unmounted file system object.
    pub fn new() -> Self {
        FileSystem {
            disk: None,
            superblock: None,
            bitmap: None,
        }
    }

    fn disk_mut(&mut self) -> Result<&mut Disk> {
        self.disk.as_mut().ok_or(Error::NotMounted)
    }

    fn superblock(&self) -> Result<&Superblock> {
        self.superblock.as_ref().ok_or(Error::NotMounted)
    }

    /// Whether this object currently has a mounted disk.
    pub fn is_mounted(&self) -> bool {
        self.disk.is_some()
    }

    // ---- format -----------------------------------------------------

    /// Formats `path` as a fresh SimpleFS image of `blocks` blocks: writes a
    /// superblock to block 0 and zeroes every other block. Fails (without
    /// mutating this object's state) if it is already mounted.
    ///
    /// Failures zeroing the data region after the superblock and inode
    /// table are written are swallowed, since mount never relies on
    /// data-region contents.
    pub fn format(&mut self, path: impl AsRef<Path>, blocks: u64) -> Result<bool> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        let mut disk = Disk::open(path, blocks)?;

        let inode_blocks = Superblock::compute_inode_blocks(blocks as u32) as u64;
        let superblock = Superblock {
            magic: MAGIC_NUMBER,
            blocks: blocks as u32,
            inode_blocks: inode_blocks as u32,
            inodes: (inode_blocks * INODES_PER_BLOCK as u64) as u32,
        };
        disk.write_block(0, &superblock.encode())?;

        let zero = zeroed_block();
        for block in 1..blocks {
            if let Err(e) = disk.write_block(block, &zero) {
                log::warn!("format: failed to zero block {block}: {e}");
            }
        }
        Ok(true)
    }

    // ---- mount / unmount ---------------------------------------------

    /// Validates the superblock and, on success, reconstructs the free-block
    /// bitmap by walking every live inode. Returns `false` (without
    /// mutating state) on any validation failure. See `try_mount` for the
    /// reason behind a failure.
    pub fn mount(&mut self, path: impl AsRef<Path>) -> bool {
        self.try_mount(path).unwrap_or(false)
    }

    /// Same as `mount`, but surfaces *why* validation failed instead of
    /// collapsing it to `false`.
    pub fn try_mount(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }

        // We don't know the device's block count up front; probe via the
        // file's length the same way the on-disk superblock records it.
        let len = std::fs::metadata(path.as_ref())?.len();
        let blocks = len / BLOCK_SIZE as u64;
        let mut disk = Disk::open(path, blocks)?;

        let sb_block = disk.read_block(0)?;
        let superblock = Superblock::decode(&sb_block);
        if superblock.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagic);
        }
        let expected_inode_blocks = Superblock::compute_inode_blocks(disk.blocks() as u32);
        if superblock.blocks != disk.blocks() as u32
            || superblock.inode_blocks != expected_inode_blocks
            || superblock.inodes != expected_inode_blocks * INODES_PER_BLOCK as u32
        {
            return Err(Error::SuperblockMismatch);
        }

        let bitmap = Self::rebuild_bitmap(&mut disk, &superblock);

        self.disk = Some(disk);
        self.superblock = Some(superblock);
        self.bitmap = Some(bitmap);
        Ok(true)
    }

    /// Walks every live inode to determine which data-region blocks are
    /// still referenced. A failed block read during reconstruction leaves
    /// that inode's blocks marked free, matching the source's behavior
    /// rather than failing the mount outright.
    fn rebuild_bitmap(disk: &mut Disk, superblock: &Superblock) -> FreeBitmap {
        let mut bitmap = FreeBitmap::all_free(superblock.blocks as u64);
        bitmap.mark_used(0);
        for b in 1..=superblock.inode_blocks as u64 {
            bitmap.mark_used(b);
        }

        for inode_block_idx in 1..=superblock.inode_blocks as u64 {
            let buf = match disk.read_block(inode_block_idx) {
                Ok(buf) => buf,
                Err(e) => {
                    log::warn!(
                        "mount: failed to read inode block {inode_block_idx} while rebuilding \
                         the free-block bitmap: {e}"
                    );
                    continue;
                }
            };
            for record in crate::layout::decode_inode_block(&buf) {
                if record.valid == 0 {
                    continue;
                }
                for ptr in record.direct {
                    if ptr != 0 {
                        bitmap.mark_used(ptr as u64);
                    }
                }
                if record.indirect == 0 {
                    continue;
                }
                bitmap.mark_used(record.indirect as u64);
                match disk.read_block(record.indirect as u64) {
                    Ok(ind_buf) => {
                        for ptr in IndirectBlock::decode(&ind_buf).pointers {
                            if ptr != 0 {
                                bitmap.mark_used(ptr as u64);
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "mount: failed to read indirect block {} while rebuilding the \
                             free-block bitmap: {e}",
                            record.indirect
                        );
                    }
                }
            }
        }
        bitmap
    }

    /// Releases the in-memory bitmap and clears the device handle. No disk
    /// I/O.
    pub fn unmount(&mut self) {
        self.disk = None;
        self.superblock = None;
        self.bitmap = None;
    }

    // ---- create / remove / stat ---------------------------------------

    /// Allocates the first unused inode record, returning its inode number,
    /// or `-1` if every inode is in use or a disk write fails. Does not
    /// touch the bitmap — inode storage is preallocated.
    pub fn create(&mut self) -> i64 {
        self.try_create().map(|n| n as i64).unwrap_or(-1)
    }

    fn try_create(&mut self) -> Result<u64> {
        let inode_blocks = self.superblock()?.inode_blocks as u64;
        let disk = self.disk_mut()?;
        for block_idx in 1..=inode_blocks {
            let mut buf = disk.read_block(block_idx)?;
            let records = crate::layout::decode_inode_block(&buf);
            if let Some(offset) = records.iter().position(|r| r.valid == 0) {
                let record = InodeRecord {
                    valid: 1,
                    size: 0,
                    direct: [0; POINTERS_PER_INODE],
                    indirect: 0,
                };
                crate::layout::encode_inode_into_block(&mut buf, offset, &record);
                disk.write_block(block_idx, &buf)?;
                return Ok((block_idx - 1) * INODES_PER_BLOCK as u64 + offset as u64);
            }
        }
        Err(Error::InodesExhausted)
    }

    /// Frees inode `n` and every block it references. Fails only if the
    /// inode cannot be loaded or the final inode store fails.
    pub fn remove(&mut self, n: u64) -> bool {
        self.try_remove(n).unwrap_or(false)
    }

    fn try_remove(&mut self, n: u64) -> Result<bool> {
        let inodes = self.superblock()?.inodes as u64;
        let mut inode = inode_table::load(self.disk_mut()?, inodes, n)?;

        let indirect = if inode.indirect != 0 {
            Some(IndirectBlock::decode(&self.disk_mut()?.read_block(inode.indirect as u64)?))
        } else {
            None
        };

        let zero = zeroed_block();
        let total_slots = POINTERS_PER_INODE + POINTERS_PER_BLOCK;
        for i in 0..total_slots {
            let block_pointer = if i < POINTERS_PER_INODE {
                inode.direct[i]
            } else {
                match &indirect {
                    Some(ind) => ind.pointers[i - POINTERS_PER_INODE],
                    None => break,
                }
            };
            if block_pointer == 0 {
                continue;
            }
            if let Some(bitmap) = self.bitmap.as_mut() {
                bitmap.mark_free(block_pointer as u64);
            }
            if let Err(e) = self.disk_mut()?.write_block(block_pointer as u64, &zero) {
                log::warn!("remove: failed to scrub block {block_pointer}: {e}");
            }
        }
        if inode.indirect != 0 {
            if let Some(bitmap) = self.bitmap.as_mut() {
                bitmap.mark_free(inode.indirect as u64);
            }
        }

        inode.valid = 0;
        inode.size = 0;
        inode_table::store(self.disk_mut()?, inodes, n, &inode)?;
        Ok(true)
    }

    /// Returns the byte size of inode `n`, or `-1` if it is not valid.
    pub fn stat(&mut self, n: u64) -> i64 {
        let inodes = match self.superblock() {
            Ok(sb) => sb.inodes as u64,
            Err(_) => return -1,
        };
        match self.disk.as_mut() {
            Some(disk) => inode_table::load(disk, inodes, n)
                .map(|inode| inode.size as i64)
                .unwrap_or(-1),
            None => -1,
        }
    }

    // ---- read / write ---------------------------------------------------

    /// Reads up to `length` bytes from inode `n` starting at `offset`,
    /// returning the number of bytes copied, or `-1` on a precondition
    /// violation, a zero-pointer slot reached before any bytes were copied,
    /// or a failed block read.
    pub fn read(&mut self, n: u64, data: &mut [u8], length: usize, offset: u64) -> i64 {
        self.try_read(n, data, length, offset).unwrap_or(-1)
    }

    fn try_read(&mut self, n: u64, data: &mut [u8], length: usize, offset: u64) -> Result<i64> {
        let inodes = self.superblock()?.inodes as u64;
        let inode = inode_table::load(self.disk_mut()?, inodes, n)?;
        if offset >= inode.size as u64 {
            return Err(Error::OffsetPastEnd {
                offset,
                size: inode.size as u64,
            });
        }

        let bytes_to_read = length.min((inode.size as u64 - offset) as usize);
        let mut bytes_read = 0usize;
        let mut block_offset = (offset as usize) % BLOCK_SIZE;
        let start_block = offset / BLOCK_SIZE as u64;

        let indirect = if inode.indirect != 0 {
            Some(IndirectBlock::decode(&self.disk_mut()?.read_block(inode.indirect as u64)?))
        } else {
            None
        };

        let mut logical = start_block;
        loop {
            if bytes_read == bytes_to_read {
                return Ok(bytes_read as i64);
            }
            let slot = match slot_for(logical) {
                Some(slot) => slot,
                None => return Ok(bytes_read as i64),
            };
            let block_pointer = match slot {
                Slot::Direct(i) => inode.direct[i],
                Slot::Indirect(i) => match &indirect {
                    Some(ind) => ind.pointers[i],
                    None => 0,
                },
            };
            if block_pointer == 0 {
                return if bytes_read == 0 {
                    Err(Error::InvalidBlockIndex(logical))
                } else {
                    Ok(bytes_read as i64)
                };
            }

            let bytes_to_copy = (BLOCK_SIZE - block_offset).min(bytes_to_read - bytes_read);
            let block = self.disk_mut()?.read_block(block_pointer as u64)?;
            data[bytes_read..bytes_read + bytes_to_copy]
                .copy_from_slice(&block[block_offset..block_offset + bytes_to_copy]);

            bytes_read += bytes_to_copy;
            block_offset = 0;
            logical += 1;
        }
    }

    /// Writes up to `length` bytes from `data` into inode `n` starting at
    /// `offset`, allocating direct/indirect blocks as needed, and returns
    /// the number of bytes actually written (which may be short if the
    /// device runs out of free blocks). `inode.size` grows monotonically by
    /// the number of bytes written: there is no truncation or hole-aware
    /// bookkeeping, so overwriting existing bytes inflates `size` rather
    /// than leaving it unchanged. Callers wanting sane file semantics issue
    /// writes at the current end-of-file with non-overlapping ranges.
    pub fn write(&mut self, n: u64, data: &[u8], length: usize, offset: u64) -> i64 {
        self.try_write(n, data, length, offset).unwrap_or(-1)
    }

    fn try_write(&mut self, n: u64, data: &[u8], length: usize, offset: u64) -> Result<i64> {
        let inodes = self.superblock()?.inodes as u64;
        let mut inode = inode_table::load(self.disk_mut()?, inodes, n)?;

        let mut indirect = if inode.indirect != 0 {
            IndirectBlock::decode(&self.disk_mut()?.read_block(inode.indirect as u64)?)
        } else {
            IndirectBlock::zeroed()
        };

        let mut bytes_written = 0usize;
        let mut block_offset = (offset as usize) % BLOCK_SIZE;
        let mut logical = offset / BLOCK_SIZE as u64;

        while bytes_written < length {
            let slot = match slot_for(logical) {
                Some(slot) => slot,
                None => break,
            };

            if let Slot::Indirect(_) = slot {
                if inode.indirect == 0 {
                    let block = match self.bitmap.as_mut().and_then(FreeBitmap::allocate) {
                        Some(b) => b,
                        None => {
                            log::debug!("write: no free blocks left to allocate an indirect block");
                            break;
                        }
                    };
                    inode.indirect = block as u32;
                    self.disk_mut()?.write_block(block, &IndirectBlock::zeroed().encode())?;
                }
            }

            let mut indirect_changed = false;
            let block_pointer = match slot {
                Slot::Direct(i) => inode.direct[i],
                Slot::Indirect(i) => indirect.pointers[i],
            };
            let block_pointer = if block_pointer == 0 {
                let allocated = match self.bitmap.as_mut().and_then(FreeBitmap::allocate) {
                    Some(b) => b,
                    None => {
                        log::debug!("write: no free blocks left for inode {n}");
                        break;
                    }
                };
                match slot {
                    Slot::Direct(i) => inode.direct[i] = allocated as u32,
                    Slot::Indirect(i) => {
                        indirect.pointers[i] = allocated as u32;
                        indirect_changed = true;
                    }
                }
                allocated
            } else {
                block_pointer as u64
            };

            let bytes_to_copy = (BLOCK_SIZE - block_offset).min(length - bytes_written);
            let mut block = self.disk_mut()?.read_block(block_pointer)?;
            block[block_offset..block_offset + bytes_to_copy]
                .copy_from_slice(&data[bytes_written..bytes_written + bytes_to_copy]);
            self.disk_mut()?.write_block(block_pointer, &block)?;

            if inode.indirect != 0 && indirect_changed {
                self.disk_mut()?.write_block(inode.indirect as u64, &indirect.encode())?;
            }

            bytes_written += bytes_to_copy;
            block_offset = 0;
            logical += 1;
        }

        inode.size += bytes_written as u32;
        inode_table::store(self.disk_mut()?, inodes, n, &inode)?;
        Ok(bytes_written as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    fn format_and_mount(blocks: u64) -> (FileSystem, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let mut fs = FileSystem::new();
        assert!(fs.format(tmp.path(), blocks).unwrap());
        assert!(fs.mount(tmp.path()));
        (fs, tmp)
    }

    #[test]
    fn fresh_image_has_no_live_inodes() {
        let (mut fs, _tmp) = format_and_mount(10);
        assert_eq!(fs.stat(0), -1);
    }

    #[test]
    fn create_write_stat_read_round_trip_small_file() {
        let (mut fs, _tmp) = format_and_mount(100);
        let ino = fs.create();
        assert_eq!(ino, 0);
        assert_eq!(fs.write(ino as u64, b"hello", 5, 0), 5);
        assert_eq!(fs.stat(ino as u64), 5);
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(ino as u64, &mut buf, 5, 0), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn write_spanning_direct_capacity_allocates_indirect_block() {
        let (mut fs, _tmp) = format_and_mount(100);
        let ino = fs.create() as u64;
        let a_block = [b'A'; BLOCK_SIZE];
        let buf: Vec<u8> = a_block.iter().cycle().take(5 * BLOCK_SIZE).copied().collect();
        assert_eq!(fs.write(ino, &buf, buf.len(), 0), buf.len() as i64);

        let inodes = fs.superblock().unwrap().inodes as u64;
        let after_five = inode_table::load(fs.disk_mut().unwrap(), inodes, ino).unwrap();
        assert!(after_five.direct.iter().all(|p| *p != 0));
        assert_eq!(after_five.indirect, 0);

        let b_block = vec![b'B'; BLOCK_SIZE];
        assert_eq!(fs.write(ino, &b_block, BLOCK_SIZE, 5 * BLOCK_SIZE as u64), BLOCK_SIZE as i64);
        let after_six = inode_table::load(fs.disk_mut().unwrap(), inodes, ino).unwrap();
        assert_ne!(after_six.indirect, 0);
    }

    #[test]
    fn remove_after_exhaustion_frees_blocks_for_reuse() {
        let (mut fs, _tmp) = format_and_mount(100);
        let ino = fs.create() as u64;
        let data = vec![b'X'; 10 * 1024 * 1024];
        let written = fs.write(ino, &data, data.len(), 0);
        assert!(written >= 0);
        assert!((written as usize) < data.len(), "write should have run out of blocks");

        assert!(fs.remove(ino));
        assert_eq!(fs.stat(ino), -1);

        let ino2 = fs.create() as u64;
        let small = vec![b'Y'; 5 * BLOCK_SIZE];
        assert_eq!(fs.write(ino2, &small, small.len(), 0), small.len() as i64);
    }

    #[test]
    fn unmount_remount_preserves_data_and_bitmap() {
        let tmp = NamedTempFile::new().unwrap();
        let mut fs = FileSystem::new();
        fs.format(tmp.path(), 100).unwrap();
        fs.mount(tmp.path());
        let ino = fs.create() as u64;
        let block = vec![b'Z'; BLOCK_SIZE];
        fs.write(ino, &block, BLOCK_SIZE, 0);
        let free_before = fs.bitmap.as_ref().unwrap().free_count();
        fs.unmount();

        assert!(fs.mount(tmp.path()));
        assert_eq!(fs.stat(ino), BLOCK_SIZE as i64);
        let mut out = vec![0u8; BLOCK_SIZE];
        fs.read(ino, &mut out, BLOCK_SIZE, 0);
        assert_eq!(out, block);
        assert_eq!(fs.bitmap.as_ref().unwrap().free_count(), free_before);
    }

    #[test]
    fn bad_magic_fails_mount_and_leaves_unmounted() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut fs = FileSystem::new();
            fs.format(tmp.path(), 10).unwrap();
        }
        // Corrupt the magic number.
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().write(true).open(tmp.path()).unwrap();
        file.write_all(&[0u8; 4]).unwrap();

        let mut fs = FileSystem::new();
        assert!(!fs.mount(tmp.path()));
        assert!(!fs.is_mounted());
    }

    #[test]
    fn create_remove_round_trip_restores_superblock_and_inode_table() {
        let (mut fs, tmp) = format_and_mount(50);
        let snapshot = std::fs::read(tmp.path()).unwrap();
        let ino = fs.create() as u64;
        assert!(fs.remove(ino));
        let after = std::fs::read(tmp.path()).unwrap();
        let inode_blocks = fs.superblock().unwrap().inode_blocks as usize;
        assert_eq!(
            &snapshot[..(inode_blocks + 1) * BLOCK_SIZE],
            &after[..(inode_blocks + 1) * BLOCK_SIZE]
        );
    }

    #[test]
    fn two_writes_concatenate_on_read() {
        let (mut fs, _tmp) = format_and_mount(100);
        let ino = fs.create() as u64;
        let first = b"hello ".to_vec();
        let second = b"world".to_vec();
        let n1 = fs.write(ino, &first, first.len(), 0);
        assert_eq!(n1, first.len() as i64);
        let n2 = fs.write(ino, &second, second.len(), first.len() as u64);
        assert_eq!(n2, second.len() as i64);

        let mut out = vec![0u8; first.len() + second.len()];
        let read = fs.read(ino, &mut out, out.len(), 0);
        assert_eq!(read, out.len() as i64);
        assert_eq!(&out, b"hello world");
    }
}
