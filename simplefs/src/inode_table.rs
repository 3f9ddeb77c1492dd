//! Flat inode array sharded across fixed-size inode blocks. Inode records
//! share a block with `INODES_PER_BLOCK - 1` siblings, so both operations
//! are read-modify-write against the containing block.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::layout::{decode_inode_block, encode_inode_into_block, InodeRecord, INODES_PER_BLOCK};

/// Splits an inode number into (inode-table block index, offset in block).
/// Block 0 is the superblock, so inode blocks start at disk block 1.
fn locate(inode_number: u64) -> (u64, usize) {
    let block = inode_number / INODES_PER_BLOCK as u64 + 1;
    let offset = (inode_number % INODES_PER_BLOCK as u64) as usize;
    (block, offset)
}

/// Loads inode `inode_number`. Fails if it is out of range, unreadable, or
/// `valid == 0`.
pub fn load(disk: &mut Disk, inodes: u64, inode_number: u64) -> Result<InodeRecord> {
    if inode_number >= inodes {
        return Err(Error::InvalidInodeNumber(inode_number));
    }
    let (block, offset) = locate(inode_number);
    let buf = disk.read_block(block)?;
    let record = decode_inode_block(&buf)[offset];
    if record.valid == 0 {
        return Err(Error::InodeNotValid(inode_number));
    }
    Ok(record)
}

/// Overwrites inode `inode_number` with `record`, without checking
/// `record.valid` (callers use this to both allocate and free inodes).
pub fn store(disk: &mut Disk, inodes: u64, inode_number: u64, record: &InodeRecord) -> Result<()> {
    if inode_number >= inodes {
        return Err(Error::InvalidInodeNumber(inode_number));
    }
    let (block, offset) = locate(inode_number);
    let mut buf = disk.read_block(block)?;
    encode_inode_into_block(&mut buf, offset, record);
    disk.write_block(block, &buf)?;
    Ok(())
}
