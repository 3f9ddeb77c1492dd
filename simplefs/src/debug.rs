//! Read-only diagnostic walk. Does not mount: it opens the device directly,
//! prints the superblock, then every live inode's size, direct pointers,
//! and indirect pointers. Missing block reads are skipped silently,
//! matching `fs_debug` in the source this was distilled from.

use crate::disk::Disk;
use crate::layout::{decode_inode_block, IndirectBlock, Superblock, MAGIC_NUMBER};

/// Prints a diagnostic report of the filesystem image on `disk` to stdout.
/// Never fails: an unreadable superblock or inode block is reported as
/// "invalid" or simply skipped, since this is a best-effort dump of
/// whatever happens to be on disk.
pub fn debug_walk(disk: &mut Disk) {
    let sb_block = match disk.read_block(0) {
        Ok(buf) => buf,
        Err(_) => {
            println!("SuperBlock: unreadable");
            return;
        }
    };
    let superblock = Superblock::decode(&sb_block);

    println!("SuperBlock:");
    println!(
        "    magic number is {}",
        if superblock.magic == MAGIC_NUMBER { "valid" } else { "invalid" }
    );
    println!("    {} blocks", superblock.blocks);
    println!("    {} inode blocks", superblock.inode_blocks);
    println!("    {} inodes", superblock.inodes);

    for inode_block_idx in 1..=superblock.inode_blocks as u64 {
        let buf = match disk.read_block(inode_block_idx) {
            Ok(buf) => buf,
            Err(_) => continue,
        };
        for (offset, record) in decode_inode_block(&buf).into_iter().enumerate() {
            if record.valid == 0 {
                continue;
            }
            let inode_number = (inode_block_idx - 1) * crate::layout::INODES_PER_BLOCK as u64
                + offset as u64;
            println!("Inode {inode_number}:");
            println!("    size: {} bytes", record.size);

            let direct: Vec<String> = record
                .direct
                .iter()
                .filter(|p| **p != 0)
                .map(u32::to_string)
                .collect();
            println!("    direct blocks: {}", direct.join(" "));

            if record.indirect != 0 {
                println!("    indirect block: {}", record.indirect);
                if let Ok(ind_buf) = disk.read_block(record.indirect as u64) {
                    let pointers: Vec<String> = IndirectBlock::decode(&ind_buf)
                        .pointers
                        .iter()
                        .filter(|p| **p != 0)
                        .map(u32::to_string)
                        .collect();
                    println!("    indirect data blocks: {}", pointers.join(" "));
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::FileSystem;
    use tempfile::NamedTempFile;

    #[test]
    fn debug_walk_does_not_panic_on_fresh_image() {
        let tmp = NamedTempFile::new().unwrap();
        let mut fs = FileSystem::new();
        fs.format(tmp.path(), 10).unwrap();
        drop(fs);

        let mut disk = Disk::open(tmp.path(), 10).unwrap();
        debug_walk(&mut disk);
    }

    #[test]
    fn debug_walk_does_not_panic_after_writes() {
        let tmp = NamedTempFile::new().unwrap();
        let mut fs = FileSystem::new();
        fs.format(tmp.path(), 100).unwrap();
        fs.mount(tmp.path());
        let ino = fs.create() as u64;
        fs.write(ino, b"hi", 2, 0);
        fs.unmount();

        let mut disk = Disk::open(tmp.path(), 100).unwrap();
        debug_walk(&mut disk);
    }
}
