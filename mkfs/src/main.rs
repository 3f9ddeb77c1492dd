//! The `sfs-mkfs` tool formats a device file with a fresh SimpleFS image.

use clap::Parser;
use simplefs::layout::Superblock;
use simplefs::{Disk, FileSystem, BLOCK_SIZE, MAGIC_NUMBER};
use std::path::PathBuf;
use std::process::exit;

/// Command line arguments for `sfs-mkfs`.
#[derive(Parser)]
#[command(name = "sfs-mkfs", about = "Format a device file with a SimpleFS image")]
struct Args {
    /// Path to the device file to format (created if it does not already exist).
    device: PathBuf,

    /// Total number of blocks the image should have.
    #[arg(long, default_value_t = 1024)]
    blocks: u64,

    /// Format even if the device already holds a recognized SimpleFS image.
    #[arg(short, long)]
    force: bool,
}

/// Peeks at block 0 of an existing device file to tell whether it already
/// holds a SimpleFS image, without disturbing its contents.
fn existing_image(device: &std::path::Path) -> Option<Superblock> {
    let len = std::fs::metadata(device).ok()?.len();
    if len < BLOCK_SIZE as u64 {
        return None;
    }
    let mut disk = Disk::open(device, len / BLOCK_SIZE as u64).ok()?;
    let block = disk.read_block(0).ok()?;
    let sb = Superblock::decode(&block);
    (sb.magic == MAGIC_NUMBER).then_some(sb)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if !args.force {
        if let Some(sb) = existing_image(&args.device) {
            println!(
                "{} already contains a SimpleFS image: {} blocks, {} inodes",
                args.device.display(),
                sb.blocks,
                sb.inodes
            );
            if !sfs_cli::confirm("Proceed and overwrite it? (y/N) ") {
                eprintln!("sfs-mkfs: abort.");
                exit(1);
            }
        }
    }

    let mut fs = FileSystem::new();
    match fs.format(&args.device, args.blocks) {
        Ok(true) => {
            log::info!(
                "formatted {} as {} blocks ({} bytes)",
                args.device.display(),
                args.blocks,
                args.blocks * BLOCK_SIZE as u64
            );
            println!(
                "{}: formatted {} blocks ({} bytes)",
                args.device.display(),
                args.blocks,
                args.blocks * BLOCK_SIZE as u64
            );
        }
        Ok(false) => sfs_cli::error("sfs-mkfs", format!("failed to format {}", args.device.display())),
        Err(e) => sfs_cli::error("sfs-mkfs", format!("{}: {e}", args.device.display())),
    }
}
