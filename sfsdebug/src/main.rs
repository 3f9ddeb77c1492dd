//! `sfsdebug` opens a device file without mounting it and prints the
//! read-only diagnostic walk (`simplefs::debug::debug_walk`) of whatever
//! SimpleFS layout happens to be on disk. It never mutates the device and
//! never installs a mount — it's a diagnostic dump, not a shell.

use clap::Parser;
use simplefs::{Disk, BLOCK_SIZE};
use std::path::PathBuf;

/// Command line arguments for `sfsdebug`.
#[derive(Parser)]
#[command(name = "sfsdebug", about = "Print a read-only diagnostic report of a SimpleFS image")]
struct Args {
    /// Path to the device file to inspect.
    device: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let len = std::fs::metadata(&args.device)
        .unwrap_or_else(|e| sfs_cli::error("sfsdebug", format!("{}: {e}", args.device.display())))
        .len();
    let blocks = len / BLOCK_SIZE as u64;
    log::info!("opening {} as a {blocks}-block device", args.device.display());
    let mut disk = Disk::open(&args.device, blocks)
        .unwrap_or_else(|e| sfs_cli::error("sfsdebug", format!("{}: {e}", args.device.display())));

    simplefs::debug::debug_walk(&mut disk);
    println!("{} block reads, {} block writes", disk.reads(), disk.writes());
}
