// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Read/program granularity of the SPI flash used by the AX frames.
pub const SPI_SECTOR_SIZE: u32 = 4096;

/// Erase block of both SPI flash and ST2205 NAND-ish memory.
pub const ERASE_BLOCK_SIZE: u32 = 65536;

/// Largest chunk a single SPI page program may carry.
pub const SPI_PAGE_SIZE: usize = 256;

/// ST2205 transfer block.
pub const ST2205_BLOCK_SIZE: u32 = 32768;

/// Below this many dirty 4 KiB sectors (out of 16) per erase block, erasing and
/// reprogramming sub-sectors one by one beats a full block cycle.
pub const SMALL_ERASE_THRESHOLD: u32 = 12;

/// Status register polls before a busy flash is given up on.
pub const MAX_READY_POLLS: u32 = 10_000;

/// AX ABFS table size and header fields.
pub const ABFS_SIZE: u32 = 0x1000;
pub const ABFS_MAGIC: &[u8; 4] = b"ABFS";
pub const ABFS_COUNT_OFFSET: u32 = 0x05;

/// ST2205 "FAT" table.
pub const ST2205_FAT_SIZE: u32 = 8192;
pub const ST2205_COUNT_OFFSET: u32 = 0x06;
/// The count byte is 8 bits wide, so the table holds at most this many files.
pub const ST2205_MAX_FILES: u32 = 255;
pub const ST2205_NAME_LEN: usize = 10;
pub const ST2205_HEADER_MARKER: u8 = 0xf5;
pub const ST2205_HEADER_SIZE: u32 = 16;

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub small_erase_threshold: u32,
    pub max_ready_polls: u32,
    /// Compact the heap when no single hole fits but the total free space does.
    pub auto_defragment: bool,
    /// Refuse to open a frame whose table checksum does not match.
    pub verify_table_checksum: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            small_erase_threshold: SMALL_ERASE_THRESHOLD,
            max_ready_polls: MAX_READY_POLLS,
            auto_defragment: true,
            verify_table_checksum: true,
        }
    }
}
