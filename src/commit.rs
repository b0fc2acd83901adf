// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Write-back of dirty sectors.
//!
//! Works one erase block at a time. A sector's dirty flag is only cleared
//! once its bytes are on the device, so a failed commit can simply be retried.

use serde::Serialize;

use crate::cache::SectorCache;
use crate::config::SessionConfig;
use crate::device::{BlockDevice, EraseSize};
use crate::error::{FrameError, Result};
use crate::layout::Layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockStrategy {
    /// Nothing dirty.
    Skip,
    /// Erase and reprogram only the dirty sectors.
    EraseProgramSmall,
    /// Erase the whole block, reprogram every sector in it.
    EraseProgramLarge,
    /// Erase the whole block, program it in one go, compare device checksum.
    EraseProgramBulkVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub small_erase: bool,
    pub bulk_program: bool,
    pub small_erase_threshold: u32,
}

impl CommitPolicy {
    pub fn new(layout: &Layout, config: &SessionConfig) -> Self {
        Self {
            small_erase: layout.small_erase,
            bulk_program: layout.bulk_program,
            small_erase_threshold: config.small_erase_threshold,
        }
    }
}

pub fn plan_block(dirty_sectors: u32, policy: &CommitPolicy) -> BlockStrategy {
    if dirty_sectors == 0 {
        BlockStrategy::Skip
    } else if policy.bulk_program {
        BlockStrategy::EraseProgramBulkVerified
    } else if policy.small_erase && dirty_sectors < policy.small_erase_threshold {
        BlockStrategy::EraseProgramSmall
    } else {
        BlockStrategy::EraseProgramLarge
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub blocks_skipped: u32,
    pub small_blocks: u32,
    pub large_blocks: u32,
    pub bulk_blocks: u32,
    pub sectors_written: u32,
    pub sector_erases: u32,
    pub block_erases: u32,
}

impl CommitStats {
    pub fn blocks_written(&self) -> u32 {
        self.small_blocks + self.large_blocks + self.bulk_blocks
    }
}

/// Flushes every dirty sector to the device.
pub fn commit<D: BlockDevice>(cache: &mut SectorCache<D>, layout: &Layout, policy: &CommitPolicy) -> Result<CommitStats> {
    let mut stats = CommitStats::default();

    if cache.device().is_memory_dump() {
        // Plain file: no erase discipline, just write the changed sectors.
        for sector in 0..cache.sector_count() {
            if cache.is_sector_dirty(sector) {
                cache.program_sector(sector)?;
                cache.clear_dirty(sector);
                stats.sectors_written += 1;
            }
        }
        cache.device_mut().flush()?;
        tracing::info!("committed {} sectors to memory dump", stats.sectors_written);
        return Ok(stats);
    }

    let mut policy = *policy;
    policy.bulk_program = policy.bulk_program && cache.device().supports_bulk_program();

    let per_block = layout.sectors_per_block();
    let mut first = 0;
    while first < cache.sector_count() {
        let count = per_block.min(cache.sector_count() - first);
        let dirty = (first..first + count).filter(|&s| cache.is_sector_dirty(s)).count() as u32;
        let strategy = plan_block(dirty, &policy);
        if strategy != BlockStrategy::Skip {
            tracing::debug!(
                "block at {:#x}: {} dirty sectors, {:?}",
                first * cache.sector_size(),
                dirty,
                strategy
            );
        }
        match strategy {
            BlockStrategy::Skip => stats.blocks_skipped += 1,
            BlockStrategy::EraseProgramSmall => {
                commit_small(cache, first, count, &mut stats)?;
                stats.small_blocks += 1;
            }
            BlockStrategy::EraseProgramLarge => {
                commit_large(cache, first, count, &mut stats)?;
                stats.large_blocks += 1;
            }
            BlockStrategy::EraseProgramBulkVerified => {
                commit_bulk(cache, first, count, &mut stats)?;
                stats.bulk_blocks += 1;
            }
        }
        first += count;
    }

    cache.device_mut().flush()?;
    if stats.blocks_written() > 0 {
        tracing::info!(
            "commit: {} blocks written ({} small, {} large, {} bulk), {} sectors",
            stats.blocks_written(),
            stats.small_blocks,
            stats.large_blocks,
            stats.bulk_blocks,
            stats.sectors_written
        );
    }
    Ok(stats)
}

fn commit_small<D: BlockDevice>(cache: &mut SectorCache<D>, first: u32, count: u32, stats: &mut CommitStats) -> Result<()> {
    for sector in first..first + count {
        if !cache.is_sector_dirty(sector) {
            continue;
        }
        cache.erase(sector * cache.sector_size(), EraseSize::Sector)?;
        stats.sector_erases += 1;
        cache.program_sector(sector)?;
        cache.clear_dirty(sector);
        stats.sectors_written += 1;
    }
    Ok(())
}

/// Reads the whole block before it is erased and marks every sector in it
/// dirty, so an interrupted rewrite is retried in full.
fn prepare_block<D: BlockDevice>(cache: &mut SectorCache<D>, first: u32, count: u32) -> Result<()> {
    for sector in first..first + count {
        cache.ensure_loaded(sector)?;
    }
    for sector in first..first + count {
        cache.mark_dirty(sector);
    }
    Ok(())
}

fn commit_large<D: BlockDevice>(cache: &mut SectorCache<D>, first: u32, count: u32, stats: &mut CommitStats) -> Result<()> {
    prepare_block(cache, first, count)?;
    cache.erase(first * cache.sector_size(), EraseSize::Block)?;
    stats.block_erases += 1;
    for sector in first..first + count {
        cache.program_sector(sector)?;
        cache.clear_dirty(sector);
        stats.sectors_written += 1;
    }
    Ok(())
}

fn commit_bulk<D: BlockDevice>(cache: &mut SectorCache<D>, first: u32, count: u32, stats: &mut CommitStats) -> Result<()> {
    prepare_block(cache, first, count)?;
    let addr = first * cache.sector_size();
    let len = count * cache.sector_size();
    cache.erase(addr, EraseSize::Block)?;
    stats.block_erases += 1;
    cache.program_bulk(first, count)?;

    let expected = cache.local_checksum(first, count);
    let found = cache.device_mut().checksum(addr, len)?;
    if found != expected {
        tracing::error!(
            "checksum mismatch after programming block at {:#x}: expected {:#06x}, got {:#06x}",
            addr,
            expected,
            found
        );
        return Err(FrameError::VerifyFailed { addr, expected, found });
    }
    for sector in first..first + count {
        cache.clear_dirty(sector);
    }
    stats.sectors_written += count;
    Ok(())
}
