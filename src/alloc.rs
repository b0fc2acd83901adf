// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Picture heap allocation.
//!
//! First-fit over the gaps between used ranges, with one defragmentation
//! retry when no single hole is large enough but the holes together are.

use serde::Serialize;

use crate::device::BlockDevice;
use crate::directory::{blob_header_len, Directory, DirectoryEntry};
use crate::error::{FrameError, Result};
use crate::layout::{EntryFormat, SizeSource};

/// Half-open byte range `[start, end)` that no new blob may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsedRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hole {
    pub start: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceReport {
    pub heap_start: u32,
    pub heap_end: u32,
    pub used: u32,
    pub free: u32,
    pub largest_hole: u32,
    pub holes: usize,
}

/// Present entries plus the system area before the heap and the reserved
/// tail, sorted by start address. Always rebuilt from the table.
pub fn build_used_ranges<D: BlockDevice>(dir: &mut Directory<'_, D>) -> Result<Vec<UsedRange>> {
    let layout = dir.layout().clone();
    let mut ranges = vec![
        UsedRange { start: 0, end: layout.heap_start },
        UsedRange { start: layout.heap_end(), end: layout.mem_size },
    ];
    for idx in 0..layout.max_entries {
        if !dir.is_present(idx)? {
            continue;
        }
        let entry = dir.read_entry(idx)?;
        ranges.push(UsedRange { start: entry.address, end: entry.end() });
    }
    ranges.sort_by_key(|r| r.start);
    Ok(ranges)
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Gaps between adjacent ranges, in address order.
pub fn holes(ranges: &[UsedRange], alignment: u32) -> Vec<Hole> {
    let mut out = Vec::new();
    let mut prev_end = 0u32;
    for range in ranges {
        let start = align_up(prev_end, alignment);
        if range.start > start {
            out.push(Hole { start, size: range.start - start });
        }
        prev_end = prev_end.max(range.end);
    }
    out
}

/// First hole (by address) of at least `needed` bytes.
pub fn first_fit(holes: &[Hole], needed: u32) -> Option<u32> {
    holes.iter().find(|h| h.size >= needed).map(|h| h.start)
}

pub fn free_space<D: BlockDevice>(dir: &mut Directory<'_, D>) -> Result<u32> {
    let ranges = build_used_ranges(dir)?;
    Ok(holes(&ranges, dir.layout().address_alignment).iter().map(|h| h.size).sum())
}

pub fn space_report<D: BlockDevice>(dir: &mut Directory<'_, D>) -> Result<SpaceReport> {
    let ranges = build_used_ranges(dir)?;
    let layout = dir.layout();
    let holes = holes(&ranges, layout.address_alignment);
    let free: u32 = holes.iter().map(|h| h.size).sum();
    Ok(SpaceReport {
        heap_start: layout.heap_start,
        heap_end: layout.heap_end(),
        used: layout.heap_end() - layout.heap_start - free,
        free,
        largest_hole: holes.iter().map(|h| h.size).max().unwrap_or(0),
        holes: holes.len(),
    })
}

/// Lowest empty slot. A full table is reported separately from a full heap.
pub fn find_free_slot<D: BlockDevice>(dir: &mut Directory<'_, D>) -> Result<u32> {
    let max = dir.layout().max_entries;
    for idx in 0..max {
        if !dir.is_present(idx)? {
            return Ok(idx);
        }
    }
    tracing::error!("no free slot in the directory table");
    Err(FrameError::TableFull { capacity: max })
}

fn check_blob<D: BlockDevice>(dir: &mut Directory<'_, D>, idx: u32, blob: &[u8]) -> Result<()> {
    if blob.is_empty() {
        return Err(FrameError::BadParameter("empty blob".into()));
    }
    if dir.is_present(idx)? {
        return Err(FrameError::BadParameter(format!("slot {} is already in use", idx)));
    }
    match dir.layout().size_source {
        SizeSource::Stored => {}
        SizeSource::Fixed(size) => {
            if blob.len() != size as usize {
                return Err(FrameError::BadParameter(format!(
                    "invalid picture size {} (expected {})",
                    blob.len(),
                    size
                )));
            }
        }
        SizeSource::BlobHeader => {
            let len = blob_header_len(blob).map_err(|_| FrameError::BadParameter("blob lacks a picture header".into()))?;
            if len as usize != blob.len() {
                return Err(FrameError::BadParameter(format!(
                    "picture header says {} bytes, blob has {}",
                    len,
                    blob.len()
                )));
            }
        }
    }
    let max = dir.layout().max_blob_size();
    let fits = u32::try_from(blob.len()).is_ok_and(|len| len <= max && dir.layout().reserved_size(len) <= max);
    if !fits {
        return Err(FrameError::BadParameter(format!(
            "blob of {} bytes exceeds the {} byte entry limit",
            blob.len(),
            max
        )));
    }
    Ok(())
}

/// One first-fit attempt. `None` when no single hole fits.
fn place<D: BlockDevice>(
    dir: &mut Directory<'_, D>,
    idx: u32,
    blob: &[u8],
    name: Option<&str>,
) -> Result<Option<DirectoryEntry>> {
    let needed = dir.layout().reserved_size(blob.len() as u32);
    let ranges = build_used_ranges(dir)?;
    let holes = holes(&ranges, dir.layout().address_alignment);
    let Some(start) = first_fit(&holes, needed) else {
        return Ok(None);
    };
    tracing::debug!("found a hole at {:#x} for {} bytes (slot {})", start, needed, idx);

    let entry = DirectoryEntry::new(start, needed);
    dir.write_entry(idx, &entry)?;
    dir.cache().write(start, blob)?;
    if dir.layout().entry_format == EntryFormat::Named32 {
        dir.write_name(idx, name.unwrap_or(""))?;
    }
    dir.update_file_count()?;
    Ok(Some(entry))
}

/// Stores `blob` in empty slot `idx`.
pub fn write_blob<D: BlockDevice>(
    dir: &mut Directory<'_, D>,
    idx: u32,
    blob: &[u8],
    auto_defragment: bool,
) -> Result<DirectoryEntry> {
    write_named_blob(dir, idx, blob, None, auto_defragment)
}

pub fn write_named_blob<D: BlockDevice>(
    dir: &mut Directory<'_, D>,
    idx: u32,
    blob: &[u8],
    name: Option<&str>,
    auto_defragment: bool,
) -> Result<DirectoryEntry> {
    check_blob(dir, idx, blob)?;
    if let Some(entry) = place(dir, idx, blob, name)? {
        return Ok(entry);
    }

    let needed = dir.layout().reserved_size(blob.len() as u32);
    let free = free_space(dir)?;
    if auto_defragment && free >= needed {
        tracing::info!("no single hole of {} bytes, defragmenting ({} bytes free)", needed, free);
        defragment(dir)?;
        if let Some(entry) = place(dir, idx, blob, name)? {
            return Ok(entry);
        }
    }
    tracing::error!("not enough freespace to add file: need {}, {} free", needed, free);
    Err(FrameError::HeapFull { needed, free })
}

/// Repacks every live blob contiguously from the heap start, keeping each at
/// its directory index.
///
/// The table is wiped before the blobs are written back. If a write-back
/// fails, blobs already written stay; the rest are gone from the table. The
/// error is logged and returned, nothing is rolled back.
pub fn defragment<D: BlockDevice>(dir: &mut Directory<'_, D>) -> Result<()> {
    let max = dir.layout().max_entries;
    let mut live = Vec::new();
    for idx in 0..max {
        if !dir.is_present(idx)? {
            continue;
        }
        let entry = dir.read_entry(idx)?;
        let blob = dir.cache().read(entry.address, entry.size)?;
        let name = dir.read_name(idx)?;
        live.push((idx, blob, name));
    }

    dir.clear()?;

    let total = live.len();
    for (done, (idx, blob, name)) in live.into_iter().enumerate() {
        let res = place(dir, idx, &blob, name.as_deref()).and_then(|placed| {
            placed.map(|_| ()).ok_or(FrameError::HeapFull {
                needed: blob.len() as u32,
                free: 0,
            })
        });
        if let Err(e) = res {
            tracing::error!(
                "defragmentation failed at slot {}: {} ({} of {} pictures lost)",
                idx,
                e,
                total - done,
                total
            );
            return Err(e);
        }
    }
    tracing::info!("defragmented {} pictures", total);
    Ok(())
}

pub fn delete<D: BlockDevice>(dir: &mut Directory<'_, D>, idx: u32) -> Result<()> {
    let entry = dir.read_entry(idx)?;
    if !entry.present {
        tracing::error!("trying to delete an already deleted file");
        return Err(FrameError::BadParameter(format!("slot {} is not in use", idx)));
    }
    dir.write_entry(idx, &DirectoryEntry { present: false, ..entry })?;
    dir.update_file_count()
}

pub fn delete_all<D: BlockDevice>(dir: &mut Directory<'_, D>) -> Result<()> {
    dir.clear()
}
