// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Open picture frame session.
//!
//! [`PictureFrame`] owns the device and the sector cache from `open` until
//! `close`. Every mutation stays in memory until [`PictureFrame::commit`];
//! dropping or closing the session without committing leaves the device as
//! it was.

use serde::Serialize;

use crate::alloc::{self, SpaceReport};
use crate::cache::SectorCache;
use crate::codec::{codec_for, RgbImage};
use crate::commit::{self, CommitPolicy, CommitStats};
use crate::config::SessionConfig;
use crate::device::BlockDevice;
use crate::directory::{Directory, DirectoryEntry};
use crate::error::{FrameError, Result};
use crate::layout::{known, FileCount, Layout};

/// One stored picture as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub index: u32,
    pub name: Option<String>,
    pub address: u32,
    pub size: u32,
}

pub struct PictureFrame<D> {
    layout: Layout,
    cache: SectorCache<D>,
    config: SessionConfig,
}

impl<D: BlockDevice> PictureFrame<D> {
    pub fn open(mut device: D, config: SessionConfig) -> Result<Self> {
        device.set_ready_poll_budget(config.max_ready_polls);
        let probe = known::probe(&mut device)?;
        let mut cache = SectorCache::new(device, probe.mem_size(), probe.sector_size())?;
        let layout = known::detect(probe, &mut cache)?;
        cache.set_write_limit(layout.heap_end());

        let mut frame = Self { layout, cache, config };
        if frame.config.verify_table_checksum {
            frame.directory().verify_checksum()?;
        }
        if let FileCount::Stored { authoritative: false, .. } = frame.layout.file_count {
            let mut dir = frame.directory();
            let stored = dir.stored_count()?.unwrap_or(0);
            let derived = dir.file_count()?;
            if stored != derived.min(u8::MAX as u32) {
                tracing::warn!("stored file count {} does not match table ({})", stored, derived);
            }
        }
        tracing::info!(
            "opened {:?} frame: {} bytes, {}x{}, {:?}",
            frame.layout.variant,
            frame.layout.mem_size,
            frame.layout.width,
            frame.layout.height,
            frame.layout.compression
        );
        Ok(frame)
    }

    /// Ends the session and returns the device. Uncommitted changes are dropped.
    pub fn close(self) -> D {
        if self.cache.is_dirty() {
            tracing::warn!("discarding {} uncommitted sectors", self.cache.dirty_count());
        }
        self.cache.into_device()
    }

    fn directory(&mut self) -> Directory<'_, D> {
        Directory::new(&self.layout, &mut self.cache)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        self.cache.device()
    }

    pub fn mem_size(&self) -> u32 {
        self.layout.mem_size
    }

    pub fn free_space(&mut self) -> Result<u32> {
        alloc::free_space(&mut self.directory())
    }

    pub fn space_report(&mut self) -> Result<SpaceReport> {
        alloc::space_report(&mut self.directory())
    }

    pub fn file_count(&mut self) -> Result<u32> {
        self.directory().file_count()
    }

    pub fn max_entries(&self) -> u32 {
        self.layout.max_entries
    }

    pub fn entry(&mut self, idx: u32) -> Result<DirectoryEntry> {
        self.directory().read_entry(idx)
    }

    pub fn name(&mut self, idx: u32) -> Result<Option<String>> {
        self.directory().read_name(idx)
    }

    /// Present pictures in index order.
    pub fn entries(&mut self) -> Result<Vec<FileInfo>> {
        let mut dir = self.directory();
        let count = dir.file_count()?;
        let mut out = Vec::new();
        for index in 0..count {
            let entry = dir.read_entry(index)?;
            if !entry.present {
                continue;
            }
            out.push(FileInfo {
                index,
                name: dir.read_name(index)?,
                address: entry.address,
                size: entry.size,
            });
        }
        Ok(out)
    }

    pub fn read_raw(&mut self, idx: u32) -> Result<Vec<u8>> {
        let entry = self.entry(idx)?;
        if !entry.present {
            return Err(FrameError::BadParameter(format!("slot {} is not in use", idx)));
        }
        self.cache.read(entry.address, entry.size)
    }

    /// Stores `blob` in empty slot `idx`.
    pub fn write_raw(&mut self, idx: u32, blob: &[u8]) -> Result<DirectoryEntry> {
        let auto = self.config.auto_defragment;
        alloc::write_blob(&mut self.directory(), idx, blob, auto)
    }

    /// Stores `blob` in the lowest free slot and returns that slot.
    pub fn add_raw(&mut self, name: &str, blob: &[u8]) -> Result<u32> {
        let auto = self.config.auto_defragment;
        let mut dir = self.directory();
        let idx = alloc::find_free_slot(&mut dir)?;
        let entry = alloc::write_named_blob(&mut dir, idx, blob, Some(name), auto)?;
        tracing::debug!("stored {} bytes at {:#x} in slot {}", blob.len(), entry.address, idx);
        Ok(idx)
    }

    pub fn read_image(&mut self, idx: u32) -> Result<RgbImage> {
        let codec = codec_for(self.layout.compression)?;
        let blob = self.read_raw(idx)?;
        codec.decode(&blob, self.layout.width, self.layout.height)
    }

    pub fn add_image(&mut self, name: &str, image: &RgbImage) -> Result<u32> {
        if self.layout.width != 0 && (image.width, image.height) != (self.layout.width, self.layout.height) {
            return Err(FrameError::BadParameter(format!(
                "image is {}x{}, frame is {}x{}",
                image.width, image.height, self.layout.width, self.layout.height
            )));
        }
        let codec = codec_for(self.layout.compression)?;
        let blob = codec.encode(image)?;
        self.add_raw(name, &blob)
    }

    pub fn delete(&mut self, idx: u32) -> Result<()> {
        alloc::delete(&mut self.directory(), idx)
    }

    pub fn delete_all(&mut self) -> Result<()> {
        alloc::delete_all(&mut self.directory())
    }

    /// See [`alloc::defragment`] for what happens when this fails halfway.
    pub fn defragment(&mut self) -> Result<()> {
        alloc::defragment(&mut self.directory())
    }

    pub fn commit(&mut self) -> Result<CommitStats> {
        let policy = CommitPolicy::new(&self.layout, &self.config);
        commit::commit(&mut self.cache, &self.layout, &policy)
    }

    pub fn is_dirty(&self) -> bool {
        self.cache.is_dirty()
    }

    /// Sectors a commit would write back.
    pub fn dirty_sectors(&self) -> usize {
        self.cache.dirty_count()
    }
}
