// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Write-back sector cache.
//!
//! Holds the whole flash image in memory for the lifetime of a session.
//! Sectors are fetched from the device the first time any byte in them is
//! touched; writes only ever land in memory and mark the sector dirty. The
//! commit engine is the only thing that pushes bytes back to the device.

use crate::device::{sum16, BlockDevice, EraseSize};
use crate::error::{FrameError, Result};

pub struct SectorCache<D> {
    device: D,
    mem: Vec<u8>,
    sector_size: u32,
    present: Vec<bool>,
    dirty: Vec<bool>,
    write_limit: u32,
}

impl<D: BlockDevice> SectorCache<D> {
    pub fn new(device: D, mem_size: u32, sector_size: u32) -> Result<Self> {
        if sector_size == 0 || mem_size == 0 || mem_size % sector_size != 0 {
            return Err(FrameError::Corrupted(format!(
                "memory size {:#x} is not a multiple of the sector size {:#x}",
                mem_size, sector_size
            )));
        }
        let sectors = (mem_size / sector_size) as usize;
        Ok(Self {
            device,
            mem: vec![0u8; mem_size as usize],
            sector_size,
            present: vec![false; sectors],
            dirty: vec![false; sectors],
            write_limit: mem_size,
        })
    }

    pub fn mem_size(&self) -> u32 {
        self.mem.len() as u32
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn sector_count(&self) -> u32 {
        self.present.len() as u32
    }

    /// Bytes at or above `limit` may be read but never written (firmware or
    /// bootloader living at the end of the flash).
    pub fn set_write_limit(&mut self, limit: u32) {
        self.write_limit = limit.min(self.mem_size());
    }

    pub fn write_limit(&self) -> u32 {
        self.write_limit
    }

    pub fn ensure_loaded(&mut self, sector: u32) -> Result<()> {
        if sector >= self.sector_count() {
            tracing::error!("read beyond end of memory: sector {}", sector);
            return Err(FrameError::Corrupted(format!(
                "sector {} beyond end of memory ({} sectors)",
                sector,
                self.sector_count()
            )));
        }
        let idx = sector as usize;
        if self.present[idx] {
            return Ok(());
        }
        let start = idx * self.sector_size as usize;
        let end = start + self.sector_size as usize;
        self.device.read_sector(start as u32, &mut self.mem[start..end])?;
        self.present[idx] = true;
        Ok(())
    }

    fn check_range(&self, offset: u32, len: usize, limit: u32) -> Result<()> {
        let end = offset as u64 + len as u64;
        if end > limit as u64 {
            return Err(FrameError::BadParameter(format!(
                "access {:#x}..{:#x} outside of {:#x} bytes",
                offset, end, limit
            )));
        }
        Ok(())
    }

    fn load_range(&mut self, offset: u32, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let first = offset / self.sector_size;
        let last = (offset + len as u32 - 1) / self.sector_size;
        for sector in first..=last {
            self.ensure_loaded(sector)?;
        }
        Ok(())
    }

    pub fn read_into(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len(), self.mem_size())?;
        self.load_range(offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        Ok(())
    }

    pub fn read(&mut self, offset: u32, len: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Copies `data` into the image. Only sectors whose bytes actually change
    /// become dirty, so rewriting identical content leaves nothing to commit.
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len(), self.write_limit)?;
        self.load_range(offset, data.len())?;

        let sector_size = self.sector_size as usize;
        let mut pos = offset as usize;
        let mut rest = data;
        while !rest.is_empty() {
            let sector = pos / sector_size;
            let chunk = (sector_size - pos % sector_size).min(rest.len());
            let target = &mut self.mem[pos..pos + chunk];
            if target != &rest[..chunk] {
                target.copy_from_slice(&rest[..chunk]);
                self.dirty[sector] = true;
            }
            pos += chunk;
            rest = &rest[chunk..];
        }
        Ok(())
    }

    pub fn fill(&mut self, offset: u32, len: u32, byte: u8) -> Result<()> {
        self.write(offset, &vec![byte; len as usize])
    }

    pub fn is_present(&self, sector: u32) -> bool {
        self.present.get(sector as usize).copied().unwrap_or(false)
    }

    pub fn is_sector_dirty(&self, sector: u32) -> bool {
        self.dirty.get(sector as usize).copied().unwrap_or(false)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.iter().filter(|&&d| d).count()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Hands the device back; anything not yet committed is dropped.
    pub fn into_device(self) -> D {
        self.device
    }

    pub(crate) fn mark_dirty(&mut self, sector: u32) {
        self.dirty[sector as usize] = true;
    }

    pub(crate) fn clear_dirty(&mut self, sector: u32) {
        self.dirty[sector as usize] = false;
    }

    fn sector_range(&self, first: u32, count: u32) -> std::ops::Range<usize> {
        let start = (first * self.sector_size) as usize;
        start..start + (count * self.sector_size) as usize
    }

    pub(crate) fn erase(&mut self, addr: u32, size: EraseSize) -> Result<()> {
        self.device.erase(addr, size)
    }

    /// Programs sector `sector` from the cached image. Does not touch flags.
    pub(crate) fn program_sector(&mut self, sector: u32) -> Result<()> {
        let range = self.sector_range(sector, 1);
        let addr = range.start as u32;
        self.device.write_sector(addr, &self.mem[range])
    }

    /// Programs `count` sectors starting at `first` in one device operation.
    pub(crate) fn program_bulk(&mut self, first: u32, count: u32) -> Result<()> {
        let range = self.sector_range(first, count);
        let addr = range.start as u32;
        self.device.program_bulk(addr, &self.mem[range])
    }

    pub(crate) fn local_checksum(&self, first: u32, count: u32) -> u16 {
        sum16(&self.mem[self.sector_range(first, count)])
    }
}
