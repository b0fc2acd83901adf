// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Directory table (ABFS / "FAT") access.
//!
//! All reads and writes go through the sector cache; nothing here talks to
//! the device. Wire-format packing is left to [`EntryFormat`].

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;

use crate::cache::SectorCache;
use crate::config::{ST2205_HEADER_MARKER, ST2205_HEADER_SIZE};
use crate::device::BlockDevice;
use crate::error::{FrameError, Result};
use crate::layout::{decode_name, encode_name, EntryFormat, FileCount, Layout, RawEntry, SizeSource, TableChecksum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DirectoryEntry {
    pub present: bool,
    pub address: u32,
    pub size: u32,
}

impl DirectoryEntry {
    pub fn new(address: u32, size: u32) -> Self {
        Self { present: true, address, size }
    }

    pub fn end(&self) -> u32 {
        self.address + self.size
    }
}

/// Total length of an ST2205 blob, taken from its header.
pub(crate) fn blob_header_len(header: &[u8]) -> Result<u32> {
    if header.len() < ST2205_HEADER_SIZE as usize || header[0] != ST2205_HEADER_MARKER {
        return Err(FrameError::Corrupted("invalid picture header".into()));
    }
    Ok(BigEndian::read_u16(&header[12..14]) as u32 + ST2205_HEADER_SIZE)
}

pub struct Directory<'a, D> {
    layout: &'a Layout,
    cache: &'a mut SectorCache<D>,
}

impl<'a, D: BlockDevice> Directory<'a, D> {
    pub fn new(layout: &'a Layout, cache: &'a mut SectorCache<D>) -> Self {
        Self { layout, cache }
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    pub fn cache(&mut self) -> &mut SectorCache<D> {
        self.cache
    }

    fn check_index(&self, idx: u32) -> Result<()> {
        if idx >= self.layout.max_entries {
            return Err(FrameError::BadParameter(format!(
                "file index {} beyond end of table ({} entries)",
                idx, self.layout.max_entries
            )));
        }
        Ok(())
    }

    fn read_slot(&mut self, idx: u32) -> Result<Vec<u8>> {
        self.cache.read(self.layout.entry_offset(idx), self.layout.entry_stride)
    }

    /// Count byte as stored on flash, for layouts that keep one.
    pub fn stored_count(&mut self) -> Result<Option<u32>> {
        match self.layout.file_count {
            FileCount::Derived => Ok(None),
            FileCount::Stored { offset, .. } => {
                let mut c = [0u8; 1];
                self.cache.read_into(self.layout.table_start + offset, &mut c)?;
                Ok(Some(c[0] as u32))
            }
        }
    }

    /// Slots at or past this index are empty by definition.
    fn scan_limit(&mut self) -> Result<u32> {
        match self.layout.file_count {
            FileCount::Stored { authoritative: true, .. } => {
                let count = self.stored_count()?.unwrap_or(0);
                Ok(count.min(self.layout.max_entries))
            }
            _ => Ok(self.layout.max_entries),
        }
    }

    fn read_raw(&mut self, idx: u32) -> Result<RawEntry> {
        self.check_index(idx)?;
        if idx >= self.scan_limit()? {
            return Ok(RawEntry::default());
        }
        let raw = self.read_slot(idx)?;
        Ok(self.layout.entry_format.decode(&raw))
    }

    pub fn is_present(&mut self, idx: u32) -> Result<bool> {
        Ok(self.read_raw(idx)?.present)
    }

    pub fn read_entry(&mut self, idx: u32) -> Result<DirectoryEntry> {
        let raw = self.read_raw(idx)?;
        if !raw.present {
            return Ok(DirectoryEntry {
                present: false,
                address: raw.address,
                size: raw.size.unwrap_or(0),
            });
        }
        let layout = self.layout;
        if raw.address % layout.address_alignment != 0
            || raw.address < layout.heap_start
            || raw.address >= layout.heap_end()
        {
            tracing::error!("entry {} points at invalid address {:#x}", idx, raw.address);
            return Err(FrameError::Corrupted(format!(
                "entry {} address {:#x} outside of picture memory",
                idx, raw.address
            )));
        }
        let size = match layout.size_source {
            SizeSource::Stored => raw.size.unwrap_or(0),
            SizeSource::Fixed(size) => size,
            SizeSource::BlobHeader => {
                if raw.address + ST2205_HEADER_SIZE > layout.heap_end() {
                    return Err(FrameError::Corrupted(format!("entry {} header beyond end of memory", idx)));
                }
                let header = self.cache.read(raw.address, ST2205_HEADER_SIZE)?;
                blob_header_len(&header)?
            }
        };
        if size == 0 || raw.address as u64 + size as u64 > layout.heap_end() as u64 {
            tracing::error!("entry {} has invalid size {}", idx, size);
            return Err(FrameError::Corrupted(format!(
                "entry {} ({:#x} + {}) outside of picture memory",
                idx, raw.address, size
            )));
        }
        Ok(DirectoryEntry { present: true, address: raw.address, size })
    }

    /// Encodes `entry` into slot `idx`. Validation happens before any byte is
    /// written.
    pub fn write_entry(&mut self, idx: u32, entry: &DirectoryEntry) -> Result<()> {
        self.check_index(idx)?;
        let layout = self.layout;
        if entry.present {
            if entry.address % layout.address_alignment != 0 {
                return Err(FrameError::BadParameter(format!(
                    "address {:#x} not aligned to {:#x}",
                    entry.address, layout.address_alignment
                )));
            }
            if entry.address < layout.heap_start || entry.address as u64 + entry.size as u64 > layout.heap_end() as u64 {
                return Err(FrameError::BadParameter(format!(
                    "{:#x} + {} outside of picture memory",
                    entry.address, entry.size
                )));
            }
            if let SizeSource::Fixed(expected) = layout.size_source {
                if entry.size != expected {
                    return Err(FrameError::BadParameter(format!(
                        "invalid picture size {} (expected {})",
                        entry.size, expected
                    )));
                }
            }
        }

        let count = match layout.file_count {
            FileCount::Stored { authoritative: true, .. } => Some(self.scan_limit()?),
            _ => None,
        };
        if let Some(count) = count {
            if entry.present && idx > count {
                // Slots between the old count and `idx` become live table
                // space; make sure no stale bytes read back as present.
                for gap in count..idx {
                    let blank = vec![0u8; layout.entry_stride as usize];
                    self.cache.write(layout.entry_offset(gap), &blank)?;
                }
            }
        }

        let mut raw = self.read_slot(idx)?;
        let mut encoded = RawEntry { present: entry.present, address: entry.address, size: Some(entry.size) };
        if !entry.present && layout.entry_format == EntryFormat::Named32 {
            // Deleting only clears the present byte.
            encoded.address = LittleEndian::read_u32(&raw[1..5]);
        }
        layout.entry_format.encode(&encoded, &mut raw)?;
        self.cache.write(layout.entry_offset(idx), &raw)?;

        if let (Some(count), FileCount::Stored { offset, .. }) = (count, layout.file_count) {
            if entry.present && idx >= count {
                self.cache.write(layout.table_start + offset, &[(idx + 1) as u8])?;
                // Appending moves the end marker to the slot after the new entry.
                if idx + 1 < layout.max_entries {
                    let mut marker = vec![0u8; layout.entry_stride as usize];
                    let end = RawEntry { present: false, address: entry.end(), size: None };
                    layout.entry_format.encode(&end, &mut marker)?;
                    self.cache.write(layout.entry_offset(idx + 1), &marker)?;
                }
            }
        }
        Ok(())
    }

    pub fn write_name(&mut self, idx: u32, name: &str) -> Result<()> {
        self.check_index(idx)?;
        if self.layout.entry_format != EntryFormat::Named32 {
            return Err(FrameError::NotSupported(format!("{:?} entries carry no name", self.layout.variant)));
        }
        let mut raw = self.read_slot(idx)?;
        encode_name(name, &mut raw);
        self.cache.write(self.layout.entry_offset(idx), &raw)
    }

    /// Stored name, `None` for layouts without names.
    pub fn read_name(&mut self, idx: u32) -> Result<Option<String>> {
        self.check_index(idx)?;
        if self.layout.entry_format != EntryFormat::Named32 {
            return Ok(None);
        }
        let raw = self.read_slot(idx)?;
        Ok(Some(decode_name(&raw)))
    }

    /// Highest present index + 1 (gaps below it do not lower the count).
    pub fn file_count(&mut self) -> Result<u32> {
        let limit = self.scan_limit()?;
        let mut count = 0;
        for idx in 0..limit {
            if self.is_present(idx)? {
                count = idx + 1;
            }
        }
        Ok(count)
    }

    /// Brings the stored count, checksum and table copies in line with the
    /// entries. The end marker is only moved by an appending `write_entry`.
    pub fn update_file_count(&mut self) -> Result<()> {
        let layout = self.layout;
        if let FileCount::Stored { offset, .. } = layout.file_count {
            let count = self.file_count()?;
            self.cache.write(layout.table_start + offset, &[count.min(u8::MAX as u32) as u8])?;
        }
        self.update_checksum()?;
        self.copy_table()
    }

    /// Empties every slot in one write.
    pub fn clear(&mut self) -> Result<()> {
        let layout = self.layout;
        let start = layout.table_start + layout.entries_offset;
        self.cache.fill(start, layout.table_size - layout.entries_offset, 0)?;
        if let FileCount::Stored { offset, .. } = layout.file_count {
            self.cache.write(layout.table_start + offset, &[0])?;
        }
        self.update_file_count()
    }

    fn compute_checksum(&mut self, offset: u32, skip_stride: u32) -> Result<u16> {
        let table = self.cache.read(self.layout.table_start, self.layout.table_size)?;
        let body = (offset as usize + 2..table.len())
            .filter(|i| i % skip_stride as usize != 0)
            .map(|i| table[i]);
        Ok(body.fold(0u32, |acc, b| acc.wrapping_add(b as u32)) as u16)
    }

    pub fn verify_checksum(&mut self) -> Result<()> {
        if let TableChecksum::Sum16 { offset, skip_stride } = self.layout.checksum {
            let mut stored = [0u8; 2];
            self.cache.read_into(self.layout.table_start + offset, &mut stored)?;
            let stored = LittleEndian::read_u16(&stored);
            let expected = self.compute_checksum(offset, skip_stride)?;
            if stored != expected {
                tracing::error!("image table checksum mismatch: {:#06x} != {:#06x}", stored, expected);
                return Err(FrameError::Corrupted("image table checksum mismatch".into()));
            }
        }
        Ok(())
    }

    fn update_checksum(&mut self) -> Result<()> {
        if let TableChecksum::Sum16 { offset, skip_stride } = self.layout.checksum {
            let sum = self.compute_checksum(offset, skip_stride)?;
            let mut buf = [0u8; 2];
            LittleEndian::write_u16(&mut buf, sum);
            self.cache.write(self.layout.table_start + offset, &buf)?;
        }
        Ok(())
    }

    fn copy_table(&mut self) -> Result<()> {
        let layout = self.layout;
        if layout.table_copies <= 1 {
            return Ok(());
        }
        let table = self.cache.read(layout.table_start, layout.table_size)?;
        for i in 1..layout.table_copies {
            self.cache.write(layout.table_start + i * layout.table_size, &table)?;
        }
        Ok(())
    }
}
