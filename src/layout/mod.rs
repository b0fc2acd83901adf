// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! On-flash layout descriptors.
//!
//! A [`Layout`] is a plain record chosen once when a frame is opened. Its
//! fields drive the generic directory and allocator code; the few behaviours
//! that really differ between firmware families are the small enums below.

pub mod known;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;

use crate::codec::Compression;
use crate::config::{
    ABFS_COUNT_OFFSET, ABFS_MAGIC, ABFS_SIZE, ERASE_BLOCK_SIZE, SPI_SECTOR_SIZE, ST2205_BLOCK_SIZE,
    ST2205_COUNT_OFFSET, ST2205_FAT_SIZE, ST2205_MAX_FILES, ST2205_NAME_LEN,
};
use crate::device::AxFirmware;
use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variant {
    Ax203V3_3,
    Ax203V3_4,
    Ax206V3_5,
    Ax3003V3_5,
    /// 4 table copies, 64 KiB firmware tail.
    St2205V1,
    /// V2 and V3 frames: one table, 256 KiB firmware tail.
    St2205V2,
    Generic,
}

/// Byte layout of one directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryFormat {
    /// LE16 `address >> 8`; zero means empty. AX203 3.3.x/3.4.x.
    PackedAddress16,
    /// u8 present flag, LE32 address, LE16 size, one pad byte. AX206.
    Flagged32,
    /// BE16 address and BE16 size, both in 256-byte units; zero means empty. AX3003.
    Blocks16,
    /// u8 present flag, LE32 address, 11-byte name. ST2205.
    Named32,
}

/// Where the length of a stored blob comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeSource {
    Stored,
    /// Every picture has the same length.
    Fixed(u32),
    /// Read from the 16-byte ST2205 picture header at the blob start.
    BlobHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileCount {
    /// No count on flash; scan all slots for present entries.
    Derived,
    /// Count byte at `offset` from the table start. When `authoritative`, slots
    /// at or past the count are treated as empty.
    Stored { offset: u32, authoritative: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableChecksum {
    None,
    /// LE16 at `offset`: byte sum of the table from `offset + 2`, skipping
    /// every byte whose index is a multiple of `skip_stride`.
    Sum16 { offset: u32, skip_stride: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub variant: Variant,
    pub mem_size: u32,
    pub sector_size: u32,
    pub erase_block_size: u32,
    /// Device can erase single sectors inside an erase block.
    pub small_erase: bool,
    /// Device can program a whole erase block at once and report a checksum.
    pub bulk_program: bool,

    pub table_start: u32,
    pub table_size: u32,
    /// First entry, relative to `table_start`.
    pub entries_offset: u32,
    pub entry_stride: u32,
    pub max_entries: u32,
    pub entry_format: EntryFormat,
    pub size_source: SizeSource,
    pub file_count: FileCount,
    pub checksum: TableChecksum,
    /// Identical table copies laid out back to back from `table_start`.
    pub table_copies: u32,
    pub magic: Option<[u8; 4]>,

    pub heap_start: u32,
    /// Bytes at the end of memory that never hold pictures.
    pub reserved_trailer: u32,
    pub address_alignment: u32,
    /// Heap reservations are rounded up to this.
    pub size_granularity: u32,

    pub width: u32,
    pub height: u32,
    pub compression: Compression,
}

impl Layout {
    pub fn ax(
        firmware: AxFirmware,
        mem_size: u32,
        small_erase: bool,
        fs_start: u32,
        width: u32,
        height: u32,
        compression: Compression,
    ) -> Result<Self> {
        let (variant, entries_offset, stride, format, picture_offset, trailer, align, bulk) = match firmware {
            AxFirmware::Ax203V3_3 => (Variant::Ax203V3_3, 0x20, 2, EntryFormat::PackedAddress16, 0x2000, 0, 0x100, false),
            AxFirmware::Ax203V3_4 => (Variant::Ax203V3_4, 0x20, 2, EntryFormat::PackedAddress16, 0x2000, 0, 0x100, false),
            AxFirmware::Ax206V3_5 => (Variant::Ax206V3_5, 0x10, 8, EntryFormat::Flagged32, 0x1000, 0, 1, true),
            AxFirmware::Ax3003V3_5 => (Variant::Ax3003V3_5, 0x20, 4, EntryFormat::Blocks16, 0x1000, 0x10000, 0x100, true),
        };
        let (size_source, file_count) = match format {
            EntryFormat::PackedAddress16 => {
                let size = compression.fixed_blob_size(width, height).ok_or_else(|| {
                    FrameError::NotSupported(format!("{:?} on {:?} firmware", compression, firmware))
                })?;
                (
                    SizeSource::Fixed(size),
                    FileCount::Stored { offset: ABFS_COUNT_OFFSET, authoritative: false },
                )
            }
            _ => (SizeSource::Stored, FileCount::Derived),
        };

        let layout = Self {
            variant,
            mem_size,
            sector_size: SPI_SECTOR_SIZE,
            erase_block_size: ERASE_BLOCK_SIZE,
            small_erase,
            bulk_program: bulk,
            table_start: fs_start,
            table_size: ABFS_SIZE,
            entries_offset,
            entry_stride: stride,
            max_entries: (ABFS_SIZE - entries_offset) / stride,
            entry_format: format,
            size_source,
            file_count,
            checksum: TableChecksum::None,
            table_copies: 1,
            magic: Some(*ABFS_MAGIC),
            heap_start: fs_start + picture_offset,
            reserved_trailer: trailer,
            address_alignment: align,
            size_granularity: if format == EntryFormat::Blocks16 { 0x100 } else { 1 },
            width,
            height,
            compression,
        };
        layout.validate()?;
        Ok(layout)
    }

    pub fn st2205(variant: Variant, mem_size: u32, width: u32, height: u32, compressed: bool) -> Result<Self> {
        let (copies, heap_start, firmware_size) = match variant {
            Variant::St2205V1 => (4, 0x10000, 0x10000),
            Variant::St2205V2 => (1, 0x2000, 0x40000),
            other => {
                return Err(FrameError::BadParameter(format!("{:?} is not an ST2205 variant", other)));
            }
        };
        let (size_source, compression) = if compressed {
            (SizeSource::BlobHeader, Compression::St2205Blocks)
        } else {
            (SizeSource::Fixed(width * height * 2), Compression::Rgb565)
        };
        let layout = Self {
            variant,
            mem_size,
            sector_size: ST2205_BLOCK_SIZE,
            erase_block_size: ERASE_BLOCK_SIZE,
            small_erase: false,
            bulk_program: false,
            table_start: 0,
            table_size: ST2205_FAT_SIZE,
            entries_offset: 16,
            entry_stride: 16,
            max_entries: ST2205_MAX_FILES,
            entry_format: EntryFormat::Named32,
            size_source,
            file_count: FileCount::Stored { offset: ST2205_COUNT_OFFSET, authoritative: true },
            checksum: TableChecksum::Sum16 { offset: 0, skip_stride: 16 },
            table_copies: copies,
            magic: None,
            heap_start,
            reserved_trailer: firmware_size,
            address_alignment: 1,
            size_granularity: 1,
            width,
            height,
            compression,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Flat layout for dumps and tests: AX206-style entries at offset 0,
    /// caller-chosen capacity and heap start.
    pub fn generic(mem_size: u32, capacity: u32, heap_start: u32) -> Result<Self> {
        let entries_offset = 0x10;
        let table_size = entries_offset + capacity * 8;
        if capacity == 0 || heap_start < table_size {
            return Err(FrameError::BadParameter(format!(
                "{} entries need {:#x} bytes of table, heap starts at {:#x}",
                capacity, table_size, heap_start
            )));
        }
        let layout = Self {
            variant: Variant::Generic,
            mem_size,
            sector_size: SPI_SECTOR_SIZE,
            erase_block_size: ERASE_BLOCK_SIZE,
            small_erase: true,
            bulk_program: false,
            table_start: 0,
            table_size,
            entries_offset,
            entry_stride: 8,
            max_entries: capacity,
            entry_format: EntryFormat::Flagged32,
            size_source: SizeSource::Stored,
            file_count: FileCount::Derived,
            checksum: TableChecksum::None,
            table_copies: 1,
            magic: None,
            heap_start,
            reserved_trailer: 0,
            address_alignment: 1,
            size_granularity: 1,
            width: 0,
            height: 0,
            compression: Compression::Rgb565,
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<()> {
        let table_end = self.table_start as u64 + self.table_size as u64 * self.table_copies as u64;
        if self.mem_size % self.erase_block_size != 0
            || table_end > self.heap_start as u64
            || self.heap_start >= self.heap_end()
        {
            return Err(FrameError::Corrupted(format!(
                "{:?}: table ends at {:#x}, heap {:#x}..{:#x} in {:#x} bytes",
                self.variant,
                table_end,
                self.heap_start,
                self.heap_end(),
                self.mem_size
            )));
        }
        Ok(())
    }

    /// First byte past the picture heap.
    pub fn heap_end(&self) -> u32 {
        self.mem_size.saturating_sub(self.reserved_trailer)
    }

    pub fn entry_offset(&self, idx: u32) -> u32 {
        self.table_start + self.entries_offset + idx * self.entry_stride
    }

    /// Size the allocator reserves for a blob of `len` bytes.
    pub fn reserved_size(&self, len: u32) -> u32 {
        let g = self.size_granularity.max(1);
        len.div_ceil(g) * g
    }

    /// Largest reservation the entry format can record.
    pub fn max_blob_size(&self) -> u32 {
        match self.entry_format {
            EntryFormat::Flagged32 => u16::MAX as u32,
            EntryFormat::Blocks16 => (u16::MAX as u32) << 8,
            EntryFormat::PackedAddress16 | EntryFormat::Named32 => u32::MAX,
        }
    }

    pub fn sectors_per_block(&self) -> u32 {
        self.erase_block_size / self.sector_size
    }
}

/// Decoded directory slot, before the blob size is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEntry {
    pub present: bool,
    pub address: u32,
    /// `None` for formats that do not store a size.
    pub size: Option<u32>,
}

impl EntryFormat {
    pub fn decode(self, raw: &[u8]) -> RawEntry {
        match self {
            EntryFormat::PackedAddress16 => {
                let address = (LittleEndian::read_u16(&raw[0..2]) as u32) << 8;
                RawEntry { present: address != 0, address, size: None }
            }
            EntryFormat::Flagged32 => RawEntry {
                present: raw[0] == 0x01,
                address: LittleEndian::read_u32(&raw[1..5]),
                size: Some(LittleEndian::read_u16(&raw[5..7]) as u32),
            },
            EntryFormat::Blocks16 => {
                let address = (BigEndian::read_u16(&raw[0..2]) as u32) << 8;
                let size = (BigEndian::read_u16(&raw[2..4]) as u32) << 8;
                RawEntry { present: address != 0, address, size: Some(size) }
            }
            EntryFormat::Named32 => RawEntry {
                present: raw[0] != 0,
                address: LittleEndian::read_u32(&raw[1..5]),
                size: None,
            },
        }
    }

    /// Encodes into `raw`, which holds the slot's current bytes so fields the
    /// format keeps alongside (the ST2205 name) survive.
    pub fn encode(self, entry: &RawEntry, raw: &mut [u8]) -> Result<()> {
        match self {
            EntryFormat::PackedAddress16 => {
                let address = if entry.present { entry.address } else { 0 };
                if address & 0xff != 0 || address >> 8 > u16::MAX as u32 {
                    return Err(FrameError::BadParameter(format!(
                        "address {:#x} not representable as a 256-byte page",
                        address
                    )));
                }
                LittleEndian::write_u16(&mut raw[0..2], (address >> 8) as u16);
            }
            EntryFormat::Flagged32 => {
                let size = entry.size.unwrap_or(0);
                if size > u16::MAX as u32 {
                    return Err(FrameError::BadParameter(format!("size {} does not fit 16 bits", size)));
                }
                raw[0] = entry.present as u8;
                LittleEndian::write_u32(&mut raw[1..5], entry.address);
                LittleEndian::write_u16(&mut raw[5..7], size as u16);
                raw[7] = 0;
            }
            EntryFormat::Blocks16 => {
                if !entry.present {
                    raw[..4].fill(0);
                    return Ok(());
                }
                let size = entry.size.unwrap_or(0);
                if entry.address & 0xff != 0 || size & 0xff != 0 {
                    return Err(FrameError::BadParameter(format!(
                        "address {:#x} / size {:#x} not 256-byte aligned",
                        entry.address, size
                    )));
                }
                if entry.address >> 8 > u16::MAX as u32 || size >> 8 > u16::MAX as u32 {
                    return Err(FrameError::BadParameter(format!(
                        "address {:#x} / size {:#x} out of range",
                        entry.address, size
                    )));
                }
                BigEndian::write_u16(&mut raw[0..2], (entry.address >> 8) as u16);
                BigEndian::write_u16(&mut raw[2..4], (size >> 8) as u16);
            }
            EntryFormat::Named32 => {
                raw[0] = entry.present as u8;
                LittleEndian::write_u32(&mut raw[1..5], entry.address);
            }
        }
        Ok(())
    }
}

/// Writes a NUL-terminated, possibly truncated name into an ST2205 slot.
pub fn encode_name(name: &str, raw: &mut [u8]) {
    let field = &mut raw[5..5 + ST2205_NAME_LEN + 1];
    field.fill(0);
    let bytes = name.as_bytes();
    let n = bytes.len().min(ST2205_NAME_LEN);
    field[..n].copy_from_slice(&bytes[..n]);
}

pub fn decode_name(raw: &[u8]) -> String {
    let field = &raw[5..5 + ST2205_NAME_LEN];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
