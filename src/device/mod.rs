// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Block device adapters.
//!
//! The core only ever talks to flash through [`BlockDevice`]: whole-sector
//! reads and programs, erases at sector or erase-block granularity, and for
//! bridges that support it a single large "auto-increment" program verified
//! by a device-side checksum.

pub mod dump;
pub mod sim;
pub mod spi;

use serde::Serialize;

use crate::error::{FrameError, Result};

pub use dump::MemoryDump;
pub use sim::{FlashOp, SimFlash};
pub use spi::{ScsiTransport, SpiEeprom};

/// Firmware revisions of the Appotech AX2xx/AX3003 bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxFirmware {
    Ax203V3_3,
    Ax203V3_4,
    Ax206V3_5,
    Ax3003V3_5,
}

/// How a memory dump should be interpreted; a dump carries no identification
/// of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DumpProfile {
    Ax(AxFirmware),
    St2205 { width: u16, height: u16 },
    Generic { capacity: u32, heap_start: u32 },
}

/// Result of the identification step, matched against the known-device tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceId {
    /// AX bridge with SPI flash behind it.
    SpiFlash {
        usb_vendor: u16,
        usb_product: u16,
        firmware: String,
        flash_id: u32,
    },
    /// Sitronix ST2205, identified by its LCD size register.
    Sitronix { width: u16, height: u16 },
    /// Flat file standing in for the flash.
    Dump { profile: DumpProfile, size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseSize {
    /// Small (4 KiB) sector erase.
    Sector,
    /// Full erase block.
    Block,
}

pub trait BlockDevice {
    fn identify(&mut self) -> Result<DeviceId>;

    /// Fills `buf` completely from `addr` or fails.
    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Programs `data` at `addr`. The target must have been erased since its
    /// last program; the commit engine guarantees the ordering.
    fn write_sector(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    fn erase(&mut self, addr: u32, size: EraseSize) -> Result<()>;

    /// Whether [`BlockDevice::program_bulk`] and [`BlockDevice::checksum`] work.
    fn supports_bulk_program(&self) -> bool {
        false
    }

    /// Programs a whole erase block in a single operation.
    fn program_bulk(&mut self, _addr: u32, _data: &[u8]) -> Result<()> {
        Err(FrameError::NotSupported("bulk program".into()))
    }

    /// 16-bit byte sum the device computes over `len` bytes at `addr`.
    fn checksum(&mut self, _addr: u32, _len: u32) -> Result<u16> {
        Err(FrameError::NotSupported("device checksum".into()))
    }

    /// Pushes completed writes to stable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_memory_dump(&self) -> bool {
        false
    }

    fn set_ready_poll_budget(&mut self, _polls: u32) {}
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn identify(&mut self) -> Result<DeviceId> {
        (**self).identify()
    }

    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_sector(addr, buf)
    }

    fn write_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write_sector(addr, data)
    }

    fn erase(&mut self, addr: u32, size: EraseSize) -> Result<()> {
        (**self).erase(addr, size)
    }

    fn supports_bulk_program(&self) -> bool {
        (**self).supports_bulk_program()
    }

    fn program_bulk(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).program_bulk(addr, data)
    }

    fn checksum(&mut self, addr: u32, len: u32) -> Result<u16> {
        (**self).checksum(addr, len)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn is_memory_dump(&self) -> bool {
        (**self).is_memory_dump()
    }

    fn set_ready_poll_budget(&mut self, polls: u32) {
        (**self).set_ready_poll_budget(polls)
    }
}

/// Byte sum truncated to 16 bits, as computed by the AX bridge.
pub fn sum16(data: &[u8]) -> u16 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32)) as u16
}
