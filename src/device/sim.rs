// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-memory NOR flash simulator.
//!
//! Behaves like the real part where it matters to the commit engine: erase
//! sets bytes to 0xFF, programming can only clear bits, and reads past the
//! end wrap around (the address lines alias, which the ST2205 size probe
//! relies on). Every operation is logged so tests can assert on ordering.

use std::io;

use super::{sum16, BlockDevice, DeviceId, EraseSize};
use crate::config::{ERASE_BLOCK_SIZE, SPI_SECTOR_SIZE};
use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Read { addr: u32, len: u32 },
    Program { addr: u32, len: u32 },
    BulkProgram { addr: u32, len: u32 },
    Erase { addr: u32, size: EraseSize },
    Checksum { addr: u32, len: u32 },
}

pub struct SimFlash {
    mem: Vec<u8>,
    id: DeviceId,
    bulk_program: bool,
    strict: bool,
    corrupt_checksums: bool,
    fail_program_at: Option<u32>,
    ops: Vec<FlashOp>,
}

impl SimFlash {
    pub fn new(image: Vec<u8>, id: DeviceId) -> Self {
        Self {
            mem: image,
            id,
            bulk_program: false,
            strict: true,
            corrupt_checksums: false,
            fail_program_at: None,
            ops: Vec::new(),
        }
    }

    /// Enables the single-shot 64 KiB program + checksum path.
    pub fn with_bulk_program(mut self) -> Self {
        self.bulk_program = true;
        self
    }

    /// Allows programming over non-erased bytes (result is still AND-ed).
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Makes the device report a checksum that is off by one.
    pub fn set_corrupt_checksums(&mut self, on: bool) {
        self.corrupt_checksums = on;
    }

    /// Fails any program touching `addr`.
    pub fn set_fail_program_at(&mut self, addr: Option<u32>) {
        self.fail_program_at = addr;
    }

    pub fn image(&self) -> &[u8] {
        &self.mem
    }

    pub fn ops(&self) -> &[FlashOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn program_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Program { .. } | FlashOp::BulkProgram { .. }))
            .count()
    }

    pub fn erase_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, FlashOp::Erase { .. })).count()
    }

    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start + len;
        if end > self.mem.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("access {:#x}..{:#x} beyond flash end {:#x}", start, end, self.mem.len()),
            )
            .into());
        }
        Ok(start..end)
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        if let Some(bad) = self.fail_program_at {
            if range.contains(&(bad as usize)) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected program failure").into());
            }
        }
        let target = &mut self.mem[range];
        if self.strict {
            if let Some(pos) = target.iter().zip(data).position(|(&old, &new)| old & new != new) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("program without erase at {:#x}", addr as usize + pos),
                )
                .into());
            }
        }
        for (old, &new) in target.iter_mut().zip(data) {
            *old &= new;
        }
        Ok(())
    }
}

impl BlockDevice for SimFlash {
    fn identify(&mut self) -> Result<DeviceId> {
        Ok(self.id.clone())
    }

    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        if self.mem.is_empty() {
            return Err(FrameError::Io(io::Error::new(io::ErrorKind::InvalidInput, "empty flash")));
        }
        self.ops.push(FlashOp::Read { addr, len: buf.len() as u32 });
        let len = self.mem.len();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.mem[(addr as usize + i) % len];
        }
        Ok(())
    }

    fn write_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.ops.push(FlashOp::Program { addr, len: data.len() as u32 });
        self.program(addr, data)
    }

    fn erase(&mut self, addr: u32, size: EraseSize) -> Result<()> {
        let len = match size {
            EraseSize::Sector => SPI_SECTOR_SIZE,
            EraseSize::Block => ERASE_BLOCK_SIZE,
        };
        if addr % len != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("unaligned erase at {:#x}", addr)).into());
        }
        self.ops.push(FlashOp::Erase { addr, size });
        let range = self.range(addr, len as usize)?;
        self.mem[range].fill(0xFF);
        Ok(())
    }

    fn supports_bulk_program(&self) -> bool {
        self.bulk_program
    }

    fn program_bulk(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if !self.bulk_program {
            return Err(FrameError::NotSupported("bulk program".into()));
        }
        self.ops.push(FlashOp::BulkProgram { addr, len: data.len() as u32 });
        self.program(addr, data)
    }

    fn checksum(&mut self, addr: u32, len: u32) -> Result<u16> {
        if !self.bulk_program {
            return Err(FrameError::NotSupported("device checksum".into()));
        }
        self.ops.push(FlashOp::Checksum { addr, len });
        let range = self.range(addr, len as usize)?;
        let sum = sum16(&self.mem[range]);
        Ok(if self.corrupt_checksums { sum.wrapping_add(1) } else { sum })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DumpProfile;

    fn sim(size: usize) -> SimFlash {
        let id = DeviceId::Dump {
            profile: DumpProfile::Generic { capacity: 4, heap_start: 0x1000 },
            size: size as u32,
        };
        SimFlash::new(vec![0xFF; size], id)
    }

    #[test]
    fn test_program_requires_erase() {
        let mut flash = sim(65536);
        flash.write_sector(0, &[0x00; 16]).unwrap();
        // 0x00 -> 0x55 needs bits set again
        assert!(flash.write_sector(0, &[0x55; 16]).is_err());

        flash.erase(0, EraseSize::Sector).unwrap();
        flash.write_sector(0, &[0x55; 16]).unwrap();
        assert_eq!(&flash.image()[..16], &[0x55; 16]);
    }

    #[test]
    fn test_lenient_program_ands_bits() {
        let mut flash = sim(65536).lenient();
        flash.write_sector(0, &[0x0F]).unwrap();
        flash.write_sector(0, &[0x3C]).unwrap();
        assert_eq!(flash.image()[0], 0x0C);
    }

    #[test]
    fn test_reads_wrap_around() {
        let mut flash = sim(65536);
        flash.erase(0, EraseSize::Block).unwrap();
        flash.write_sector(0, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        flash.read_sector(65536, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_checksum_fault_injection() {
        let mut flash = sim(65536).with_bulk_program();
        flash.program_bulk(0, &[1u8; 256]).unwrap();
        assert_eq!(flash.checksum(0, 256).unwrap(), 256);
        flash.set_corrupt_checksums(true);
        assert_eq!(flash.checksum(0, 256).unwrap(), 257);
    }
}
