// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Flat-file memory dump standing in for the flash.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{BlockDevice, DeviceId, DumpProfile, EraseSize};
use crate::error::{FrameError, Result};

/// A dump is byte-for-byte the flash contents. Erase is a no-op and programs
/// are plain seek + write, so every commit strategy degenerates to writing
/// the dirty sectors back.
pub struct MemoryDump {
    file: File,
    size: u32,
    profile: DumpProfile,
}

impl MemoryDump {
    pub fn open(path: impl AsRef<Path>, profile: DumpProfile) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let size = u32::try_from(len).map_err(|_| {
            FrameError::BadParameter(format!("dump {} is too large ({} bytes)", path.display(), len))
        })?;
        tracing::debug!("Opened memory dump {:?}, {} bytes", path, size);
        Ok(Self { file, size, profile })
    }

    /// Writes `image` to a new dump file and opens it.
    pub fn create(path: impl AsRef<Path>, image: &[u8], profile: DumpProfile) -> Result<Self> {
        let path = path.as_ref();
        {
            let mut file = File::create(path)?;
            file.write_all(image)?;
            file.sync_data()?;
        }
        Self::open(path, profile)
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

impl BlockDevice for MemoryDump {
    fn identify(&mut self) -> Result<DeviceId> {
        Ok(DeviceId::Dump {
            profile: self.profile,
            size: self.size,
        })
    }

    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(addr as u64))?;
        // read_exact turns a short read into UnexpectedEof instead of
        // handing back a partially filled sector.
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(addr as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn erase(&mut self, _addr: u32, _size: EraseSize) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn is_memory_dump(&self) -> bool {
        true
    }
}
