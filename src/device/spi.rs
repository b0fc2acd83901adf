// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! AX203/AX206/AX3003 bridge: SPI flash commands tunnelled through vendor
//! SCSI commands.

use std::io;

use super::{BlockDevice, DeviceId, EraseSize};
use crate::config::{MAX_READY_POLLS, SPI_PAGE_SIZE};
use crate::error::{FrameError, Result};

const AX_TO_DEV: u8 = 0xCB;
const AX_FROM_DEV: u8 = 0xCD;
const AX_EEPROM_CMD: u8 = 0x00;
const AX_GET_VERSION: u8 = 0x01;
const AX_GET_CHECKSUM: u8 = 0x05;

const SPI_PP: u8 = 0x02;
const SPI_READ: u8 = 0x03;
const SPI_RDSR: u8 = 0x05;
const SPI_WREN: u8 = 0x06;
const SPI_ERASE_4K: u8 = 0x20;
const SPI_RDID: u8 = 0x9f;
const SPI_RDP: u8 = 0xab;
const SPI_ERASE_64K: u8 = 0xd8;

/// Status words read per RDSR poll; only the last one is checked.
const STATUS_READS: usize = 64;
const STATUS_WIP: u8 = 0x01;

/// Raw access to the bridge's vendor SCSI command set.
pub trait ScsiTransport {
    fn command_out(&mut self, cmd: &[u8; 16], data: &[u8]) -> io::Result<()>;
    fn command_in(&mut self, cmd: &[u8; 16], data: &mut [u8]) -> io::Result<()>;
}

pub struct SpiEeprom<T> {
    transport: T,
    usb_vendor: u16,
    usb_product: u16,
    max_polls: u32,
}

impl<T: ScsiTransport> SpiEeprom<T> {
    /// `usb_vendor`/`usb_product` come from USB enumeration and pick the
    /// firmware family.
    pub fn new(transport: T, usb_vendor: u16, usb_product: u16) -> Self {
        Self {
            transport,
            usb_vendor,
            usb_product,
            max_polls: MAX_READY_POLLS,
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn eeprom_cmd(to_dev: bool, spi: &[u8], data_len: usize) -> [u8; 16] {
        let mut cmd = [0u8; 16];
        cmd[0] = if to_dev { AX_TO_DEV } else { AX_FROM_DEV };
        cmd[5] = AX_EEPROM_CMD;
        cmd[6] = spi.len() as u8;
        cmd[7] = (data_len >> 16) as u8;
        cmd[8] = (data_len >> 8) as u8;
        cmd[9] = data_len as u8;
        cmd[10..10 + spi.len()].copy_from_slice(spi);
        cmd
    }

    fn spi_out(&mut self, spi: &[u8], data: &[u8]) -> Result<()> {
        let cmd = Self::eeprom_cmd(true, spi, data.len());
        self.transport.command_out(&cmd, data)?;
        Ok(())
    }

    fn spi_in(&mut self, spi: &[u8], data: &mut [u8]) -> Result<()> {
        let cmd = Self::eeprom_cmd(false, spi, data.len());
        self.transport.command_in(&cmd, data)?;
        Ok(())
    }

    fn addressed(op: u8, addr: u32) -> [u8; 4] {
        [op, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
    }

    fn write_enable(&mut self) -> Result<()> {
        self.spi_out(&[SPI_WREN], &[])
    }

    fn wait_ready(&mut self) -> Result<()> {
        let mut status = [0u8; STATUS_READS];
        for _ in 0..self.max_polls {
            self.spi_in(&[SPI_RDSR], &mut status)?;
            if status[STATUS_READS - 1] & STATUS_WIP == 0 {
                return Ok(());
            }
        }
        tracing::error!("SPI flash still busy after {} polls", self.max_polls);
        Err(FrameError::DeviceTimeout { polls: self.max_polls })
    }

    fn firmware_version(&mut self) -> Result<String> {
        let mut cmd = [0u8; 16];
        cmd[0] = AX_FROM_DEV;
        cmd[5] = AX_GET_VERSION;
        cmd[6] = 1;
        cmd[10] = AX_GET_VERSION;
        let mut buf = [0u8; 64];
        self.transport.command_in(&cmd, &mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

impl<T: ScsiTransport> BlockDevice for SpiEeprom<T> {
    fn identify(&mut self) -> Result<DeviceId> {
        let firmware = self.firmware_version()?;
        tracing::debug!("AX bridge firmware version: {}", firmware);

        self.spi_out(&[SPI_RDP], &[])?;
        let mut id = [0u8; 4];
        self.spi_in(&[SPI_RDID], &mut id)?;

        Ok(DeviceId::SpiFlash {
            usb_vendor: self.usb_vendor,
            usb_product: self.usb_product,
            firmware,
            flash_id: u32::from_le_bytes(id),
        })
    }

    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.spi_in(&Self::addressed(SPI_READ, addr), buf)
    }

    fn write_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        for (i, page) in data.chunks(SPI_PAGE_SIZE).enumerate() {
            let page_addr = addr + (i * SPI_PAGE_SIZE) as u32;
            self.write_enable()?;
            self.spi_out(&Self::addressed(SPI_PP, page_addr), page)?;
            self.wait_ready()?;
        }
        Ok(())
    }

    fn erase(&mut self, addr: u32, size: EraseSize) -> Result<()> {
        let op = match size {
            EraseSize::Sector => SPI_ERASE_4K,
            EraseSize::Block => SPI_ERASE_64K,
        };
        self.write_enable()?;
        self.spi_out(&Self::addressed(op, addr), &[])?;
        self.wait_ready()
    }

    fn supports_bulk_program(&self) -> bool {
        true
    }

    fn program_bulk(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.write_enable()?;
        self.spi_out(&Self::addressed(SPI_PP, addr), data)?;
        self.wait_ready()
    }

    fn checksum(&mut self, addr: u32, len: u32) -> Result<u16> {
        let mut cmd = [0u8; 16];
        cmd[0] = AX_FROM_DEV;
        cmd[5] = AX_GET_CHECKSUM;
        cmd[6] = 6;
        cmd[9] = 2;
        cmd[10] = (addr >> 16) as u8;
        cmd[11] = (addr >> 8) as u8;
        cmd[12] = addr as u8;
        cmd[13] = (len >> 16) as u8;
        cmd[14] = (len >> 8) as u8;
        cmd[15] = len as u8;
        let mut reply = [0u8; 2];
        self.transport.command_in(&cmd, &mut reply)?;
        Ok(u16::from_be_bytes(reply))
    }

    fn set_ready_poll_budget(&mut self, polls: u32) {
        self.max_polls = polls.max(1);
    }
}
