// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Known devices and the identification steps that map a device onto a
//! [`Layout`].

use byteorder::{ByteOrder, LittleEndian};

use super::{Layout, Variant};
use crate::cache::SectorCache;
use crate::codec::Compression;
use crate::config::{SPI_SECTOR_SIZE, ST2205_BLOCK_SIZE};
use crate::device::{AxFirmware, BlockDevice, DeviceId, DumpProfile};
use crate::error::{FrameError, Result};

pub struct UsbBridge {
    pub vendor: u16,
    pub product: u16,
    pub firmware: AxFirmware,
}

pub const AX_BRIDGES: &[UsbBridge] = &[
    UsbBridge { vendor: 0x1908, product: 0x1315, firmware: AxFirmware::Ax203V3_3 },
    UsbBridge { vendor: 0x1908, product: 0x1320, firmware: AxFirmware::Ax203V3_4 },
    UsbBridge { vendor: 0x1908, product: 0x0102, firmware: AxFirmware::Ax206V3_5 },
    UsbBridge { vendor: 0x1908, product: 0x3335, firmware: AxFirmware::Ax3003V3_5 },
];

#[derive(Debug)]
pub struct FlashChip {
    pub name: &'static str,
    /// RDID reply read as little endian.
    pub id: u32,
    pub mem_size: u32,
    pub has_4k_sectors: bool,
}

macro_rules! chip {
    ($name:expr, $id:expr, $size:expr, $small:expr) => {
        FlashChip { name: $name, id: $id, mem_size: $size, has_4k_sectors: $small }
    };
}

// ATmel AT26DF041 is left out: no 64K erase and a non-standard page program.
// SST25VF080/016 can only program a byte at a time.
pub const SPI_FLASH_CHIPS: &[FlashChip] = &[
    chip!("AMIC A25L040", 0x00133037, 524288, true),
    chip!("AMIC A25L080", 0x00143037, 1048576, true),
    chip!("AMIC A25L40P", 0x1320377f, 524288, false),
    chip!("AMIC A25L80P", 0x1420377f, 1048576, false),
    chip!("AMIC A25L16P", 0x1520377f, 2097152, false),
    chip!("ATmel AT26DF161", 0x0000461f, 2097152, true),
    chip!("ATmel AT26DF081A", 0x0001451f, 1048576, true),
    chip!("ATmel AT26DF161A", 0x0001461f, 2097152, true),
    chip!("ATmel AT25DF081", 0x0002451f, 1048576, true),
    chip!("ATmel AT25DF161", 0x0002461f, 2097152, true),
    chip!("EON EN25B16", 0x1c15201c, 2097152, false),
    chip!("EON EN25B32", 0x1c16201c, 4194304, false),
    chip!("EON EN25F80", 0x1c14311c, 1048576, true),
    chip!("EON EN25F16", 0x1c15311c, 2097152, true),
    chip!("ESI ES25P80", 0x0014204a, 1048576, false),
    chip!("ESI ES25P16", 0x0015204a, 2097152, false),
    chip!("ESMT F25L008 (top)", 0x8c14208c, 1048576, true),
    chip!("ESMT F25L008 (bottom)", 0x8c14218c, 1048576, true),
    chip!("MXIC MX25L4005A", 0xc21320c2, 524288, true),
    chip!("MXIC MX25L8005A", 0xc21420c2, 1048576, true),
    chip!("MXIC MX25L1605A", 0xc21520c2, 2097152, true),
    chip!("PMC Pm25LV010", 0x007e9d7f, 524288, false),
    chip!("Spansion S25FL004A", 0x00120201, 524288, false),
    chip!("Spansion S25FL008A", 0x00130201, 1048576, false),
    chip!("Spansion S25FL016A", 0x00140201, 2097152, false),
    chip!("Winbond W25P80", 0x001420ef, 1048576, false),
    chip!("Winbond W25P16", 0x001420ef, 2097152, false),
    chip!("Winbond W25X40", 0x001330ef, 524288, true),
    chip!("Winbond W25X80", 0x001430ef, 1048576, true),
    chip!("Winbond W25X16", 0x001530ef, 2097152, true),
    chip!("Winbond W25X32", 0x001630ef, 4194304, true),
    chip!("Winbond W25X64", 0x001730ef, 8388608, true),
];

pub fn lookup_bridge(vendor: u16, product: u16) -> Result<AxFirmware> {
    AX_BRIDGES
        .iter()
        .find(|b| b.vendor == vendor && b.product == product)
        .map(|b| b.firmware)
        .ok_or_else(|| FrameError::ModelNotFound(format!("unknown USB id {:04x}:{:04x}", vendor, product)))
}

/// First match wins; two Winbond parts share an id.
pub fn lookup_flash_chip(id: u32) -> Result<&'static FlashChip> {
    SPI_FLASH_CHIPS
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| FrameError::ModelNotFound(format!("unknown flash id {:08x}", id)))
}

const AX_RESOLUTIONS: &[(u32, u32)] = &[
    (120, 160),
    (128, 128),
    (128, 160),
    (160, 120),
    (160, 128),
    (240, 320),
    (320, 240),
];

const ST2205_RESOLUTIONS: &[(u32, u32)] = &[(128, 160), (128, 128), (120, 160), (96, 64), (240, 320)];

const ST2205_MSDOS_MARKER: &[u8] = b"\xeb\x3c\x90MSDOS5.0\0";
const ST2205_V2_MARKER_FROM_END: u32 = 0x20000;
const ST2205_V1_LOOKUP_OFFSET: u32 = 0x8477;
const ST2205_V1_LOOKUP: &[u8] = b"\xd0\xff\xcd\xff\xcb\xff\xcb\xff\xcb\xff\xcc\xff";

/// Firmware byte sums of frames that store plain RGB565 pictures.
pub const ST2205_UNCOMPRESSED_FIRMWARE_SUMS: &[u32] = &[0x00ab02fc, 0x00aa8060];

/// What identification found out before any filesystem structure was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ax { firmware: AxFirmware, mem_size: u32, small_erase: bool },
    St2205 { width: u32, height: u32, mem_size: u32 },
    Generic { mem_size: u32, capacity: u32, heap_start: u32 },
}

impl Probe {
    pub fn mem_size(&self) -> u32 {
        match *self {
            Probe::Ax { mem_size, .. } | Probe::St2205 { mem_size, .. } | Probe::Generic { mem_size, .. } => mem_size,
        }
    }

    pub fn sector_size(&self) -> u32 {
        match self {
            Probe::St2205 { .. } => ST2205_BLOCK_SIZE,
            _ => SPI_SECTOR_SIZE,
        }
    }
}

/// Identifies `device` and works out family and memory size.
pub fn probe<D: BlockDevice>(device: &mut D) -> Result<Probe> {
    let id = device.identify()?;
    let probe = match id {
        DeviceId::SpiFlash { usb_vendor, usb_product, firmware, flash_id } => {
            let fw = lookup_bridge(usb_vendor, usb_product)?;
            tracing::debug!("Appotech picframe firmware version: {}", firmware);
            let chip = lookup_flash_chip(flash_id)?;
            tracing::debug!(
                "{} EEPROM found, capacity: {}, has 4k sectors: {}",
                chip.name,
                chip.mem_size,
                chip.has_4k_sectors
            );
            Probe::Ax { firmware: fw, mem_size: chip.mem_size, small_erase: chip.has_4k_sectors }
        }
        DeviceId::Sitronix { width, height } => {
            let (width, height) = st2205_resolution(width as u32, height as u32)?;
            let mem_size = st2205_mem_size(device)?;
            Probe::St2205 { width, height, mem_size }
        }
        DeviceId::Dump { profile, size } => match profile {
            DumpProfile::Ax(firmware) => Probe::Ax { firmware, mem_size: size, small_erase: true },
            DumpProfile::St2205 { width, height } => {
                let (width, height) = st2205_resolution(width as u32, height as u32)?;
                Probe::St2205 { width, height, mem_size: size }
            }
            DumpProfile::Generic { capacity, heap_start } => Probe::Generic { mem_size: size, capacity, heap_start },
        },
    };
    tracing::debug!("probe result: {:?}", probe);
    Ok(probe)
}

fn st2205_resolution(width: u32, height: u32) -> Result<(u32, u32)> {
    if width % 8 != 0 || height % 8 != 0 {
        return Err(FrameError::ModelNotFound(format!(
            "lcd width and height must be a multiple of 8, got {}x{}",
            width, height
        )));
    }
    // 320x240 panels are driven as 240x320.
    let (width, height) = if (width, height) == (320, 240) { (240, 320) } else { (width, height) };
    if !ST2205_RESOLUTIONS.contains(&(width, height)) {
        return Err(FrameError::ModelNotFound(format!("unknown display resolution: {}x{}", width, height)));
    }
    Ok((width, height))
}

/// Flash smaller than the address space mirrors itself; the first offset
/// reading back block 0 is the size.
fn st2205_mem_size<D: BlockDevice>(device: &mut D) -> Result<u32> {
    let mut block0 = vec![0u8; ST2205_BLOCK_SIZE as usize];
    let mut other = vec![0u8; ST2205_BLOCK_SIZE as usize];
    device.read_sector(0, &mut block0)?;
    let mut i = 0;
    while i < 3 {
        device.read_sector(524288 << i, &mut other)?;
        if block0 == other {
            break;
        }
        i += 1;
    }
    Ok(524288 << i)
}

/// Reads the on-flash structures and builds the final layout.
pub fn detect<D: BlockDevice>(probe: Probe, cache: &mut SectorCache<D>) -> Result<Layout> {
    let layout = match probe {
        Probe::Ax { firmware, mem_size, small_erase } => {
            let params = read_ax_parameters(firmware, cache)?;
            let layout = Layout::ax(
                firmware,
                mem_size,
                small_erase,
                params.fs_start,
                params.width,
                params.height,
                params.compression,
            )?;
            let mut magic = [0u8; 4];
            cache.read_into(layout.table_start, &mut magic)?;
            if Some(magic) != layout.magic {
                tracing::error!("ABFS magic not found at: {:#x}", layout.table_start);
                return Err(FrameError::ModelNotFound(format!("ABFS magic not found at {:#x}", layout.table_start)));
            }
            layout
        }
        Probe::St2205 { width, height, mem_size } => {
            let variant = st2205_version(cache, mem_size)?;
            let layout = Layout::st2205(variant, mem_size, width, height, true)?;
            let sum = firmware_sum(cache, layout.heap_end(), mem_size)?;
            tracing::debug!("firmware checksum: {:#010x}", sum);
            if ST2205_UNCOMPRESSED_FIRMWARE_SUMS.contains(&sum) {
                Layout::st2205(variant, mem_size, width, height, false)?
            } else {
                layout
            }
        }
        Probe::Generic { mem_size, capacity, heap_start } => Layout::generic(mem_size, capacity, heap_start)?,
    };
    tracing::debug!(
        "layout {:?}: table at {:#x}, heap {:#x}..{:#x}, {}x{} {:?}",
        layout.variant,
        layout.table_start,
        layout.heap_start,
        layout.heap_end(),
        layout.width,
        layout.height,
        layout.compression
    );
    Ok(layout)
}

struct AxParameters {
    fs_start: u32,
    width: u32,
    height: u32,
    compression: Compression,
}

/// Offset and expected contents of the firmware parameter block. Resolution,
/// compression and ABFS start bytes are patched in before comparing.
fn ax_parameter_template(firmware: AxFirmware) -> (u32, Vec<u8>) {
    match firmware {
        AxFirmware::Ax203V3_3 => (
            0x50,
            vec![0x13, 0x15, 0, 0, 0x02, 0x01, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 0, 0],
        ),
        AxFirmware::Ax203V3_4 => (
            0x50,
            vec![0x13, 0x15, 0, 0, 0, 0, 0, 0x01, 0x01, 0, 0, 0, 0, 0, 0, 0],
        ),
        AxFirmware::Ax206V3_5 | AxFirmware::Ax3003V3_5 => (0x20, vec![0, 0, 0, 0, 0, 0, 0, 0xd8]),
    }
}

fn read_ax_parameters<D: BlockDevice>(firmware: AxFirmware, cache: &mut SectorCache<D>) -> Result<AxParameters> {
    let (offset, mut expect) = ax_parameter_template(firmware);
    let mut buf = [0u8; 32];
    cache.read_into(offset, &mut buf)?;

    let (width, height, compression, fs_byte_at) = match firmware {
        AxFirmware::Ax203V3_3 => {
            expect[2] = buf[2];
            expect[3] = buf[3];
            (buf[2] as u32, buf[3] as u32, Compression::Yuv, 16)
        }
        AxFirmware::Ax203V3_4 => {
            expect[2..7].copy_from_slice(&buf[2..7]);
            let compression = match buf[6] {
                2 => Compression::Yuv,
                3 => Compression::YuvDelta,
                other => {
                    tracing::error!("unknown compression version: {}", other);
                    return Err(FrameError::ModelNotFound(format!("unknown compression version {}", other)));
                }
            };
            (
                LittleEndian::read_u16(&buf[2..4]) as u32,
                LittleEndian::read_u16(&buf[4..6]) as u32,
                compression,
                16,
            )
        }
        AxFirmware::Ax206V3_5 | AxFirmware::Ax3003V3_5 => {
            expect[2..7].copy_from_slice(&buf[2..7]);
            (
                LittleEndian::read_u16(&buf[3..5]) as u32,
                LittleEndian::read_u16(&buf[5..7]) as u32,
                Compression::Jpeg,
                2,
            )
        }
    };
    let fs_start = buf[fs_byte_at] as u32 * 0x10000;

    if buf[..expect.len()] != expect[..] {
        tracing::error!("unexpected contents of parameter block");
        return Err(FrameError::ModelNotFound("unexpected contents of parameter block".into()));
    }
    if !AX_RESOLUTIONS.contains(&(width, height)) {
        tracing::error!("unknown resolution: {}x{}", width, height);
        return Err(FrameError::ModelNotFound(format!("unknown resolution: {}x{}", width, height)));
    }
    if width % 4 != 0 || height % 4 != 0 {
        return Err(FrameError::ModelNotFound("lcd width and height must be a multiple of 4".into()));
    }
    tracing::debug!(
        "lcd size {}x{}, compression {:?}, fs-start: {:#x}",
        width,
        height,
        compression,
        fs_start
    );
    Ok(AxParameters { fs_start, width, height, compression })
}

fn st2205_version<D: BlockDevice>(cache: &mut SectorCache<D>, mem_size: u32) -> Result<Variant> {
    let mut buf = [0u8; 12];
    if mem_size >= ST2205_V2_MARKER_FROM_END {
        let mut marker = [0u8; 12];
        cache.read_into(mem_size - ST2205_V2_MARKER_FROM_END, &mut marker)?;
        if marker[..] == *ST2205_MSDOS_MARKER {
            tracing::debug!("Detected V2/V3 picframe");
            return Ok(Variant::St2205V2);
        }
    }
    cache.read_into(ST2205_V1_LOOKUP_OFFSET, &mut buf)?;
    if buf[..] == *ST2205_V1_LOOKUP {
        tracing::debug!("Detected V1 picframe");
        return Ok(Variant::St2205V1);
    }
    tracing::error!("Could not determine picframe version");
    Err(FrameError::ModelNotFound("could not determine picframe version".into()))
}

fn firmware_sum<D: BlockDevice>(cache: &mut SectorCache<D>, start: u32, end: u32) -> Result<u32> {
    let firmware = cache.read(start, end - start)?;
    Ok(firmware.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_chip_lookup() {
        let chip = lookup_flash_chip(0x001730ef).unwrap();
        assert_eq!(chip.name, "Winbond W25X64");
        assert_eq!(chip.mem_size, 8388608);
        // Duplicate id: the first entry is used.
        assert_eq!(lookup_flash_chip(0x001420ef).unwrap().mem_size, 1048576);
        assert!(matches!(lookup_flash_chip(0xdeadbeef), Err(FrameError::ModelNotFound(_))));
    }

    #[test]
    fn test_bridge_lookup() {
        assert_eq!(lookup_bridge(0x1908, 0x0102).unwrap(), AxFirmware::Ax206V3_5);
        assert!(matches!(lookup_bridge(0x1908, 0x9999), Err(FrameError::ModelNotFound(_))));
    }

    #[test]
    fn test_st2205_resolution_rules() {
        assert_eq!(st2205_resolution(320, 240).unwrap(), (240, 320));
        assert_eq!(st2205_resolution(128, 160).unwrap(), (128, 160));
        assert!(st2205_resolution(130, 160).is_err());
        assert!(st2205_resolution(160, 160).is_err());
    }
}
