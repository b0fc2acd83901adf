// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Freshly formatted flash images for every family.
//!
//! Used by the tests and by `picframe format`. The images contain exactly
//! what identification looks at (parameter block, magic, version markers,
//! firmware sum) and an empty directory table; everything else is erased.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::codec::Compression;
use crate::config::{ABFS_MAGIC, ABFS_SIZE, ERASE_BLOCK_SIZE, ST2205_FAT_SIZE, ST2205_HEADER_MARKER};
use crate::device::AxFirmware;
use crate::error::{FrameError, Result};
use crate::layout::known::ST2205_UNCOMPRESSED_FIRMWARE_SUMS;
use crate::layout::Variant;

fn check_size(mem_size: u32) -> Result<()> {
    if mem_size == 0 || mem_size % ERASE_BLOCK_SIZE != 0 {
        return Err(FrameError::BadParameter(format!(
            "image size {:#x} is not a multiple of the erase block",
            mem_size
        )));
    }
    Ok(())
}

/// Erased image with a zeroed generic table of `capacity` entries.
pub fn blank_generic(mem_size: u32, capacity: u32) -> Result<Vec<u8>> {
    check_size(mem_size)?;
    let table = (0x10 + capacity * 8) as usize;
    if table > mem_size as usize {
        return Err(FrameError::BadParameter(format!("{} entries do not fit", capacity)));
    }
    let mut img = vec![0xFF; mem_size as usize];
    img[..table].fill(0);
    Ok(img)
}

/// Erased AX image with a valid parameter block and an empty ABFS at
/// `fs_start` (a multiple of 64 KiB, not 0).
pub fn blank_ax(
    firmware: AxFirmware,
    mem_size: u32,
    width: u16,
    height: u16,
    compression: Compression,
    fs_start: u32,
) -> Result<Vec<u8>> {
    check_size(mem_size)?;
    if fs_start == 0 || fs_start % 0x10000 != 0 || fs_start + 0x10000 > mem_size || fs_start >> 16 > 0xff {
        return Err(FrameError::BadParameter(format!("invalid ABFS start {:#x}", fs_start)));
    }
    let fs_byte = (fs_start >> 16) as u8;
    let mut img = vec![0xFF; mem_size as usize];

    let (offset, mut block): (usize, Vec<u8>) = match firmware {
        AxFirmware::Ax203V3_3 => {
            if width > 0xff || height > 0xff || compression != Compression::Yuv {
                return Err(FrameError::BadParameter("3.3.x stores 8-bit sizes and YUV only".into()));
            }
            let mut b = vec![0x13, 0x15, width as u8, height as u8, 0x02, 0x01, 0x02, 0x01];
            b.resize(32, 0);
            b[16] = fs_byte;
            (0x50, b)
        }
        AxFirmware::Ax203V3_4 => {
            let tag = match compression {
                Compression::Yuv => 2,
                Compression::YuvDelta => 3,
                other => return Err(FrameError::BadParameter(format!("{:?} on 3.4.x firmware", other))),
            };
            let mut b = vec![0u8; 32];
            b[0] = 0x13;
            b[1] = 0x15;
            LittleEndian::write_u16(&mut b[2..4], width);
            LittleEndian::write_u16(&mut b[4..6], height);
            b[6] = tag;
            b[7] = 0x01;
            b[8] = 0x01;
            b[16] = fs_byte;
            (0x50, b)
        }
        AxFirmware::Ax206V3_5 | AxFirmware::Ax3003V3_5 => {
            if compression != Compression::Jpeg {
                return Err(FrameError::BadParameter("3.5.x firmware stores JPEG only".into()));
            }
            let mut b = vec![0u8; 32];
            b[2] = fs_byte;
            LittleEndian::write_u16(&mut b[3..5], width);
            LittleEndian::write_u16(&mut b[5..7], height);
            b[7] = 0xd8;
            (0x20, b)
        }
    };
    block.truncate(32);
    img[offset..offset + block.len()].copy_from_slice(&block);

    let fs = fs_start as usize;
    img[fs..fs + ABFS_SIZE as usize].fill(0);
    img[fs..fs + 4].copy_from_slice(ABFS_MAGIC);
    Ok(img)
}

const MSDOS_MARKER: &[u8] = b"\xeb\x3c\x90MSDOS5.0\0";
const V1_LOOKUP: &[u8] = b"\xd0\xff\xcd\xff\xcb\xff\xcb\xff\xcb\xff\xcc\xff";

/// Erased ST2205 image. Uncompressed frames get a firmware area whose byte
/// sum is on the RGB565 list.
pub fn blank_st2205(variant: Variant, mem_size: u32, compressed: bool) -> Result<Vec<u8>> {
    check_size(mem_size)?;
    let (firmware_size, copies) = match variant {
        Variant::St2205V1 => (0x10000u32, 4u32),
        Variant::St2205V2 => (0x40000, 1),
        other => return Err(FrameError::BadParameter(format!("{:?} is not an ST2205 variant", other))),
    };
    if mem_size < firmware_size + 0x20000 {
        return Err(FrameError::BadParameter(format!("{:#x} bytes is too small", mem_size)));
    }
    let mut img = vec![0xFF; mem_size as usize];
    img[..(ST2205_FAT_SIZE * copies) as usize].fill(0);

    let fw = (mem_size - firmware_size) as usize;
    if !compressed {
        img[fw..].fill(0);
        let mut remaining = ST2205_UNCOMPRESSED_FIRMWARE_SUMS[0];
        if variant == Variant::St2205V2 {
            remaining -= MSDOS_MARKER.iter().map(|&b| b as u32).sum::<u32>();
        }
        let mut pos = fw;
        while remaining > 0 {
            let b = remaining.min(0xFF);
            img[pos] = b as u8;
            remaining -= b;
            pos += 1;
        }
    }
    match variant {
        Variant::St2205V2 => {
            let at = (mem_size - 0x20000) as usize;
            img[at..at + MSDOS_MARKER.len()].copy_from_slice(MSDOS_MARKER);
        }
        _ => img[0x8477..0x8477 + V1_LOOKUP.len()].copy_from_slice(V1_LOOKUP),
    }
    Ok(img)
}

/// ST2205 picture blob: 16-byte header followed by `payload`.
pub fn st2205_blob(width: u16, height: u16, payload: &[u8]) -> Vec<u8> {
    let mut header = [0u8; 16];
    header[0] = ST2205_HEADER_MARKER;
    BigEndian::write_u16(&mut header[1..3], width);
    BigEndian::write_u16(&mut header[3..5], height);
    BigEndian::write_u16(&mut header[5..7], (width / 8) * (height / 8));
    header[8] = 0x04;
    BigEndian::write_u16(&mut header[12..14], payload.len() as u16);
    let mut blob = header.to_vec();
    blob.extend_from_slice(payload);
    blob
}
