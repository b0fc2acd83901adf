// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]
use crate::codec::Compression;
use crate::config::SessionConfig;
use crate::device::{AxFirmware, DeviceId, DumpProfile, SimFlash};
use crate::fixtures;
use crate::frame::PictureFrame;
use crate::layout::Variant;

pub const MEM_512K: u32 = 512 * 1024;

/// W25X40: 512 KiB with 4 KiB sectors.
pub const FLASH_512K: u32 = 0x001330ef;
/// AMIC A25L40P: 512 KiB, 64 KiB erase only.
pub const FLASH_512K_NO_4K: u32 = 0x1320377f;

pub fn generic_sim(mem_size: u32, capacity: u32, heap_start: u32) -> SimFlash {
    let image = fixtures::blank_generic(mem_size, capacity).unwrap();
    let id = DeviceId::Dump {
        profile: DumpProfile::Generic { capacity, heap_start },
        size: mem_size,
    };
    SimFlash::new(image, id)
}

pub fn generic_frame(mem_size: u32, capacity: u32, heap_start: u32) -> PictureFrame<SimFlash> {
    PictureFrame::open(generic_sim(mem_size, capacity, heap_start), SessionConfig::default()).unwrap()
}

pub fn ax_product(firmware: AxFirmware) -> u16 {
    match firmware {
        AxFirmware::Ax203V3_3 => 0x1315,
        AxFirmware::Ax203V3_4 => 0x1320,
        AxFirmware::Ax206V3_5 => 0x0102,
        AxFirmware::Ax3003V3_5 => 0x3335,
    }
}

pub fn ax_sim(firmware: AxFirmware, flash_id: u32, width: u16, height: u16, compression: Compression) -> SimFlash {
    let image = fixtures::blank_ax(firmware, MEM_512K, width, height, compression, 0x10000).unwrap();
    let id = DeviceId::SpiFlash {
        usb_vendor: 0x1908,
        usb_product: ax_product(firmware),
        firmware: "V3.x test".to_string(),
        flash_id,
    };
    let sim = SimFlash::new(image, id);
    match firmware {
        AxFirmware::Ax206V3_5 | AxFirmware::Ax3003V3_5 => sim.with_bulk_program(),
        _ => sim,
    }
}

pub fn st2205_sim(variant: Variant, compressed: bool) -> SimFlash {
    let image = fixtures::blank_st2205(variant, MEM_512K, compressed).unwrap();
    SimFlash::new(image, DeviceId::Sitronix { width: 128, height: 128 })
}

/// Deterministic filler so blobs are distinguishable.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}
