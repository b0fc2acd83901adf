// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::cache::SectorCache;
use crate::codec::Compression;
use crate::commit::{commit, plan_block, BlockStrategy, CommitPolicy};
use crate::config::{SessionConfig, SPI_SECTOR_SIZE};
use crate::device::{AxFirmware, EraseSize, FlashOp, SimFlash};
use crate::error::FrameError;
use crate::fixtures;
use crate::frame::PictureFrame;
use crate::layout::Layout;
use crate::tests::helpers::*;

fn writes(sim: &SimFlash) -> Vec<FlashOp> {
    sim.ops().iter().copied().filter(|op| !matches!(op, FlashOp::Read { .. })).collect()
}

#[test]
fn test_plan_block() {
    let small = CommitPolicy { small_erase: true, bulk_program: false, small_erase_threshold: 12 };
    assert_eq!(plan_block(0, &small), BlockStrategy::Skip);
    assert_eq!(plan_block(1, &small), BlockStrategy::EraseProgramSmall);
    assert_eq!(plan_block(11, &small), BlockStrategy::EraseProgramSmall);
    assert_eq!(plan_block(12, &small), BlockStrategy::EraseProgramLarge);

    let no_small = CommitPolicy { small_erase: false, ..small };
    assert_eq!(plan_block(1, &no_small), BlockStrategy::EraseProgramLarge);

    let bulk = CommitPolicy { bulk_program: true, ..small };
    assert_eq!(plan_block(0, &bulk), BlockStrategy::Skip);
    assert_eq!(plan_block(1, &bulk), BlockStrategy::EraseProgramBulkVerified);
}

#[test]
fn test_small_erase_commit() {
    let mut frame = generic_frame(MEM_512K, 100, 0x2000);
    frame.write_raw(0, &pattern(1000, 1)).unwrap();
    let stats = frame.commit().unwrap();

    assert_eq!(stats.small_blocks, 1);
    assert_eq!(stats.blocks_skipped, 7);
    assert_eq!(stats.sectors_written, 2);
    assert_eq!(stats.sector_erases, 2);
    assert_eq!(stats.block_erases, 0);
    assert_eq!(
        writes(frame.device()),
        vec![
            FlashOp::Erase { addr: 0, size: EraseSize::Sector },
            FlashOp::Program { addr: 0, len: SPI_SECTOR_SIZE },
            FlashOp::Erase { addr: 0x2000, size: EraseSize::Sector },
            FlashOp::Program { addr: 0x2000, len: SPI_SECTOR_SIZE },
        ]
    );
    assert!(!frame.is_dirty());
}

#[test]
fn test_threshold_switches_to_block_erase() {
    let mut frame = generic_frame(MEM_512K, 100, 0x2000);
    // Table sector plus 12 heap sectors.
    frame.write_raw(0, &pattern(12 * SPI_SECTOR_SIZE as usize, 1)).unwrap();
    let stats = frame.commit().unwrap();
    assert_eq!(stats.large_blocks, 1);
    assert_eq!(stats.block_erases, 1);
    assert_eq!(stats.sectors_written, 16);
}

#[test]
fn test_large_erase_without_4k_sectors() {
    let sim = ax_sim(AxFirmware::Ax203V3_4, FLASH_512K_NO_4K, 128, 128, Compression::Yuv);
    let mut frame = PictureFrame::open(sim, SessionConfig::default()).unwrap();
    assert!(!frame.layout().small_erase);
    let blob = pattern(128 * 128, 5);
    let idx = frame.add_raw("", &blob).unwrap();
    let stats = frame.commit().unwrap();
    assert_eq!(stats.large_blocks, 1);

    let ops = writes(frame.device());
    assert_eq!(ops[0], FlashOp::Erase { addr: 0x10000, size: EraseSize::Block });
    assert_eq!(ops.len(), 17);
    for (i, op) in ops[1..].iter().enumerate() {
        assert_eq!(*op, FlashOp::Program { addr: 0x10000 + i as u32 * SPI_SECTOR_SIZE, len: SPI_SECTOR_SIZE });
    }

    // A fresh session reads everything back from the device.
    let mut frame = PictureFrame::open(frame.close(), SessionConfig::default()).unwrap();
    assert_eq!(frame.read_raw(idx).unwrap(), blob);
    assert_eq!(frame.file_count().unwrap(), 1);
}

#[test]
fn test_commit_is_idempotent() {
    let mut frame = generic_frame(MEM_512K, 100, 0x2000);
    frame.write_raw(0, &pattern(5000, 3)).unwrap();
    frame.commit().unwrap();
    let before = frame.device().ops().len();

    let stats = frame.commit().unwrap();
    assert_eq!(stats.blocks_written(), 0);
    assert_eq!(stats.blocks_skipped, 8);
    assert_eq!(frame.device().ops().len(), before);
    assert!(!frame.is_dirty());
}

fn ax206_cache(sim: SimFlash) -> (Layout, SectorCache<SimFlash>) {
    let layout = Layout::ax(AxFirmware::Ax206V3_5, MEM_512K, true, 0x10000, 320, 240, Compression::Jpeg).unwrap();
    let cache = SectorCache::new(sim, MEM_512K, SPI_SECTOR_SIZE).unwrap();
    (layout, cache)
}

#[test]
fn test_bulk_commit_verified() {
    let sim = ax_sim(AxFirmware::Ax206V3_5, FLASH_512K, 320, 240, Compression::Jpeg);
    let (layout, mut cache) = ax206_cache(sim);
    cache.write(0x11000, &pattern(3000, 4)).unwrap();
    let policy = CommitPolicy::new(&layout, &SessionConfig::default());
    let stats = commit(&mut cache, &layout, &policy).unwrap();

    assert_eq!(stats.bulk_blocks, 1);
    assert_eq!(stats.sectors_written, 16);
    assert_eq!(
        writes(cache.device()),
        vec![
            FlashOp::Erase { addr: 0x10000, size: EraseSize::Block },
            FlashOp::BulkProgram { addr: 0x10000, len: 0x10000 },
            FlashOp::Checksum { addr: 0x10000, len: 0x10000 },
        ]
    );
    assert_eq!(&cache.device().image()[0x11000..0x11000 + 3000], &pattern(3000, 4)[..]);
}

#[test]
fn test_bulk_checksum_mismatch_keeps_block_dirty() {
    let mut sim = ax_sim(AxFirmware::Ax206V3_5, FLASH_512K, 320, 240, Compression::Jpeg);
    sim.set_corrupt_checksums(true);
    let (layout, mut cache) = ax206_cache(sim);
    cache.write(0x11000, &pattern(3000, 4)).unwrap();
    let policy = CommitPolicy::new(&layout, &SessionConfig::default());

    let err = commit(&mut cache, &layout, &policy).unwrap_err();
    assert!(matches!(err, FrameError::VerifyFailed { addr: 0x10000, .. }));
    for sector in 16..32 {
        assert!(cache.is_sector_dirty(sector));
    }

    cache.device_mut().set_corrupt_checksums(false);
    let stats = commit(&mut cache, &layout, &policy).unwrap();
    assert_eq!(stats.bulk_blocks, 1);
    assert!(!cache.is_dirty());
    assert_eq!(&cache.device().image()[0x11000..0x11000 + 3000], &pattern(3000, 4)[..]);
}

#[test]
fn test_bulk_needs_device_support() {
    let image = fixtures::blank_ax(AxFirmware::Ax206V3_5, MEM_512K, 320, 240, Compression::Jpeg, 0x10000).unwrap();
    let id = crate::device::DeviceId::Dump {
        profile: crate::device::DumpProfile::Ax(AxFirmware::Ax206V3_5),
        size: MEM_512K,
    };
    let (layout, mut cache) = ax206_cache(SimFlash::new(image, id));
    assert!(layout.bulk_program);
    cache.write(0x11000, &pattern(100, 4)).unwrap();
    let policy = CommitPolicy::new(&layout, &SessionConfig::default());
    let stats = commit(&mut cache, &layout, &policy).unwrap();
    assert_eq!(stats.bulk_blocks, 0);
    assert_eq!(stats.small_blocks, 1);
}

#[test]
fn test_interrupted_commit_can_be_retried() {
    let mut sim = generic_sim(MEM_512K, 100, 0x2000);
    sim.set_fail_program_at(Some(0x2000));
    let mut cache = SectorCache::new(sim, MEM_512K, SPI_SECTOR_SIZE).unwrap();
    let layout = Layout::generic(MEM_512K, 100, 0x2000).unwrap();
    let policy = CommitPolicy::new(&layout, &SessionConfig::default());
    cache.write(0x2000, &pattern(64, 1)).unwrap();
    cache.write(0x3000, &pattern(64, 2)).unwrap();

    let err = commit(&mut cache, &layout, &policy).unwrap_err();
    assert!(matches!(err, FrameError::Io(_)));
    assert!(cache.is_sector_dirty(2));
    assert!(cache.is_sector_dirty(3));

    cache.device_mut().set_fail_program_at(None);
    commit(&mut cache, &layout, &policy).unwrap();
    assert!(!cache.is_dirty());
    let image = cache.device().image();
    assert_eq!(&image[0x2000..0x2040], &pattern(64, 1)[..]);
    assert_eq!(&image[0x3000..0x3040], &pattern(64, 2)[..]);
}

#[test]
fn test_st2205_commits_whole_blocks() {
    let mut frame = PictureFrame::open(st2205_sim(crate::layout::Variant::St2205V2, true), SessionConfig::default()).unwrap();
    let blob = fixtures::st2205_blob(128, 128, &pattern(500, 8));
    frame.add_raw("a", &blob).unwrap();
    let stats = frame.commit().unwrap();
    assert_eq!(stats.large_blocks, 1);
    assert_eq!(stats.sectors_written, 2);
    assert_eq!(writes(frame.device())[0], FlashOp::Erase { addr: 0, size: EraseSize::Block });
}
