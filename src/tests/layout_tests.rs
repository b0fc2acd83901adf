// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::codec::Compression;
use crate::config::SessionConfig;
use crate::device::{AxFirmware, DeviceId, DumpProfile, SimFlash};
use crate::error::{ErrorKind, FrameError};
use crate::fixtures;
use crate::frame::PictureFrame;
use crate::layout::{decode_name, encode_name, EntryFormat, FileCount, Layout, RawEntry, SizeSource, Variant};
use crate::tests::helpers::*;

#[test]
fn test_packed_address_encoding() {
    let mut raw = [0u8; 2];
    let e = RawEntry { present: true, address: 0x12300, size: None };
    EntryFormat::PackedAddress16.encode(&e, &mut raw).unwrap();
    assert_eq!(raw, [0x23, 0x01]);
    assert_eq!(EntryFormat::PackedAddress16.decode(&raw), e);

    let bad = RawEntry { present: true, address: 0x12345, size: None };
    assert!(matches!(
        EntryFormat::PackedAddress16.encode(&bad, &mut raw),
        Err(FrameError::BadParameter(_))
    ));
    // Rejected before touching the slot.
    assert_eq!(raw, [0x23, 0x01]);

    let gone = RawEntry { present: false, address: 0x12300, size: None };
    EntryFormat::PackedAddress16.encode(&gone, &mut raw).unwrap();
    assert_eq!(raw, [0, 0]);
    assert!(!EntryFormat::PackedAddress16.decode(&raw).present);
}

#[test]
fn test_flagged_encoding() {
    let mut raw = [0xAAu8; 8];
    let e = RawEntry { present: true, address: 0x0001_2345, size: Some(0x4321) };
    EntryFormat::Flagged32.encode(&e, &mut raw).unwrap();
    assert_eq!(raw, [0x01, 0x45, 0x23, 0x01, 0x00, 0x21, 0x43, 0x00]);
    assert_eq!(EntryFormat::Flagged32.decode(&raw), e);

    let big = RawEntry { present: true, address: 0, size: Some(0x10000) };
    assert!(EntryFormat::Flagged32.encode(&big, &mut raw).is_err());
}

#[test]
fn test_blocks_encoding() {
    let mut raw = [0u8; 4];
    let e = RawEntry { present: true, address: 0x12300, size: Some(0x1200) };
    EntryFormat::Blocks16.encode(&e, &mut raw).unwrap();
    assert_eq!(raw, [0x01, 0x23, 0x00, 0x12]);
    assert_eq!(EntryFormat::Blocks16.decode(&raw), e);

    let odd = RawEntry { present: true, address: 0x12300, size: Some(0x1201) };
    assert!(matches!(EntryFormat::Blocks16.encode(&odd, &mut raw), Err(FrameError::BadParameter(_))));
}

#[test]
fn test_named_entry_keeps_name() {
    let mut raw = [0u8; 16];
    encode_name("holiday_photo", &mut raw);
    let e = RawEntry { present: true, address: 0x2000, size: None };
    EntryFormat::Named32.encode(&e, &mut raw).unwrap();
    assert_eq!(raw[0], 1);
    assert_eq!(decode_name(&raw), "holiday_ph");
    assert_eq!(raw[15], 0);
    assert_eq!(EntryFormat::Named32.decode(&raw).address, 0x2000);
}

#[test]
fn test_generic_layout_validation() {
    let l = Layout::generic(MEM_512K, 100, 0x2000).unwrap();
    assert_eq!(l.entry_offset(0), 0x10);
    assert_eq!(l.entry_offset(99), 0x10 + 99 * 8);
    assert_eq!(l.heap_end(), MEM_512K);

    assert!(Layout::generic(MEM_512K, 1000, 0x100).is_err());
    assert!(Layout::generic(MEM_512K, 0, 0x100).is_err());
}

#[test]
fn test_max_blob_size_per_format() {
    let generic = Layout::generic(MEM_512K, 100, 0x2000).unwrap();
    assert_eq!(generic.max_blob_size(), 0xFFFF);
    let ax3003 = Layout::ax(AxFirmware::Ax3003V3_5, MEM_512K, true, 0x10000, 320, 240, Compression::Jpeg).unwrap();
    assert_eq!(ax3003.max_blob_size(), 0xFF_FF00);
    let st = Layout::st2205(Variant::St2205V2, MEM_512K, 128, 128, false).unwrap();
    assert_eq!(st.max_blob_size(), u32::MAX);
}

#[test]
fn test_ax_layouts() {
    let l = Layout::ax(AxFirmware::Ax203V3_4, MEM_512K, true, 0x10000, 128, 128, Compression::YuvDelta).unwrap();
    assert_eq!(l.heap_start, 0x12000);
    assert_eq!(l.max_entries, 2032);
    assert_eq!(l.size_source, SizeSource::Fixed(128 * 128 * 3 / 4));
    assert!(matches!(l.file_count, FileCount::Stored { offset: 5, authoritative: false }));

    let l = Layout::ax(AxFirmware::Ax3003V3_5, MEM_512K, true, 0x10000, 320, 240, Compression::Jpeg).unwrap();
    assert_eq!(l.heap_end(), MEM_512K - 0x10000);
    assert_eq!(l.reserved_size(1000), 1024);
    assert_eq!(l.max_entries, 1016);

    // JPEG on a fixed-size firmware makes no sense.
    let res = Layout::ax(AxFirmware::Ax203V3_3, MEM_512K, true, 0x10000, 128, 128, Compression::Jpeg);
    assert!(matches!(res, Err(FrameError::NotSupported(_))));
}

#[test]
fn test_identify_each_ax_firmware() {
    let cases = [
        (AxFirmware::Ax203V3_3, 128, 128, Compression::Yuv, Variant::Ax203V3_3),
        (AxFirmware::Ax203V3_4, 128, 160, Compression::YuvDelta, Variant::Ax203V3_4),
        (AxFirmware::Ax206V3_5, 320, 240, Compression::Jpeg, Variant::Ax206V3_5),
        (AxFirmware::Ax3003V3_5, 240, 320, Compression::Jpeg, Variant::Ax3003V3_5),
    ];
    for (fw, w, h, c, variant) in cases {
        let frame = PictureFrame::open(ax_sim(fw, FLASH_512K, w, h, c), SessionConfig::default()).unwrap();
        let l = frame.layout();
        assert_eq!(l.variant, variant);
        assert_eq!((l.width, l.height), (w as u32, h as u32));
        assert_eq!(l.compression, c);
        assert_eq!(l.table_start, 0x10000);
        assert_eq!(l.mem_size, MEM_512K);
    }
}

#[test]
fn test_unknown_ids_are_model_not_found() {
    let sim = ax_sim(AxFirmware::Ax206V3_5, 0x00badbad, 128, 128, Compression::Jpeg);
    let err = PictureFrame::open(sim, SessionConfig::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ModelNotFound);

    let image = fixtures::blank_ax(AxFirmware::Ax206V3_5, MEM_512K, 128, 128, Compression::Jpeg, 0x10000).unwrap();
    let id = DeviceId::SpiFlash {
        usb_vendor: 0x1908,
        usb_product: 0x4242,
        firmware: String::new(),
        flash_id: FLASH_512K,
    };
    let err = PictureFrame::open(SimFlash::new(image, id), SessionConfig::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ModelNotFound);
}

#[test]
fn test_bad_parameter_block_is_rejected() {
    let mut image =
        fixtures::blank_ax(AxFirmware::Ax203V3_4, MEM_512K, 128, 128, Compression::Yuv, 0x10000).unwrap();
    // One of the constant bytes.
    image[0x50 + 7] = 0x02;
    let dump = DeviceId::Dump { profile: DumpProfile::Ax(AxFirmware::Ax203V3_4), size: MEM_512K };
    let err = PictureFrame::open(SimFlash::new(image.clone(), dump.clone()), SessionConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, FrameError::ModelNotFound(_)));

    // Unknown compression tag.
    image[0x50 + 7] = 0x01;
    image[0x50 + 6] = 7;
    let err = PictureFrame::open(SimFlash::new(image.clone(), dump.clone()), SessionConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, FrameError::ModelNotFound(_)));

    // Resolution off the allow-list.
    image[0x50 + 6] = 2;
    image[0x50 + 2] = 100;
    let err = PictureFrame::open(SimFlash::new(image.clone(), dump.clone()), SessionConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, FrameError::ModelNotFound(_)));

    // Magic missing at the ABFS start.
    image[0x50 + 2] = 128;
    image[0x10000] = b'X';
    let err = PictureFrame::open(SimFlash::new(image, dump), SessionConfig::default()).err().unwrap();
    assert!(matches!(err, FrameError::ModelNotFound(_)));
}

#[test]
fn test_st2205_versions_and_compression() {
    for (variant, copies, heap) in [(Variant::St2205V1, 4, 0x10000), (Variant::St2205V2, 1, 0x2000)] {
        let frame = PictureFrame::open(st2205_sim(variant, true), SessionConfig::default()).unwrap();
        let l = frame.layout();
        assert_eq!(l.variant, variant);
        assert_eq!(l.table_copies, copies);
        assert_eq!(l.heap_start, heap);
        assert_eq!(l.compression, Compression::St2205Blocks);
        assert_eq!(l.size_source, SizeSource::BlobHeader);

        let frame = PictureFrame::open(st2205_sim(variant, false), SessionConfig::default()).unwrap();
        assert_eq!(frame.layout().compression, Compression::Rgb565);
        assert_eq!(frame.layout().size_source, SizeSource::Fixed(128 * 128 * 2));
    }
}

#[test]
fn test_st2205_memory_size_probe() {
    let image = fixtures::blank_st2205(Variant::St2205V2, 2 * MEM_512K, true).unwrap();
    let sim = SimFlash::new(image, DeviceId::Sitronix { width: 128, height: 160 });
    let frame = PictureFrame::open(sim, SessionConfig::default()).unwrap();
    assert_eq!(frame.mem_size(), 2 * MEM_512K);
    assert_eq!(frame.layout().heap_end(), 2 * MEM_512K - 0x40000);
}

#[test]
fn test_st2205_without_markers_is_unknown() {
    let mut image = fixtures::blank_st2205(Variant::St2205V1, MEM_512K, true).unwrap();
    image[0x8477] = 0;
    let sim = SimFlash::new(image, DeviceId::Sitronix { width: 128, height: 128 });
    let err = PictureFrame::open(sim, SessionConfig::default()).err().unwrap();
    assert!(matches!(err, FrameError::ModelNotFound(_)));

    let sim = st2205_sim(Variant::St2205V2, true);
    let sim = SimFlash::new(sim.image().to_vec(), DeviceId::Sitronix { width: 100, height: 100 });
    assert!(PictureFrame::open(sim, SessionConfig::default()).is_err());
}
