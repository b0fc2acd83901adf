// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::{bail, Context};

use picframe_flash::codec::Compression;
use picframe_flash::device::AxFirmware;
use picframe_flash::fixtures;
use picframe_flash::layout::Variant;
use picframe_flash::MemoryDump;

use crate::session::{DumpArgs, Family};

/// ABFS start used for freshly formatted AX images.
const AX_FS_START: u32 = 0x10000;

/// Writes a blank, formatted image for `args.family` to `args.dump`.
pub fn run(args: &DumpArgs, size: u32, rgb565: bool, st2205_v1: bool) -> anyhow::Result<()> {
    if args.dump.exists() {
        bail!("{} already exists, refusing to overwrite", args.dump.display());
    }
    let image = match args.family {
        Family::Generic => fixtures::blank_generic(size, args.capacity)?,
        Family::St2205 => {
            let variant = if st2205_v1 { Variant::St2205V1 } else { Variant::St2205V2 };
            fixtures::blank_st2205(variant, size, !rgb565)?
        }
        family => {
            let (firmware, compression) = match family {
                Family::Ax203V33 => (AxFirmware::Ax203V3_3, Compression::Yuv),
                Family::Ax203V34 => (AxFirmware::Ax203V3_4, Compression::YuvDelta),
                Family::Ax206 => (AxFirmware::Ax206V3_5, Compression::Jpeg),
                _ => (AxFirmware::Ax3003V3_5, Compression::Jpeg),
            };
            let (Some(width), Some(height)) = (args.width, args.height) else {
                bail!("AX images need --width and --height");
            };
            fixtures::blank_ax(firmware, size, width, height, compression, AX_FS_START)?
        }
    };

    MemoryDump::create(&args.dump, &image, args.profile()?)
        .with_context(|| format!("Failed to create {}", args.dump.display()))?;

    // Read it back the way every other command will.
    let mut frame = args.open()?;
    let space = frame.space_report()?;
    println!(
        "Formatted {} as {:?}: {} bytes, {} slots, {} bytes of picture space",
        args.dump.display(),
        frame.layout().variant,
        frame.mem_size(),
        frame.max_entries(),
        space.free
    );
    Ok(())
}
