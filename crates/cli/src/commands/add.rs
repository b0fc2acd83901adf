// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::session::{finish, DumpArgs};

/// Stores the raw contents of `file` (already in the frame's picture format)
/// in the lowest free slot.
pub fn run(args: &DumpArgs, file: &Path, name: Option<String>, dry_run: bool) -> anyhow::Result<()> {
    let blob = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut frame = args.open()?;
    let idx = frame
        .add_raw(&name, &blob)
        .with_context(|| format!("Failed to store {} ({} bytes)", file.display(), blob.len()))?;
    let entry = frame.entry(idx)?;
    println!("Stored {} as picture {} at {:#08x}", file.display(), idx, entry.address);
    finish(frame, dry_run)
}
