// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::fs;
use std::path::Path;

use anyhow::Context;

use super::blob_digest;
use crate::session::DumpArgs;

pub fn run(args: &DumpArgs, index: u32, out: &Path) -> anyhow::Result<()> {
    let mut frame = args.open()?;
    let blob = frame
        .read_raw(index)
        .with_context(|| format!("Failed to read picture {}", index))?;
    fs::write(out, &blob).with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Extracted picture {} ({} bytes, crc64 {:016x}) to {}",
        index,
        blob.len(),
        blob_digest(&blob),
        out.display()
    );
    Ok(())
}
