// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;

use crate::session::{finish, DumpArgs};

pub fn run(args: &DumpArgs, dry_run: bool) -> anyhow::Result<()> {
    let mut frame = args.open()?;
    let before = frame.space_report()?;
    // A failure here can leave pictures missing from the table; nothing has
    // reached the dump yet, so bail out without committing.
    frame.defragment().context("Defragmentation failed, dump left untouched")?;
    let after = frame.space_report()?;
    println!(
        "Holes: {} -> {}, largest free block: {} -> {} bytes",
        before.holes, after.holes, before.largest_hole, after.largest_hole
    );
    finish(frame, dry_run)
}
