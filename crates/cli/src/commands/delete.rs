// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;

use crate::session::{finish, DumpArgs};

pub fn run(args: &DumpArgs, index: u32, dry_run: bool) -> anyhow::Result<()> {
    let mut frame = args.open()?;
    frame
        .delete(index)
        .with_context(|| format!("Failed to delete picture {}", index))?;
    println!("Deleted picture {}", index);
    finish(frame, dry_run)
}
