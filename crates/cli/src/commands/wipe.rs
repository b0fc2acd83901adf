// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::session::{finish, DumpArgs};

pub fn run(args: &DumpArgs, dry_run: bool) -> anyhow::Result<()> {
    let mut frame = args.open()?;
    let count = frame.entries()?.len();
    frame.delete_all()?;
    println!("Deleted {} pictures", count);
    finish(frame, dry_run)
}
