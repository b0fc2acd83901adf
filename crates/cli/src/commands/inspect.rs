// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

use picframe_flash::alloc::SpaceReport;
use picframe_flash::Layout;

use crate::session::DumpArgs;

#[derive(Serialize)]
struct Report<'a> {
    layout: &'a Layout,
    files: u32,
    space: SpaceReport,
}

pub fn run(args: &DumpArgs, json: bool) -> anyhow::Result<()> {
    let mut frame = args.open()?;
    let files = frame.file_count()?;
    let space = frame.space_report()?;
    let layout = frame.layout();

    if json {
        let report = Report { layout, files, space };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Variant".to_string(), format!("{:?}", layout.variant)]);
    table.add_row(vec!["Memory".to_string(), format!("{} bytes", layout.mem_size)]);
    table.add_row(vec!["Display".to_string(), format!("{}x{}", layout.width, layout.height)]);
    table.add_row(vec!["Compression".to_string(), format!("{:?}", layout.compression)]);
    table.add_row(vec![
        "Table".to_string(),
        format!(
            "{:#x}, {} x {:?}, {} copies",
            layout.table_start, layout.max_entries, layout.entry_format, layout.table_copies
        ),
    ]);
    table.add_row(vec![
        "Heap".to_string(),
        format!("{:#x}..{:#x}", space.heap_start, space.heap_end),
    ]);
    table.add_row(vec!["Files".to_string(), files.to_string()]);
    table.add_row(vec![
        "Free".to_string(),
        format!("{} bytes in {} holes (largest {})", space.free, space.holes, space.largest_hole),
    ]);

    println!("\nPicture Frame Status\n");
    println!("{table}\n");
    Ok(())
}
