// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

use super::blob_digest;
use crate::session::DumpArgs;

#[derive(Serialize)]
struct Row {
    index: u32,
    name: Option<String>,
    address: u32,
    size: u32,
    crc64: String,
}

pub fn run(args: &DumpArgs, json: bool) -> anyhow::Result<()> {
    let mut frame = args.open()?;
    let mut rows = Vec::new();
    for info in frame.entries()? {
        let blob = frame.read_raw(info.index)?;
        rows.push(Row {
            index: info.index,
            name: info.name,
            address: info.address,
            size: info.size,
            crc64: format!("{:016x}", blob_digest(&blob)),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Index", "Name", "Address", "Size", "CRC64"]);
    for row in &rows {
        table.add_row(vec![
            row.index.to_string(),
            row.name.clone().unwrap_or_default(),
            format!("{:#08x}", row.address),
            row.size.to_string(),
            row.crc64.clone(),
        ]);
    }

    println!("\n{} pictures\n", rows.len());
    println!("{table}\n");
    Ok(())
}
