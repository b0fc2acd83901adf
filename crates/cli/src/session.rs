// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use picframe_flash::device::AxFirmware;
use picframe_flash::{DumpProfile, MemoryDump, PictureFrame, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Family {
    #[value(name = "ax203-3.3")]
    Ax203V33,
    #[value(name = "ax203-3.4")]
    Ax203V34,
    Ax206,
    Ax3003,
    St2205,
    Generic,
}

/// Which dump to open and how to read it.
#[derive(Debug, Clone, Args)]
pub struct DumpArgs {
    /// Memory dump file
    pub dump: PathBuf,

    #[arg(long, value_enum, default_value = "generic")]
    pub family: Family,

    /// LCD width (st2205; AX frames store it in the firmware and only `format` needs it)
    #[arg(long)]
    pub width: Option<u16>,

    /// LCD height
    #[arg(long)]
    pub height: Option<u16>,

    /// Directory capacity (generic only)
    #[arg(long, default_value_t = 100)]
    pub capacity: u32,

    /// Heap start offset (generic only)
    #[arg(long, value_parser = parse_u32, default_value = "0x2000")]
    pub heap_start: u32,

    /// Open even if the table checksum does not match
    #[arg(long)]
    pub ignore_checksum: bool,
}

/// Accepts decimal or `0x`-prefixed hex.
pub fn parse_u32(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

impl DumpArgs {
    pub fn profile(&self) -> Result<DumpProfile> {
        Ok(match self.family {
            Family::Ax203V33 => DumpProfile::Ax(AxFirmware::Ax203V3_3),
            Family::Ax203V34 => DumpProfile::Ax(AxFirmware::Ax203V3_4),
            Family::Ax206 => DumpProfile::Ax(AxFirmware::Ax206V3_5),
            Family::Ax3003 => DumpProfile::Ax(AxFirmware::Ax3003V3_5),
            Family::St2205 => match (self.width, self.height) {
                (Some(width), Some(height)) => DumpProfile::St2205 { width, height },
                _ => bail!("st2205 dumps need --width and --height"),
            },
            Family::Generic => DumpProfile::Generic {
                capacity: self.capacity,
                heap_start: self.heap_start,
            },
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            verify_table_checksum: !self.ignore_checksum,
            ..SessionConfig::default()
        }
    }

    pub fn open(&self) -> Result<PictureFrame<MemoryDump>> {
        let profile = self.profile()?;
        tracing::debug!("opening {} as {:?}", self.dump.display(), profile);
        let dump = MemoryDump::open(&self.dump, profile)
            .with_context(|| format!("Failed to open dump {}", self.dump.display()))?;
        PictureFrame::open(dump, self.session_config())
            .with_context(|| format!("Failed to read {:?} layout from {}", self.family, self.dump.display()))
    }
}

/// Commits the session unless `dry_run`, then closes it.
pub fn finish(mut frame: PictureFrame<MemoryDump>, dry_run: bool) -> Result<()> {
    if dry_run {
        let dirty = frame.dirty_sectors();
        tracing::info!("dry run, dropping {} changed sectors", dirty);
        println!("Dry run: {} changed sectors not written", dirty);
        frame.close();
        return Ok(());
    }
    let stats = frame.commit().context("Commit failed")?;
    tracing::info!(
        "committed {} sectors ({} block erases)",
        stats.sectors_written,
        stats.block_erases
    );
    println!("Committed {} sectors", stats.sectors_written);
    frame.close();
    Ok(())
}
