// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! picframe-flash: the flash filesystem and commit engine of AX203/AX206/AX3003
//! and ST2205 based USB picture frames.
//!
//! A session ([`frame::PictureFrame`]) caches the whole flash in memory,
//! edits the directory table and picture heap there, and writes changed
//! erase blocks back on commit.

pub mod config;
pub mod error;
pub mod device;
pub mod cache;
pub mod codec;
pub mod layout;
pub mod directory;
pub mod alloc;
pub mod commit;
pub mod frame;
pub mod fixtures;

pub use config::SessionConfig;
pub use device::{BlockDevice, DeviceId, DumpProfile, MemoryDump, SimFlash};
pub use directory::DirectoryEntry;
pub use error::{ErrorKind, FrameError, Result};
pub use frame::PictureFrame;
pub use layout::Layout;

#[cfg(test)]
mod tests;
