// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod add;
pub mod defrag;
pub mod delete;
pub mod extract;
pub mod format;
pub mod inspect;
pub mod list;
pub mod wipe;

use crc64fast::Digest;

/// CRC-64 of a stored blob, for comparing pictures across dumps.
pub fn blob_digest(data: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(data);
    digest.sum64()
}
