// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    /// Transport failure while talking to the flash (or the dump file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The device reported a checksum that does not match what was programmed.
    #[error("Verify failed at {addr:#08x}: expected checksum {expected:#06x}, device reported {found:#06x}")]
    VerifyFailed { addr: u32, expected: u16, found: u16 },

    /// The flash stayed busy for the whole polling budget.
    #[error("Device still busy after {polls} status polls")]
    DeviceTimeout { polls: u32 },

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// Every slot of the directory table is in use.
    #[error("Directory table full ({capacity} entries)")]
    TableFull { capacity: u32 },

    /// The picture heap cannot hold the blob, not even after defragmenting.
    #[error("Not enough free space: need {needed} bytes, {free} bytes free")]
    HeapFull { needed: u32, free: u32 },

    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Coarse classification of a [`FrameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Corrupted,
    ModelNotFound,
    BadParameter,
    OutOfSpace,
    NotSupported,
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::Io(_) | FrameError::VerifyFailed { .. } | FrameError::DeviceTimeout { .. } => {
                ErrorKind::Io
            }
            FrameError::Corrupted(_) => ErrorKind::Corrupted,
            FrameError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            FrameError::BadParameter(_) => ErrorKind::BadParameter,
            FrameError::TableFull { .. } | FrameError::HeapFull { .. } => ErrorKind::OutOfSpace,
            FrameError::NotSupported(_) => ErrorKind::NotSupported,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
