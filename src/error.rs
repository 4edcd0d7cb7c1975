//! Error types for a reduction run.
//!
//! Every variant here is fatal for the measurement that produced it. A sum
//! that disagrees with the host reference is not an error: it is reported as
//! [`Verdict::Mismatch`](crate::verify::Verdict::Mismatch).

use std::fmt;

use thiserror::Error;

use crate::target::Variant;

/// Which buffer an allocation or transfer concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Device mirror of the input array.
    Input,
    /// One slot per block, holding that block's partial sum.
    PartialSums,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Input => f.write_str("input"),
            BufferKind::PartialSums => f.write_str("partial-sums"),
        }
    }
}

/// Errors produced while staging, launching or collecting a reduction pass.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to allocate {buffer} buffer ({bytes} bytes)")]
    Allocation {
        buffer: BufferKind,
        bytes: usize,
    },

    #[error("{variant}: transfer of {buffer} buffer failed: {reason}")]
    Transfer {
        variant: Variant,
        buffer: BufferKind,
        reason: String,
    },

    #[error("{variant}: launch failed: {reason}")]
    Launch {
        variant: Variant,
        reason: String,
    },

    #[error("{variant}: device synchronization failed: {reason}")]
    Synchronization {
        variant: Variant,
        reason: String,
    },
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ReduceError>;

/// Size in bytes of `len` elements of `T`, or an allocation error if it
/// does not fit in `usize`.
pub(crate) fn buffer_bytes<T>(buffer: BufferKind, len: usize) -> Result<usize> {
    len.checked_mul(std::mem::size_of::<T>())
        .ok_or(ReduceError::Allocation {
            buffer,
            bytes: usize::MAX,
        })
}
