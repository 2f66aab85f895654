//! Disassembly error types.

use thiserror::Error;

/// Error type for instruction decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Instruction was truncated (not enough bytes).
    #[error("truncated instruction at {address:#x}: need {needed} bytes, have {available}")]
    Truncated {
        address: u64,
        needed: usize,
        available: usize,
    },

    /// Encoding is not valid in 64-bit mode.
    #[error("invalid encoding at {address:#x} ({bytes:02x?}): {reason}")]
    InvalidEncoding {
        address: u64,
        bytes: Vec<u8>,
        reason: &'static str,
    },

    /// Recognized opcode family that this decoder does not render.
    #[error("unsupported instruction at {address:#x} ({bytes:02x?}): {reason}")]
    Unsupported {
        address: u64,
        bytes: Vec<u8>,
        reason: &'static str,
    },
}

impl DecodeError {
    /// Creates a new Truncated error.
    pub fn truncated(address: u64, needed: usize, available: usize) -> Self {
        Self::Truncated {
            address,
            needed,
            available,
        }
    }

    /// Creates a new InvalidEncoding error covering `bytes`.
    pub fn invalid_encoding(address: u64, bytes: &[u8], reason: &'static str) -> Self {
        Self::InvalidEncoding {
            address,
            bytes: bytes.to_vec(),
            reason,
        }
    }

    /// Creates a new Unsupported error covering `bytes`.
    pub fn unsupported(address: u64, bytes: &[u8], reason: &'static str) -> Self {
        Self::Unsupported {
            address,
            bytes: bytes.to_vec(),
            reason,
        }
    }

    /// Address of the instruction that failed to decode.
    pub fn address(&self) -> u64 {
        match self {
            Self::Truncated { address, .. }
            | Self::InvalidEncoding { address, .. }
            | Self::Unsupported { address, .. } => *address,
        }
    }

    /// Number of bytes a placeholder for this error covers.
    ///
    /// `None` for truncation, which is always fatal for the buffer.
    pub fn skip_len(&self) -> Option<usize> {
        match self {
            Self::Truncated { .. } => None,
            Self::InvalidEncoding { bytes, .. } | Self::Unsupported { bytes, .. } => {
                Some(bytes.len().max(1))
            }
        }
    }

    /// Returns true if decoding of the enclosing buffer cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
