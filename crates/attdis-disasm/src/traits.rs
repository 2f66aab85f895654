//! Disassembler traits.

use crate::DecodeError;
use attdis_core::Instruction;

/// Result of decoding an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// The decoded instruction.
    pub instruction: Instruction,
    /// Number of bytes consumed.
    pub size: usize,
}

/// Trait for instruction decoders.
///
/// Implementations hold no per-decode state, so `Send + Sync` is required:
/// one decoder can serve several buffers decoded on separate threads.
pub trait Disassembler: Send + Sync {
    /// Decode a single instruction starting at the given address.
    ///
    /// # Arguments
    /// * `bytes` - The raw bytes to decode
    /// * `address` - The virtual address of the first byte
    ///
    /// # Returns
    /// The decoded instruction and the number of bytes consumed. Nothing is
    /// returned for an instruction that does not fit in `bytes`.
    fn decode_instruction(&self, bytes: &[u8], address: u64) -> Result<DecodedInstruction, DecodeError>;

    /// Returns the minimum instruction size for this architecture.
    fn min_instruction_size(&self) -> usize;

    /// Returns the maximum instruction size for this architecture.
    fn max_instruction_size(&self) -> usize;

    /// Returns whether instructions are fixed-width.
    fn is_fixed_width(&self) -> bool;
}
