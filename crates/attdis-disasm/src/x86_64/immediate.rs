//! Immediate and displacement readers.

use crate::cursor::ByteCursor;
use crate::DecodeError;
use attdis_core::Operand;

/// Reads a little-endian field of `size` bytes (1, 2, 4 or 8), sign-extended.
pub fn read_signed(cursor: &mut ByteCursor<'_>, size: usize) -> Result<i64, DecodeError> {
    let value = match size {
        1 => cursor.read_u8()? as i8 as i64,
        2 => i16::from_le_bytes(cursor.read_bytes::<2>()?) as i64,
        4 => i32::from_le_bytes(cursor.read_bytes::<4>()?) as i64,
        _ => i64::from_le_bytes(cursor.read_bytes::<8>()?),
    };
    Ok(value)
}

/// Reads an immediate of `size` bytes rendered at `width` bits.
///
/// Narrow immediates are sign-extended to the operand width, so `83 /0 80`
/// on a 64-bit operand renders as `$0xffffffffffffff80`.
pub fn read_imm(cursor: &mut ByteCursor<'_>, size: usize, width: u16) -> Result<Operand, DecodeError> {
    Ok(Operand::imm(read_signed(cursor, size)?, width))
}

/// Size in bytes of an `Iz` immediate: 16 bits for 16-bit operands, 32
/// otherwise (sign-extended for 64-bit operands).
pub fn iz_size(operand_size: u16) -> usize {
    if operand_size == 16 {
        2
    } else {
        4
    }
}
