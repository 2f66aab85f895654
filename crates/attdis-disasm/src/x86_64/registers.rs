//! Register class selection for ModR/M fields.

use super::prefix::Prefixes;
use attdis_core::Register;

/// Which register file each ModR/M field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSelector {
    /// Both fields are general purpose registers of the given width.
    Gpr(u16),
    /// Both fields are vector registers, ymm when `wide`.
    Vector { wide: bool },
    /// The reg field is an xmm register, the r/m field a general purpose
    /// register of the given width (movd/movq between register files).
    VectorGpr(u16),
}

/// Which ModR/M field a register index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Reg,
    Rm,
}

impl RegisterSelector {
    /// Names the register an index refers to in the given field.
    pub fn register(&self, field: Field, index: u8, prefixes: &Prefixes) -> Register {
        match (*self, field) {
            (Self::Gpr(width), _) => gpr(index, width, prefixes),
            (Self::Vector { wide }, _) => Register::vector(index, wide),
            (Self::VectorGpr(_), Field::Reg) => Register::vector(index, false),
            (Self::VectorGpr(width), Field::Rm) => gpr(index, width, prefixes),
        }
    }

    /// Access width of a memory operand in the r/m field, in bits.
    pub fn memory_size(&self) -> u16 {
        match *self {
            Self::Gpr(width) | Self::VectorGpr(width) => width,
            Self::Vector { wide: true } => 256,
            Self::Vector { wide: false } => 128,
        }
    }
}

/// Names a general purpose register, honoring the REX byte-register rule.
pub fn gpr(index: u8, width: u16, prefixes: &Prefixes) -> Register {
    Register::gpr(index, width, prefixes.rex_present())
}

/// Names the register an opcode's low three bits select (push/pop/bswap/...).
pub fn opcode_reg(opcode: u8, width: u16, prefixes: &Prefixes) -> Register {
    gpr((opcode & 0x07) | (prefixes.rex_b() << 3), width, prefixes)
}
