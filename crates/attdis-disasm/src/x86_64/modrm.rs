//! ModR/M and SIB byte decoding.

use super::immediate::read_signed;
use super::prefix::Prefixes;
use super::registers::{Field, RegisterSelector};
use crate::cursor::ByteCursor;
use crate::DecodeError;
use attdis_core::register::instruction_pointer;
use attdis_core::{MemoryRef, Operand, Register};

/// Decoded ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRM {
    /// Mod field (2 bits)
    pub mod_: u8,
    /// Reg field (3 bits, extended by REX.R)
    pub reg: u8,
    /// R/M field (3 bits, extended by REX.B)
    pub rm: u8,
}

impl ModRM {
    /// Parse a ModR/M byte with REX (or VEX) extension.
    pub fn parse(byte: u8, prefixes: &Prefixes) -> Self {
        Self {
            mod_: (byte >> 6) & 0x3,
            reg: ((byte >> 3) & 0x7) | (prefixes.rex_r() << 3),
            rm: (byte & 0x7) | (prefixes.rex_b() << 3),
        }
    }

    /// The reg field without the REX extension (the /digit of group opcodes).
    pub fn digit(&self) -> u8 {
        self.reg & 0x7
    }

    /// Returns true if this ModR/M encodes a register operand (mod=11).
    pub fn is_register(&self) -> bool {
        self.mod_ == 0b11
    }

    /// Returns true if this ModR/M requires a SIB byte.
    pub fn needs_sib(&self) -> bool {
        self.mod_ != 0b11 && (self.rm & 0x7) == 0x4
    }

    /// Returns true if this ModR/M is RIP-relative (mod=00, rm=101, no SIB).
    pub fn is_rip_relative(&self) -> bool {
        self.mod_ == 0b00 && (self.rm & 0x7) == 0x5
    }

    /// Returns true if this ModR/M has a 32-bit displacement.
    pub fn has_disp32(&self) -> bool {
        self.mod_ == 0b10 || self.is_rip_relative()
    }

    /// Returns true if this ModR/M has an 8-bit displacement.
    pub fn has_disp8(&self) -> bool {
        self.mod_ == 0b01
    }
}

/// Decoded SIB byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib {
    /// Scale (2 bits) - actual scale is 1 << scale
    pub scale: u8,
    /// Index register (3 bits, extended by REX.X)
    pub index: u8,
    /// Base register (3 bits, extended by REX.B)
    pub base: u8,
}

impl Sib {
    /// Parse a SIB byte with REX extension.
    pub fn parse(byte: u8, prefixes: &Prefixes) -> Self {
        Self {
            scale: (byte >> 6) & 0x3,
            index: ((byte >> 3) & 0x7) | (prefixes.rex_x() << 3),
            base: (byte & 0x7) | (prefixes.rex_b() << 3),
        }
    }

    /// Returns the actual scale factor (1, 2, 4, or 8).
    pub fn scale_factor(&self) -> u8 {
        1 << self.scale
    }

    /// Index 100 without REX.X means "no index"; r12 is a valid index.
    pub fn has_index(&self) -> bool {
        self.index != 0x4
    }
}

/// The two operands a ModR/M byte names, in (reg, r/m) field order.
///
/// Callers pick the textual order; x86 mnemonics vary in which field is the
/// destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRmOperands {
    pub modrm: ModRM,
    pub reg: Operand,
    pub rm: Operand,
}

/// Consume a ModR/M byte and any SIB/displacement it requires.
pub fn resolve(
    cursor: &mut ByteCursor<'_>,
    prefixes: &Prefixes,
    selector: RegisterSelector,
) -> Result<ModRmOperands, DecodeError> {
    let modrm = ModRM::parse(cursor.read_u8()?, prefixes);
    let rm = decode_rm(cursor, modrm, prefixes, selector)?;
    let reg = Operand::Register(selector.register(Field::Reg, modrm.reg, prefixes));
    Ok(ModRmOperands { modrm, reg, rm })
}

/// Decode the r/m field of an already-consumed ModR/M byte.
pub fn decode_rm(
    cursor: &mut ByteCursor<'_>,
    modrm: ModRM,
    prefixes: &Prefixes,
    selector: RegisterSelector,
) -> Result<Operand, DecodeError> {
    if modrm.is_register() {
        return Ok(Operand::Register(
            selector.register(Field::Rm, modrm.rm, prefixes),
        ));
    }
    decode_memory(cursor, modrm, prefixes, selector.memory_size()).map(Operand::Memory)
}

/// Decode a memory r/m operand of `size` bits.
pub fn decode_memory(
    cursor: &mut ByteCursor<'_>,
    modrm: ModRM,
    prefixes: &Prefixes,
    size: u16,
) -> Result<MemoryRef, DecodeError> {
    let address_size = prefixes.address_size();
    let address_reg = |index: u8| Register::gpr(index, address_size, false);

    let mut base = None;
    let mut index = None;
    let mut scale = 1;
    let mut sib_disp32 = false;

    if modrm.needs_sib() {
        let sib = Sib::parse(cursor.read_u8()?, prefixes);

        if sib.has_index() {
            index = Some(address_reg(sib.index));
            scale = sib.scale_factor();
        }

        // base=101 with mod=00: no base register, disp32 follows
        if (sib.base & 0x7) == 0x5 && modrm.mod_ == 0b00 {
            sib_disp32 = true;
        } else {
            base = Some(address_reg(sib.base));
        }
    } else if modrm.is_rip_relative() {
        base = Some(instruction_pointer(address_size == 32));
    } else {
        base = Some(address_reg(modrm.rm));
    }

    let (displacement, disp_size) = if modrm.has_disp32() || sib_disp32 {
        (read_signed(cursor, 4)?, 4)
    } else if modrm.has_disp8() {
        (read_signed(cursor, 1)?, 1)
    } else {
        (0, 0)
    };

    Ok(MemoryRef {
        base,
        index,
        scale,
        displacement,
        disp_size,
        size,
        segment: prefixes.segment(),
    })
}
