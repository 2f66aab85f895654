//! Instruction operand types and their AT&T rendering.

use crate::Register;

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Operand {
    /// Register operand.
    Register(Register),
    /// Immediate value.
    Immediate(Immediate),
    /// Memory reference.
    Memory(MemoryRef),
    /// PC-relative address (used in branches/calls).
    PcRelative {
        /// Offset from the end of the instruction.
        offset: i64,
        /// Resolved target address.
        target: u64,
    },
}

impl Operand {
    /// Creates a register operand.
    pub fn reg(reg: Register) -> Self {
        Self::Register(reg)
    }

    /// Creates an immediate operand rendered at `width` bits.
    pub fn imm(value: i64, width: u16) -> Self {
        Self::Immediate(Immediate { value, width })
    }

    /// Creates a PC-relative operand.
    pub fn pc_rel(offset: i64, target: u64) -> Self {
        Self::PcRelative { offset, target }
    }

    /// Returns true if this is a memory operand.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

/// Immediate value operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Immediate {
    /// The value, sign-extended from its encoded size.
    pub value: i64,
    /// Width in bits the value is rendered at (8, 16, 32 or 64).
    pub width: u16,
}

impl Immediate {
    /// Returns the value truncated to its rendering width.
    pub fn as_unsigned(&self) -> u64 {
        match self.width {
            8 => self.value as u8 as u64,
            16 => self.value as u16 as u64,
            32 => self.value as u32 as u64,
            _ => self.value as u64,
        }
    }
}

/// Memory reference operand, `segment:disp(base,index,scale)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemoryRef {
    /// Base register (if any).
    pub base: Option<Register>,
    /// Index register (if any).
    pub index: Option<Register>,
    /// Scale factor for index (1, 2, 4, or 8).
    pub scale: u8,
    /// Displacement, sign-extended.
    pub displacement: i64,
    /// Size of the displacement field in the encoding, in bytes (0, 1, 4 or 8).
    pub disp_size: u8,
    /// Access width in bits (0 when the access has no natural width).
    pub size: u16,
    /// Segment override.
    pub segment: Option<Register>,
}

impl MemoryRef {
    /// Creates a memory reference through a single base register.
    pub fn base(reg: Register, size: u16) -> Self {
        Self {
            base: Some(reg),
            index: None,
            scale: 1,
            displacement: 0,
            disp_size: 0,
            size,
            segment: None,
        }
    }

    /// Creates an absolute memory reference (`movabs` offsets).
    pub fn absolute(address: u64, disp_size: u8, size: u16) -> Self {
        Self {
            base: None,
            index: None,
            scale: 1,
            displacement: address as i64,
            disp_size,
            size,
            segment: None,
        }
    }

    /// Sets the segment override.
    pub fn with_segment(mut self, segment: Register) -> Self {
        self.segment = Some(segment);
        self
    }
}

impl std::fmt::Display for Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:#x}", self.as_unsigned())
    }
}

impl std::fmt::Display for MemoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(segment) = self.segment {
            write!(f, "{}:", segment)?;
        }

        let has_registers = self.base.is_some() || self.index.is_some();

        if self.disp_size > 0 {
            if !has_registers {
                write!(f, "{:#x}", self.displacement as u64)?;
            } else if self.displacement < 0 {
                write!(f, "-{:#x}", self.displacement.unsigned_abs())?;
            } else {
                write!(f, "{:#x}", self.displacement)?;
            }
        }

        if has_registers {
            write!(f, "(")?;
            if let Some(base) = self.base {
                write!(f, "{}", base)?;
            }
            if let Some(index) = self.index {
                write!(f, ",{},{}", index, self.scale)?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(reg) => write!(f, "{}", reg),
            Self::Immediate(imm) => write!(f, "{}", imm),
            Self::Memory(mem) => write!(f, "{}", mem),
            Self::PcRelative { target, .. } => write!(f, "{:#x}", target),
        }
    }
}
