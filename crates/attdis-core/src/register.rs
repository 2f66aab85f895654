//! x86-64 register representation and naming.

/// Register class (register file plus access width).
///
/// The class fixes both which file an index refers to and how wide the
/// access is, so a `(class, index)` pair always resolves to exactly one name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RegisterClass {
    /// 8-bit general purpose without any REX prefix (al, cl, dl, bl, ah, ch, dh, bh).
    Gpr8,
    /// 8-bit general purpose with a REX prefix present (al..dil, r8b..r15b).
    Gpr8Rex,
    /// 16-bit general purpose (ax..r15w).
    Gpr16,
    /// 32-bit general purpose (eax..r15d).
    Gpr32,
    /// 64-bit general purpose (rax..r15).
    Gpr64,
    /// 128-bit SSE register (xmm0..xmm15).
    Xmm,
    /// 256-bit AVX register (ymm0..ymm15).
    Ymm,
    /// Segment register (es, cs, ss, ds, fs, gs).
    Segment,
    /// 64-bit instruction pointer, only valid as a memory base.
    Rip,
    /// 32-bit instruction pointer, selected by an address-size override.
    Eip,
}

impl RegisterClass {
    /// Returns the general purpose class for a width in bits.
    ///
    /// `rex` selects the uniform byte-register view (`spl`, `sil`, ...) over
    /// the legacy high-byte view (`ah`, `dh`, ...).
    pub fn gpr(width: u16, rex: bool) -> Self {
        match width {
            8 if rex => Self::Gpr8Rex,
            8 => Self::Gpr8,
            16 => Self::Gpr16,
            32 => Self::Gpr32,
            _ => Self::Gpr64,
        }
    }

    /// Returns the width of a register in this class, in bits.
    pub fn width(&self) -> u16 {
        match self {
            Self::Gpr8 | Self::Gpr8Rex => 8,
            Self::Gpr16 | Self::Segment => 16,
            Self::Gpr32 | Self::Eip => 32,
            Self::Gpr64 | Self::Rip => 64,
            Self::Xmm => 128,
            Self::Ymm => 256,
        }
    }
}

/// A single x86-64 register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Register {
    /// The register class.
    pub class: RegisterClass,
    /// Hardware index within the class (0-15).
    pub index: u8,
}

// Hardware indices of the general purpose registers.
pub mod gpr {
    pub const RAX: u8 = 0;
    pub const RCX: u8 = 1;
    pub const RDX: u8 = 2;
    pub const RBX: u8 = 3;
    pub const RSP: u8 = 4;
    pub const RBP: u8 = 5;
    pub const RSI: u8 = 6;
    pub const RDI: u8 = 7;
}

// Hardware indices of the segment registers (ModRM.reg order).
pub mod seg {
    pub const ES: u8 = 0;
    pub const CS: u8 = 1;
    pub const SS: u8 = 2;
    pub const DS: u8 = 3;
    pub const FS: u8 = 4;
    pub const GS: u8 = 5;
}

impl Register {
    /// Creates a new register.
    pub fn new(class: RegisterClass, index: u8) -> Self {
        Self { class, index }
    }

    /// Creates a general purpose register of the given width.
    pub fn gpr(index: u8, width: u16, rex: bool) -> Self {
        Self::new(RegisterClass::gpr(width, rex), index)
    }

    /// Creates an xmm register, or a ymm register when `wide` is set.
    pub fn vector(index: u8, wide: bool) -> Self {
        let class = if wide { RegisterClass::Ymm } else { RegisterClass::Xmm };
        Self::new(class, index)
    }

    /// Creates a segment register.
    pub fn segment(index: u8) -> Self {
        Self::new(RegisterClass::Segment, index)
    }

    /// Returns the width of this register in bits.
    pub fn width(&self) -> u16 {
        self.class.width()
    }

    /// Returns the canonical (lowercase, unprefixed) name for this register.
    pub fn name(&self) -> &'static str {
        let i = (self.index & 0x0F) as usize;
        match self.class {
            RegisterClass::Gpr8 => GPR8_LEGACY[i],
            RegisterClass::Gpr8Rex => GPR8[i],
            RegisterClass::Gpr16 => GPR16[i],
            RegisterClass::Gpr32 => GPR32[i],
            RegisterClass::Gpr64 => GPR64[i],
            RegisterClass::Xmm => XMM[i],
            RegisterClass::Ymm => YMM[i],
            RegisterClass::Segment => SEGMENT.get(i).copied().unwrap_or("?"),
            RegisterClass::Rip => "rip",
            RegisterClass::Eip => "eip",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.name())
    }
}

// Indices 8-15 never reach the legacy table (any REX selects Gpr8Rex), the
// entries are filled for completeness of the lookup.
const GPR8_LEGACY: [&str; 16] = [
    "al", "cl", "dl", "bl", "ah", "ch", "dh", "bh", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];

const GPR8: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];

const GPR16: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w",
    "r13w", "r14w", "r15w",
];

const GPR32: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
    "r12d", "r13d", "r14d", "r15d",
];

const GPR64: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

const XMM: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

const YMM: [&str; 16] = [
    "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "ymm8", "ymm9", "ymm10",
    "ymm11", "ymm12", "ymm13", "ymm14", "ymm15",
];

const SEGMENT: [&str; 6] = ["es", "cs", "ss", "ds", "fs", "gs"];

/// The instruction pointer as a memory base, `%rip` or `%eip` under an
/// address-size override.
pub fn instruction_pointer(address_32: bool) -> Register {
    let class = if address_32 { RegisterClass::Eip } else { RegisterClass::Rip };
    Register::new(class, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_register_views() {
        assert_eq!(Register::gpr(4, 8, false).name(), "ah");
        assert_eq!(Register::gpr(4, 8, true).name(), "spl");
        assert_eq!(Register::gpr(7, 8, true).name(), "dil");
        assert_eq!(Register::gpr(12, 8, true).name(), "r12b");
    }

    #[test]
    fn test_gpr_widths() {
        assert_eq!(Register::gpr(0, 16, false).name(), "ax");
        assert_eq!(Register::gpr(0, 32, false).name(), "eax");
        assert_eq!(Register::gpr(0, 64, false).name(), "rax");
        assert_eq!(Register::gpr(9, 32, true).name(), "r9d");
        assert_eq!(Register::gpr(15, 16, true).name(), "r15w");
    }

    #[test]
    fn test_vector_and_special() {
        assert_eq!(Register::vector(3, false).to_string(), "%xmm3");
        assert_eq!(Register::vector(15, true).to_string(), "%ymm15");
        assert_eq!(Register::segment(seg::FS).to_string(), "%fs");
        assert_eq!(instruction_pointer(false).to_string(), "%rip");
        assert_eq!(instruction_pointer(true).to_string(), "%eip");
    }

    #[test]
    fn test_class_widths() {
        assert_eq!(RegisterClass::gpr(8, false).width(), 8);
        assert_eq!(RegisterClass::Ymm.width(), 256);
        assert_eq!(instruction_pointer(true).width(), 32);
        assert_eq!(instruction_pointer(false), Register::new(RegisterClass::Rip, 0));
    }
}
