//! x86_64 opcode definitions and lookup.

use super::prefix::SimdPrefix;

/// Operand encoding of a regular one-byte opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandEncoding {
    /// No operands
    None,
    /// ModR/M: r/m, reg
    RmReg,
    /// ModR/M: reg, r/m
    RegRm,
    /// AL/AX/EAX/RAX, immediate
    AccImm,
    /// Register in opcode (low three bits of the opcode byte)
    OpReg,
    /// Immediate only
    Imm8,
    Imm16,
    /// 16 or 32-bit immediate by operand size
    ImmZ,
}

/// Opcode table entry.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    /// Mnemonic
    pub mnemonic: &'static str,
    /// Operand encoding
    pub encoding: OperandEncoding,
    /// Byte-sized operation (ignores operand size prefixes)
    pub byte_op: bool,
    /// Is this a 64-bit default operation?
    pub default_64: bool,
}

impl OpcodeEntry {
    pub const fn new(mnemonic: &'static str, encoding: OperandEncoding) -> Self {
        Self {
            mnemonic,
            encoding,
            byte_op: false,
            default_64: false,
        }
    }

    pub const fn byte(mut self) -> Self {
        self.byte_op = true;
        self
    }

    pub const fn with_default_64(mut self) -> Self {
        self.default_64 = true;
        self
    }
}

/// Mnemonics of the eight classic ALU operations, in opcode order.
///
/// Opcodes `00..3D` and the `/digit` of group 1 both index this list.
pub const ALU_OPS: [&str; 8] = ["add", "or", "adc", "sbb", "and", "sub", "xor", "cmp"];

/// Const None for array initialization (stable Rust compatibility)
const NONE_ENTRY: Option<OpcodeEntry> = None;

/// One-byte opcodes whose decoding is fully described by their encoding.
///
/// Everything irregular (groups, branches, string operations, moves with
/// special forms) is dispatched directly by the decoder.
pub static OPCODE_TABLE: [Option<OpcodeEntry>; 256] = {
    use OperandEncoding::*;

    let mut table: [Option<OpcodeEntry>; 256] = [NONE_ENTRY; 256];

    // ALU rows: Eb,Gb / Ev,Gv / Gb,Eb / Gv,Ev / AL,Ib / eAX,Iz
    let mut row = 0;
    while row < 8 {
        let base = row * 8;
        let name = ALU_OPS[row];
        table[base] = Some(OpcodeEntry::new(name, RmReg).byte());
        table[base + 1] = Some(OpcodeEntry::new(name, RmReg));
        table[base + 2] = Some(OpcodeEntry::new(name, RegRm).byte());
        table[base + 3] = Some(OpcodeEntry::new(name, RegRm));
        table[base + 4] = Some(OpcodeEntry::new(name, AccImm).byte());
        table[base + 5] = Some(OpcodeEntry::new(name, AccImm));
        row += 1;
    }

    // PUSH/POP r64
    let mut reg = 0;
    while reg < 8 {
        table[0x50 + reg] = Some(OpcodeEntry::new("push", OpReg).with_default_64());
        table[0x58 + reg] = Some(OpcodeEntry::new("pop", OpReg).with_default_64());
        reg += 1;
    }

    // PUSH imm
    table[0x68] = Some(OpcodeEntry::new("push", ImmZ).with_default_64());
    table[0x6A] = Some(OpcodeEntry::new("push", Imm8).with_default_64());

    // TEST, XCHG, MOV
    table[0x84] = Some(OpcodeEntry::new("test", RmReg).byte());
    table[0x85] = Some(OpcodeEntry::new("test", RmReg));
    table[0x86] = Some(OpcodeEntry::new("xchg", RmReg).byte());
    table[0x87] = Some(OpcodeEntry::new("xchg", RmReg));
    table[0x88] = Some(OpcodeEntry::new("mov", RmReg).byte());
    table[0x89] = Some(OpcodeEntry::new("mov", RmReg));
    table[0x8A] = Some(OpcodeEntry::new("mov", RegRm).byte());
    table[0x8B] = Some(OpcodeEntry::new("mov", RegRm));

    table[0x9B] = Some(OpcodeEntry::new("fwait", None));
    table[0x9E] = Some(OpcodeEntry::new("sahf", None));
    table[0x9F] = Some(OpcodeEntry::new("lahf", None));

    table[0xA8] = Some(OpcodeEntry::new("test", AccImm).byte());
    table[0xA9] = Some(OpcodeEntry::new("test", AccImm));

    table[0xC2] = Some(OpcodeEntry::new("ret", Imm16));
    table[0xC9] = Some(OpcodeEntry::new("leave", None));
    table[0xCA] = Some(OpcodeEntry::new("lret", Imm16));
    table[0xCB] = Some(OpcodeEntry::new("lret", None));
    table[0xCC] = Some(OpcodeEntry::new("int3", None));
    table[0xCD] = Some(OpcodeEntry::new("int", Imm8).byte());

    table[0xF1] = Some(OpcodeEntry::new("int1", None));
    table[0xF4] = Some(OpcodeEntry::new("hlt", None));
    table[0xF5] = Some(OpcodeEntry::new("cmc", None));
    table[0xF8] = Some(OpcodeEntry::new("clc", None));
    table[0xF9] = Some(OpcodeEntry::new("stc", None));
    table[0xFA] = Some(OpcodeEntry::new("cli", None));
    table[0xFB] = Some(OpcodeEntry::new("sti", None));
    table[0xFC] = Some(OpcodeEntry::new("cld", None));
    table[0xFD] = Some(OpcodeEntry::new("std", None));

    table
};

/// Group 2 operations (shift/rotate), indexed by ModR/M reg field.
pub static GROUP2_OPS: [&str; 8] = ["rol", "ror", "rcl", "rcr", "shl", "shr", "shl", "sar"];

/// Group 3 operations (F6/F7), indexed by ModR/M reg field.
pub static GROUP3_OPS: [&str; 8] = ["test", "test", "not", "neg", "mul", "imul", "div", "idiv"];

/// One-byte opcodes that are not valid in 64-bit mode.
pub fn invalid_in_64bit(opcode: u8) -> Option<&'static str> {
    match opcode {
        0x06 | 0x07 | 0x0E | 0x16 | 0x17 | 0x1E | 0x1F => Some("segment push/pop is invalid in 64-bit mode"),
        0x27 | 0x2F | 0x37 | 0x3F => Some("BCD adjust is invalid in 64-bit mode"),
        0x60 | 0x61 => Some("pusha/popa is invalid in 64-bit mode"),
        0x82 => Some("opcode 0x82 is invalid in 64-bit mode"),
        0x9A | 0xEA => Some("far absolute branch is invalid in 64-bit mode"),
        0xCE => Some("into is invalid in 64-bit mode"),
        0xD4 | 0xD5 => Some("aam/aad is invalid in 64-bit mode"),
        0xD6 => Some("salc is invalid in 64-bit mode"),
        _ => None,
    }
}

/// Returns true if a `0F xx` opcode is followed by a ModR/M byte.
pub fn two_byte_has_modrm(opcode: u8) -> bool {
    !matches!(
        opcode,
        0x05..=0x09 | 0x0B | 0x0E | 0x30..=0x37 | 0x77 | 0x80..=0x8F | 0xA0..=0xA2 | 0xA8..=0xAA | 0xC8..=0xCF
    )
}

/// Returns true if a `0F xx` opcode carries an 8-bit immediate after its ModR/M operand.
pub fn two_byte_has_imm8(opcode: u8) -> bool {
    matches!(
        opcode,
        0x0F | 0x70..=0x73 | 0xA4 | 0xAC | 0xBA | 0xC2 | 0xC4..=0xC6
    )
}

/// Operand shape of an SSE/AVX opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdEncoding {
    /// xmm, xmm/m; VEX adds vvvv as the first source
    ThreeOp,
    /// xmm, xmm/m
    Load,
    /// xmm/m, xmm
    Store,
    /// xmm, r/m32 (r/m64 with W, spelled movq)
    GprToVector,
    /// r/m32 (r/m64 with W, spelled movq), xmm
    VectorToGpr,
    /// xmm, xmm/m64
    QwordLoad,
    /// xmm/m64, xmm
    QwordStore,
}

impl SimdEncoding {
    /// Forms that only exist at 128 bits; VEX.L=1 is not a valid encoding.
    pub fn xmm_only(&self) -> bool {
        matches!(
            self,
            Self::GprToVector | Self::VectorToGpr | Self::QwordLoad | Self::QwordStore
        )
    }

    /// Forms whose VEX encoding names a register in VEX.vvvv.
    pub fn uses_vvvv(&self) -> bool {
        matches!(self, Self::ThreeOp)
    }
}

/// One SSE instruction form selected by opcode and mandatory prefix.
#[derive(Debug, Clone, Copy)]
pub struct SimdEntry {
    /// Legacy mnemonic; the VEX form prepends `v`.
    pub mnemonic: &'static str,
    pub encoding: SimdEncoding,
    /// Scalar forms name xmm registers regardless of VEX.L.
    pub scalar: bool,
}

impl SimdEntry {
    const fn new(mnemonic: &'static str, encoding: SimdEncoding) -> Self {
        Self {
            mnemonic,
            encoding,
            scalar: false,
        }
    }

    const fn scalar(mut self) -> Self {
        self.scalar = true;
        self
    }
}

/// The forms of one `0F xx` opcode, per mandatory prefix.
#[derive(Debug, Clone, Copy)]
pub struct SimdOpcode {
    pub none: Option<SimdEntry>,
    pub p66: Option<SimdEntry>,
    pub f3: Option<SimdEntry>,
    pub f2: Option<SimdEntry>,
}

impl SimdOpcode {
    const EMPTY: Self = Self {
        none: None,
        p66: None,
        f3: None,
        f2: None,
    };

    /// Returns the form selected by a mandatory prefix.
    pub fn get(&self, prefix: SimdPrefix) -> Option<SimdEntry> {
        match prefix {
            SimdPrefix::None => self.none,
            SimdPrefix::P66 => self.p66,
            SimdPrefix::F3 => self.f3,
            SimdPrefix::F2 => self.f2,
        }
    }
}

const fn packed(ps: &'static str, pd: &'static str, encoding: SimdEncoding) -> Option<SimdOpcode> {
    Some(SimdOpcode {
        none: Some(SimdEntry::new(ps, encoding)),
        p66: Some(SimdEntry::new(pd, encoding)),
        ..SimdOpcode::EMPTY
    })
}

const fn float_arith(ps: &'static str, pd: &'static str, ss: &'static str, sd: &'static str) -> Option<SimdOpcode> {
    use SimdEncoding::ThreeOp;
    Some(SimdOpcode {
        none: Some(SimdEntry::new(ps, ThreeOp)),
        p66: Some(SimdEntry::new(pd, ThreeOp)),
        f3: Some(SimdEntry::new(ss, ThreeOp).scalar()),
        f2: Some(SimdEntry::new(sd, ThreeOp).scalar()),
    })
}

const fn integer(name: &'static str) -> Option<SimdOpcode> {
    Some(SimdOpcode {
        p66: Some(SimdEntry::new(name, SimdEncoding::ThreeOp)),
        ..SimdOpcode::EMPTY
    })
}

const NONE_SIMD: Option<SimdOpcode> = None;

/// SSE opcodes of the `0F` map, shared by the legacy and VEX map 1 encodings.
///
/// MMX forms (no mandatory prefix on integer opcodes) are not listed.
pub static SIMD_TABLE: [Option<SimdOpcode>; 256] = {
    use SimdEncoding::*;

    let mut table: [Option<SimdOpcode>; 256] = [NONE_SIMD; 256];

    table[0x10] = packed("movups", "movupd", Load);
    table[0x11] = packed("movups", "movupd", Store);
    table[0x28] = packed("movaps", "movapd", Load);
    table[0x29] = packed("movaps", "movapd", Store);

    table[0x54] = packed("andps", "andpd", ThreeOp);
    table[0x55] = packed("andnps", "andnpd", ThreeOp);
    table[0x56] = packed("orps", "orpd", ThreeOp);
    table[0x57] = packed("xorps", "xorpd", ThreeOp);
    table[0x58] = float_arith("addps", "addpd", "addss", "addsd");
    table[0x59] = float_arith("mulps", "mulpd", "mulss", "mulsd");
    table[0x5C] = float_arith("subps", "subpd", "subss", "subsd");
    table[0x5D] = float_arith("minps", "minpd", "minss", "minsd");
    table[0x5E] = float_arith("divps", "divpd", "divss", "divsd");
    table[0x5F] = float_arith("maxps", "maxpd", "maxss", "maxsd");

    table[0x60] = integer("punpcklbw");
    table[0x61] = integer("punpcklwd");
    table[0x62] = integer("punpckldq");
    table[0x63] = integer("packsswb");
    table[0x64] = integer("pcmpgtb");
    table[0x65] = integer("pcmpgtw");
    table[0x66] = integer("pcmpgtd");
    table[0x67] = integer("packuswb");
    table[0x68] = integer("punpckhbw");
    table[0x69] = integer("punpckhwd");
    table[0x6A] = integer("punpckhdq");
    table[0x6B] = integer("packssdw");
    table[0x6C] = integer("punpcklqdq");
    table[0x6D] = integer("punpckhqdq");

    table[0x6E] = Some(SimdOpcode {
        p66: Some(SimdEntry::new("movd", GprToVector)),
        ..SimdOpcode::EMPTY
    });
    table[0x6F] = Some(SimdOpcode {
        p66: Some(SimdEntry::new("movdqa", Load)),
        f3: Some(SimdEntry::new("movdqu", Load)),
        ..SimdOpcode::EMPTY
    });

    table[0x74] = integer("pcmpeqb");
    table[0x75] = integer("pcmpeqw");
    table[0x76] = integer("pcmpeqd");

    table[0x7E] = Some(SimdOpcode {
        p66: Some(SimdEntry::new("movd", VectorToGpr)),
        f3: Some(SimdEntry::new("movq", QwordLoad)),
        ..SimdOpcode::EMPTY
    });
    table[0x7F] = Some(SimdOpcode {
        p66: Some(SimdEntry::new("movdqa", Store)),
        f3: Some(SimdEntry::new("movdqu", Store)),
        ..SimdOpcode::EMPTY
    });

    table[0xD4] = integer("paddq");
    table[0xD5] = integer("pmullw");
    table[0xD6] = Some(SimdOpcode {
        p66: Some(SimdEntry::new("movq", QwordStore)),
        ..SimdOpcode::EMPTY
    });
    table[0xDB] = integer("pand");
    table[0xDF] = integer("pandn");
    table[0xEB] = integer("por");
    table[0xEF] = integer("pxor");
    table[0xF4] = integer("pmuludq");
    table[0xF8] = integer("psubb");
    table[0xF9] = integer("psubw");
    table[0xFA] = integer("psubd");
    table[0xFB] = integer("psubq");
    table[0xFC] = integer("paddb");
    table[0xFD] = integer("paddw");
    table[0xFE] = integer("paddd");

    table
};
