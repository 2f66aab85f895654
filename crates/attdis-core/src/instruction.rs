//! Decoded instruction representation and its AT&T text form.

use crate::Operand;

/// A decoded x86-64 instruction.
///
/// Decoding never emits text directly; the text line is produced from this
/// value by its `Display` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Instruction {
    /// Virtual address of this instruction.
    pub address: u64,
    /// Size in bytes.
    pub size: usize,
    /// Raw bytes of the instruction.
    pub bytes: Vec<u8>,
    /// Mnemonic including any width suffix (e.g. "movl", "vpacksswb").
    pub mnemonic: String,
    /// Repeat or lock marker printed before the mnemonic.
    pub prefix: Option<&'static str>,
    /// Operands (destination first, then sources).
    pub operands: Vec<Operand>,
    /// Control flow information.
    pub control_flow: ControlFlow,
    /// Bytes that could not be decoded, rendered as a `.byte` directive.
    pub undecoded: bool,
}

impl Instruction {
    /// Creates a new instruction with minimal fields.
    pub fn new(address: u64, bytes: Vec<u8>, mnemonic: impl Into<String>) -> Self {
        Self {
            address,
            size: bytes.len(),
            bytes,
            mnemonic: mnemonic.into(),
            prefix: None,
            operands: Vec::new(),
            control_flow: ControlFlow::Sequential,
            undecoded: false,
        }
    }

    /// Creates a placeholder covering bytes that were skipped undecoded.
    pub fn undecoded(address: u64, bytes: Vec<u8>) -> Self {
        let mut insn = Self::new(address, bytes, ".byte");
        insn.undecoded = true;
        insn
    }

    /// Sets the repeat/lock marker.
    pub fn with_prefix(mut self, prefix: Option<&'static str>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Sets operands.
    pub fn with_operands(mut self, ops: Vec<Operand>) -> Self {
        self.operands = ops;
        self
    }

    /// Sets the control flow.
    pub fn with_control_flow(mut self, cf: ControlFlow) -> Self {
        self.control_flow = cf;
        self
    }

    /// Returns the end address (address + size).
    pub fn end_address(&self) -> u64 {
        self.address.wrapping_add(self.size as u64)
    }

    /// Returns true if this instruction is a call.
    pub fn is_call(&self) -> bool {
        matches!(
            self.control_flow,
            ControlFlow::Call { .. } | ControlFlow::IndirectCall { .. }
        )
    }

    /// Returns true if this instruction is a return.
    pub fn is_return(&self) -> bool {
        matches!(self.control_flow, ControlFlow::Return)
    }

    /// Returns true if the branch target is taken from a register or memory.
    pub fn is_indirect(&self) -> bool {
        matches!(
            self.control_flow,
            ControlFlow::IndirectBranch | ControlFlow::IndirectCall { .. }
        )
    }
}

/// Branch condition, the `cc` nibble of Jcc/SETcc/CMOVcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Condition {
    // Unsigned comparisons
    Equal,
    NotEqual,
    Above,        // CF=0 and ZF=0
    AboveOrEqual, // CF=0
    Below,        // CF=1
    BelowOrEqual, // CF=1 or ZF=1

    // Signed comparisons
    Greater,        // ZF=0 and SF=OF
    GreaterOrEqual, // SF=OF
    Less,           // SF!=OF
    LessOrEqual,    // ZF=1 or SF!=OF

    // Flag-based
    Sign,
    NotSign,
    Overflow,
    NotOverflow,
    Parity,
    NotParity,

    // Counter-based (loop/jrcxz)
    CounterZero,
    CounterNotZero,
}

impl Condition {
    /// Decodes the low nibble of a conditional opcode.
    pub fn from_cc(cc: u8) -> Self {
        match cc & 0x0F {
            0x0 => Self::Overflow,
            0x1 => Self::NotOverflow,
            0x2 => Self::Below,
            0x3 => Self::AboveOrEqual,
            0x4 => Self::Equal,
            0x5 => Self::NotEqual,
            0x6 => Self::BelowOrEqual,
            0x7 => Self::Above,
            0x8 => Self::Sign,
            0x9 => Self::NotSign,
            0xA => Self::Parity,
            0xB => Self::NotParity,
            0xC => Self::Less,
            0xD => Self::GreaterOrEqual,
            0xE => Self::LessOrEqual,
            _ => Self::Greater,
        }
    }

    /// Returns the x86 mnemonic suffix for this condition.
    pub fn x86_suffix(&self) -> &'static str {
        match self {
            Self::Equal => "e",
            Self::NotEqual => "ne",
            Self::Above => "a",
            Self::AboveOrEqual => "ae",
            Self::Below => "b",
            Self::BelowOrEqual => "be",
            Self::Greater => "g",
            Self::GreaterOrEqual => "ge",
            Self::Less => "l",
            Self::LessOrEqual => "le",
            Self::Sign => "s",
            Self::NotSign => "ns",
            Self::Overflow => "o",
            Self::NotOverflow => "no",
            Self::Parity => "p",
            Self::NotParity => "np",
            Self::CounterZero => "rcxz",
            Self::CounterNotZero => "rcxnz",
        }
    }
}

/// Control flow classification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ControlFlow {
    /// Sequential - falls through to next instruction.
    Sequential,

    /// Unconditional branch to a known address.
    UnconditionalBranch { target: u64 },

    /// Conditional branch - may fall through or jump.
    ConditionalBranch {
        target: u64,
        condition: Condition,
        fallthrough: u64,
    },

    /// Indirect jump (target in register or memory).
    IndirectBranch,

    /// Function call to known address.
    Call { target: u64, return_addr: u64 },

    /// Indirect call.
    IndirectCall { return_addr: u64 },

    /// Return from function.
    Return,

    /// System call.
    Syscall,

    /// Halts execution (trap, undefined, etc.).
    Halt,
}

impl std::fmt::Display for Instruction {
    /// Writes the AT&T text: sources first, destination last.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.undecoded {
            write!(f, ".byte ")?;
            for (i, byte) in self.bytes.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{:#04x}", byte)?;
            }
            return Ok(());
        }

        if let Some(prefix) = self.prefix {
            write!(f, "{} ", prefix)?;
        }
        write!(f, "{}", self.mnemonic)?;

        if !self.operands.is_empty() {
            write!(f, " ")?;
            if self.is_indirect() {
                write!(f, "*")?;
            }
            for (i, op) in self.operands.iter().rev().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", op)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryRef, Register};

    #[test]
    fn test_operands_render_reversed() {
        let insn = Instruction::new(0x1000, vec![0x69, 0xc0, 0x05, 0, 0, 0], "imul").with_operands(vec![
            Operand::reg(Register::gpr(0, 32, false)),
            Operand::reg(Register::gpr(0, 32, false)),
            Operand::imm(5, 32),
        ]);
        assert_eq!(insn.to_string(), "imul $0x5,%eax,%eax");
        assert_eq!(insn.end_address(), 0x1006);
    }

    #[test]
    fn test_prefix_and_no_operands() {
        let insn = Instruction::new(0, vec![0xf3, 0xa4], "movsb").with_prefix(Some("rep"));
        assert_eq!(insn.to_string(), "rep movsb");
    }

    #[test]
    fn test_indirect_marker() {
        let target = MemoryRef::base(Register::gpr(0, 64, false), 64);
        let insn = Instruction::new(0, vec![0xff, 0x10], "call")
            .with_operands(vec![Operand::Memory(target)])
            .with_control_flow(ControlFlow::IndirectCall { return_addr: 2 });
        assert_eq!(insn.to_string(), "call *(%rax)");
        assert!(insn.is_call());
    }

    #[test]
    fn test_undecoded_placeholder() {
        let insn = Instruction::undecoded(0, vec![0xd9, 0xc0]);
        assert_eq!(insn.to_string(), ".byte 0xd9,0xc0");
        assert_eq!(insn.size, 2);
    }

    #[test]
    fn test_condition_nibbles() {
        assert_eq!(Condition::from_cc(0x74).x86_suffix(), "e");
        assert_eq!(Condition::from_cc(0x8f).x86_suffix(), "g");
        assert_eq!(Condition::from_cc(0x42).x86_suffix(), "b");
    }
}
