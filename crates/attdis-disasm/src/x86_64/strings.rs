//! String and port I/O instructions with implicit operands.

use super::decoder::{suffix, Decoder};
use super::prefix::OperandDefault;
use crate::error::DecodeError;
use attdis_core::register::{gpr, seg};
use attdis_core::{Instruction, MemoryRef, Operand, Register};

impl Decoder<'_> {
    /// `%ds:(%rsi)`, or the overriding segment.
    fn string_source(&self, width: u16) -> Operand {
        let segment = self
            .prefixes
            .segment()
            .unwrap_or(Register::segment(seg::DS));
        Operand::Memory(MemoryRef::base(self.address_reg(gpr::RSI), width).with_segment(segment))
    }

    /// `%es:(%rdi)`. The destination segment cannot be overridden.
    fn string_destination(&self, width: u16) -> Operand {
        Operand::Memory(
            MemoryRef::base(self.address_reg(gpr::RDI), width)
                .with_segment(Register::segment(seg::ES)),
        )
    }

    /// `(%dx)`, the implicit port operand.
    fn port(&self) -> Operand {
        Operand::Memory(MemoryRef::base(Register::gpr(gpr::RDX, 16, false), 8))
    }

    /// Repeat marker for a string instruction; compare forms spell the
    /// condition out.
    fn repeat_marker(&self, compares: bool) -> Option<&'static str> {
        if self.prefixes.repne() {
            Some("repnz")
        } else if self.prefixes.rep() {
            Some(if compares { "repz" } else { "rep" })
        } else if self.prefixes.lock() {
            Some("lock")
        } else {
            None
        }
    }

    /// Port widths stop at 32 bits.
    fn port_width(&self, opcode: u8) -> u16 {
        if opcode & 1 == 0 {
            8
        } else if self.prefixes.operand_size_override() {
            16
        } else {
            32
        }
    }

    /// 0x6C-0x6F: ins/outs.
    pub(super) fn port_string(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = self.port_width(opcode);
        let (name, operands) = if opcode <= 0x6D {
            ("ins", vec![self.string_destination(width), self.port()])
        } else {
            ("outs", vec![self.port(), self.string_source(width)])
        };

        let mnemonic = format!("{}{}", name, suffix(width));
        Ok(self
            .finish(mnemonic, operands)
            .with_prefix(self.repeat_marker(false)))
    }

    /// 0xA4-0xA7, 0xAA-0xAF: movs, cmps, stos, lods, scas.
    pub(super) fn string_op(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = if opcode & 1 == 0 {
            8
        } else {
            self.width(OperandDefault::Bits32)
        };
        let acc = self.accumulator(width);
        let source = self.string_source(width);
        let destination = self.string_destination(width);

        let (mnemonic, operands, compares) = match opcode {
            0xA4 | 0xA5 => (format!("movs{}", suffix(width)), vec![destination, source], false),
            0xA6 | 0xA7 => (format!("cmps{}", suffix(width)), vec![source, destination], true),
            0xAA | 0xAB => ("stos".to_string(), vec![destination, acc], false),
            0xAC | 0xAD => ("lods".to_string(), vec![acc, source], false),
            _ => ("scas".to_string(), vec![acc, destination], true),
        };

        Ok(self
            .finish(mnemonic, operands)
            .with_prefix(self.repeat_marker(compares)))
    }

    /// 0xE4-0xE7, 0xEC-0xEF: in/out with an immediate or `%dx` port.
    pub(super) fn port_io(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = self.port_width(opcode);
        let port = if opcode < 0xE8 {
            self.imm(1, 8)?
        } else {
            self.port()
        };
        let acc = self.accumulator(width);

        // Bit 1 selects the direction: in reads the port into the accumulator.
        let insn = if opcode & 0x02 == 0 {
            self.finish("in", vec![acc, port])
        } else {
            self.finish("out", vec![port, acc])
        };
        Ok(insn)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Disassembler, X86_64Disassembler};

    fn att(bytes: &[u8]) -> String {
        X86_64Disassembler::new()
            .decode_instruction(bytes, 0)
            .unwrap()
            .instruction
            .to_string()
    }

    #[test]
    fn test_port_strings() {
        assert_eq!(att(&[0x6c]), "insb (%dx),%es:(%rdi)");
        assert_eq!(att(&[0xf3, 0x6c]), "rep insb (%dx),%es:(%rdi)");
        assert_eq!(att(&[0x6d]), "insl (%dx),%es:(%rdi)");
        assert_eq!(att(&[0x66, 0x6d]), "insw (%dx),%es:(%rdi)");
        assert_eq!(att(&[0x48, 0x6d]), "insl (%dx),%es:(%rdi)");
        assert_eq!(att(&[0x6e]), "outsb %ds:(%rsi),(%dx)");
        assert_eq!(att(&[0xf3, 0x66, 0x6f]), "rep outsw %ds:(%rsi),(%dx)");
    }

    #[test]
    fn test_port_string_consumes_only_opcode() {
        let decoded = X86_64Disassembler::new()
            .decode_instruction(&[0x6c, 0x90, 0x90], 0)
            .unwrap();
        assert_eq!(decoded.size, 1);
    }

    #[test]
    fn test_moves_and_compares() {
        assert_eq!(att(&[0xf3, 0xa4]), "rep movsb %ds:(%rsi),%es:(%rdi)");
        assert_eq!(att(&[0xf3, 0x48, 0xa5]), "rep movsq %ds:(%rsi),%es:(%rdi)");
        assert_eq!(att(&[0xf3, 0xa6]), "repz cmpsb %es:(%rdi),%ds:(%rsi)");
        assert_eq!(att(&[0xf2, 0xae]), "repnz scas %es:(%rdi),%al");
    }

    #[test]
    fn test_accumulator_forms() {
        assert_eq!(att(&[0xf3, 0x48, 0xab]), "rep stos %rax,%es:(%rdi)");
        assert_eq!(att(&[0xac]), "lods %ds:(%rsi),%al");
        assert_eq!(att(&[0x66, 0xad]), "lods %ds:(%rsi),%ax");
    }

    #[test]
    fn test_overrides() {
        assert_eq!(att(&[0x64, 0xa4]), "movsb %fs:(%rsi),%es:(%rdi)");
        assert_eq!(att(&[0x67, 0xaa]), "stos %al,%es:(%edi)");
    }
}
