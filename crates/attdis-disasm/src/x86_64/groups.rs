//! Opcode groups: one opcode byte, operation selected by ModR/M reg.

use super::decoder::{sized, Decoder};
use super::immediate::iz_size;
use super::opcodes::{ALU_OPS, GROUP2_OPS, GROUP3_OPS};
use super::prefix::OperandDefault;
use super::registers::RegisterSelector;
use crate::error::DecodeError;
use attdis_core::register::gpr;
use attdis_core::{ControlFlow, Instruction, Operand, Register};

impl Decoder<'_> {
    /// Byte or full-width operand size, from the low opcode bit.
    fn group_width(&self, opcode: u8) -> u16 {
        if opcode & 1 == 0 {
            8
        } else {
            self.width(OperandDefault::Bits32)
        }
    }

    /// Group 1 (0x80, 0x81, 0x83): ALU operation with immediate.
    pub(super) fn group1(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let width = self.group_width(opcode);
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;

        // 0x83 sign-extends an 8-bit immediate to the operand size
        let imm_size = if opcode == 0x81 { iz_size(width) } else { 1 };
        let imm = self.imm(imm_size, width)?;

        let mnemonic = sized(ALU_OPS[modrm.digit() as usize], width, &rm);
        Ok(self.finish(mnemonic, vec![rm, imm]))
    }

    /// Group 2 (0xC0, 0xC1, 0xD0-0xD3): shifts and rotates.
    pub(super) fn group2(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let width = self.group_width(opcode);
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;

        let count = match opcode {
            0xC0 | 0xC1 => Some(self.imm(1, 8)?),
            0xD2 | 0xD3 => Some(Operand::reg(Register::gpr(gpr::RCX, 8, false))),
            // Shift by one has no count operand
            _ => None,
        };

        let mnemonic = sized(GROUP2_OPS[modrm.digit() as usize], width, &rm);
        let mut operands = vec![rm];
        operands.extend(count);
        Ok(self.finish(mnemonic, operands))
    }

    /// Group 3 (0xF6, 0xF7): test with immediate and unary arithmetic.
    pub(super) fn group3(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let width = self.group_width(opcode);
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;
        let mnemonic = sized(GROUP3_OPS[modrm.digit() as usize], width, &rm);

        let operands = if modrm.digit() < 2 {
            let imm_size = if width == 8 { 1 } else { iz_size(width) };
            vec![rm, self.imm(imm_size, width)?]
        } else {
            vec![rm]
        };
        Ok(self.finish(mnemonic, operands))
    }

    /// Group 4 (0xFE): byte inc/dec.
    pub(super) fn group4(&mut self) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let rm = self.rm(modrm, RegisterSelector::Gpr(8))?;
        let op = match modrm.digit() {
            0 => "inc",
            1 => "dec",
            _ => return Err(self.invalid("undefined group 4 operation")),
        };
        Ok(self.finish(sized(op, 8, &rm), vec![rm]))
    }

    /// Group 5 (0xFF): inc/dec, indirect branches and push.
    pub(super) fn group5(&mut self) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let digit = modrm.digit();

        let width = match digit {
            0 | 1 => self.width(OperandDefault::Bits32),
            _ => self.width(OperandDefault::Bits64),
        };
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;
        let return_addr = self.end_address();

        let insn = match digit {
            0 => self.finish(sized("inc", width, &rm), vec![rm]),
            1 => self.finish(sized("dec", width, &rm), vec![rm]),
            2 => self
                .finish("call", vec![rm])
                .with_control_flow(ControlFlow::IndirectCall { return_addr }),
            4 => self
                .finish("jmp", vec![rm])
                .with_control_flow(ControlFlow::IndirectBranch),
            3 | 5 => {
                if !rm.is_memory() {
                    return Err(self.invalid("far branch requires a memory operand"));
                }
                if digit == 3 {
                    self.finish("lcall", vec![rm])
                        .with_control_flow(ControlFlow::IndirectCall { return_addr })
                } else {
                    self.finish("ljmp", vec![rm])
                        .with_control_flow(ControlFlow::IndirectBranch)
                }
            }
            6 => self.finish(sized("push", width, &rm), vec![rm]),
            _ => return Err(self.invalid("undefined group 5 operation")),
        };
        Ok(insn)
    }

    /// 0x8F /0: pop to register or memory.
    pub(super) fn pop_rm(&mut self) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let width = self.width(OperandDefault::Bits64);
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;
        if modrm.digit() != 0 {
            return Err(self.invalid("undefined group 1a operation"));
        }
        Ok(self.finish(sized("pop", width, &rm), vec![rm]))
    }

    /// Group 11 (0xC6, 0xC7): move immediate to register or memory.
    pub(super) fn mov_rm_imm(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let width = self.group_width(opcode);
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;
        let imm_size = if width == 8 { 1 } else { iz_size(width) };

        match modrm.digit() {
            0 => {
                let imm = self.imm(imm_size, width)?;
                Ok(self.finish(sized("mov", width, &rm), vec![rm, imm]))
            }
            // xabort ib / xbegin rel
            7 if modrm.is_register() && modrm.rm & 0x7 == 0 => {
                self.cursor.skip(if opcode == 0xC6 { 1 } else { imm_size })?;
                Err(self.unsupported("transactional memory instructions are not decoded"))
            }
            _ => Err(self.invalid("undefined group 11 operation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{DecodeError, Disassembler, X86_64Disassembler};

    fn att(bytes: &[u8]) -> String {
        X86_64Disassembler::new()
            .decode_instruction(bytes, 0)
            .unwrap()
            .instruction
            .to_string()
    }

    fn err(bytes: &[u8]) -> DecodeError {
        X86_64Disassembler::new()
            .decode_instruction(bytes, 0)
            .unwrap_err()
    }

    #[test]
    fn test_group1() {
        // 48 83 ec 08: sub $0x8,%rsp
        assert_eq!(att(&[0x48, 0x83, 0xec, 0x08]), "sub $0x8,%rsp");
        assert_eq!(att(&[0x48, 0x83, 0xe4, 0xf0]), "and $0xfffffffffffffff0,%rsp");
        assert_eq!(att(&[0x83, 0x7d, 0xfc, 0x00]), "cmpl $0x0,-0x4(%rbp)");
        assert_eq!(att(&[0x80, 0x38, 0x2f]), "cmpb $0x2f,(%rax)");
        assert_eq!(
            att(&[0x81, 0xc1, 0x00, 0x01, 0x00, 0x00]),
            "add $0x100,%ecx"
        );
        assert_eq!(att(&[0x66, 0x81, 0x38, 0x34, 0x12]), "cmpw $0x1234,(%rax)");
    }

    #[test]
    fn test_group2() {
        assert_eq!(att(&[0xd1, 0xe0]), "shl %eax");
        assert_eq!(att(&[0x48, 0xc1, 0xe8, 0x3f]), "shr $0x3f,%rax");
        assert_eq!(att(&[0xd3, 0xf8]), "sar %cl,%eax");
        assert_eq!(att(&[0xd0, 0x20]), "shlb (%rax)");
        assert_eq!(att(&[0x48, 0xd3, 0x20]), "shlq %cl,(%rax)");
        assert_eq!(att(&[0xd1, 0xf0]), "shl %eax");
    }

    #[test]
    fn test_group3() {
        assert_eq!(att(&[0xf7, 0xd8]), "neg %eax");
        assert_eq!(att(&[0x48, 0xf7, 0xf1]), "div %rcx");
        assert_eq!(att(&[0xf6, 0xc2, 0x01]), "test $0x1,%dl");
        assert_eq!(
            att(&[0xf7, 0x07, 0x00, 0x00, 0x00, 0x80]),
            "testl $0x80000000,(%rdi)"
        );
        assert_eq!(att(&[0x48, 0xf7, 0x2e]), "imulq (%rsi)");
    }

    #[test]
    fn test_group4() {
        assert_eq!(att(&[0xfe, 0xc0]), "inc %al");
        assert_eq!(att(&[0xfe, 0x08]), "decb (%rax)");
        assert!(matches!(err(&[0xfe, 0xd0]), DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_group5() {
        assert_eq!(att(&[0xff, 0xd0]), "call *%rax");
        assert_eq!(att(&[0xff, 0x25, 0x02, 0x00, 0x00, 0x00]), "jmp *0x2(%rip)");
        assert_eq!(att(&[0x41, 0xff, 0xe3]), "jmp *%r11");
        assert_eq!(att(&[0xff, 0x18]), "lcall *(%rax)");
        assert_eq!(att(&[0xff, 0x75, 0xf8]), "pushq -0x8(%rbp)");
        assert_eq!(att(&[0xff, 0xc0]), "inc %eax");
        assert_eq!(att(&[0x48, 0xff, 0x08]), "decq (%rax)");
        assert!(matches!(err(&[0xff, 0xd8]), DecodeError::InvalidEncoding { .. }));
        assert!(matches!(err(&[0xff, 0xf8]), DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_indirect_call_control_flow() {
        let decoded = X86_64Disassembler::new()
            .decode_instruction(&[0xff, 0x10], 0x2000)
            .unwrap();
        assert!(decoded.instruction.is_call());
        assert!(decoded.instruction.is_indirect());
    }

    #[test]
    fn test_pop_rm() {
        assert_eq!(att(&[0x8f, 0x00]), "popq (%rax)");
        assert_eq!(att(&[0x8f, 0xc0]), "pop %rax");
        assert!(matches!(err(&[0x8f, 0xc8]), DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_mov_rm_imm() {
        assert_eq!(
            att(&[0xc7, 0x45, 0xfc, 0x00, 0x00, 0x00, 0x00]),
            "movl $0x0,-0x4(%rbp)"
        );
        assert_eq!(att(&[0xc6, 0x00, 0x41]), "movb $0x41,(%rax)");
        assert_eq!(
            att(&[0x48, 0xc7, 0xc0, 0xff, 0xff, 0xff, 0xff]),
            "mov $0xffffffffffffffff,%rax"
        );
        assert_eq!(err(&[0xc7, 0xf8, 0x00, 0x00, 0x00, 0x00]).skip_len(), Some(6));
        assert!(matches!(err(&[0xc6, 0x08, 0x00]), DecodeError::InvalidEncoding { .. }));
    }
}
