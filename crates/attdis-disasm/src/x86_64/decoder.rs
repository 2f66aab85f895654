//! x86_64 instruction decoder.

use super::immediate::{iz_size, read_imm, read_signed};
use super::modrm::{self, ModRM, ModRmOperands};
use super::opcodes::{invalid_in_64bit, two_byte_has_imm8, OpcodeEntry, OperandEncoding, OPCODE_TABLE};
use super::prefix::{OperandDefault, Prefixes};
use super::registers::{gpr, opcode_reg, RegisterSelector};
use super::{simd, two_byte};
use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::traits::{DecodedInstruction, Disassembler};
use attdis_core::register::{gpr as regs, seg};
use attdis_core::{Condition, ControlFlow, Instruction, MemoryRef, Operand, Register};

/// Longest encoding the processor accepts.
pub const MAX_INSTRUCTION_LEN: usize = 15;

/// x86_64 instruction decoder.
///
/// Stateless: every call works on its own cursor, so one decoder can be
/// shared between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64Disassembler;

impl X86_64Disassembler {
    /// Creates a new x86_64 disassembler.
    pub fn new() -> Self {
        Self
    }
}

impl Disassembler for X86_64Disassembler {
    fn decode_instruction(&self, bytes: &[u8], address: u64) -> Result<DecodedInstruction, DecodeError> {
        let mut cursor = ByteCursor::new(bytes, address);
        let prefixes = Prefixes::parse(&mut cursor)?;

        let mut decoder = Decoder {
            cursor,
            prefixes,
            address,
        };
        let instruction = decoder.decode()?;

        if instruction.size > MAX_INSTRUCTION_LEN {
            return Err(DecodeError::invalid_encoding(
                address,
                &instruction.bytes,
                "instruction longer than 15 bytes",
            ));
        }

        Ok(DecodedInstruction {
            size: instruction.size,
            instruction,
        })
    }

    fn min_instruction_size(&self) -> usize {
        1
    }

    fn max_instruction_size(&self) -> usize {
        MAX_INSTRUCTION_LEN
    }

    fn is_fixed_width(&self) -> bool {
        false
    }
}

/// AT&T width suffix for an operand size in bits.
pub(super) fn suffix(width: u16) -> char {
    match width {
        8 => 'b',
        16 => 'w',
        32 => 'l',
        _ => 'q',
    }
}

/// Appends the width suffix when the r/m operand is memory.
///
/// Only for forms whose other operands are immediates or counts, where no
/// register names the access width.
pub(super) fn sized(mnemonic: &str, width: u16, rm: &Operand) -> String {
    if rm.is_memory() {
        format!("{}{}", mnemonic, suffix(width))
    } else {
        mnemonic.to_string()
    }
}

/// State of one instruction decode: the cursor, the prefix run that
/// preceded the opcode, and the instruction's address.
pub(super) struct Decoder<'a> {
    pub(super) cursor: ByteCursor<'a>,
    pub(super) prefixes: Prefixes,
    pub(super) address: u64,
}

impl<'a> Decoder<'a> {
    fn decode(&mut self) -> Result<Instruction, DecodeError> {
        if self.prefixes.has_vex() {
            let opcode = self.cursor.read_u8()?;
            return match self.prefixes.vex_map() {
                1 => simd::decode_vex(self, opcode),
                2 | 3 => {
                    self.skip_modrm()?;
                    if self.prefixes.vex_map() == 3 {
                        self.cursor.skip(1)?;
                    }
                    Err(self.unsupported("VEX 0F38/0F3A maps are not decoded"))
                }
                _ => Err(self.invalid("reserved VEX opcode map")),
            };
        }

        let opcode = self.cursor.read_u8()?;
        self.one_byte(opcode)
    }

    // ---- shared helpers ----

    /// Effective operand size for an opcode with the given default.
    pub(super) fn width(&self, default: OperandDefault) -> u16 {
        self.prefixes.operand_size(default)
    }

    /// Reads a ModR/M byte without resolving its r/m operand.
    pub(super) fn modrm_byte(&mut self) -> Result<ModRM, DecodeError> {
        Ok(ModRM::parse(self.cursor.read_u8()?, &self.prefixes))
    }

    /// Resolves a full ModR/M operand pair.
    pub(super) fn modrm(&mut self, selector: RegisterSelector) -> Result<ModRmOperands, DecodeError> {
        modrm::resolve(&mut self.cursor, &self.prefixes, selector)
    }

    /// Resolves the r/m operand of a ModR/M byte read with `modrm_byte`.
    pub(super) fn rm(&mut self, modrm: ModRM, selector: RegisterSelector) -> Result<Operand, DecodeError> {
        modrm::decode_rm(&mut self.cursor, modrm, &self.prefixes, selector)
    }

    /// Consumes a ModR/M byte and its SIB/displacement, discarding them.
    pub(super) fn skip_modrm(&mut self) -> Result<ModRM, DecodeError> {
        let modrm = self.modrm_byte()?;
        if !modrm.is_register() {
            modrm::decode_memory(&mut self.cursor, modrm, &self.prefixes, 0)?;
        }
        Ok(modrm)
    }

    /// Reads an immediate of `size` bytes rendered at `width` bits.
    pub(super) fn imm(&mut self, size: usize, width: u16) -> Result<Operand, DecodeError> {
        read_imm(&mut self.cursor, size, width)
    }

    /// Reads a relative branch offset and resolves it against the end of
    /// the instruction.
    pub(super) fn relative(&mut self, size: usize) -> Result<(Operand, u64), DecodeError> {
        let offset = read_signed(&mut self.cursor, size)?;
        let target = self.end_address().wrapping_add(offset as u64);
        Ok((Operand::pc_rel(offset, target), target))
    }

    /// Address just past the bytes consumed so far.
    pub(super) fn end_address(&self) -> u64 {
        self.address.wrapping_add(self.cursor.position() as u64)
    }

    /// The accumulator at the given width.
    pub(super) fn accumulator(&self, width: u16) -> Operand {
        Operand::reg(gpr(regs::RAX, width, &self.prefixes))
    }

    /// A general purpose register used as an implicit memory base, sized by
    /// the address size.
    pub(super) fn address_reg(&self, index: u8) -> Register {
        Register::gpr(index, self.prefixes.address_size(), false)
    }

    pub(super) fn invalid(&self, reason: &'static str) -> DecodeError {
        DecodeError::invalid_encoding(self.address, self.cursor.consumed(), reason)
    }

    pub(super) fn unsupported(&self, reason: &'static str) -> DecodeError {
        DecodeError::unsupported(self.address, self.cursor.consumed(), reason)
    }

    /// Builds the instruction from everything consumed so far.
    pub(super) fn finish(&self, mnemonic: impl Into<String>, operands: Vec<Operand>) -> Instruction {
        let prefix = if self.prefixes.lock() { Some("lock") } else { None };
        Instruction::new(self.address, self.cursor.consumed().to_vec(), mnemonic)
            .with_operands(operands)
            .with_prefix(prefix)
    }

    // ---- one-byte map ----

    fn one_byte(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        if let Some(reason) = invalid_in_64bit(opcode) {
            return Err(self.invalid(reason));
        }
        if let Some(entry) = OPCODE_TABLE[opcode as usize] {
            return self.table_entry(opcode, entry);
        }

        match opcode {
            0x0F => {
                let opcode = self.cursor.read_u8()?;
                two_byte::decode(self, opcode)
            }
            0x62 => self.evex(),
            0x63 => self.movsxd(),
            0x69 | 0x6B => self.imul_imm(opcode),
            0x6C..=0x6F => self.port_string(opcode),
            0x70..=0x7F => self.jcc(opcode, 1),
            0x80 | 0x81 | 0x83 => self.group1(opcode),
            0x8C | 0x8E => self.mov_segment(opcode),
            0x8D => self.lea(),
            0x8F => self.pop_rm(),
            0x90..=0x97 => self.xchg_acc(opcode),
            0x98 => {
                let mnemonic = match self.width(OperandDefault::Bits32) {
                    16 => "cbtw",
                    64 => "cltq",
                    _ => "cwtl",
                };
                Ok(self.finish(mnemonic, vec![]))
            }
            0x99 => {
                let mnemonic = match self.width(OperandDefault::Bits32) {
                    16 => "cwtd",
                    64 => "cqto",
                    _ => "cltd",
                };
                Ok(self.finish(mnemonic, vec![]))
            }
            0x9C | 0x9D => {
                let base = if opcode == 0x9C { "pushf" } else { "popf" };
                let mnemonic = if self.width(OperandDefault::Bits64) == 16 {
                    format!("{}w", base)
                } else {
                    base.to_string()
                };
                Ok(self.finish(mnemonic, vec![]))
            }
            0xA0..=0xA3 => self.mov_moffs(opcode),
            0xA4..=0xA7 | 0xAA..=0xAF => self.string_op(opcode),
            0xB0..=0xBF => self.mov_imm(opcode),
            0xC0 | 0xC1 | 0xD0..=0xD3 => self.group2(opcode),
            0xC3 => {
                let insn = self.finish("ret", vec![]).with_control_flow(ControlFlow::Return);
                Ok(if self.prefixes.rep() {
                    insn.with_prefix(Some("repz"))
                } else {
                    self.with_bnd(insn)
                })
            }
            0xC6 | 0xC7 => self.mov_rm_imm(opcode),
            0xC8 => {
                let frame = self.imm(2, 16)?;
                let level = self.imm(1, 8)?;
                Ok(self.finish("enter", vec![level, frame]))
            }
            0xCF => {
                let mnemonic = match self.width(OperandDefault::Bits32) {
                    16 => "iretw",
                    64 => "iretq",
                    _ => "iret",
                };
                Ok(self.finish(mnemonic, vec![]).with_control_flow(ControlFlow::Return))
            }
            0xD7 => {
                let segment = self.prefixes.segment().unwrap_or(Register::segment(seg::DS));
                let table = MemoryRef::base(self.address_reg(regs::RBX), 8).with_segment(segment);
                Ok(self.finish("xlat", vec![Operand::Memory(table)]))
            }
            0xD8..=0xDF => {
                self.skip_modrm()?;
                Err(self.unsupported("x87 escape opcodes are not decoded"))
            }
            0xE0..=0xE3 => self.loop_branch(opcode),
            0xE4..=0xE7 | 0xEC..=0xEF => self.port_io(opcode),
            0xE8 => {
                let (target_op, target) = self.relative(4)?;
                let return_addr = self.end_address();
                let insn = self
                    .finish("call", vec![target_op])
                    .with_control_flow(ControlFlow::Call { target, return_addr });
                Ok(self.with_bnd(insn))
            }
            0xE9 | 0xEB => {
                let size = if opcode == 0xE9 { 4 } else { 1 };
                let (target_op, target) = self.relative(size)?;
                let insn = self
                    .finish("jmp", vec![target_op])
                    .with_control_flow(ControlFlow::UnconditionalBranch { target });
                Ok(self.with_bnd(insn))
            }
            0xF6 | 0xF7 => self.group3(opcode),
            0xFE => self.group4(),
            0xFF => self.group5(),
            _ => Err(self.invalid("undefined opcode")),
        }
    }

    fn table_entry(&mut self, opcode: u8, entry: OpcodeEntry) -> Result<Instruction, DecodeError> {
        let width = if entry.byte_op {
            8
        } else if entry.default_64 {
            self.width(OperandDefault::Bits64)
        } else {
            self.width(OperandDefault::Bits32)
        };

        let operands = match entry.encoding {
            OperandEncoding::None => vec![],
            OperandEncoding::RmReg => {
                let ops = self.modrm(RegisterSelector::Gpr(width))?;
                vec![ops.rm, ops.reg]
            }
            OperandEncoding::RegRm => {
                let ops = self.modrm(RegisterSelector::Gpr(width))?;
                vec![ops.reg, ops.rm]
            }
            OperandEncoding::AccImm => {
                let size = if width == 8 { 1 } else { iz_size(width) };
                vec![self.accumulator(width), self.imm(size, width)?]
            }
            OperandEncoding::OpReg => vec![Operand::reg(opcode_reg(opcode, width, &self.prefixes))],
            OperandEncoding::Imm8 => vec![self.imm(1, width)?],
            OperandEncoding::Imm16 => vec![self.imm(2, 16)?],
            OperandEncoding::ImmZ => vec![self.imm(iz_size(width), width)?],
        };

        let control_flow = match opcode {
            0xC2 | 0xCA | 0xCB => ControlFlow::Return,
            0xCC | 0xF4 => ControlFlow::Halt,
            _ => ControlFlow::Sequential,
        };

        // push $imm under 66 has no register to fix its width
        let mnemonic = match entry.encoding {
            OperandEncoding::Imm8 | OperandEncoding::ImmZ if entry.default_64 && width == 16 => {
                format!("{}w", entry.mnemonic)
            }
            _ => entry.mnemonic.to_string(),
        };

        let insn = self.finish(mnemonic, operands).with_control_flow(control_flow);
        Ok(if opcode == 0xC2 { self.with_bnd(insn) } else { insn })
    }

    /// Marks a near branch or return carrying an `F2` prefix as `bnd`.
    pub(super) fn with_bnd(&self, insn: Instruction) -> Instruction {
        if self.prefixes.repne() {
            insn.with_prefix(Some("bnd"))
        } else {
            insn
        }
    }

    /// Jcc with an 8 or 32-bit displacement.
    pub(super) fn jcc(&mut self, opcode: u8, size: usize) -> Result<Instruction, DecodeError> {
        let (target_op, target) = self.relative(size)?;
        let condition = Condition::from_cc(opcode);
        let fallthrough = self.end_address();
        let insn = self
            .finish(format!("j{}", condition.x86_suffix()), vec![target_op])
            .with_control_flow(ControlFlow::ConditionalBranch {
                target,
                condition,
                fallthrough,
            });
        Ok(self.with_bnd(insn))
    }

    fn loop_branch(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let (mnemonic, condition) = match opcode {
            0xE0 => ("loopne", Condition::CounterNotZero),
            0xE1 => ("loope", Condition::CounterNotZero),
            0xE2 => ("loop", Condition::CounterNotZero),
            _ if self.prefixes.address_size_override() => ("jecxz", Condition::CounterZero),
            _ => ("jrcxz", Condition::CounterZero),
        };
        let (target_op, target) = self.relative(1)?;
        let fallthrough = self.end_address();
        Ok(self
            .finish(mnemonic, vec![target_op])
            .with_control_flow(ControlFlow::ConditionalBranch {
                target,
                condition,
                fallthrough,
            }))
    }

    /// 63 /r: sign-extending move from a 32-bit source.
    fn movsxd(&mut self) -> Result<Instruction, DecodeError> {
        let width = self.width(OperandDefault::Bits32);
        let modrm = self.modrm_byte()?;
        let rm = self.rm(modrm, RegisterSelector::Gpr(32))?;
        let reg = Operand::reg(gpr(modrm.reg, width, &self.prefixes));
        let mnemonic = if width == 64 { "movslq" } else { "movsxd" };
        Ok(self.finish(mnemonic, vec![reg, rm]))
    }

    /// 69 /r iz, 6B /r ib: three-operand signed multiply.
    fn imul_imm(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = self.width(OperandDefault::Bits32);
        let ops = self.modrm(RegisterSelector::Gpr(width))?;
        let size = if opcode == 0x69 { iz_size(width) } else { 1 };
        let imm = self.imm(size, width)?;
        Ok(self.finish("imul", vec![ops.reg, ops.rm, imm]))
    }

    /// 8C/8E: moves to and from segment registers.
    fn mov_segment(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let modrm = self.modrm_byte()?;
        let sreg = modrm.digit();
        if sreg > seg::GS || (opcode == 0x8E && sreg == seg::CS) {
            self.rm(modrm, RegisterSelector::Gpr(16))?;
            return Err(self.invalid("undefined segment register"));
        }

        let width = if modrm.is_register() {
            self.width(OperandDefault::Bits32)
        } else {
            16
        };
        let rm = self.rm(modrm, RegisterSelector::Gpr(width))?;
        let sreg = Operand::reg(Register::segment(sreg));
        let operands = if opcode == 0x8C { vec![rm, sreg] } else { vec![sreg, rm] };
        Ok(self.finish("mov", operands))
    }

    fn lea(&mut self) -> Result<Instruction, DecodeError> {
        let width = self.width(OperandDefault::Bits32);
        let ops = self.modrm(RegisterSelector::Gpr(width))?;
        if !ops.rm.is_memory() {
            return Err(self.invalid("lea requires a memory operand"));
        }
        Ok(self.finish("lea", vec![ops.reg, ops.rm]))
    }

    /// 90-97: nop, pause and exchanges with the accumulator.
    fn xchg_acc(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = self.width(OperandDefault::Bits32);
        let index = (opcode & 0x07) | (self.prefixes.rex_b() << 3);

        if index == 0 && width != 16 {
            let mnemonic = if self.prefixes.rep() { "pause" } else { "nop" };
            return Ok(self.finish(mnemonic, vec![]));
        }

        let reg = Operand::reg(gpr(index, width, &self.prefixes));
        let acc = self.accumulator(width);
        Ok(self.finish("xchg", vec![reg, acc]))
    }

    /// A0-A3: accumulator moves with an absolute address.
    fn mov_moffs(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = if opcode & 1 == 0 {
            8
        } else {
            self.width(OperandDefault::Bits32)
        };

        let (address, size, mnemonic) = if self.prefixes.address_size_override() {
            let raw = u32::from_le_bytes(self.cursor.read_bytes::<4>()?);
            (raw as u64, 4, "mov")
        } else {
            let raw = u64::from_le_bytes(self.cursor.read_bytes::<8>()?);
            (raw, 8, "movabs")
        };

        let mut mem = MemoryRef::absolute(address, size, width);
        mem.segment = self.prefixes.segment();
        let mem = Operand::Memory(mem);
        let acc = self.accumulator(width);

        let operands = if opcode <= 0xA1 { vec![acc, mem] } else { vec![mem, acc] };
        Ok(self.finish(mnemonic, operands))
    }

    /// B0-BF: register, immediate moves. The only full 64-bit immediate.
    fn mov_imm(&mut self, opcode: u8) -> Result<Instruction, DecodeError> {
        let width = if opcode < 0xB8 {
            8
        } else {
            self.width(OperandDefault::Bits32)
        };
        let reg = Operand::reg(opcode_reg(opcode, width, &self.prefixes));
        let imm = self.imm((width / 8) as usize, width)?;
        let mnemonic = if width == 64 { "movabs" } else { "mov" };
        Ok(self.finish(mnemonic, vec![reg, imm]))
    }

    /// 62: EVEX prefix. Length is determined, the instruction is not decoded.
    fn evex(&mut self) -> Result<Instruction, DecodeError> {
        let [p0, _, _] = self.cursor.read_bytes::<3>()?;
        let map = p0 & 0x07;
        let opcode = self.cursor.read_u8()?;
        self.skip_modrm()?;
        if map == 3 || (map == 1 && two_byte_has_imm8(opcode)) {
            self.cursor.skip(1)?;
        }
        Err(self.unsupported("EVEX encoding is not decoded"))
    }
}
