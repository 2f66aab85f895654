//! The `0F` two-byte opcode map.

use super::decoder::{sized, suffix, Decoder};
use super::opcodes::{two_byte_has_imm8, two_byte_has_modrm, SIMD_TABLE};
use super::prefix::OperandDefault;
use super::registers::{gpr, opcode_reg, RegisterSelector};
use super::simd;
use crate::error::DecodeError;
use attdis_core::register::seg;
use attdis_core::{Condition, ControlFlow, Instruction, Operand, Register};

/// Decodes the instruction whose `0F` escape and second opcode byte have
/// been consumed.
pub(super) fn decode(d: &mut Decoder<'_>, opcode: u8) -> Result<Instruction, DecodeError> {
    match opcode {
        0x05 => Ok(d.finish("syscall", vec![]).with_control_flow(ControlFlow::Syscall)),
        0x07 => Ok(d.finish("sysret", vec![]).with_control_flow(ControlFlow::Return)),
        0x0B => Ok(d.finish("ud2", vec![]).with_control_flow(ControlFlow::Halt)),
        0x06 | 0x08 | 0x09 | 0x30..=0x35 | 0xAA => {
            let mnemonic = match opcode {
                0x06 => "clts",
                0x08 => "invd",
                0x09 => "wbinvd",
                0x30 => "wrmsr",
                0x31 => "rdtsc",
                0x32 => "rdmsr",
                0x33 => "rdpmc",
                0x34 => "sysenter",
                0x35 => "sysexit",
                _ => "rsm",
            };
            Ok(d.finish(mnemonic, vec![]))
        }
        0xA2 => Ok(d.finish("cpuid", vec![])),

        0x1E if d.prefixes.rep() && matches!(d.cursor.peek(), Some(0xFA | 0xFB)) => {
            let last = d.cursor.read_u8()?;
            let mnemonic = if last == 0xFA { "endbr64" } else { "endbr32" };
            Ok(d.finish(mnemonic, vec![]))
        }
        0x1E | 0x1F => {
            let width = d.width(OperandDefault::Bits32);
            let modrm = d.modrm_byte()?;
            let rm = d.rm(modrm, RegisterSelector::Gpr(width))?;
            Ok(d.finish(sized("nop", width, &rm), vec![rm]))
        }

        0x40..=0x4F => {
            let width = d.width(OperandDefault::Bits32);
            let ops = d.modrm(RegisterSelector::Gpr(width))?;
            let mnemonic = format!("cmov{}", Condition::from_cc(opcode).x86_suffix());
            Ok(d.finish(mnemonic, vec![ops.reg, ops.rm]))
        }
        0x80..=0x8F => d.jcc(opcode, 4),
        0x90..=0x9F => {
            let modrm = d.modrm_byte()?;
            let rm = d.rm(modrm, RegisterSelector::Gpr(8))?;
            let mnemonic = format!("set{}", Condition::from_cc(opcode).x86_suffix());
            Ok(d.finish(mnemonic, vec![rm]))
        }

        0xA0 | 0xA1 | 0xA8 | 0xA9 => {
            let segment = if opcode < 0xA8 { seg::FS } else { seg::GS };
            let base = if opcode & 1 == 0 { "push" } else { "pop" };
            let mnemonic = if d.width(OperandDefault::Bits64) == 16 {
                format!("{}w", base)
            } else {
                base.to_string()
            };
            Ok(d.finish(mnemonic, vec![Operand::reg(Register::segment(segment))]))
        }
        0xAF => {
            let width = d.width(OperandDefault::Bits32);
            let ops = d.modrm(RegisterSelector::Gpr(width))?;
            Ok(d.finish("imul", vec![ops.reg, ops.rm]))
        }
        0xB6 | 0xB7 | 0xBE | 0xBF => extend(d, opcode),
        0xC8..=0xCF => {
            let width = if d.prefixes.rex_w() { 64 } else { 32 };
            let reg = opcode_reg(opcode, width, &d.prefixes);
            Ok(d.finish("bswap", vec![Operand::reg(reg)]))
        }
        0x77 if !d.prefixes.operand_size_override() => Ok(d.finish("emms", vec![])),

        0x38 | 0x3A => {
            d.cursor.read_u8()?;
            d.skip_modrm()?;
            if opcode == 0x3A {
                d.cursor.skip(1)?;
            }
            Err(d.unsupported("three-byte opcode maps are not decoded"))
        }

        _ => match SIMD_TABLE[opcode as usize] {
            Some(forms) => simd::decode(d, opcode, forms),
            None => Err(skip_operands(d, opcode, "two-byte opcode is not decoded")),
        },
    }
}

/// movzb*/movzw*/movsb*/movsw*: zero or sign extension, spelled with the
/// source and destination widths.
fn extend(d: &mut Decoder<'_>, opcode: u8) -> Result<Instruction, DecodeError> {
    let width = d.width(OperandDefault::Bits32);
    let source_width = if opcode & 1 == 0 { 8 } else { 16 };
    let kind = if opcode < 0xBE { 'z' } else { 's' };

    let modrm = d.modrm_byte()?;
    let rm = d.rm(modrm, RegisterSelector::Gpr(source_width))?;
    let reg = Operand::reg(gpr(modrm.reg, width, &d.prefixes));

    let mnemonic = format!("mov{}{}{}", kind, suffix(source_width), suffix(width));
    Ok(d.finish(mnemonic, vec![reg, rm]))
}

/// Consumes the operand bytes of an opcode that is not decoded and reports
/// it, so the placeholder covers the whole instruction.
pub(super) fn skip_operands(d: &mut Decoder<'_>, opcode: u8, reason: &'static str) -> DecodeError {
    if two_byte_has_modrm(opcode) {
        if let Err(err) = d.skip_modrm() {
            return err;
        }
        if two_byte_has_imm8(opcode) {
            if let Err(err) = d.cursor.skip(1) {
                return err;
            }
        }
    }
    d.unsupported(reason)
}
