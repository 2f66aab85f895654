//! SSE and AVX forms of the `0F` map.
//!
//! The legacy SSE encoding and the VEX map 1 encoding share opcode values
//! and one entry routine: the VEX branch adds the `v` mnemonic, the vvvv
//! source register and 256-bit naming.

use super::decoder::Decoder;
use super::opcodes::{SimdEncoding, SimdOpcode, SIMD_TABLE};
use super::registers::RegisterSelector;
use super::two_byte::skip_operands;
use crate::error::DecodeError;
use attdis_core::{Instruction, Operand, Register};

/// Decodes the opcode following a VEX prefix that selects map 1 (`0F`).
pub(super) fn decode_vex(d: &mut Decoder<'_>, opcode: u8) -> Result<Instruction, DecodeError> {
    if opcode == 0x77 {
        let mnemonic = if d.prefixes.vector_width_256() {
            "vzeroall"
        } else {
            "vzeroupper"
        };
        return Ok(d.finish(mnemonic, vec![]));
    }

    match SIMD_TABLE[opcode as usize] {
        Some(forms) => decode(d, opcode, forms),
        None => Err(skip_operands(d, opcode, "VEX opcode is not decoded")),
    }
}

/// Decodes an SSE/AVX opcode, legacy or VEX encoded.
pub(super) fn decode(d: &mut Decoder<'_>, opcode: u8, forms: SimdOpcode) -> Result<Instruction, DecodeError> {
    let Some(entry) = forms.get(d.prefixes.simd_prefix()) else {
        return Err(skip_operands(d, opcode, "MMX and unlisted SIMD forms are not decoded"));
    };

    let vex = d.prefixes.has_vex();
    if vex {
        if entry.encoding.xmm_only() && d.prefixes.vector_width_256() {
            d.skip_modrm()?;
            return Err(d.invalid("VEX.L must be 0 for this instruction"));
        }
        if !entry.encoding.uses_vvvv() && d.prefixes.vvvv_register() != 0 {
            d.skip_modrm()?;
            return Err(d.invalid("VEX.vvvv must be 1111 for this instruction"));
        }
    }

    let wide = vex && d.prefixes.vector_width_256() && !entry.scalar;
    let vector = RegisterSelector::Vector { wide };

    // 66 is the mandatory prefix here, so only W selects the 64-bit form.
    let qword = d.prefixes.rex_w();
    let gpr = RegisterSelector::VectorGpr(if qword { 64 } else { 32 });

    let operands = match entry.encoding {
        SimdEncoding::ThreeOp => {
            let ops = d.modrm(vector)?;
            if vex {
                let source = Operand::reg(Register::vector(d.prefixes.vvvv_register(), wide));
                vec![ops.reg, source, ops.rm]
            } else {
                vec![ops.reg, ops.rm]
            }
        }
        SimdEncoding::Load | SimdEncoding::QwordLoad => {
            let ops = d.modrm(vector)?;
            vec![ops.reg, ops.rm]
        }
        SimdEncoding::Store | SimdEncoding::QwordStore => {
            let ops = d.modrm(vector)?;
            vec![ops.rm, ops.reg]
        }
        SimdEncoding::GprToVector => {
            let ops = d.modrm(gpr)?;
            vec![ops.reg, ops.rm]
        }
        SimdEncoding::VectorToGpr => {
            let ops = d.modrm(gpr)?;
            vec![ops.rm, ops.reg]
        }
    };

    let base = match entry.encoding {
        SimdEncoding::GprToVector | SimdEncoding::VectorToGpr if qword => "movq",
        _ => entry.mnemonic,
    };
    let mnemonic = if vex {
        format!("v{}", base)
    } else {
        base.to_string()
    };

    Ok(d.finish(mnemonic, operands))
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
    fn test_legacy_pack() {
        // 66 0f 63 c1: packsswb %xmm1,%xmm0
        assert_eq!(att(&[0x66, 0x0f, 0x63, 0xc1]), "packsswb %xmm1,%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0x6b, 0x07]), "packssdw (%rdi),%xmm0");
    }

    #[test]
    fn test_vex_pack_128_and_256() {
        // c5 f1 63 c2: vpacksswb %xmm2,%xmm1,%xmm0
        assert_eq!(att(&[0xc5, 0xf1, 0x63, 0xc2]), "vpacksswb %xmm2,%xmm1,%xmm0");
        // c5 f5 63 c2: L=1
        assert_eq!(att(&[0xc5, 0xf5, 0x63, 0xc2]), "vpacksswb %ymm2,%ymm1,%ymm0");
        // c4 41 35 6b c2: R and B extended, vvvv = ymm9
        assert_eq!(
            att(&[0xc4, 0x41, 0x35, 0x6b, 0xc2]),
            "vpackssdw %ymm10,%ymm9,%ymm8"
        );
    }

    #[test]
    fn test_vex_wins_over_rex() {
        // A REX byte before VEX is discarded
        assert_eq!(
            att(&[0x4c, 0xc5, 0xf1, 0x63, 0xc2]),
            "vpacksswb %xmm2,%xmm1,%xmm0"
        );
    }

    #[test]
    fn test_movd_movq() {
        assert_eq!(att(&[0x66, 0x0f, 0x6e, 0xc7]), "movd %edi,%xmm0");
        assert_eq!(att(&[0x66, 0x48, 0x0f, 0x6e, 0xc7]), "movq %rdi,%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0x7e, 0xc0]), "movd %xmm0,%eax");
        assert_eq!(att(&[0xf3, 0x0f, 0x7e, 0x07]), "movq (%rdi),%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0xd6, 0x07]), "movq %xmm0,(%rdi)");
        assert_eq!(att(&[0xc5, 0xf9, 0x6e, 0xc7]), "vmovd %edi,%xmm0");
        assert_eq!(att(&[0xc4, 0xe1, 0xf9, 0x7e, 0xc0]), "vmovq %xmm0,%rax");
    }

    #[test]
    fn test_vex_l_on_xmm_only_form() {
        // c5 fd 6e c7: vmovd with L=1
        let e = err(&[0xc5, 0xfd, 0x6e, 0xc7]);
        assert!(matches!(e, DecodeError::InvalidEncoding { .. }));
        assert_eq!(e.skip_len(), Some(4));
    }

    #[test]
    fn test_vex_vvvv_must_be_unused() {
        // c5 f1 6f c1: vmovdqa with vvvv naming xmm1
        let e = err(&[0xc5, 0xf1, 0x6f, 0xc1]);
        assert!(matches!(e, DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_moves() {
        assert_eq!(att(&[0x0f, 0x10, 0x07]), "movups (%rdi),%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0x29, 0x07]), "movapd %xmm0,(%rdi)");
        assert_eq!(att(&[0xf3, 0x0f, 0x6f, 0x06]), "movdqu (%rsi),%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0x7f, 0x07]), "movdqa %xmm0,(%rdi)");
        assert_eq!(att(&[0xc5, 0xfe, 0x6f, 0x06]), "vmovdqu (%rsi),%ymm0");
        assert_eq!(att(&[0xc5, 0xfc, 0x29, 0x07]), "vmovaps %ymm0,(%rdi)");
    }

    #[test]
    fn test_float_arith() {
        assert_eq!(att(&[0x0f, 0x58, 0xc1]), "addps %xmm1,%xmm0");
        assert_eq!(att(&[0xf2, 0x0f, 0x59, 0xc1]), "mulsd %xmm1,%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0x57, 0xc0]), "xorpd %xmm0,%xmm0");
        assert_eq!(att(&[0xc5, 0xf4, 0x58, 0xc2]), "vaddps %ymm2,%ymm1,%ymm0");
        // Scalar forms ignore VEX.L
        assert_eq!(att(&[0xc5, 0xf6, 0x5c, 0xc2]), "vsubss %xmm2,%xmm1,%xmm0");
    }

    #[test]
    fn test_integer_ops() {
        assert_eq!(att(&[0x66, 0x0f, 0xef, 0xc0]), "pxor %xmm0,%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0x74, 0xc1]), "pcmpeqb %xmm1,%xmm0");
        assert_eq!(att(&[0x66, 0x0f, 0xd4, 0xc1]), "paddq %xmm1,%xmm0");
        assert_eq!(att(&[0xc5, 0xfd, 0xfe, 0xc1]), "vpaddd %ymm1,%ymm0,%ymm0");
    }

    #[test]
    fn test_mmx_form_is_unsupported() {
        // 0f 63 c1: MMX packsswb %mm1,%mm0
        let e = err(&[0x0f, 0x63, 0xc1]);
        assert!(matches!(e, DecodeError::Unsupported { .. }));
        assert_eq!(e.skip_len(), Some(3));
    }

    #[test]
    fn test_vzeroupper() {
        assert_eq!(att(&[0xc5, 0xf8, 0x77]), "vzeroupper");
    }

    #[test]
    fn test_vex_other_maps() {
        // c4 e2 79 18 07: vbroadcastss (%rdi),%xmm0 (map 2)
        let e = err(&[0xc4, 0xe2, 0x79, 0x18, 0x07]);
        assert!(matches!(e, DecodeError::Unsupported { .. }));
        assert_eq!(e.skip_len(), Some(5));
    }
}
