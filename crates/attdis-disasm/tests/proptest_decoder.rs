//! Property-based tests for the x86-64 decoder.
//!
//! These tests verify invariants that should hold for any input:
//! - Decoding never panics on arbitrary input
//! - Decoded instruction size is within valid bounds
//! - Deterministic decoding (same input → same output)
//! - The decode loop accounts for every byte of a buffer
//! - VEX.vvvv and operand-width rules hold for every encoding

use proptest::prelude::*;

use attdis_disasm::{
    DecodeError, DecodeLoop, DecodeOptions, Disassembler, LineFormat, LoopEnd, X86_64Disassembler,
};

// =============================================================================
// Single-instruction properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    /// Decoding arbitrary bytes should never panic.
    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..32)) {
        let disasm = X86_64Disassembler::new();
        let _ = disasm.decode_instruction(&bytes, 0x1000);
    }

    /// Successfully decoded instructions have valid size and keep their bytes.
    #[test]
    fn decoded_size_is_valid(bytes in prop::collection::vec(any::<u8>(), 1..32)) {
        let disasm = X86_64Disassembler::new();
        if let Ok(decoded) = disasm.decode_instruction(&bytes, 0x1000) {
            prop_assert!(decoded.size >= 1, "Instruction size must be at least 1");
            prop_assert!(decoded.size <= 15, "Instruction size must be at most 15");
            prop_assert!(decoded.size <= bytes.len(), "Instruction size cannot exceed input length");
            prop_assert_eq!(&decoded.instruction.bytes[..], &bytes[..decoded.size]);
        }
    }

    /// Placeholders never cover more than the input.
    #[test]
    fn skip_len_is_bounded(bytes in prop::collection::vec(any::<u8>(), 1..32)) {
        let disasm = X86_64Disassembler::new();
        if let Err(err) = disasm.decode_instruction(&bytes, 0x1000) {
            if let Some(len) = err.skip_len() {
                prop_assert!(len >= 1);
                prop_assert!(len <= bytes.len());
            } else {
                prop_assert!(matches!(err, DecodeError::Truncated { .. }), "only truncation lacks a skip length");
            }
        }
    }

    /// Decoding is deterministic: same input always produces same output.
    #[test]
    fn decode_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 1..32)) {
        let disasm = X86_64Disassembler::new();
        let result1 = disasm.decode_instruction(&bytes, 0x1000);
        let result2 = X86_64Disassembler::new().decode_instruction(&bytes, 0x1000);
        prop_assert_eq!(&result1, &result2);
        if let (Ok(d1), Ok(d2)) = (&result1, &result2) {
            prop_assert_eq!(d1.instruction.to_string(), d2.instruction.to_string());
        }
    }

    /// Successfully decoded instructions have valid address.
    #[test]
    fn decoded_address_matches(
        bytes in prop::collection::vec(any::<u8>(), 1..32),
        addr in 0x1000u64..0xFFFF_FFFF_FFFF_0000u64
    ) {
        let disasm = X86_64Disassembler::new();
        if let Ok(decoded) = disasm.decode_instruction(&bytes, addr) {
            prop_assert_eq!(decoded.instruction.address, addr, "Decoded address should match input address");
        }
    }

    /// Decoded instructions have non-empty mnemonics.
    #[test]
    fn decoded_has_mnemonic(bytes in prop::collection::vec(any::<u8>(), 1..32)) {
        let disasm = X86_64Disassembler::new();
        if let Ok(decoded) = disasm.decode_instruction(&bytes, 0x1000) {
            prop_assert!(!decoded.instruction.mnemonic.is_empty(), "Mnemonic should not be empty");
        }
    }
}

// =============================================================================
// Decode loop properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// Instructions are contiguous and either cover the buffer or stop at a
    /// truncated instruction.
    #[test]
    fn decode_loop_covers_all_bytes(
        bytes in prop::collection::vec(any::<u8>(), 16..128),
        start in 0usize..8,
    ) {
        let base = 0x40_0000u64;
        let listing = DecodeLoop::new(DecodeOptions::default()).run(&bytes, base, start, None);

        let mut expected = base + start as u64;
        for insn in &listing.instructions {
            prop_assert_eq!(insn.address, expected);
            prop_assert!(insn.size >= 1);
            expected += insn.size as u64;
        }

        let covered = listing.covered();
        match &listing.end {
            LoopEnd::Exhausted => prop_assert_eq!(covered, bytes.len() - start),
            LoopEnd::Failed { offset, error } => {
                prop_assert!(
                    matches!(error, DecodeError::Truncated { .. }),
                    "only truncation stops the loop"
                );
                prop_assert_eq!(covered, offset - start);
            }
            LoopEnd::Cancelled { .. } => prop_assert!(false, "no cancellation was requested"),
        }
    }

    /// Two independent runs over one buffer produce identical text.
    #[test]
    fn decode_loop_is_idempotent(bytes in prop::collection::vec(any::<u8>(), 1..128)) {
        let first = DecodeLoop::new(DecodeOptions::default()).run(&bytes, 0, 0, None);
        let second = DecodeLoop::new(DecodeOptions::default()).run(&bytes, 0, 0, None);
        let first: Vec<String> = first.lines(LineFormat::default()).collect();
        let second: Vec<String> = second.lines(LineFormat::default()).collect();
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Encoding rules
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// The stored VEX.vvvv field names register `field ^ 0xF`.
    #[test]
    fn vex_vvvv_is_complemented(field in 0u8..16, wide in any::<bool>()) {
        // c5 [R̄ vvvv L pp=01] fe c0: vpaddd %?mm0,%?mm(field^0xF),%?mm0
        let payload = 0x80 | (field << 3) | ((wide as u8) << 2) | 0x01;
        let bytes = [0xc5, payload, 0xfe, 0xc0];
        let decoded = X86_64Disassembler::new().decode_instruction(&bytes, 0).unwrap();

        let class = if wide { "ymm" } else { "xmm" };
        let expected = format!("vpaddd %{0}0,%{0}{1},%{0}0", class, field ^ 0xF);
        prop_assert_eq!(decoded.instruction.to_string(), expected);
    }

    /// `66` selects 16 bits regardless of REX.W; REX.W alone selects 64.
    #[test]
    fn operand_width_precedence(opsize in any::<bool>(), rex_w in any::<bool>(), reg in 0u8..8) {
        let mut bytes = Vec::new();
        if opsize {
            bytes.push(0x66);
        }
        if rex_w {
            bytes.push(0x48);
        }
        // 01 /r with mod=11: add %reg,%reg
        bytes.extend_from_slice(&[0x01, 0xc0 | (reg << 3) | reg]);
        let decoded = X86_64Disassembler::new().decode_instruction(&bytes, 0).unwrap();

        let names16 = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
        let name = names16[reg as usize];
        let expected = match (opsize, rex_w) {
            (true, _) => name.to_string(),
            (false, true) => format!("r{}", name),
            (false, false) => format!("e{}", name),
        };
        prop_assert_eq!(decoded.instruction.to_string(), format!("add %{0},%{0}", expected));
        prop_assert_eq!(decoded.size, bytes.len());
    }

    /// Instruction length depends on structure only, never on operand values.
    #[test]
    fn length_ignores_operand_values(digit in 0u8..8, rm in 0u8..8, imm in any::<u32>()) {
        // 81 /digit with a register operand and a 4-byte immediate
        let mut bytes = vec![0x81, 0xc0 | (digit << 3) | rm];
        bytes.extend_from_slice(&imm.to_le_bytes());
        let decoded = X86_64Disassembler::new().decode_instruction(&bytes, 0).unwrap();
        prop_assert_eq!(decoded.size, 6);
    }

    /// REX prefixes never change instruction length for register forms.
    #[test]
    fn rex_prefix_handling(rex in 0x40u8..0x50, opcode in 0x00u8..0x04, modrm in 0xc0u8..=0xff) {
        let bytes = [rex, opcode, modrm];
        let decoded = X86_64Disassembler::new().decode_instruction(&bytes, 0).unwrap();
        prop_assert_eq!(decoded.size, 3);
    }

    /// Three-byte VEX prefixes with any payload never panic and never
    /// over-consume.
    #[test]
    fn vex_prefix_handling(
        b1 in any::<u8>(),
        b2 in any::<u8>(),
        rest in prop::collection::vec(any::<u8>(), 0..10)
    ) {
        let mut bytes = vec![0xc4, b1, b2];
        bytes.extend(rest);
        let disasm = X86_64Disassembler::new();
        if let Ok(decoded) = disasm.decode_instruction(&bytes, 0) {
            prop_assert!(decoded.size <= bytes.len());
            prop_assert!(decoded.instruction.mnemonic.starts_with('v'));
        }
    }

    /// Escape sequences into the 0F map never panic.
    #[test]
    fn escape_sequences(
        prefix in prop::sample::select(vec![None, Some(0x66u8), Some(0xf2), Some(0xf3)]),
        opcode in any::<u8>(),
        rest in prop::collection::vec(any::<u8>(), 0..12)
    ) {
        let mut bytes = Vec::new();
        bytes.extend(prefix);
        bytes.push(0x0f);
        bytes.push(opcode);
        bytes.extend(rest);
        let _ = X86_64Disassembler::new().decode_instruction(&bytes, 0);
    }
}
