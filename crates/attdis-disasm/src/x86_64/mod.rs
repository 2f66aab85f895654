//! x86_64 instruction decoder.
//!
//! This module implements a from-scratch x86_64 decoder emitting AT&T syntax.
//! It handles:
//! - Legacy prefixes (REP, LOCK, segment overrides, operand/address size)
//! - REX prefix for 64-bit operands and extended registers
//! - Two- and three-byte VEX prefixes (AVX)
//! - ModR/M and SIB byte decoding
//! - The one-byte map, the `0F` map and its SSE/AVX forms

mod decoder;
mod groups;
mod immediate;
mod modrm;
mod opcodes;
mod prefix;
mod registers;
mod simd;
mod strings;
mod two_byte;

pub use decoder::{X86_64Disassembler, MAX_INSTRUCTION_LEN};
pub use prefix::{OperandDefault, PrefixFlags, Prefixes, SimdPrefix};
