//! # attdis-disasm
//!
//! x86-64 (64-bit mode) instruction decoder producing AT&T syntax.
//!
//! Single instructions are decoded through the [`Disassembler`] trait;
//! whole buffers go through a [`DecodeLoop`], which turns undecodable bytes
//! into `.byte` placeholders and writes lines to a [`LineSink`].
//!
//! ```
//! use attdis_disasm::{Disassembler, X86_64Disassembler};
//!
//! let decoded = X86_64Disassembler::new()
//!     .decode_instruction(&[0x48, 0x89, 0xe5], 0x1000)
//!     .unwrap();
//! assert_eq!(decoded.instruction.to_string(), "mov %rsp,%rbp");
//! ```

pub mod cursor;
pub mod decode_loop;
pub mod error;
pub mod sink;
pub mod traits;
pub mod x86_64;

pub use cursor::ByteCursor;
pub use decode_loop::{DecodeLoop, DecodeOptions, Listing, LoopEnd, UnsupportedPolicy};
pub use error::DecodeError;
pub use sink::{LineFormat, LineSink, SharedSink};
pub use traits::{DecodedInstruction, Disassembler};
pub use x86_64::X86_64Disassembler;
