//! Buffer-level decode loop.
//!
//! The loop walks a byte buffer one instruction at a time, turning decode
//! failures into `.byte` placeholders or stopping, depending on
//! [`UnsupportedPolicy`]. A cancellation flag is polled between
//! instructions, never inside one.

use crate::error::DecodeError;
use crate::sink::{LineFormat, LineSink};
use crate::traits::Disassembler;
use crate::x86_64::X86_64Disassembler;
use attdis_core::Instruction;
use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// What to do with bytes that are invalid or not decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsupportedPolicy {
    /// Emit a `.byte` line covering the instruction and keep going.
    #[default]
    Placeholder,
    /// Stop the buffer at the first such instruction.
    Halt,
}

/// Options for a [`DecodeLoop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub unsupported: UnsupportedPolicy,
    pub line: LineFormat,
}

/// Why a decode loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEnd {
    /// Every byte from the start offset was covered.
    Exhausted,
    /// The cancellation flag was observed before decoding at `offset`.
    Cancelled { offset: usize },
    /// Decoding stopped at `offset`; nothing was emitted for that instruction.
    Failed { offset: usize, error: DecodeError },
}

impl LoopEnd {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// Instructions decoded from one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub instructions: Vec<Instruction>,
    pub end: LoopEnd,
}

impl Listing {
    /// Renders every instruction with `format`.
    pub fn lines(&self, format: LineFormat) -> impl Iterator<Item = String> + '_ {
        self.instructions.iter().map(move |insn| format.render(insn))
    }

    /// Writes every line to `sink`.
    pub fn write_to<S: LineSink + ?Sized>(&self, format: LineFormat, sink: &mut S) -> io::Result<()> {
        for line in self.lines(format) {
            sink.write_line(&line)?;
        }
        Ok(())
    }

    /// Total number of bytes covered by the listing.
    pub fn covered(&self) -> usize {
        self.instructions.iter().map(|insn| insn.size).sum()
    }
}

/// Drives a [`Disassembler`] over whole buffers.
#[derive(Debug, Clone)]
pub struct DecodeLoop<D = X86_64Disassembler> {
    disassembler: D,
    options: DecodeOptions,
}

impl DecodeLoop<X86_64Disassembler> {
    pub fn new(options: DecodeOptions) -> Self {
        Self::with_disassembler(X86_64Disassembler::new(), options)
    }
}

impl<D: Disassembler> DecodeLoop<D> {
    pub fn with_disassembler(disassembler: D, options: DecodeOptions) -> Self {
        Self {
            disassembler,
            options,
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decodes `bytes[start_offset..]`, where `bytes[0]` sits at
    /// `base_address`.
    pub fn run(
        &self,
        bytes: &[u8],
        base_address: u64,
        start_offset: usize,
        cancel: Option<&AtomicBool>,
    ) -> Listing {
        let mut instructions = Vec::new();
        let end = self.drive::<Infallible>(bytes, base_address, start_offset, cancel, |insn| {
            instructions.push(insn);
            Ok(())
        });
        let end = match end {
            Ok(end) => end,
            Err(never) => match never {},
        };
        Listing { instructions, end }
    }

    /// Like [`run`](Self::run), but writes each line to `sink` as soon as its
    /// instruction is decoded.
    pub fn run_to_sink<S: LineSink + ?Sized>(
        &self,
        bytes: &[u8],
        base_address: u64,
        start_offset: usize,
        cancel: Option<&AtomicBool>,
        sink: &mut S,
    ) -> io::Result<LoopEnd> {
        let format = self.options.line;
        self.drive(bytes, base_address, start_offset, cancel, |insn| {
            sink.write_line(&format.render(&insn))
        })
    }

    fn drive<E>(
        &self,
        bytes: &[u8],
        base_address: u64,
        start_offset: usize,
        cancel: Option<&AtomicBool>,
        mut emit: impl FnMut(Instruction) -> Result<(), E>,
    ) -> Result<LoopEnd, E> {
        let mut offset = start_offset.min(bytes.len());

        while offset < bytes.len() {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                debug!(offset, "decode cancelled");
                return Ok(LoopEnd::Cancelled { offset });
            }

            let address = base_address.wrapping_add(offset as u64);
            match self.disassembler.decode_instruction(&bytes[offset..], address) {
                Ok(decoded) => {
                    trace!(offset, len = decoded.size, "decoded instruction");
                    offset += decoded.size;
                    emit(decoded.instruction)?;
                }
                Err(error) => {
                    let Some(skip) = error.skip_len() else {
                        warn!(offset, %error, "buffer ends inside an instruction");
                        return Ok(LoopEnd::Failed { offset, error });
                    };
                    if self.options.unsupported == UnsupportedPolicy::Halt {
                        debug!(offset, %error, "halting on undecodable instruction");
                        return Ok(LoopEnd::Failed { offset, error });
                    }

                    let len = skip.min(bytes.len() - offset);
                    debug!(offset, len, %error, "emitting placeholder");
                    emit(Instruction::undecoded(address, bytes[offset..offset + len].to_vec()))?;
                    offset += len;
                }
            }
        }

        Ok(LoopEnd::Exhausted)
    }
}
