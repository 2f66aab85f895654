//! attdis - AT&T syntax disassembler for raw x86-64 code
//!
//! Usage:
//!   attdis <file>                    Disassemble a whole raw code file
//!   attdis <file> --offset 0x40      Start at a byte offset
//!   attdis --hex "55 48 89 e5 c3"    Disassemble bytes given on the command line
//!   attdis <file> --addresses --bytes

use anyhow::{bail, Context, Result};
use attdis_core::{ControlFlow, Instruction, Operand};
use attdis_disasm::{
    DecodeLoop, DecodeOptions, LineFormat, LineSink, Listing, LoopEnd, SharedSink,
    UnsupportedPolicy,
};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attdis")]
#[command(about = "Disassemble raw x86-64 machine code into AT&T syntax", long_about = None)]
struct Cli {
    /// Path to a file of raw machine code
    #[arg(required_unless_present = "hex", conflicts_with = "hex")]
    input: Option<PathBuf>,

    /// Machine code as hex digits (whitespace ignored)
    #[arg(long)]
    hex: Option<String>,

    /// Byte offset to start decoding at
    #[arg(short, long, default_value = "0", value_parser = parse_number)]
    offset: u64,

    /// Number of bytes to decode from the offset
    #[arg(short, long, value_parser = parse_number)]
    length: Option<u64>,

    /// Address of the first byte of the input
    #[arg(short, long, default_value = "0", value_parser = parse_hex)]
    base: u64,

    /// Prefix each line with its address
    #[arg(long)]
    addresses: bool,

    /// Show the raw instruction bytes
    #[arg(long)]
    bytes: bool,

    /// Stop at the first invalid or unsupported instruction instead of
    /// emitting a `.byte` placeholder
    #[arg(long)]
    halt_on_unsupported: bool,

    /// Emit one JSON object per instruction
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn options(&self) -> DecodeOptions {
        DecodeOptions {
            unsupported: if self.halt_on_unsupported {
                UnsupportedPolicy::Halt
            } else {
                UnsupportedPolicy::Placeholder
            },
            line: LineFormat {
                address: self.addresses,
                bytes: self.bytes,
            },
        }
    }
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| e.to_string())
}

/// Decimal, or hex with a `0x` prefix.
fn parse_number(s: &str) -> Result<u64, String> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

fn decode_hex_string(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .split_whitespace()
        .map(|word| word.strip_prefix("0x").unwrap_or(word))
        .collect();
    if !digits.is_ascii() {
        bail!("Hex input contains non-ASCII characters");
    }
    if digits.len() % 2 != 0 {
        bail!("Hex input has an odd number of digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = &digits[i..i + 2];
            u8::from_str_radix(pair, 16).with_context(|| format!("Invalid hex byte '{}'", pair))
        })
        .collect()
}

/// One instruction in `--json` output.
#[derive(Serialize)]
struct JsonInstruction<'a> {
    address: u64,
    bytes: String,
    text: String,
    undecoded: bool,
    operands: &'a [Operand],
    control_flow: &'a ControlFlow,
}

impl<'a> From<&'a Instruction> for JsonInstruction<'a> {
    fn from(insn: &'a Instruction) -> Self {
        Self {
            address: insn.address,
            bytes: insn.bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            text: insn.to_string(),
            undecoded: insn.undecoded,
            operands: &insn.operands,
            control_flow: &insn.control_flow,
        }
    }
}

fn write_json(listing: &Listing, sink: &mut impl LineSink) -> Result<()> {
    for insn in &listing.instructions {
        let line = serde_json::to_string(&JsonInstruction::from(insn))
            .context("Failed to serialize instruction")?;
        sink.write_line(&line).context("Failed to write output")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let data = match (&cli.input, &cli.hex) {
        (Some(path), _) => fs::read(path)
            .with_context(|| format!("Failed to read input: {}", path.display()))?,
        (None, Some(text)) => decode_hex_string(text)?,
        (None, None) => bail!("No input given"),
    };

    let start = usize::try_from(cli.offset).context("Offset does not fit in memory")?;
    if start > data.len() {
        bail!(
            "Offset {:#x} is past the end of the input ({} bytes)",
            cli.offset,
            data.len()
        );
    }
    let end = match cli.length {
        Some(length) => {
            let length = usize::try_from(length).context("Length does not fit in memory")?;
            start.saturating_add(length).min(data.len())
        }
        None => data.len(),
    };
    let bytes = &data[..end];

    info!(len = bytes.len() - start, base = cli.base, "decoding input");

    let decode_loop = DecodeLoop::new(cli.options());
    let mut sink = SharedSink::new(io::stdout().lock());
    let outcome = if cli.json {
        let listing = decode_loop.run(bytes, cli.base, start, None);
        write_json(&listing, &mut sink)?;
        listing.end
    } else {
        decode_loop
            .run_to_sink(bytes, cli.base, start, None, &mut sink)
            .context("Failed to write output")?
    };

    match outcome {
        LoopEnd::Exhausted => Ok(()),
        LoopEnd::Cancelled { offset } => bail!("Decoding cancelled at offset {:#x}", offset),
        LoopEnd::Failed { offset, error } => {
            Err(error).with_context(|| format!("Decoding stopped at offset {:#x}", offset))
        }
    }
}
