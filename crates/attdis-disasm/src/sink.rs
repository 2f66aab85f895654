//! Line sinks and listing line format.

use attdis_core::Instruction;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Columns printed in front of the instruction text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineFormat {
    /// Prefix each line with the instruction address.
    pub address: bool,
    /// Show the raw instruction bytes.
    pub bytes: bool,
}

impl LineFormat {
    /// Renders one listing line (without a line terminator).
    pub fn render(&self, instruction: &Instruction) -> String {
        let mut line = String::new();
        if self.address {
            line.push_str(&format!("{:>8x}:\t", instruction.address));
        }
        if self.bytes {
            let hex: Vec<String> = instruction.bytes.iter().map(|b| format!("{:02x}", b)).collect();
            line.push_str(&format!("{:<21}\t", hex.join(" ")));
        }
        line.push_str(&instruction.to_string());
        line
    }
}

/// Destination for listing lines.
///
/// Each call receives one complete line; implementations must not split it.
pub trait LineSink {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

impl LineSink for Vec<String> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

impl<S: LineSink + ?Sized> LineSink for &mut S {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }
}

/// A writer shared by several decode loops.
///
/// A line is assembled in a local buffer and written with one `write_all`
/// under the lock, so lines from concurrent loops never interleave.
#[derive(Debug)]
pub struct SharedSink<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> SharedSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Runs `f` with exclusive access to the writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> io::Result<R> {
        let mut guard = self.inner.lock().map_err(|_| poisoned())?;
        Ok(f(&mut guard))
    }

    /// Returns the writer once every other handle has been dropped.
    pub fn into_inner(self) -> Option<W> {
        Arc::try_unwrap(self.inner)
            .ok()
            .and_then(|mutex| mutex.into_inner().ok())
    }
}

impl<W: Write> LineSink for SharedSink<W> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let mut guard = self.inner.lock().map_err(|_| poisoned())?;
        guard.write_all(&buf)
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "output sink lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use attdis_core::Instruction;

    #[test]
    fn test_line_format_columns() {
        let insn = Instruction::new(0x401000, vec![0x90], "nop");
        assert_eq!(LineFormat::default().render(&insn), "nop");

        let format = LineFormat {
            address: true,
            bytes: true,
        };
        assert_eq!(
            format.render(&insn),
            format!("  401000:\t{:<21}\tnop", "90")
        );
    }

    #[test]
    fn test_vec_sink() {
        let mut lines: Vec<String> = Vec::new();
        lines.write_line("nop").unwrap();
        lines.write_line("ret").unwrap();
        assert_eq!(lines, vec!["nop", "ret"]);
    }

    #[test]
    fn test_shared_sink_appends_newlines() {
        let sink = SharedSink::new(Vec::<u8>::new());
        let mut handle = sink.clone();
        handle.write_line("push %rbp").unwrap();
        drop(handle);
        let written = sink.into_inner().unwrap();
        assert_eq!(written, b"push %rbp\n");
    }
}
